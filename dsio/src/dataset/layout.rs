//! Dataset storage layouts.
//!
//! A [`LayoutDescriptor`] is the versioned layout record persisted in the dataset metadata.
//! [`LayoutIo`] moves elements between storage and a flat buffer for the contiguous and chunked layouts.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use dsio_storage::{
    byte_range::ByteRange, ListableStorageTraits, ReadableStorageTraits,
    ReadableWritableListableStorage, StoreKey, StoreKeyOffsetValue, StorePrefix,
    WritableStorageTraits,
};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    config::global_config,
    filter::FilterPipeline,
    registry::Registry,
    selection::{ravel_indices, unravel_index, Selection},
};

use super::{DatasetError, ExternalFile, Layout};

/// The kind of a dataset layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutKind {
    /// Contiguous.
    Contiguous,
    /// Chunked.
    Chunked,
}

/// A versioned dataset layout record.
///
/// The descriptor is written when a dataset is created and read back unchanged when it is opened.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayoutDescriptor {
    version: u32,
    kind: LayoutKind,
    dims: Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    chunk_shape: Option<Vec<u64>>,
}

impl LayoutDescriptor {
    /// The current layout descriptor version.
    pub const VERSION: u32 = 1;

    pub(crate) fn new(layout: &Layout, dims: &[u64]) -> Self {
        let (kind, chunk_shape) = match layout {
            Layout::Contiguous => (LayoutKind::Contiguous, None),
            Layout::Chunked { chunk_shape } => (LayoutKind::Chunked, Some(chunk_shape.clone())),
        };
        Self {
            version: Self::VERSION,
            kind,
            dims: dims.to_vec(),
            chunk_shape,
        }
    }

    /// The descriptor version.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// The layout kind.
    #[must_use]
    pub const fn kind(&self) -> LayoutKind {
        self.kind
    }

    /// The dataset dimensions when the layout was created.
    #[must_use]
    pub fn dims(&self) -> &[u64] {
        &self.dims
    }

    /// The chunk shape of a chunked layout.
    #[must_use]
    pub fn chunk_shape(&self) -> Option<&[u64]> {
        self.chunk_shape.as_deref()
    }

    /// Reconstruct the [`Layout`].
    pub(crate) fn layout(&self) -> Result<Layout, DatasetError> {
        if self.version != Self::VERSION {
            return Err(DatasetError::NotFound(format!(
                "unsupported layout descriptor version {}",
                self.version
            )));
        }
        match (self.kind, &self.chunk_shape) {
            (LayoutKind::Contiguous, _) => Ok(Layout::Contiguous),
            (LayoutKind::Chunked, Some(chunk_shape)) => Ok(Layout::Chunked {
                chunk_shape: chunk_shape.clone(),
            }),
            (LayoutKind::Chunked, None) => Err(DatasetError::NotFound(
                "chunked layout descriptor without a chunk shape".to_string(),
            )),
        }
    }
}

/// A run of elements to transfer between storage and a flat buffer, in elements.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Piece {
    /// The linear element index in storage.
    pub file: u64,
    /// The element index in the buffer.
    pub mem: u64,
    /// The number of elements.
    pub len: u64,
}

/// The byte offset of element `index`.
fn element_bytes(index: u64, element_size: u64) -> Result<u64, DatasetError> {
    index.checked_mul(element_size).ok_or_else(|| {
        DatasetError::InvalidArgument(format!(
            "element {index} is beyond the addressable bytes of the dataset"
        ))
    })
}

fn to_usize(value: u64) -> Result<usize, DatasetError> {
    usize::try_from(value).map_err(|_| {
        DatasetError::BufferTooSmall(format!("{value} bytes exceeds the address space"))
    })
}

/// Fill `bytes` with the repeating element `fill`, where `bytes` starts at byte `start` of the element sequence.
fn fill_pattern(bytes: &mut [u8], fill: &[u8], start: u64) {
    let element_size = fill.len() as u64;
    for (i, byte) in (start..).zip(bytes.iter_mut()) {
        *byte = fill[(i % element_size) as usize];
    }
}

#[derive(Clone, Debug)]
struct Segment {
    key: StoreKey,
    offset: u64,
    size: Option<u64>,
}

/// Contiguous layout I/O.
///
/// Elements are stored in row-major order.
/// The byte sequence is held in a single internal value, or split across a sequence of external file segments.
#[derive(Clone)]
pub(crate) struct ContiguousIo {
    storage: ReadableWritableListableStorage,
    segments: Vec<Segment>,
    external: bool,
    element_size: usize,
    fill: Vec<u8>,
}

/// A part of a byte range that falls in one segment.
struct SegmentRange {
    segment: usize,
    key_offset: u64,
    start: u64,
    len: u64,
}

impl ContiguousIo {
    pub(crate) fn new(
        storage: ReadableWritableListableStorage,
        name: &str,
        external_files: &[ExternalFile],
        element_size: usize,
        fill: Vec<u8>,
    ) -> Result<Self, DatasetError> {
        let segments = if external_files.is_empty() {
            vec![Segment {
                key: StoreKey::new(format!("{name}/data"))?,
                offset: 0,
                size: None,
            }]
        } else {
            external_files
                .iter()
                .map(|external_file| {
                    Ok(Segment {
                        key: StoreKey::new(external_file.name.clone())?,
                        offset: external_file.offset,
                        size: external_file.size,
                    })
                })
                .collect::<Result<_, DatasetError>>()?
        };
        Ok(Self {
            storage,
            segments,
            external: !external_files.is_empty(),
            element_size,
            fill,
        })
    }

    /// Split the byte range `start..start + len` across segments.
    fn segment_ranges(
        &self,
        mut start: u64,
        mut len: u64,
        ranges: &mut Vec<SegmentRange>,
    ) -> Result<(), DatasetError> {
        let mut segment_start: u64 = 0;
        for (segment_index, segment) in self.segments.iter().enumerate() {
            if len == 0 {
                break;
            }
            let segment_end = segment
                .size
                .map_or(u64::MAX, |size| segment_start.saturating_add(size));
            if start < segment_end {
                let part = len.min(segment_end - start);
                let key_offset = segment
                    .offset
                    .checked_add(start - segment_start)
                    .ok_or_else(|| {
                        DatasetError::InvalidArgument(format!(
                            "byte {start} is beyond the addressable bytes of external file {}",
                            segment.key
                        ))
                    })?;
                ranges.push(SegmentRange {
                    segment: segment_index,
                    key_offset,
                    start,
                    len: part,
                });
                start += part;
                len -= part;
            }
            segment_start = segment_end;
        }
        if len == 0 {
            Ok(())
        } else {
            Err(DatasetError::InvalidArgument(format!(
                "byte {start} is beyond the external storage of the dataset"
            )))
        }
    }

    fn byte_ranges(&self, pieces: &[Piece]) -> Result<Vec<(SegmentRange, u64)>, DatasetError> {
        let element_size = self.element_size as u64;
        let mut ranges = Vec::with_capacity(pieces.len());
        let mut parts = Vec::new();
        for piece in pieces {
            let start = element_bytes(piece.file, element_size)?;
            self.segment_ranges(start, element_bytes(piece.len, element_size)?, &mut parts)?;
            let mem = element_bytes(piece.mem, element_size)?;
            for part in parts.drain(..) {
                let mem_start = mem + (part.start - start);
                ranges.push((part, mem_start));
            }
        }
        Ok(ranges)
    }

    pub(crate) fn read_pieces(&self, pieces: &[Piece], out: &mut [u8]) -> Result<(), DatasetError> {
        let ranges = self.byte_ranges(pieces)?;
        for (segment_index, segment) in self.segments.iter().enumerate() {
            let requests = ranges
                .iter()
                .filter(|(range, _)| range.segment == segment_index)
                .collect::<Vec<_>>();
            if requests.is_empty() {
                continue;
            }
            let stored = self.storage.size_key(&segment.key)?.unwrap_or_default();
            let stored_len =
                |range: &SegmentRange| range.len.min(stored.saturating_sub(range.key_offset));
            let byte_ranges = requests
                .iter()
                .filter(|(range, _)| stored_len(range) > 0)
                .map(|(range, _)| ByteRange::new(range.key_offset, Some(stored_len(range))))
                .collect::<Vec<_>>();
            let mut values = if byte_ranges.is_empty() {
                Vec::new()
            } else {
                self.storage
                    .get_byte_ranges(&segment.key, &byte_ranges)?
                    .unwrap_or_default()
            }
            .into_iter();
            for (range, mem_start) in requests {
                let out = &mut out[to_usize(*mem_start)?..to_usize(mem_start + range.len)?];
                let stored_len = to_usize(stored_len(range))?;
                if stored_len > 0 {
                    let value = values.next().ok_or_else(|| {
                        DatasetError::PartialTransfer {
                            expected: range.len,
                            actual: 0,
                        }
                    })?;
                    if value.len() != stored_len {
                        return Err(DatasetError::PartialTransfer {
                            expected: stored_len as u64,
                            actual: value.len() as u64,
                        });
                    }
                    out[..stored_len].copy_from_slice(&value);
                }
                fill_pattern(
                    &mut out[stored_len..],
                    &self.fill,
                    range.start + stored_len as u64,
                );
            }
        }
        Ok(())
    }

    pub(crate) fn write_pieces(&self, pieces: &[Piece], input: &[u8]) -> Result<(), DatasetError> {
        let mut ranges = self.byte_ranges(pieces)?;
        ranges.sort_by_key(|(range, _)| range.segment);
        let key_offset_values = ranges
            .iter()
            .map(|(range, mem_start)| {
                let value = &input[to_usize(*mem_start)?..to_usize(mem_start + range.len)?];
                Ok(StoreKeyOffsetValue::new(
                    self.segments[range.segment].key.clone(),
                    range.key_offset,
                    value,
                ))
            })
            .collect::<Result<Vec<_>, DatasetError>>()?;
        self.storage.set_partial_values(&key_offset_values)?;
        Ok(())
    }

    /// Write `fill` to the elements `start..end`, one strip at a time.
    pub(crate) fn fill_elements(&self, start: u64, end: u64, fill: &[u8]) -> Result<(), DatasetError> {
        let strip = (global_config().transfer_buffer_size() / self.element_size).max(1) as u64;
        let strip_bytes = fill.repeat(to_usize(strip.min(end.saturating_sub(start)))?);
        let mut file = start;
        while file < end {
            let len = strip.min(end - file);
            self.write_pieces(&[Piece { file, mem: 0, len }], &strip_bytes)?;
            file += len;
        }
        Ok(())
    }

    /// The number of bytes held in storage.
    pub(crate) fn storage_size(&self) -> Result<u64, DatasetError> {
        let mut size = 0;
        for segment in &self.segments {
            let stored = self.storage.size_key(&segment.key)?.unwrap_or_default();
            let stored = stored.saturating_sub(segment.offset);
            size += segment.size.map_or(stored, |limit| stored.min(limit));
        }
        Ok(size)
    }

    pub(crate) const fn is_external(&self) -> bool {
        self.external
    }
}

/// Chunked layout I/O.
///
/// Every chunk holds `chunk_shape` elements in row-major order, including chunks that overhang the dataset extent.
/// Chunks are stored at `{name}/c/{i}/{j}/...` encoded through the filter pipeline, and a missing chunk reads as fill.
#[derive(Clone)]
pub(crate) struct ChunkedIo {
    storage: ReadableWritableListableStorage,
    name: String,
    dims: Vec<u64>,
    chunk_shape: Vec<u64>,
    element_size: usize,
    fill: Vec<u8>,
    filters: FilterPipeline,
    registry: Arc<Registry>,
}

impl ChunkedIo {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        storage: ReadableWritableListableStorage,
        name: &str,
        dims: Vec<u64>,
        chunk_shape: Vec<u64>,
        element_size: usize,
        fill: Vec<u8>,
        filters: FilterPipeline,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            storage,
            name: name.to_string(),
            dims,
            chunk_shape,
            element_size,
            fill,
            filters,
            registry,
        }
    }

    fn chunk_key(&self, chunk_indices: &[u64]) -> Result<StoreKey, DatasetError> {
        Ok(StoreKey::new(format!(
            "{}/c/{}",
            self.name,
            chunk_indices.iter().join("/")
        ))?)
    }

    fn chunk_prefix(&self) -> Result<StorePrefix, DatasetError> {
        Ok(StorePrefix::new(format!("{}/c/", self.name))?)
    }

    fn chunk_num_elements(&self) -> u64 {
        self.chunk_shape.iter().product()
    }

    fn fill_chunk(&self) -> Result<Vec<u8>, DatasetError> {
        Ok(self.fill.repeat(to_usize(self.chunk_num_elements())?))
    }

    fn retrieve_chunk(&self, key: &StoreKey) -> Result<Option<Vec<u8>>, DatasetError> {
        let Some(stored) = self.storage.get(key)? else {
            return Ok(None);
        };
        let decoded = self
            .filters
            .decode(&self.registry.filters(), &stored, self.element_size)?;
        let expected = to_usize(self.chunk_num_elements())? * self.element_size;
        if decoded.len() == expected {
            Ok(Some(decoded))
        } else {
            Err(DatasetError::FilterFailed(
                format!(
                    "chunk {key} decoded to {} bytes, expected {expected}",
                    decoded.len()
                )
                .into(),
            ))
        }
    }

    fn store_chunk(&self, key: &StoreKey, decoded: Vec<u8>) -> Result<(), DatasetError> {
        let encoded = self
            .filters
            .encode(&self.registry.filters(), decoded, self.element_size)?;
        self.storage.set(key, encoded.into())?;
        Ok(())
    }

    /// Split pieces at chunk boundaries, grouped by chunk.
    ///
    /// The file index of each returned piece is the element index within its chunk.
    fn chunk_pieces(&self, pieces: &[Piece]) -> BTreeMap<Vec<u64>, Vec<Piece>> {
        let mut chunk_pieces: BTreeMap<Vec<u64>, Vec<Piece>> = BTreeMap::new();
        let last = self.dims.len() - 1;
        for piece in pieces {
            let (mut file, mut mem, mut remaining) = (piece.file, piece.mem, piece.len);
            while remaining > 0 {
                let coordinates = unravel_index(file, &self.dims);
                let chunk_indices = coordinates
                    .iter()
                    .zip(&self.chunk_shape)
                    .map(|(coordinate, chunk)| coordinate / chunk)
                    .collect::<Vec<_>>();
                let within_chunk = coordinates
                    .iter()
                    .zip(&self.chunk_shape)
                    .map(|(coordinate, chunk)| coordinate % chunk)
                    .collect::<Vec<_>>();
                let len = remaining
                    .min(self.dims[last] - coordinates[last])
                    .min(self.chunk_shape[last] - within_chunk[last]);
                chunk_pieces.entry(chunk_indices).or_default().push(Piece {
                    file: ravel_indices(&within_chunk, &self.chunk_shape),
                    mem,
                    len,
                });
                file += len;
                mem += len;
                remaining -= len;
            }
        }
        chunk_pieces
    }

    pub(crate) fn read_pieces(&self, pieces: &[Piece], out: &mut [u8]) -> Result<(), DatasetError> {
        let element_size = self.element_size;
        for (chunk_indices, pieces) in self.chunk_pieces(pieces) {
            let chunk = self.retrieve_chunk(&self.chunk_key(&chunk_indices)?)?;
            for piece in pieces {
                let out = &mut out[to_usize(piece.mem)? * element_size
                    ..to_usize(piece.mem + piece.len)? * element_size];
                match &chunk {
                    Some(chunk) => out.copy_from_slice(
                        &chunk[to_usize(piece.file)? * element_size
                            ..to_usize(piece.file + piece.len)? * element_size],
                    ),
                    None => fill_pattern(out, &self.fill, 0),
                }
            }
        }
        Ok(())
    }

    pub(crate) fn write_pieces(&self, pieces: &[Piece], input: &[u8]) -> Result<(), DatasetError> {
        let element_size = self.element_size;
        let chunk_num_elements = self.chunk_num_elements();
        for (chunk_indices, pieces) in self.chunk_pieces(pieces) {
            let key = self.chunk_key(&chunk_indices)?;
            let covers_chunk = {
                let mut ranges = pieces
                    .iter()
                    .map(|piece| (piece.file, piece.len))
                    .collect::<Vec<_>>();
                ranges.sort_unstable();
                let end = ranges.iter().try_fold(0, |end, (start, len)| {
                    (*start == end).then_some(end + len)
                });
                end == Some(chunk_num_elements)
            };
            let mut chunk = if covers_chunk {
                vec![0; to_usize(chunk_num_elements)? * element_size]
            } else {
                match self.retrieve_chunk(&key)? {
                    Some(chunk) => chunk,
                    None => self.fill_chunk()?,
                }
            };
            for piece in pieces {
                chunk[to_usize(piece.file)? * element_size
                    ..to_usize(piece.file + piece.len)? * element_size]
                    .copy_from_slice(
                        &input[to_usize(piece.mem)? * element_size
                            ..to_usize(piece.mem + piece.len)? * element_size],
                    );
            }
            self.store_chunk(&key, chunk)?;
        }
        Ok(())
    }

    /// Store a fill chunk for every chunk intersecting the dataset extent that is not yet stored.
    pub(crate) fn allocate_missing_chunks(&self) -> Result<u64, DatasetError> {
        let stored: BTreeSet<StoreKey> = self
            .storage
            .list_prefix(&self.chunk_prefix()?)?
            .into_iter()
            .collect();
        let mut allocated = 0;
        let grid = self
            .dims
            .iter()
            .zip(&self.chunk_shape)
            .map(|(dim, chunk)| 0..dim.div_ceil(*chunk))
            .multi_cartesian_product();
        for chunk_indices in grid {
            let key = self.chunk_key(&chunk_indices)?;
            if !stored.contains(&key) {
                self.store_chunk(&key, self.fill_chunk()?)?;
                allocated += 1;
            }
        }
        Ok(allocated)
    }

    /// The number of bytes held in storage by encoded chunks.
    pub(crate) fn storage_size(&self) -> Result<u64, DatasetError> {
        Ok(self.storage.size_prefix(&self.chunk_prefix()?)?)
    }
}

/// Layout specific element I/O, selected once when a dataset is created or opened.
#[derive(Clone)]
pub(crate) enum LayoutIo {
    Contiguous(ContiguousIo),
    Chunked(ChunkedIo),
}

impl LayoutIo {
    pub(crate) fn read_pieces(&self, pieces: &[Piece], out: &mut [u8]) -> Result<(), DatasetError> {
        match self {
            Self::Contiguous(io) => io.read_pieces(pieces, out),
            Self::Chunked(io) => io.read_pieces(pieces, out),
        }
    }

    pub(crate) fn write_pieces(&self, pieces: &[Piece], input: &[u8]) -> Result<(), DatasetError> {
        match self {
            Self::Contiguous(io) => io.write_pieces(pieces, input),
            Self::Chunked(io) => io.write_pieces(pieces, input),
        }
    }

    /// Returns true if the layout has a direct transfer routine for a pair of selections.
    pub(crate) fn supports_direct_transfer(&self, file: &Selection, memory: &Selection) -> bool {
        match self {
            Self::Contiguous(_) => !file.is_points() && !memory.is_points(),
            Self::Chunked(_) => !file.is_points(),
        }
    }

    pub(crate) const fn is_contiguous(&self) -> bool {
        matches!(self, Self::Contiguous(_))
    }

    pub(crate) fn set_dims(&mut self, dims: &[u64]) {
        if let Self::Chunked(io) = self {
            io.dims = dims.to_vec();
        }
    }

    pub(crate) fn storage_size(&self) -> Result<u64, DatasetError> {
        match self {
            Self::Contiguous(io) => io.storage_size(),
            Self::Chunked(io) => io.storage_size(),
        }
    }
}
