//! Transfer configuration and the strip-mining transfer engine.
//!
//! A transfer moves the selected elements of a source to the selected elements of a destination:
//!  - If the element types are identical and the dataset layout has a direct routine for the selections, elements are copied in a single pass without conversion.
//!  - Otherwise, elements are processed in strips bounded by the [buffer size](TransferConfig::buffer_size).
//!    Each strip is gathered from the source into the conversion buffer, converted in place, and scattered to the destination.

use std::ops::{Deref, DerefMut};

use crate::{
    config::global_config,
    element_type::ConversionPath,
    selection::{Dataspace, SelectionIter},
};

use super::{
    adapter::{Gather, Scatter},
    layout::{LayoutIo, Piece},
    DatasetError,
};

/// When a background buffer is used.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BackgroundPolicy {
    /// Use a background buffer if the conversion path requires one.
    #[default]
    Auto,
    /// Always use a background buffer.
    ///
    /// If the conversion path does not require one, the background is zero filled rather than gathered.
    Always,
}

/// The access mode of a transfer on a container with a collective backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TransferMode {
    /// Each process accesses storage independently.
    #[default]
    Independent,
    /// Processes access storage collectively.
    Collective,
}

/// The default B-tree split ratios.
pub const DEFAULT_BTREE_SPLIT_RATIOS: [f64; 3] = [0.1, 0.5, 0.9];

/// Transfer configuration.
///
/// Caller-owned conversion and background buffers can be supplied to avoid per-call allocation.
/// They are borrowed for the lifetime of the configuration and are never freed by a transfer.
#[derive(Debug)]
pub struct TransferConfig<'a> {
    buffer_size: usize,
    conversion_buffer: Option<&'a mut [u8]>,
    background_buffer: Option<&'a mut [u8]>,
    background: BackgroundPolicy,
    mode: TransferMode,
    btree_split_ratios: [f64; 3],
    force_general_path: bool,
}

impl Default for TransferConfig<'_> {
    fn default() -> Self {
        Self {
            buffer_size: global_config().transfer_buffer_size(),
            conversion_buffer: None,
            background_buffer: None,
            background: BackgroundPolicy::default(),
            mode: TransferMode::default(),
            btree_split_ratios: DEFAULT_BTREE_SPLIT_RATIOS,
            force_general_path: false,
        }
    }
}

impl<'a> TransferConfig<'a> {
    /// Create a default transfer configuration.
    ///
    /// The buffer size is the [transfer buffer size](crate::config::Config#transfer-buffer-size) of the global configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The strip buffer size in bytes.
    #[must_use]
    pub const fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Set the strip buffer size in bytes.
    pub fn set_buffer_size(&mut self, buffer_size: usize) -> &mut Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Set a caller-owned conversion buffer.
    pub fn set_conversion_buffer(&mut self, conversion_buffer: Option<&'a mut [u8]>) -> &mut Self {
        self.conversion_buffer = conversion_buffer;
        self
    }

    /// Set a caller-owned background buffer.
    pub fn set_background_buffer(&mut self, background_buffer: Option<&'a mut [u8]>) -> &mut Self {
        self.background_buffer = background_buffer;
        self
    }

    /// The background buffer policy.
    #[must_use]
    pub const fn background(&self) -> BackgroundPolicy {
        self.background
    }

    /// Set the background buffer policy.
    pub fn set_background(&mut self, background: BackgroundPolicy) -> &mut Self {
        self.background = background;
        self
    }

    /// The transfer mode.
    #[must_use]
    pub const fn mode(&self) -> TransferMode {
        self.mode
    }

    /// Set the transfer mode.
    pub fn set_mode(&mut self, mode: TransferMode) -> &mut Self {
        self.mode = mode;
        self
    }

    /// The B-tree node split ratios passed through to storage.
    #[must_use]
    pub const fn btree_split_ratios(&self) -> [f64; 3] {
        self.btree_split_ratios
    }

    /// Set the B-tree node split ratios.
    ///
    /// # Errors
    /// Returns [`DatasetError::InvalidArgument`] if a ratio is not in the range `0.0..=1.0`.
    pub fn set_btree_split_ratios(&mut self, btree_split_ratios: [f64; 3]) -> Result<&mut Self, DatasetError> {
        if let Some(ratio) = btree_split_ratios
            .iter()
            .find(|ratio| !(0.0..=1.0).contains(*ratio))
        {
            return Err(DatasetError::InvalidArgument(format!(
                "B-tree split ratio {ratio} is not in the range 0 to 1"
            )));
        }
        self.btree_split_ratios = btree_split_ratios;
        Ok(self)
    }

    /// Returns true if the direct transfer path is disabled.
    #[must_use]
    pub const fn force_general_path(&self) -> bool {
        self.force_general_path
    }

    /// Disable the direct transfer path, so every transfer is strip-mined.
    pub fn set_force_general_path(&mut self, force_general_path: bool) -> &mut Self {
        self.force_general_path = force_general_path;
        self
    }
}

/// A transfer buffer owned by the session or borrowed from a [`TransferConfig`].
enum SessionBuffer<'a> {
    Owned(Vec<u8>),
    Borrowed(&'a mut [u8]),
}

impl<'a> SessionBuffer<'a> {
    fn acquire(
        borrowed: Option<&'a mut [u8]>,
        len: usize,
        name: &str,
    ) -> Result<Self, DatasetError> {
        match borrowed {
            Some(buffer) if buffer.len() < len => Err(DatasetError::BufferTooSmall(format!(
                "{name} buffer has {} bytes, {len} bytes are required",
                buffer.len()
            ))),
            Some(buffer) => Ok(Self::Borrowed(&mut buffer[..len])),
            None => Ok(Self::Owned(vec![0; len])),
        }
    }
}

impl Deref for SessionBuffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Owned(buffer) => buffer,
            Self::Borrowed(buffer) => buffer,
        }
    }
}

impl DerefMut for SessionBuffer<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        match self {
            Self::Owned(buffer) => buffer,
            Self::Borrowed(buffer) => buffer,
        }
    }
}

/// Background buffer state of a [`TransferSession`].
enum Background<'a> {
    /// Existing destination elements are gathered into the buffer.
    Gathered(SessionBuffer<'a>, SelectionIter),
    /// The buffer is zero filled.
    Zeroed(SessionBuffer<'a>),
}

/// The state of a strip-mined transfer.
///
/// Dropping a session releases its iterators and session-owned buffers.
pub(crate) struct TransferSession<'a> {
    source_iter: SelectionIter,
    destination_iter: SelectionIter,
    path: &'a ConversionPath,
    strip: u64,
    conversion: SessionBuffer<'a>,
    background: Option<Background<'a>>,
}

fn checked_bytes(elements: u64, element_size: usize) -> Result<usize, DatasetError> {
    usize::try_from(elements)
        .ok()
        .and_then(|elements| elements.checked_mul(element_size))
        .ok_or_else(|| {
            DatasetError::BufferTooSmall(format!(
                "{elements} elements of {element_size} bytes overflows the address space"
            ))
        })
}

impl<'a> TransferSession<'a> {
    /// Create a session from the source and destination dataspaces.
    ///
    /// The background iterator walks the destination selection.
    pub(crate) fn new(
        source_space: &Dataspace,
        destination_space: &Dataspace,
        path: &'a ConversionPath,
        config: &'a mut TransferConfig<'_>,
    ) -> Result<Self, DatasetError> {
        let num_elements = source_space.num_elements();
        let max_element_size = path.source_size().max(path.destination_size());
        let strip = (config.buffer_size / max_element_size.max(1)) as u64;
        if strip == 0 {
            return Err(DatasetError::BufferTooSmall(format!(
                "buffer size {} is smaller than an element of {max_element_size} bytes",
                config.buffer_size
            )));
        }
        let strip = strip.min(num_elements);
        let conversion = SessionBuffer::acquire(
            config.conversion_buffer.as_deref_mut(),
            checked_bytes(strip, max_element_size)?,
            "conversion",
        )?;
        let background = if path.needs_background() || config.background == BackgroundPolicy::Always {
            let buffer = SessionBuffer::acquire(
                config.background_buffer.as_deref_mut(),
                checked_bytes(strip, path.destination_size())?,
                "background",
            )?;
            Some(if path.needs_background() {
                Background::Gathered(buffer, destination_space.iter())
            } else {
                Background::Zeroed(buffer)
            })
        } else {
            None
        };
        log::debug!(
            "transfer session: {num_elements} elements from {} to {}, strip of {strip} elements, background {}",
            path.source(),
            path.destination(),
            background.is_some()
        );
        Ok(Self {
            source_iter: source_space.iter(),
            destination_iter: destination_space.iter(),
            path,
            strip,
            conversion,
            background,
        })
    }

    /// Run the strip loop, returning the number of strips.
    pub(crate) fn run<S: Gather, D: Gather + Scatter>(
        &mut self,
        source: &S,
        destination: &mut D,
    ) -> Result<u64, DatasetError> {
        let source_size = self.path.source_size();
        let destination_size = self.path.destination_size();
        let mut strips = 0;
        while self.source_iter.remaining() > 0 {
            let requested = self.strip.min(self.source_iter.remaining());
            let count = source.available(&self.source_iter, requested);
            if count == 0 {
                return Err(DatasetError::PartialTransfer {
                    expected: requested,
                    actual: 0,
                });
            }
            // strip bytes are bounded by the session buffers
            let count_usize = count as usize;
            let gathered = source.gather(
                &mut self.source_iter,
                count,
                &mut self.conversion[..count_usize * source_size],
            )?;
            if gathered != count {
                return Err(DatasetError::PartialTransfer {
                    expected: count,
                    actual: gathered,
                });
            }
            let background = match &mut self.background {
                Some(Background::Gathered(buffer, iter)) => {
                    let buffer = &mut buffer[..count_usize * destination_size];
                    let gathered = destination.gather(iter, count, buffer)?;
                    if gathered != count {
                        return Err(DatasetError::PartialTransfer {
                            expected: count,
                            actual: gathered,
                        });
                    }
                    Some(&*buffer)
                }
                Some(Background::Zeroed(buffer)) => {
                    let buffer = &mut buffer[..count_usize * destination_size];
                    buffer.fill(0);
                    Some(&*buffer)
                }
                None => None,
            };
            self.path.convert(&mut self.conversion, count_usize, background);
            let scattered = destination.scatter(
                &mut self.destination_iter,
                count,
                &self.conversion[..count_usize * destination_size],
            )?;
            if scattered != count {
                return Err(DatasetError::PartialTransfer {
                    expected: count,
                    actual: scattered,
                });
            }
            strips += 1;
            log::trace!("transfer strip {strips}: {count} elements");
        }
        Ok(strips)
    }
}

/// Pair the runs of a file and a memory selection into pieces.
pub(crate) fn paired_pieces(
    file: &mut SelectionIter,
    memory: &mut SelectionIter,
) -> Result<Vec<Piece>, DatasetError> {
    let expected = file.num_elements();
    let mut pieces = Vec::new();
    let mut transferred = 0;
    while let Some(file_run) = file.next_run(u64::MAX) {
        let mut covered = 0;
        while covered < file_run.len {
            let Some(memory_run) = memory.next_run(file_run.len - covered) else {
                return Err(DatasetError::PartialTransfer {
                    expected,
                    actual: transferred + covered,
                });
            };
            pieces.push(Piece {
                file: file_run.offset + covered,
                mem: memory_run.offset,
                len: memory_run.len,
            });
            covered += memory_run.len;
        }
        transferred += covered;
    }
    Ok(pieces)
}

/// Returns true if a transfer can use the direct routine of `io`.
pub(crate) fn is_direct_eligible(
    io: &LayoutIo,
    path: &ConversionPath,
    file_space: &Dataspace,
    memory_space: &Dataspace,
    config: &TransferConfig<'_>,
) -> bool {
    !config.force_general_path
        && path.is_noop()
        && io.supports_direct_transfer(file_space.selection(), memory_space.selection())
}

/// Read the file selection directly into the memory selection.
pub(crate) fn read_direct(
    io: &LayoutIo,
    file_space: &Dataspace,
    memory_space: &Dataspace,
    buffer: &mut [u8],
) -> Result<(), DatasetError> {
    let pieces = paired_pieces(&mut file_space.iter(), &mut memory_space.iter())?;
    log::debug!("direct read of {} pieces", pieces.len());
    io.read_pieces(&pieces, buffer)
}

/// Write the memory selection directly to the file selection.
pub(crate) fn write_direct(
    io: &LayoutIo,
    file_space: &Dataspace,
    memory_space: &Dataspace,
    buffer: &[u8],
) -> Result<(), DatasetError> {
    let pieces = paired_pieces(&mut file_space.iter(), &mut memory_space.iter())?;
    log::debug!("direct write of {} pieces", pieces.len());
    io.write_pieces(&pieces, buffer)
}
