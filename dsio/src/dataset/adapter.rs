//! Gather/scatter adapters.
//!
//! A gather reads the next `count` selected elements of a selection iterator into a packed buffer.
//! A scatter writes a packed buffer to the next `count` selected elements.
//! The memory adapters operate on an application buffer, and [`LayoutIo`] operates on dataset storage.

use crate::selection::{Run, SelectionIter};

use super::{
    layout::{LayoutIo, Piece},
    DatasetError,
};

/// Gather selected elements into a packed buffer.
pub(crate) trait Gather {
    /// The number of elements the next gather can deliver, at most `requested`.
    ///
    /// A gather packs every run it covers, so a strip is not limited to the next contiguous run of `iter`.
    /// By default every remaining element of `iter` is available.
    /// The strip loop asks the source of a transfer: dataset storage on read and the application buffer on write.
    fn available(&self, iter: &SelectionIter, requested: u64) -> u64 {
        requested.min(iter.remaining())
    }

    /// Gather the next `count` elements of `iter` into `out`, returning the number of elements gathered.
    fn gather(&self, iter: &mut SelectionIter, count: u64, out: &mut [u8]) -> Result<u64, DatasetError>;
}

/// Scatter a packed buffer into selected elements.
pub(crate) trait Scatter {
    /// Scatter `count` elements from `input` to the next `count` elements of `iter`, returning the number of elements scattered.
    fn scatter(&mut self, iter: &mut SelectionIter, count: u64, input: &[u8]) -> Result<u64, DatasetError>;
}

/// Convert runs of selected elements into pieces of a packed buffer.
fn packed_pieces(runs: &[Run]) -> (Vec<Piece>, u64) {
    let mut mem = 0;
    let pieces = runs
        .iter()
        .map(|run| {
            let piece = Piece {
                file: run.offset,
                mem,
                len: run.len,
            };
            mem += run.len;
            piece
        })
        .collect();
    (pieces, mem)
}

fn byte_range(offset: u64, len: u64, element_size: usize) -> std::ops::Range<usize> {
    // bounded by an application buffer
    let start = offset as usize * element_size;
    start..start + len as usize * element_size
}

fn check_memory_bounds(runs: &[Run], element_size: usize, len: usize) -> Result<(), DatasetError> {
    match runs.iter().map(Run::end).max() {
        Some(end) if end.saturating_mul(element_size as u64) > len as u64 => Err(
            DatasetError::BufferTooSmall(format!(
                "selection ends at element {end} but the buffer holds {} elements",
                len / element_size.max(1)
            )),
        ),
        _ => Ok(()),
    }
}

/// Gathers from an application buffer.
pub(crate) struct MemoryGather<'a> {
    buffer: &'a [u8],
    element_size: usize,
}

impl<'a> MemoryGather<'a> {
    pub(crate) const fn new(buffer: &'a [u8], element_size: usize) -> Self {
        Self {
            buffer,
            element_size,
        }
    }
}

fn gather_memory(
    buffer: &[u8],
    element_size: usize,
    iter: &mut SelectionIter,
    count: u64,
    out: &mut [u8],
) -> Result<u64, DatasetError> {
    let runs = iter.next_runs(count);
    check_memory_bounds(&runs, element_size, buffer.len())?;
    let mut gathered = 0;
    for run in runs {
        let source = &buffer[byte_range(run.offset, run.len, element_size)];
        out[byte_range(gathered, run.len, element_size)].copy_from_slice(source);
        gathered += run.len;
    }
    Ok(gathered)
}

impl Gather for MemoryGather<'_> {
    fn gather(&self, iter: &mut SelectionIter, count: u64, out: &mut [u8]) -> Result<u64, DatasetError> {
        gather_memory(self.buffer, self.element_size, iter, count, out)
    }
}

/// Gathers from and scatters to an application buffer.
pub(crate) struct MemoryBuffer<'a> {
    buffer: &'a mut [u8],
    element_size: usize,
}

impl<'a> MemoryBuffer<'a> {
    pub(crate) fn new(buffer: &'a mut [u8], element_size: usize) -> Self {
        Self {
            buffer,
            element_size,
        }
    }
}

impl Gather for MemoryBuffer<'_> {
    fn gather(&self, iter: &mut SelectionIter, count: u64, out: &mut [u8]) -> Result<u64, DatasetError> {
        gather_memory(self.buffer, self.element_size, iter, count, out)
    }
}

impl Scatter for MemoryBuffer<'_> {
    fn scatter(&mut self, iter: &mut SelectionIter, count: u64, input: &[u8]) -> Result<u64, DatasetError> {
        let element_size = self.element_size;
        let runs = iter.next_runs(count);
        check_memory_bounds(&runs, element_size, self.buffer.len())?;
        let mut scattered = 0;
        for run in runs {
            self.buffer[byte_range(run.offset, run.len, element_size)]
                .copy_from_slice(&input[byte_range(scattered, run.len, element_size)]);
            scattered += run.len;
        }
        Ok(scattered)
    }
}

impl Gather for LayoutIo {
    fn gather(&self, iter: &mut SelectionIter, count: u64, out: &mut [u8]) -> Result<u64, DatasetError> {
        let (pieces, gathered) = packed_pieces(&iter.next_runs(count));
        self.read_pieces(&pieces, out)?;
        Ok(gathered)
    }
}

impl Scatter for LayoutIo {
    fn scatter(&mut self, iter: &mut SelectionIter, count: u64, input: &[u8]) -> Result<u64, DatasetError> {
        let (pieces, scattered) = packed_pieces(&iter.next_runs(count));
        self.write_pieces(&pieces, input)?;
        Ok(scattered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::{Dataspace, Extent, Selection};

    #[test]
    fn memory_gather_scatter() {
        let dataspace = Dataspace::with_selection(
            Extent::new(vec![3, 3]),
            Selection::range(&[0..2, 1..3]),
        )
        .unwrap();
        let buffer: Vec<u8> = (0..9).collect();
        let gather = MemoryGather::new(&buffer, 1);
        let mut iter = dataspace.iter();
        assert_eq!(gather.available(&iter, 10), 4);
        // spans the runs of both rows
        assert_eq!(gather.available(&iter, 3), 3);
        let mut out = vec![0; 3];
        assert_eq!(gather.gather(&mut iter, 3, &mut out).unwrap(), 3);
        assert_eq!(out, [1, 2, 4]);
        assert_eq!(gather.available(&iter, 10), 1);

        let mut target = vec![0u8; 9];
        let mut scatter = MemoryBuffer::new(&mut target, 1);
        let mut iter = dataspace.iter();
        assert_eq!(scatter.scatter(&mut iter, 4, &[1, 2, 3, 4]).unwrap(), 4);
        assert_eq!(target, [0, 1, 2, 0, 3, 4, 0, 0, 0]);
    }

    #[test]
    fn memory_buffer_too_small() {
        let dataspace = Dataspace::new_fixed(vec![4]);
        let buffer = vec![0u8; 6];
        let mut out = vec![0; 8];
        assert!(matches!(
            MemoryGather::new(&buffer, 2).gather(&mut dataspace.iter(), 4, &mut out),
            Err(DatasetError::BufferTooSmall(_))
        ));
    }
}
