use super::{ravel_indices, Dataspace, Selection};

/// A run of consecutive elements, as row-major linear element indices of an extent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Run {
    /// The linear index of the first element.
    pub offset: u64,
    /// The number of elements.
    pub len: u64,
}

impl Run {
    /// The linear index one past the last element.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// A restartable iterator over the selected elements of a [`Dataspace`].
///
/// Elements are enumerated in row-major order, except for point selections which are enumerated in the order given.
/// [`SelectionIter::next_run`] yields runs of consecutive elements capped at a requested length, so a consumer can stop part way through a run and resume from the same position.
#[derive(Clone, Debug)]
pub struct SelectionIter {
    state: IterState,
    num_elements: u64,
    consumed: u64,
}

#[derive(Clone, Debug)]
enum IterState {
    Contiguous,
    Hyperslab(HyperslabState),
    Points { offsets: Vec<u64>, index: usize },
}

#[derive(Clone, Debug)]
struct HyperslabState {
    /// Selected intervals `(start, length)` of dimensions `0..=run_dim`.
    intervals: Vec<Vec<(u64, u64)>>,
    /// Element strides of dimensions `0..=run_dim`.
    strides: Vec<u64>,
    /// The innermost dimension that is not fully selected.
    run_dim: usize,
    /// Position `(interval, offset within interval)` in each dimension before `run_dim`.
    outer: Vec<(usize, u64)>,
    run_interval: usize,
    run_position: u64,
}

impl HyperslabState {
    fn base(&self) -> u64 {
        self.outer
            .iter()
            .enumerate()
            .map(|(dim, (interval, position))| {
                (self.intervals[dim][*interval].0 + position) * self.strides[dim]
            })
            .sum()
    }

    fn next_run(&mut self, max: u64) -> Run {
        let (start, len) = self.intervals[self.run_dim][self.run_interval];
        let scale = self.strides[self.run_dim];
        let run_len = len * scale;
        let offset = self.base() + start * scale + self.run_position;
        let len = (run_len - self.run_position).min(max);
        self.run_position += len;
        if self.run_position == run_len {
            self.run_position = 0;
            self.run_interval += 1;
            if self.run_interval == self.intervals[self.run_dim].len() {
                self.run_interval = 0;
                self.increment_outer();
            }
        }
        Run { offset, len }
    }

    fn increment_outer(&mut self) {
        for dim in (0..self.run_dim).rev() {
            let (interval, position) = &mut self.outer[dim];
            *position += 1;
            if *position < self.intervals[dim][*interval].1 {
                return;
            }
            *position = 0;
            *interval += 1;
            if *interval < self.intervals[dim].len() {
                return;
            }
            *interval = 0;
        }
    }

    fn reset(&mut self) {
        self.outer.fill((0, 0));
        self.run_interval = 0;
        self.run_position = 0;
    }
}

impl SelectionIter {
    /// Create a new selection iterator.
    #[must_use]
    pub fn new(dataspace: &Dataspace) -> Self {
        let dims = dataspace.extent().dims();
        let num_elements = dataspace.num_elements();
        let state = match dataspace.selection() {
            Selection::All | Selection::None => IterState::Contiguous,
            Selection::Hyperslab(hyperslab) => {
                let intervals: Vec<_> = (0..dims.len()).map(|i| hyperslab.intervals(i)).collect();
                let run_dim = intervals
                    .iter()
                    .zip(dims)
                    .rposition(|(intervals, dim)| intervals.as_slice() != [(0, *dim)]);
                match run_dim {
                    Some(run_dim) if num_elements > 0 => {
                        let mut strides = vec![1; dims.len()];
                        for i in (0..dims.len().saturating_sub(1)).rev() {
                            strides[i] = strides[i + 1] * dims[i + 1];
                        }
                        strides.truncate(run_dim + 1);
                        let mut intervals = intervals;
                        intervals.truncate(run_dim + 1);
                        IterState::Hyperslab(HyperslabState {
                            intervals,
                            strides,
                            run_dim,
                            outer: vec![(0, 0); run_dim],
                            run_interval: 0,
                            run_position: 0,
                        })
                    }
                    _ => IterState::Contiguous,
                }
            }
            Selection::Points(points) => IterState::Points {
                offsets: points
                    .iter()
                    .map(|point| ravel_indices(point, dims))
                    .collect(),
                index: 0,
            },
        };
        Self {
            state,
            num_elements,
            consumed: 0,
        }
    }

    /// The total number of selected elements.
    #[must_use]
    pub const fn num_elements(&self) -> u64 {
        self.num_elements
    }

    /// The number of elements not yet yielded.
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.num_elements - self.consumed
    }

    /// Return the next run of at most `max` consecutive elements, or [`None`] if the iterator is exhausted or `max` is zero.
    pub fn next_run(&mut self, max: u64) -> Option<Run> {
        let max = max.min(self.remaining());
        if max == 0 {
            return None;
        }
        let run = match &mut self.state {
            IterState::Contiguous => Run {
                offset: self.consumed,
                len: max,
            },
            IterState::Hyperslab(state) => state.next_run(max),
            IterState::Points { offsets, index } => {
                let offset = offsets[*index];
                let len = offsets[*index..]
                    .iter()
                    .zip(offset..)
                    .take(usize::try_from(max).unwrap_or(usize::MAX))
                    .take_while(|(a, b)| *a == b)
                    .count();
                *index += len;
                Run {
                    offset,
                    len: len as u64,
                }
            }
        };
        self.consumed += run.len;
        Some(run)
    }

    /// Return the runs covering the next `count` elements.
    pub fn next_runs(&mut self, mut count: u64) -> Vec<Run> {
        let mut runs = Vec::new();
        while let Some(run) = self.next_run(count) {
            count -= run.len;
            runs.push(run);
        }
        runs
    }

    /// Returns true if the iterator yields a single run covering every selected element.
    #[must_use]
    pub fn is_contiguous(&self) -> bool {
        matches!(self.state, IterState::Contiguous)
    }

    /// Restart the iterator from the first selected element.
    pub fn reset(&mut self) {
        self.consumed = 0;
        match &mut self.state {
            IterState::Contiguous => {}
            IterState::Hyperslab(state) => state.reset(),
            IterState::Points { index, .. } => *index = 0,
        }
    }
}

impl Iterator for SelectionIter {
    type Item = Run;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_run(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::Extent;

    fn runs(dataspace: &Dataspace) -> Vec<(u64, u64)> {
        dataspace.iter().map(|run| (run.offset, run.len)).collect()
    }

    #[test]
    fn selection_iter_all() {
        let dataspace = Dataspace::new_fixed(vec![4, 5]);
        assert_eq!(runs(&dataspace), vec![(0, 20)]);
        let mut iter = dataspace.iter();
        assert_eq!(iter.next_run(6), Some(Run { offset: 0, len: 6 }));
        assert_eq!(iter.remaining(), 14);
        assert_eq!(iter.next_runs(100).len(), 1);
        assert_eq!(iter.next_run(1), None);
    }

    #[test]
    fn selection_iter_none() {
        let dataspace = Dataspace::new_fixed(vec![4]).select(Selection::None).unwrap();
        assert_eq!(runs(&dataspace), vec![]);
        let dataspace = Dataspace::new_fixed(vec![0, 3]);
        assert_eq!(runs(&dataspace), vec![]);
    }

    #[test]
    fn selection_iter_scalar() {
        let dataspace = Dataspace::new_fixed(vec![]);
        assert_eq!(runs(&dataspace), vec![(0, 1)]);
    }

    #[test]
    fn selection_iter_hyperslab_rows() {
        let dataspace = Dataspace::with_selection(
            Extent::new(vec![4, 5]),
            Selection::range(&[1..3, 1..4]),
        )
        .unwrap();
        assert_eq!(runs(&dataspace), vec![(6, 3), (11, 3)]);
    }

    #[test]
    fn selection_iter_hyperslab_collapsed() {
        let dataspace = Dataspace::with_selection(
            Extent::new(vec![4, 2, 3]),
            Selection::range(&[1..3, 0..2, 0..3]),
        )
        .unwrap();
        assert_eq!(runs(&dataspace), vec![(6, 12)]);

        let mut iter = dataspace.iter();
        assert_eq!(iter.next_run(5), Some(Run { offset: 6, len: 5 }));
        assert_eq!(iter.next_run(100), Some(Run { offset: 11, len: 7 }));
        assert_eq!(iter.next_run(100), None);
        iter.reset();
        assert_eq!(iter.next_run(100), Some(Run { offset: 6, len: 12 }));
    }

    #[test]
    fn selection_iter_hyperslab_strided() {
        let selection = Selection::hyperslab(vec![0, 1], vec![2, 3], vec![2, 2], vec![1, 2]).unwrap();
        let dataspace = Dataspace::with_selection(Extent::new(vec![3, 6]), selection).unwrap();
        assert_eq!(dataspace.num_elements(), 8);
        assert_eq!(runs(&dataspace), vec![(1, 2), (4, 2), (13, 2), (16, 2)]);
    }

    #[test]
    fn selection_iter_hyperslab_adjacent_blocks_merge() {
        let selection = Selection::hyperslab(vec![2], vec![2], vec![3], vec![2]).unwrap();
        let dataspace = Dataspace::with_selection(Extent::new(vec![10]), selection).unwrap();
        assert_eq!(runs(&dataspace), vec![(2, 6)]);
    }

    #[test]
    fn selection_iter_points() {
        let selection = Selection::points(vec![vec![0, 1], vec![0, 2], vec![1, 1], vec![0, 0]]);
        let dataspace = Dataspace::with_selection(Extent::new(vec![2, 3]), selection).unwrap();
        assert_eq!(runs(&dataspace), vec![(1, 2), (4, 1), (0, 1)]);
        let mut iter = dataspace.iter();
        assert_eq!(iter.next_run(1), Some(Run { offset: 1, len: 1 }));
        assert_eq!(iter.next_run(4), Some(Run { offset: 2, len: 1 }));
        assert_eq!(iter.remaining(), 2);
    }

    #[test]
    fn selection_iter_points_merge_across_rows() {
        // offsets 1, 2, 3 are consecutive in row-major order
        let selection = Selection::points(vec![vec![0, 1], vec![0, 2], vec![1, 0], vec![0, 0]]);
        let dataspace = Dataspace::with_selection(Extent::new(vec![2, 3]), selection).unwrap();
        assert_eq!(runs(&dataspace), vec![(1, 3), (0, 1)]);
    }
}
