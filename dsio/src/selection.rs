//! Extents, selections, and dataspaces.
//!
//! A [`Dataspace`] is an [`Extent`] (the shape of a dataset or a memory buffer) with a [`Selection`] over it.
//! The elements of a dataspace are enumerated in row-major order by a [`SelectionIter`].

mod selection_iterator;

use std::ops::Range;

pub use selection_iterator::{Run, SelectionIter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A selection error.
#[derive(Clone, Debug, Error)]
pub enum SelectionError {
    /// The dimensionality of a selection or extent does not match.
    #[error("dimensionality {got} does not match the expected dimensionality {expected}")]
    IncompatibleDimensionality {
        /// The expected dimensionality.
        expected: usize,
        /// The dimensionality supplied.
        got: usize,
    },
    /// An invalid extent.
    #[error("invalid extent: {_0}")]
    InvalidExtent(String),
    /// An invalid hyperslab.
    #[error("invalid hyperslab: {_0}")]
    InvalidHyperslab(String),
    /// A selection is outside of its extent.
    #[error("selection {selection:?} is out of bounds of extent {dims:?}")]
    OutOfBounds {
        /// The selection.
        selection: Selection,
        /// The extent dimensions.
        dims: Vec<u64>,
    },
}

/// The current and maximum dimensions of a dataset or memory buffer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent {
    dims: Vec<u64>,
    max_dims: Vec<Option<u64>>,
}

impl Extent {
    /// Create a fixed size extent.
    #[must_use]
    pub fn new(dims: Vec<u64>) -> Self {
        let max_dims = dims.iter().copied().map(Some).collect();
        Self { dims, max_dims }
    }

    /// Create an extent with maximum dimensions, where [`None`] is unlimited.
    ///
    /// # Errors
    /// Returns a [`SelectionError`] if the dimensionality of `dims` and `max_dims` differ or a dimension exceeds its maximum.
    pub fn new_with_max(dims: Vec<u64>, max_dims: Vec<Option<u64>>) -> Result<Self, SelectionError> {
        let extent = Self { dims, max_dims };
        extent.validate()?;
        Ok(extent)
    }

    pub(crate) fn validate(&self) -> Result<(), SelectionError> {
        if self.dims.len() != self.max_dims.len() {
            return Err(SelectionError::IncompatibleDimensionality {
                expected: self.dims.len(),
                got: self.max_dims.len(),
            });
        }
        if let Some((dim, max)) = self
            .dims
            .iter()
            .zip(&self.max_dims)
            .find(|(dim, max)| max.is_some_and(|max| **dim > max))
        {
            return Err(SelectionError::InvalidExtent(format!(
                "dimension {dim} exceeds its maximum {max:?}"
            )));
        }
        if checked_product(&self.dims).is_none() {
            return Err(SelectionError::InvalidExtent(format!(
                "the number of elements of {:?} exceeds u64::MAX",
                self.dims
            )));
        }
        if let Some(max_dims) = self.bounded_max_dims() {
            if checked_product(&max_dims).is_none() {
                return Err(SelectionError::InvalidExtent(format!(
                    "the number of elements of the maximum extent {max_dims:?} exceeds u64::MAX"
                )));
            }
        }
        Ok(())
    }

    /// The current dimensions.
    #[must_use]
    pub fn dims(&self) -> &[u64] {
        &self.dims
    }

    /// The maximum dimensions, where [`None`] is unlimited.
    #[must_use]
    pub fn max_dims(&self) -> &[Option<u64>] {
        &self.max_dims
    }

    /// The dimensionality.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// The number of elements, saturating at [`u64::MAX`].
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        checked_product(&self.dims).unwrap_or(u64::MAX)
    }

    /// Returns true if any dimension is unlimited.
    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        self.max_dims.iter().any(Option::is_none)
    }

    /// The number of elements at the maximum extent saturating at [`u64::MAX`], or [`None`] if unlimited.
    #[must_use]
    pub fn max_num_elements(&self) -> Option<u64> {
        self.bounded_max_dims()
            .map(|max_dims| checked_product(&max_dims).unwrap_or(u64::MAX))
    }

    fn bounded_max_dims(&self) -> Option<Vec<u64>> {
        self.max_dims.iter().copied().collect()
    }

    /// Return the extent with new current dimensions and the same maximum.
    pub(crate) fn with_dims(&self, dims: Vec<u64>) -> Result<Self, SelectionError> {
        Self::new_with_max(dims, self.max_dims.clone())
    }
}

/// A regular hyperslab.
///
/// Selects `count[i]` blocks of `block[i]` elements, starting at `start[i]` and spaced `stride[i]` elements apart in each dimension `i`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Hyperslab {
    start: Vec<u64>,
    stride: Vec<u64>,
    count: Vec<u64>,
    block: Vec<u64>,
}

impl Hyperslab {
    /// Create a new hyperslab.
    ///
    /// # Errors
    /// Returns [`SelectionError`] if
    ///  - the dimensionality of the parameters differ,
    ///  - a block is empty while its count is non-zero,
    ///  - blocks overlap (`stride < block` while `count > 1`), or
    ///  - the end of a dimension or the number of selected elements exceeds [`u64::MAX`].
    pub fn new(
        start: Vec<u64>,
        stride: Vec<u64>,
        count: Vec<u64>,
        block: Vec<u64>,
    ) -> Result<Self, SelectionError> {
        let rank = start.len();
        for len in [stride.len(), count.len(), block.len()] {
            if len != rank {
                return Err(SelectionError::IncompatibleDimensionality {
                    expected: rank,
                    got: len,
                });
            }
        }
        for i in 0..rank {
            if count[i] > 0 && block[i] == 0 {
                return Err(SelectionError::InvalidHyperslab(format!(
                    "block {i} is empty"
                )));
            }
            if count[i] > 1 && stride[i] < block[i] {
                return Err(SelectionError::InvalidHyperslab(format!(
                    "stride {} is less than block {} in dimension {i}",
                    stride[i], block[i]
                )));
            }
        }
        let hyperslab = Self {
            start,
            stride,
            count,
            block,
        };
        if let Some(i) = (0..rank).find(|&i| hyperslab.end(i).is_none()) {
            return Err(SelectionError::InvalidHyperslab(format!(
                "the end of dimension {i} exceeds u64::MAX"
            )));
        }
        if hyperslab.checked_num_elements().is_none() {
            return Err(SelectionError::InvalidHyperslab(
                "the number of selected elements exceeds u64::MAX".to_string(),
            ));
        }
        Ok(hyperslab)
    }

    /// The hyperslab start.
    #[must_use]
    pub fn start(&self) -> &[u64] {
        &self.start
    }

    /// The hyperslab stride.
    #[must_use]
    pub fn stride(&self) -> &[u64] {
        &self.stride
    }

    /// The hyperslab block count.
    #[must_use]
    pub fn count(&self) -> &[u64] {
        &self.count
    }

    /// The hyperslab block size.
    #[must_use]
    pub fn block(&self) -> &[u64] {
        &self.block
    }

    /// The number of selected elements, saturating at [`u64::MAX`].
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.checked_num_elements().unwrap_or(u64::MAX)
    }

    fn checked_num_elements(&self) -> Option<u64> {
        let per_dimension = self
            .count
            .iter()
            .zip(&self.block)
            .map(|(count, block)| count.checked_mul(*block))
            .collect::<Option<Vec<u64>>>()?;
        checked_product(&per_dimension)
    }

    /// The exclusive end of the last block in dimension `i`, or [`None`] if it exceeds [`u64::MAX`].
    ///
    /// A dimension with no blocks ends at its start.
    fn end(&self, i: usize) -> Option<u64> {
        match self.count[i] {
            0 => Some(self.start[i]),
            count => (count - 1)
                .checked_mul(self.stride[i])?
                .checked_add(self.block[i])?
                .checked_add(self.start[i]),
        }
    }

    /// The selected intervals `(start, length)` of dimension `i`, in increasing order with adjacent blocks merged.
    pub(crate) fn intervals(&self, i: usize) -> Vec<(u64, u64)> {
        let (start, stride, count, block) = (self.start[i], self.stride[i], self.count[i], self.block[i]);
        if count == 0 {
            Vec::new()
        } else if count == 1 || stride == block {
            vec![(start, count * block)]
        } else {
            (0..count).map(|c| (start + c * stride, block)).collect()
        }
    }

    fn is_within(&self, dims: &[u64]) -> bool {
        (0..self.start.len()).all(|i| {
            self.count[i] == 0 || self.end(i).is_some_and(|end| end <= dims[i])
        })
    }
}

/// A selection of elements within an [`Extent`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum Selection {
    /// Every element of the extent.
    #[default]
    All,
    /// No elements.
    None,
    /// A regular hyperslab.
    Hyperslab(Hyperslab),
    /// A list of element coordinates, enumerated in the order given.
    Points(Vec<Vec<u64>>),
}

impl Selection {
    /// Create a unit stride hyperslab selection from a range in each dimension.
    ///
    /// An empty or reversed range selects nothing in its dimension.
    #[must_use]
    pub fn range(ranges: &[Range<u64>]) -> Self {
        let rank = ranges.len();
        Self::Hyperslab(Hyperslab {
            start: ranges.iter().map(|range| range.start).collect(),
            stride: vec![1; rank],
            count: ranges
                .iter()
                .map(|range| u64::from(!range.is_empty()))
                .collect(),
            block: ranges
                .iter()
                .map(|range| range.end.saturating_sub(range.start).max(1))
                .collect(),
        })
    }

    /// Create a hyperslab selection.
    ///
    /// # Errors
    /// See [`Hyperslab::new`].
    pub fn hyperslab(
        start: Vec<u64>,
        stride: Vec<u64>,
        count: Vec<u64>,
        block: Vec<u64>,
    ) -> Result<Self, SelectionError> {
        Ok(Self::Hyperslab(Hyperslab::new(start, stride, count, block)?))
    }

    /// Create a point selection.
    #[must_use]
    pub fn points(points: Vec<Vec<u64>>) -> Self {
        Self::Points(points)
    }

    /// Returns true if the selection is a point selection.
    #[must_use]
    pub const fn is_points(&self) -> bool {
        matches!(self, Self::Points(_))
    }

    fn validate(&self, extent: &Extent) -> Result<(), SelectionError> {
        let out_of_bounds = || SelectionError::OutOfBounds {
            selection: self.clone(),
            dims: extent.dims.clone(),
        };
        let rank = extent.rank();
        if checked_product(&extent.dims).is_none() {
            return Err(SelectionError::InvalidExtent(format!(
                "the number of elements of {:?} exceeds u64::MAX",
                extent.dims
            )));
        }
        match self {
            Self::All | Self::None => Ok(()),
            Self::Hyperslab(hyperslab) => {
                if hyperslab.start.len() != rank {
                    return Err(SelectionError::IncompatibleDimensionality {
                        expected: rank,
                        got: hyperslab.start.len(),
                    });
                }
                if hyperslab.is_within(&extent.dims) {
                    Ok(())
                } else {
                    Err(out_of_bounds())
                }
            }
            Self::Points(points) => {
                for point in points {
                    if point.len() != rank {
                        return Err(SelectionError::IncompatibleDimensionality {
                            expected: rank,
                            got: point.len(),
                        });
                    }
                    if point.iter().zip(&extent.dims).any(|(p, dim)| p >= dim) {
                        return Err(out_of_bounds());
                    }
                }
                Ok(())
            }
        }
    }
}

/// An [`Extent`] with a [`Selection`] over it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Dataspace {
    extent: Extent,
    selection: Selection,
}

impl Dataspace {
    /// Create a dataspace selecting all of `extent`.
    #[must_use]
    pub fn new(extent: Extent) -> Self {
        Self {
            extent,
            selection: Selection::All,
        }
    }

    /// Create a dataspace selecting all of a fixed extent with dimensions `dims`.
    #[must_use]
    pub fn new_fixed(dims: Vec<u64>) -> Self {
        Self::new(Extent::new(dims))
    }

    /// Create a dataspace with a selection.
    ///
    /// # Errors
    /// Returns a [`SelectionError`] if the selection is incompatible with the extent or out of its bounds.
    pub fn with_selection(extent: Extent, selection: Selection) -> Result<Self, SelectionError> {
        selection.validate(&extent)?;
        Ok(Self { extent, selection })
    }

    /// Replace the selection.
    ///
    /// # Errors
    /// Returns a [`SelectionError`] if the selection is incompatible with the extent or out of its bounds.
    pub fn select(mut self, selection: Selection) -> Result<Self, SelectionError> {
        selection.validate(&self.extent)?;
        self.selection = selection;
        Ok(self)
    }

    /// The extent.
    #[must_use]
    pub const fn extent(&self) -> &Extent {
        &self.extent
    }

    /// The selection.
    #[must_use]
    pub const fn selection(&self) -> &Selection {
        &self.selection
    }

    /// The number of selected elements.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        match &self.selection {
            Selection::All => self.extent.num_elements(),
            Selection::None => 0,
            Selection::Hyperslab(hyperslab) => hyperslab.num_elements(),
            Selection::Points(points) => points.len() as u64,
        }
    }

    /// Returns an iterator over the runs of selected elements.
    #[must_use]
    pub fn iter(&self) -> SelectionIter {
        SelectionIter::new(self)
    }
}

/// The product of `values`, or [`None`] on overflow.
///
/// Any zero value makes the product zero.
fn checked_product(values: &[u64]) -> Option<u64> {
    if values.contains(&0) {
        Some(0)
    } else {
        values
            .iter()
            .try_fold(1u64, |product, value| product.checked_mul(*value))
    }
}

/// Convert a row-major linear element index into coordinates within `dims`.
#[must_use]
pub fn unravel_index(mut index: u64, dims: &[u64]) -> Vec<u64> {
    let mut coordinates = vec![0; dims.len()];
    for (coordinate, dim) in coordinates.iter_mut().zip(dims).rev() {
        if *dim > 0 {
            *coordinate = index % dim;
            index /= dim;
        }
    }
    coordinates
}

/// Convert coordinates within `dims` into a row-major linear element index.
#[must_use]
pub fn ravel_indices(coordinates: &[u64], dims: &[u64]) -> u64 {
    coordinates
        .iter()
        .zip(dims)
        .fold(0, |index, (coordinate, dim)| index * dim + coordinate)
}
