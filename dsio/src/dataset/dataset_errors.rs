use dsio_storage::StorageError;
use thiserror::Error;

use crate::{
    element_type::{ElementType, ElementTypeError, UnsupportedConversionError},
    filter::FilterError,
    selection::SelectionError,
};

/// A dataset error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DatasetError {
    /// An invalid shape, type, or selection combination, detected before any I/O.
    #[error("invalid argument: {_0}")]
    InvalidArgument(String),
    /// A dataset or named entity is absent.
    #[error("not found: {_0}")]
    NotFound(String),
    /// There is no conversion path between two element types.
    #[error("no conversion path from {source_type} to {destination_type}")]
    UnsupportedConversion {
        /// The source element type.
        source_type: ElementType,
        /// The destination element type.
        destination_type: ElementType,
    },
    /// The file and memory selections have a different number of elements.
    #[error("file selection has {file} elements but memory selection has {memory} elements")]
    SelectionSizeMismatch {
        /// The number of elements in the file selection.
        file: u64,
        /// The number of elements in the memory selection.
        memory: u64,
    },
    /// A buffer is too small.
    #[error("buffer too small: {_0}")]
    BufferTooSmall(String),
    /// A gather, scatter, or storage read transferred less than requested.
    ///
    /// Gathers and scatters count elements, storage reads count bytes.
    #[error("partial transfer: expected {expected}, transferred {actual}")]
    PartialTransfer {
        /// The number of elements (or bytes) requested.
        expected: u64,
        /// The number of elements (or bytes) transferred.
        actual: u64,
    },
    /// Dataset storage could not be initialised.
    #[error("failed to initialise dataset storage: {_0}")]
    StorageInitFailed(StorageError),
    /// A filter pipeline error.
    #[error(transparent)]
    FilterFailed(#[from] FilterError),
    /// The container was not opened with write intent.
    #[error("the container was not opened with write intent")]
    WriteDenied,
    /// A storage error.
    #[error(transparent)]
    StorageError(#[from] StorageError),
    /// A selection error.
    #[error(transparent)]
    SelectionError(#[from] SelectionError),
}

impl From<ElementTypeError> for DatasetError {
    fn from(err: ElementTypeError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl From<UnsupportedConversionError> for DatasetError {
    fn from(err: UnsupportedConversionError) -> Self {
        Self::UnsupportedConversion {
            source_type: err.source_type,
            destination_type: err.destination_type,
        }
    }
}

impl From<dsio_storage::StoreKeyError> for DatasetError {
    fn from(err: dsio_storage::StoreKeyError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl From<dsio_storage::StorePrefixError> for DatasetError {
    fn from(err: dsio_storage::StorePrefixError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}
