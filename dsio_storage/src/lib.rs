//! The storage API for the [`dsio`](https://docs.rs/dsio/latest/dsio/index.html) dataset I/O engine.
//!
//! A store is a key/value system that holds the bytes of a container: dataset metadata records,
//! contiguous dataset data, and encoded chunks.
//! For example: an in-memory map, a filesystem directory, etc.
//!
//! This crate includes an in-memory store implementation and a [performance metrics](storage_adapter::performance_metrics) storage adapter.
//! A filesystem store is provided by the `dsio_filesystem` crate.
//!
//! ## Licence
//! `dsio_storage` is licensed under either of
//! - the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> or
//! - the MIT license <http://opensource.org/licenses/MIT>, at your option.
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod byte_range;
pub mod storage_adapter;
mod storage_sync;
pub mod store;
mod store_key;
mod store_prefix;


use std::sync::Arc;

use thiserror::Error;

use byte_range::InvalidByteRangeError;

pub use store_key::{StoreKey, StoreKeyError, StoreKeyOffsetValue, StoreKeys};
pub use store_prefix::{StorePrefix, StorePrefixError};

pub use self::storage_sync::{
    ListableStorageTraits, ReadableStorageTraits, ReadableWritableListableStorageTraits,
    ReadableWritableStorageTraits, WritableStorageTraits,
};

/// [`Arc`] wrapped readable, writable, and listable storage.
pub type ReadableWritableListableStorage = Arc<dyn ReadableWritableListableStorageTraits>;

/// The type for bytes used in store set and get methods.
///
/// An alias for [`bytes::Bytes`].
pub type Bytes = bytes::Bytes;

/// An alias for bytes which may or may not be available.
///
/// When a value is read from a store, it returns `MaybeBytes` which is [`None`] if the key is not available.
pub type MaybeBytes = Option<Bytes>;

/// A storage error.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// A write operation was attempted on a read only store.
    #[error("a write operation was attempted on a read only store")]
    ReadOnly,
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] Arc<std::io::Error>),
    /// An invalid store prefix.
    #[error(transparent)]
    StorePrefixError(#[from] StorePrefixError),
    /// An invalid store key.
    #[error(transparent)]
    InvalidStoreKey(#[from] StoreKeyError),
    /// An invalid byte range.
    #[error(transparent)]
    InvalidByteRangeError(#[from] InvalidByteRangeError),
    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::IOError(Arc::new(err))
    }
}
