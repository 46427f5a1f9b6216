//! A filesystem store for the [`dsio`](https://docs.rs/dsio/latest/dsio/index.html) dataset I/O engine.
//!
//! Each store key maps to a file below the store base path, so a container persisted with this
//! store is a directory holding one metadata file and the data (or chunk) files of each dataset.
//!
//! ## Licence
//! `dsio_filesystem` is licensed under either of
//! - the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> or
//! - the MIT license <http://opensource.org/licenses/MIT>, at your option.

use dsio_storage::{
    byte_range::{ByteOffset, ByteRange},
    Bytes, ListableStorageTraits, ReadableStorageTraits, StorageError, StoreKey, StoreKeyError,
    StoreKeyOffsetValue, StoreKeys, StorePrefix, WritableStorageTraits,
};

use itertools::Itertools;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use walkdir::WalkDir;

use std::{
    collections::HashMap,
    fs::OpenOptions,
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

/// A synchronous file system store.
#[derive(Debug)]
pub struct FilesystemStore {
    base_path: PathBuf,
    readonly: bool,
    files: Mutex<HashMap<StoreKey, Arc<RwLock<()>>>>,
}

impl FilesystemStore {
    /// Create a new file system store at a given `base_path`.
    ///
    /// The store is read only if `base_path` exists and is not writable.
    ///
    /// # Errors
    /// Returns a [`FilesystemStoreCreateError`] if `base_directory`:
    ///   - is not valid, or
    ///   - it points to an existing file rather than a directory.
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, FilesystemStoreCreateError> {
        let base_path = base_path.as_ref().to_path_buf();
        if base_path.to_str().is_none() {
            return Err(FilesystemStoreCreateError::InvalidBasePath(base_path));
        }

        let readonly = if base_path.exists() {
            let md = std::fs::metadata(&base_path)?;
            if !md.is_dir() {
                return Err(FilesystemStoreCreateError::InvalidBasePath(base_path));
            }
            md.permissions().readonly()
        } else {
            // creating the directory proves the filesystem is writable
            std::fs::create_dir_all(&base_path)?;
            std::fs::remove_dir(&base_path)?;
            false
        };

        Ok(Self {
            base_path,
            readonly,
            files: Mutex::default(),
        })
    }

    /// Returns true if the store is read only.
    #[must_use]
    pub const fn readonly(&self) -> bool {
        self.readonly
    }

    /// Maps a [`StoreKey`] to a filesystem [`PathBuf`].
    #[must_use]
    pub fn key_to_fspath(&self, key: &StoreKey) -> PathBuf {
        let mut path = self.base_path.clone();
        path.push(key.as_str());
        path
    }

    /// Maps a filesystem [`PathBuf`] to a [`StoreKey`].
    fn fspath_to_key(&self, path: &Path) -> Result<StoreKey, StoreKeyError> {
        let path = pathdiff::diff_paths(path, &self.base_path)
            .ok_or_else(|| StoreKeyError::from(path.to_string_lossy().to_string()))?;
        let path_str = path.to_string_lossy();
        #[cfg(target_os = "windows")]
        {
            StoreKey::new(path_str.replace('\\', "/"))
        }
        #[cfg(not(target_os = "windows"))]
        {
            StoreKey::new(path_str)
        }
    }

    /// Maps a store [`StorePrefix`] to a filesystem [`PathBuf`].
    #[must_use]
    pub fn prefix_to_fs_path(&self, prefix: &StorePrefix) -> PathBuf {
        let mut path = self.base_path.clone();
        path.push(prefix.as_str());
        path
    }

    fn get_file_mutex(&self, key: &StoreKey) -> Arc<RwLock<()>> {
        self.files
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RwLock::default()))
            .clone()
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.readonly {
            Err(StorageError::ReadOnly)
        } else {
            Ok(())
        }
    }

    /// Write `values` at their offsets in the file of `key`, creating it if required.
    ///
    /// Writing past the end of a file leaves a zero-filled gap.
    fn set_impl(
        &self,
        key: &StoreKey,
        offset_values: &[(ByteOffset, &[u8])],
        truncate: bool,
    ) -> Result<(), StorageError> {
        let file = self.get_file_mutex(key);
        let _lock = file.write();

        let key_path = self.key_to_fspath(key);
        if let Some(parent) = key_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(truncate)
            .open(key_path)?;
        for (offset, value) in offset_values {
            file.seek(SeekFrom::Start(*offset))?;
            file.write_all(value)?;
        }
        Ok(())
    }
}

impl ReadableStorageTraits for FilesystemStore {
    fn get_byte_ranges(
        &self,
        key: &StoreKey,
        byte_ranges: &[ByteRange],
    ) -> Result<Option<Vec<Bytes>>, StorageError> {
        let file = self.get_file_mutex(key);
        let _lock = file.read();
        let mut file = match OpenOptions::new().read(true).open(self.key_to_fspath(key)) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let size = file.metadata()?.len();

        let out = byte_ranges
            .iter()
            .map(|byte_range| {
                let range = byte_range.to_range_usize(size)?;
                let mut buffer = vec![0; range.len()];
                file.seek(SeekFrom::Start(byte_range.offset()))?;
                file.read_exact(&mut buffer)?;
                Ok(Bytes::from(buffer))
            })
            .collect::<Result<Vec<_>, StorageError>>()?;
        Ok(Some(out))
    }

    fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StorageError> {
        match std::fs::metadata(self.key_to_fspath(key)) {
            Ok(metadata) => Ok(Some(metadata.len())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

impl WritableStorageTraits for FilesystemStore {
    fn set(&self, key: &StoreKey, value: Bytes) -> Result<(), StorageError> {
        self.check_writable()?;
        self.set_impl(key, &[(0, value.as_ref())], true)
    }

    fn set_partial_values(
        &self,
        key_offset_values: &[StoreKeyOffsetValue],
    ) -> Result<(), StorageError> {
        self.check_writable()?;
        for (key, group) in &key_offset_values
            .iter()
            .chunk_by(|key_offset_value| key_offset_value.key())
        {
            let offset_values = group
                .map(|key_offset_value| (key_offset_value.offset(), key_offset_value.value()))
                .collect::<Vec<_>>();
            self.set_impl(key, &offset_values, false)?;
        }
        Ok(())
    }

    fn erase(&self, key: &StoreKey) -> Result<(), StorageError> {
        self.check_writable()?;

        let file = self.get_file_mutex(key);
        let _lock = file.write();

        match std::fs::remove_file(self.key_to_fspath(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl ListableStorageTraits for FilesystemStore {
    fn list_prefix(&self, prefix: &StorePrefix) -> Result<StoreKeys, StorageError> {
        let mut keys: StoreKeys = WalkDir::new(self.prefix_to_fs_path(prefix))
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| self.fspath_to_key(entry.path()).ok())
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn size_prefix(&self, prefix: &StorePrefix) -> Result<u64, StorageError> {
        let mut size = 0;
        for entry in WalkDir::new(self.prefix_to_fs_path(prefix))
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_file())
        {
            size += entry.metadata().map_err(std::io::Error::from)?.len();
        }
        Ok(size)
    }
}

/// A filesystem store creation error.
#[derive(Debug, Error)]
pub enum FilesystemStoreCreateError {
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// The path is not valid on this system.
    #[error("base path {0} is not valid")]
    InvalidBasePath(PathBuf),
}
