//! An in-memory store.

use std::collections::BTreeMap;

use bytes::BytesMut;
use parking_lot::Mutex;

use crate::byte_range::{ByteOffset, ByteRange};
use crate::{
    Bytes, ListableStorageTraits, MaybeBytes, ReadableStorageTraits, StorageError, StoreKey,
    StoreKeyOffsetValue, StoreKeys, StorePrefix, WritableStorageTraits,
};

/// An in-memory store.
///
/// Values are held in a map from [`StoreKey`] to bytes which grow on partial writes beyond their end.
#[derive(Debug)]
pub struct MemoryStore {
    data_map: Mutex<BTreeMap<StoreKey, BytesMut>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a new memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data_map: Mutex::default(),
        }
    }

    fn set_impl(
        data: &mut BytesMut,
        value: &[u8],
        offset: ByteOffset,
    ) -> Result<(), StorageError> {
        let offset = usize::try_from(offset)
            .map_err(|_| StorageError::Other(format!("offset {offset} exceeds usize::MAX")))?;
        let length = offset + value.len();
        if data.len() < length {
            data.resize(length, 0);
        }
        data[offset..length].copy_from_slice(value);
        Ok(())
    }
}

impl ReadableStorageTraits for MemoryStore {
    fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StorageError> {
        let data_map = self.data_map.lock();
        Ok(data_map.get(key).map(|data| data.clone().freeze()))
    }

    fn get_byte_ranges(
        &self,
        key: &StoreKey,
        byte_ranges: &[ByteRange],
    ) -> Result<Option<Vec<Bytes>>, StorageError> {
        let data_map = self.data_map.lock();
        let Some(data) = data_map.get(key) else {
            return Ok(None);
        };
        let data = data.clone().freeze();
        let size = data.len() as u64;
        let out = byte_ranges
            .iter()
            .map(|byte_range| Ok(data.slice(byte_range.to_range_usize(size)?)))
            .collect::<Result<Vec<_>, StorageError>>()?;
        Ok(Some(out))
    }

    fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StorageError> {
        let data_map = self.data_map.lock();
        Ok(data_map.get(key).map(|entry| entry.len() as u64))
    }
}

impl WritableStorageTraits for MemoryStore {
    fn set(&self, key: &StoreKey, value: Bytes) -> Result<(), StorageError> {
        let mut data_map = self.data_map.lock();
        data_map.insert(key.clone(), BytesMut::from(value.as_ref()));
        Ok(())
    }

    fn set_partial_values(
        &self,
        key_offset_values: &[StoreKeyOffsetValue],
    ) -> Result<(), StorageError> {
        let mut data_map = self.data_map.lock();
        for key_offset_value in key_offset_values {
            let data = data_map.entry(key_offset_value.key().clone()).or_default();
            Self::set_impl(data, key_offset_value.value(), key_offset_value.offset())?;
        }
        Ok(())
    }

    fn erase(&self, key: &StoreKey) -> Result<(), StorageError> {
        self.data_map.lock().remove(key);
        Ok(())
    }
}

impl ListableStorageTraits for MemoryStore {
    fn list_prefix(&self, prefix: &StorePrefix) -> Result<StoreKeys, StorageError> {
        let data_map = self.data_map.lock();
        Ok(data_map
            .keys()
            .filter(|&key| key.has_prefix(prefix))
            .cloned()
            .collect())
    }

    fn size_prefix(&self, prefix: &StorePrefix) -> Result<u64, StorageError> {
        let data_map = self.data_map.lock();
        Ok(data_map
            .iter()
            .filter(|(key, _)| key.has_prefix(prefix))
            .map(|(_, value)| value.len() as u64)
            .sum())
    }
}
