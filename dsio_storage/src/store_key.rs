use derive_more::Display;
use thiserror::Error;

use crate::byte_range::ByteOffset;
use crate::StorePrefix;

/// A store key.
///
/// A key is a `/` separated path which does not start or end with `/` and is not empty.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
pub struct StoreKey(String);

/// An invalid store key.
#[derive(Clone, Debug, Error)]
#[error("invalid store key {0}")]
pub struct StoreKeyError(String);

impl From<String> for StoreKeyError {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// A list of [`StoreKey`].
pub type StoreKeys = Vec<StoreKey>;

impl StoreKey {
    /// Create a new store key from `key`.
    ///
    /// # Errors
    /// Returns [`StoreKeyError`] if `key` is not valid according to [`StoreKey::validate()`].
    pub fn new(key: impl Into<String>) -> Result<Self, StoreKeyError> {
        let key = key.into();
        if Self::validate(&key) {
            Ok(Self(key))
        } else {
            Err(StoreKeyError(key))
        }
    }

    /// Extracts a string slice of the underlying key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validates a key.
    ///
    /// A key must not be empty, and must not start or end with `/`.
    #[must_use]
    pub fn validate(key: &str) -> bool {
        !key.is_empty() && !key.starts_with('/') && !key.ends_with('/')
    }

    /// Returns true if the key has prefix `prefix`.
    #[must_use]
    pub fn has_prefix(&self, prefix: &StorePrefix) -> bool {
        self.0.starts_with(prefix.as_str())
    }
}

impl TryFrom<&str> for StoreKey {
    type Error = StoreKeyError;

    fn try_from(key: &str) -> Result<Self, Self::Error> {
        Self::new(key)
    }
}

/// A [`StoreKey`], [`ByteOffset`], and value (bytes).
#[derive(Debug, Clone)]
pub struct StoreKeyOffsetValue<'a> {
    key: StoreKey,
    offset: ByteOffset,
    value: &'a [u8],
}

impl<'a> StoreKeyOffsetValue<'a> {
    /// Create a new [`StoreKeyOffsetValue`].
    #[must_use]
    pub const fn new(key: StoreKey, offset: ByteOffset, value: &'a [u8]) -> Self {
        Self { key, offset, value }
    }

    /// Get the store key.
    #[must_use]
    pub const fn key(&self) -> &StoreKey {
        &self.key
    }

    /// Get the offset.
    #[must_use]
    pub const fn offset(&self) -> ByteOffset {
        self.offset
    }

    /// Get the value.
    #[must_use]
    pub const fn value(&self) -> &'a [u8] {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_key() {
        assert!(StoreKey::new("a").is_ok());
        assert_eq!(StoreKey::new("a").unwrap().to_string(), "a");
        assert!(StoreKey::new("a/").is_err());
        assert!(StoreKey::new("/a").is_err());
        assert!(StoreKey::new("").is_err());
        assert_eq!(
            StoreKey::new("a/").unwrap_err().to_string(),
            "invalid store key a/"
        );
        let key = StoreKey::new("dset/c/0").unwrap();
        assert!(key.has_prefix(&StorePrefix::new("dset/c/").unwrap()));
        assert!(key.has_prefix(&StorePrefix::root()));
        assert!(!key.has_prefix(&StorePrefix::new("dset/d/").unwrap()));
    }
}
