use derive_more::Display;
use thiserror::Error;

/// A store prefix.
///
/// A prefix is either empty (the root) or a `/` terminated path which does not start with `/`.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
pub struct StorePrefix(String);

/// An invalid store prefix.
#[derive(Clone, Debug, Error)]
#[error("invalid store prefix {0}")]
pub struct StorePrefixError(String);

impl From<String> for StorePrefixError {
    fn from(prefix: String) -> Self {
        Self(prefix)
    }
}

impl StorePrefix {
    /// Create a new store prefix from `prefix`.
    ///
    /// # Errors
    /// Returns [`StorePrefixError`] if `prefix` is not valid according to [`StorePrefix::validate`].
    pub fn new(prefix: impl Into<String>) -> Result<Self, StorePrefixError> {
        let prefix = prefix.into();
        if Self::validate(&prefix) {
            Ok(Self(prefix))
        } else {
            Err(StorePrefixError(prefix))
        }
    }

    /// The root prefix.
    #[must_use]
    pub const fn root() -> Self {
        Self(String::new())
    }

    /// Extracts a string slice containing the prefix.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validates a prefix.
    ///
    /// A prefix is empty, or ends with `/` and does not start with `/`.
    #[must_use]
    pub fn validate(prefix: &str) -> bool {
        prefix.is_empty() || (prefix.ends_with('/') && !prefix.starts_with('/'))
    }
}

impl TryFrom<&str> for StorePrefix {
    type Error = StorePrefixError;

    fn try_from(prefix: &str) -> Result<Self, Self::Error> {
        Self::new(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_prefix() {
        assert!(StorePrefix::new("").is_ok());
        assert!(StorePrefix::new("a/").is_ok());
        assert!(StorePrefix::new("a").is_err());
        assert!(StorePrefix::new("/a/").is_err());
        assert_eq!(StorePrefix::root().as_str(), "");
        assert_eq!(
            StorePrefix::new("a").unwrap_err().to_string(),
            "invalid store prefix a"
        );
    }
}
