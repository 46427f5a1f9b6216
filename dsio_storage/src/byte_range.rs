//! Byte ranges.
//!
//! A [`ByteRange`] addresses bytes of a stored value from an offset.
//! Contiguous dataset storage is read through byte ranges, one per contiguous run of selected elements.

use std::ops::Range;

use thiserror::Error;

/// A byte offset.
pub type ByteOffset = u64;

/// A byte length.
pub type ByteLength = u64;

/// A byte range of a stored value, starting at an offset.
///
/// A range without a length extends to the end of the value.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ByteRange {
    offset: ByteOffset,
    length: Option<ByteLength>,
}

impl ByteRange {
    /// Create a new byte range of `length` bytes from `offset`, or to the end of the value if `length` is [`None`].
    #[must_use]
    pub const fn new(offset: ByteOffset, length: Option<ByteLength>) -> Self {
        Self { offset, length }
    }

    /// A byte range covering an entire value.
    #[must_use]
    pub const fn all() -> Self {
        Self::new(0, None)
    }

    /// The offset of the first byte.
    #[must_use]
    pub const fn offset(&self) -> ByteOffset {
        self.offset
    }

    /// The length, or [`None`] if the range extends to the end of the value.
    #[must_use]
    pub const fn length(&self) -> Option<ByteLength> {
        self.length
    }

    /// Convert the byte range of a value of `size` bytes to a [`Range<usize>`].
    ///
    /// # Errors
    /// Returns [`InvalidByteRangeError`] if the byte range does not fit within `size` bytes.
    pub fn to_range_usize(&self, size: u64) -> Result<Range<usize>, InvalidByteRangeError> {
        let invalid = || InvalidByteRangeError::new(*self, size);
        let end = match self.length {
            Some(length) => self.offset.checked_add(length).ok_or_else(invalid)?,
            None => size,
        };
        if self.offset > end || end > size {
            return Err(invalid());
        }
        let start = usize::try_from(self.offset).map_err(|_| invalid())?;
        let end = usize::try_from(end).map_err(|_| invalid())?;
        Ok(start..end)
    }
}

impl std::fmt::Display for ByteRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.length {
            None => write!(f, "{}..", self.offset),
            Some(length) => write!(f, "{}..{}", self.offset, self.offset.saturating_add(length)),
        }
    }
}

/// An invalid byte range error.
#[derive(Copy, Clone, Debug, Error)]
#[error("invalid byte range {0} for bytes of length {1}")]
pub struct InvalidByteRangeError(ByteRange, u64);

impl InvalidByteRangeError {
    /// Create a new [`InvalidByteRangeError`].
    #[must_use]
    pub fn new(byte_range: ByteRange, bytes_len: u64) -> Self {
        Self(byte_range, bytes_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_range_to_range() {
        assert_eq!(ByteRange::all().to_range_usize(10).unwrap(), 0..10);
        assert_eq!(ByteRange::new(1, None).to_range_usize(10).unwrap(), 1..10);
        assert_eq!(ByteRange::new(1, Some(5)).to_range_usize(10).unwrap(), 1..6);
        assert_eq!(ByteRange::new(10, Some(0)).to_range_usize(10).unwrap(), 10..10);
        assert!(ByteRange::new(1, Some(5)).to_range_usize(2).is_err());
        assert!(ByteRange::new(11, None).to_range_usize(10).is_err());
        assert!(ByteRange::new(1, Some(u64::MAX)).to_range_usize(10).is_err());
        assert_eq!(
            ByteRange::new(1, Some(4)).to_range_usize(3).unwrap_err().to_string(),
            "invalid byte range 1..5 for bytes of length 3"
        );
    }

    #[test]
    fn byte_range_display() {
        assert_eq!(ByteRange::all().to_string(), "0..");
        assert_eq!(ByteRange::new(5, Some(2)).to_string(), "5..7");
        assert_eq!(ByteRange::new(5, None).offset(), 5);
        assert_eq!(ByteRange::new(5, Some(2)).length(), Some(2));
    }
}
