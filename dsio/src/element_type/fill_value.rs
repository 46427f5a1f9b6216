use serde::{Deserialize, Serialize};

use super::{ConversionPath, Element, ElementType, ElementTypeError, UnsupportedConversionError};

/// A typed fill value.
///
/// The value of elements that have been allocated but never written.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FillValue {
    element_type: ElementType,
    bytes: Vec<u8>,
}

impl FillValue {
    /// Create a new fill value from the `bytes` of an element of `element_type`.
    ///
    /// # Errors
    /// Returns [`ElementTypeError::InvalidElementBytes`] if the length of `bytes` does not match the element size.
    pub fn new(element_type: ElementType, bytes: Vec<u8>) -> Result<Self, ElementTypeError> {
        if bytes.len() == element_type.size() {
            Ok(Self {
                element_type,
                bytes,
            })
        } else {
            Err(ElementTypeError::InvalidElementBytes {
                expected: element_type.size(),
                got: bytes.len(),
                element_type,
            })
        }
    }

    /// The element type of the fill value.
    #[must_use]
    pub const fn element_type(&self) -> &ElementType {
        &self.element_type
    }

    /// The bytes of the fill value.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Convert the fill value to `element_type`.
    ///
    /// # Errors
    /// Returns [`UnsupportedConversionError`] if there is no conversion path to `element_type`.
    pub fn convert_to(&self, element_type: &ElementType) -> Result<Self, UnsupportedConversionError> {
        let path = ConversionPath::new(&self.element_type, element_type)?;
        let mut buffer = self.bytes.clone();
        buffer.resize(path.source_size().max(path.destination_size()), 0);
        path.convert(&mut buffer, 1, None);
        buffer.truncate(path.destination_size());
        Ok(Self {
            element_type: element_type.clone(),
            bytes: buffer,
        })
    }

    /// Returns the fill value repeated `count` times.
    #[must_use]
    pub fn repeat(&self, count: usize) -> Vec<u8> {
        self.bytes.repeat(count)
    }
}

impl<T: Element> From<T> for FillValue {
    fn from(value: T) -> Self {
        Self {
            element_type: T::element_type(),
            bytes: bytemuck::bytes_of(&value).to_vec(),
        }
    }
}
