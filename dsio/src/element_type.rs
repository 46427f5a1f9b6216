//! Element types.
//!
//! An [`ElementType`] is a fixed-size, fixed-layout record type: a numeric type with a byte order, or a compound of named members.
//! Element types are converted between with a [`ConversionPath`].

mod conversion;
mod fill_value;

pub use conversion::{ConversionPath, UnsupportedConversionError};
pub use fill_value::FillValue;

use derive_more::Display;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The byte order of a numeric element type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    /// Little endian.
    #[display("le")]
    Little,
    /// Big endian.
    #[display("be")]
    Big,
}

impl ByteOrder {
    /// The native byte order of the target.
    #[cfg(target_endian = "little")]
    pub const NATIVE: Self = Self::Little;

    /// The native byte order of the target.
    #[cfg(target_endian = "big")]
    pub const NATIVE: Self = Self::Big;
}

/// A numeric element kind.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum NumericKind {
    #[display("int8")]
    Int8,
    #[display("int16")]
    Int16,
    #[display("int32")]
    Int32,
    #[display("int64")]
    Int64,
    #[display("uint8")]
    UInt8,
    #[display("uint16")]
    UInt16,
    #[display("uint32")]
    UInt32,
    #[display("uint64")]
    UInt64,
    #[display("float16")]
    Float16,
    #[display("float32")]
    Float32,
    #[display("float64")]
    Float64,
}

impl NumericKind {
    /// The size in bytes of the numeric kind.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 | Self::Float16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 => 8,
        }
    }

    /// Returns true if the numeric kind is a floating point type.
    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float16 | Self::Float32 | Self::Float64)
    }

    /// Returns true if the numeric kind is a signed integer type.
    #[must_use]
    pub const fn is_signed_integer(self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }
}

/// An element type error.
#[derive(Clone, Debug, Error)]
pub enum ElementTypeError {
    /// An invalid compound element type.
    #[error("invalid compound element type: {_0}")]
    InvalidCompound(String),
    /// Bytes do not match the size of an element type.
    #[error("got {got} bytes for element type {element_type}, expected {expected}")]
    InvalidElementBytes {
        /// The element type.
        element_type: ElementType,
        /// The expected number of bytes.
        expected: usize,
        /// The number of bytes supplied.
        got: usize,
    },
}

/// A named member of a [`CompoundType`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompoundMember {
    name: String,
    offset: usize,
    element_type: ElementType,
}

impl CompoundMember {
    /// Create a new compound member at byte `offset` within its compound.
    #[must_use]
    pub fn new(name: impl Into<String>, offset: usize, element_type: ElementType) -> Self {
        Self {
            name: name.into(),
            offset,
            element_type,
        }
    }

    /// The member name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The byte offset of the member within its compound.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// The member element type.
    #[must_use]
    pub const fn element_type(&self) -> &ElementType {
        &self.element_type
    }
}

/// A compound element type.
///
/// Members are named, lie within the compound size, and do not overlap.
/// Bytes not covered by a member are padding.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "CompoundTypeUnchecked")]
pub struct CompoundType {
    size: usize,
    members: Vec<CompoundMember>,
}

#[derive(Deserialize)]
struct CompoundTypeUnchecked {
    size: usize,
    members: Vec<CompoundMember>,
}

impl TryFrom<CompoundTypeUnchecked> for CompoundType {
    type Error = ElementTypeError;

    fn try_from(compound: CompoundTypeUnchecked) -> Result<Self, Self::Error> {
        Self::new(compound.size, compound.members)
    }
}

impl CompoundType {
    /// Create a new compound element type of `size` bytes.
    ///
    /// # Errors
    /// Returns [`ElementTypeError::InvalidCompound`] if
    ///  - `size` is zero or there are no members,
    ///  - member names are not unique,
    ///  - a member extends beyond `size`, or
    ///  - members overlap.
    pub fn new(size: usize, members: Vec<CompoundMember>) -> Result<Self, ElementTypeError> {
        if size == 0 || members.is_empty() {
            return Err(ElementTypeError::InvalidCompound(
                "a compound must have a non-zero size and at least one member".to_string(),
            ));
        }
        if let Some(name) = members.iter().map(CompoundMember::name).duplicates().next() {
            return Err(ElementTypeError::InvalidCompound(format!(
                "member name {name} is not unique"
            )));
        }
        for member in &members {
            if member.offset + member.element_type.size() > size {
                return Err(ElementTypeError::InvalidCompound(format!(
                    "member {} ends beyond the compound size {size}",
                    member.name
                )));
            }
        }
        let overlap = members
            .iter()
            .map(|member| (member.offset, member.offset + member.element_type.size()))
            .sorted()
            .tuple_windows()
            .any(|((_, end), (start, _))| start < end);
        if overlap {
            return Err(ElementTypeError::InvalidCompound(
                "members overlap".to_string(),
            ));
        }
        Ok(Self { size, members })
    }

    /// The size in bytes of the compound.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// The compound members.
    #[must_use]
    pub fn members(&self) -> &[CompoundMember] {
        &self.members
    }

    /// Find a member by name.
    #[must_use]
    pub fn member(&self, name: &str) -> Option<&CompoundMember> {
        self.members.iter().find(|member| member.name == name)
    }
}

/// An element type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    /// A numeric type.
    Numeric {
        /// The numeric kind.
        kind: NumericKind,
        /// The byte order.
        byte_order: ByteOrder,
    },
    /// A compound type.
    Compound(CompoundType),
}

macro_rules! native_element_type {
    ($name:ident, $kind:ident, $doc:literal) => {
        #[doc = $doc]
        pub const $name: Self = Self::Numeric {
            kind: NumericKind::$kind,
            byte_order: ByteOrder::NATIVE,
        };
    };
}

impl ElementType {
    native_element_type!(INT8, Int8, "A native `int8` element type.");
    native_element_type!(INT16, Int16, "A native `int16` element type.");
    native_element_type!(INT32, Int32, "A native `int32` element type.");
    native_element_type!(INT64, Int64, "A native `int64` element type.");
    native_element_type!(UINT8, UInt8, "A native `uint8` element type.");
    native_element_type!(UINT16, UInt16, "A native `uint16` element type.");
    native_element_type!(UINT32, UInt32, "A native `uint32` element type.");
    native_element_type!(UINT64, UInt64, "A native `uint64` element type.");
    native_element_type!(FLOAT16, Float16, "A native `float16` element type.");
    native_element_type!(FLOAT32, Float32, "A native `float32` element type.");
    native_element_type!(FLOAT64, Float64, "A native `float64` element type.");

    /// Create a numeric element type.
    #[must_use]
    pub const fn numeric(kind: NumericKind, byte_order: ByteOrder) -> Self {
        Self::Numeric { kind, byte_order }
    }

    /// Return a copy of a numeric element type with `byte_order`.
    ///
    /// Compound element types are returned unchanged.
    #[must_use]
    pub fn with_byte_order(self, byte_order: ByteOrder) -> Self {
        match self {
            Self::Numeric { kind, .. } => Self::Numeric { kind, byte_order },
            compound @ Self::Compound(_) => compound,
        }
    }

    /// The size in bytes of an element.
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            Self::Numeric { kind, .. } => kind.size(),
            Self::Compound(compound) => compound.size(),
        }
    }

    /// Returns true if the element type is a compound.
    #[must_use]
    pub const fn is_compound(&self) -> bool {
        matches!(self, Self::Compound(_))
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Numeric { kind, byte_order } => write!(f, "{kind}{byte_order}"),
            Self::Compound(compound) => {
                write!(f, "compound[{}]{{", compound.size)?;
                for (i, member) in compound.members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}@{}: {}", member.name, member.offset, member.element_type)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// A native element that can be read from or written to a dataset.
pub trait Element: bytemuck::Pod {
    /// The native element type of `Self`.
    fn element_type() -> ElementType;
}

macro_rules! impl_element {
    ($type:ty, $const:ident) => {
        impl Element for $type {
            fn element_type() -> ElementType {
                ElementType::$const
            }
        }
    };
}

impl_element!(i8, INT8);
impl_element!(i16, INT16);
impl_element!(i32, INT32);
impl_element!(i64, INT64);
impl_element!(u8, UINT8);
impl_element!(u16, UINT16);
impl_element!(u32, UINT32);
impl_element!(u64, UINT64);
impl_element!(half::f16, FLOAT16);
impl_element!(f32, FLOAT32);
impl_element!(f64, FLOAT64);

#[cfg(test)]
mod tests {
    use super::*;

    fn point() -> CompoundType {
        CompoundType::new(
            16,
            vec![
                CompoundMember::new("x", 0, ElementType::INT32),
                CompoundMember::new("y", 8, ElementType::FLOAT64),
            ],
        )
        .unwrap()
    }

    #[test]
    fn element_type_sizes() {
        assert_eq!(ElementType::INT8.size(), 1);
        assert_eq!(ElementType::FLOAT16.size(), 2);
        assert_eq!(ElementType::UINT32.size(), 4);
        assert_eq!(ElementType::FLOAT64.size(), 8);
        assert_eq!(ElementType::Compound(point()).size(), 16);
        assert_eq!(<f32 as Element>::element_type(), ElementType::FLOAT32);
    }

    #[test]
    fn element_type_compound_invalid() {
        let overlapping = CompoundType::new(
            8,
            vec![
                CompoundMember::new("a", 0, ElementType::INT32),
                CompoundMember::new("b", 2, ElementType::INT16),
            ],
        );
        assert!(overlapping.is_err());
        let duplicate = CompoundType::new(
            8,
            vec![
                CompoundMember::new("a", 0, ElementType::INT32),
                CompoundMember::new("a", 4, ElementType::INT32),
            ],
        );
        assert!(duplicate.is_err());
        assert!(CompoundType::new(4, vec![]).is_err());
    }

    #[test]
    fn element_type_display() {
        assert_eq!(
            ElementType::INT32.with_byte_order(ByteOrder::Big).to_string(),
            "int32be"
        );
        assert_eq!(
            ElementType::Compound(point())
                .with_byte_order(ByteOrder::Little)
                .to_string(),
            format!(
                "compound[16]{{x@0: {}, y@8: {}}}",
                ElementType::INT32,
                ElementType::FLOAT64
            )
        );
    }

    #[test]
    fn element_type_serde() {
        let element_type = ElementType::Compound(point());
        let json = serde_json::to_string(&element_type).unwrap();
        let decoded: ElementType = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, element_type);

        let invalid = r#"{"compound":{"size":2,"members":[{"name":"a","offset":0,"element_type":{"numeric":{"kind":"int32","byte_order":"little"}}}]}}"#;
        assert!(serde_json::from_str::<ElementType>(invalid).is_err());
    }
}
