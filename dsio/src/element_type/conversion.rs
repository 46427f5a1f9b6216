use thiserror::Error;

use super::{ByteOrder, ElementType, NumericKind};

/// No conversion path exists between two element types.
#[derive(Clone, Debug, Error)]
#[error("no conversion path from {source_type} to {destination_type}")]
pub struct UnsupportedConversionError {
    /// The source element type.
    pub source_type: ElementType,
    /// The destination element type.
    pub destination_type: ElementType,
}

/// A resolved conversion from a source to a destination element type.
///
/// Conversions are applied in place to a buffer holding packed source elements, leaving packed destination elements.
/// Conversion rules:
///  - identical types: no-op,
///  - the same numeric kind with a different byte order: byte swap,
///  - numeric to numeric: value conversion where integer destinations saturate, `NaN` becomes `0`, float to integer truncates toward zero, and float to float rounds to nearest,
///  - compound to compound: members are matched by name and converted recursively.
///    Destination members absent from the source keep their background bytes.
#[derive(Clone, Debug)]
pub struct ConversionPath {
    source: ElementType,
    destination: ElementType,
    kind: ConversionKind,
}

#[derive(Clone, Debug)]
enum ConversionKind {
    NoOp,
    ByteSwap,
    Numeric {
        source: (NumericKind, ByteOrder),
        destination: (NumericKind, ByteOrder),
    },
    Compound {
        members: Vec<MemberConversion>,
        needs_background: bool,
    },
}

#[derive(Clone, Debug)]
struct MemberConversion {
    source_offset: usize,
    destination_offset: usize,
    path: ConversionPath,
}

impl ConversionPath {
    /// Resolve the conversion path from `source` to `destination`.
    ///
    /// # Errors
    /// Returns [`UnsupportedConversionError`] if there is no conversion between the element types.
    pub fn new(
        source: &ElementType,
        destination: &ElementType,
    ) -> Result<Self, UnsupportedConversionError> {
        let unsupported = || UnsupportedConversionError {
            source_type: source.clone(),
            destination_type: destination.clone(),
        };
        let kind = if source == destination {
            ConversionKind::NoOp
        } else {
            match (source, destination) {
                (
                    ElementType::Numeric {
                        kind: source_kind,
                        byte_order: source_order,
                    },
                    ElementType::Numeric {
                        kind: destination_kind,
                        byte_order: destination_order,
                    },
                ) => {
                    if source_kind == destination_kind {
                        if source_kind.size() == 1 {
                            ConversionKind::NoOp
                        } else {
                            ConversionKind::ByteSwap
                        }
                    } else {
                        ConversionKind::Numeric {
                            source: (*source_kind, *source_order),
                            destination: (*destination_kind, *destination_order),
                        }
                    }
                }
                (ElementType::Compound(source_compound), ElementType::Compound(destination_compound)) => {
                    let mut members = Vec::with_capacity(destination_compound.members().len());
                    let mut needs_background = false;
                    for destination_member in destination_compound.members() {
                        if let Some(source_member) = source_compound.member(destination_member.name()) {
                            let path = Self::new(
                                source_member.element_type(),
                                destination_member.element_type(),
                            )
                            .map_err(|_| unsupported())?;
                            needs_background |= path.needs_background();
                            members.push(MemberConversion {
                                source_offset: source_member.offset(),
                                destination_offset: destination_member.offset(),
                                path,
                            });
                        } else {
                            needs_background = true;
                        }
                    }
                    if members.is_empty() {
                        return Err(unsupported());
                    }
                    ConversionKind::Compound {
                        members,
                        needs_background,
                    }
                }
                _ => return Err(unsupported()),
            }
        };
        Ok(Self {
            source: source.clone(),
            destination: destination.clone(),
            kind,
        })
    }

    /// The source element type.
    #[must_use]
    pub const fn source(&self) -> &ElementType {
        &self.source
    }

    /// The destination element type.
    #[must_use]
    pub const fn destination(&self) -> &ElementType {
        &self.destination
    }

    /// Returns true if the conversion does not change any bytes.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        matches!(self.kind, ConversionKind::NoOp)
    }

    /// Returns true if the conversion must be given the existing destination elements as background.
    #[must_use]
    pub const fn needs_background(&self) -> bool {
        matches!(
            self.kind,
            ConversionKind::Compound {
                needs_background: true,
                ..
            }
        )
    }

    /// The size in bytes of a source element.
    #[must_use]
    pub fn source_size(&self) -> usize {
        self.source.size()
    }

    /// The size in bytes of a destination element.
    #[must_use]
    pub fn destination_size(&self) -> usize {
        self.destination.size()
    }

    /// Convert `count` packed source elements at the start of `buffer` to packed destination elements.
    ///
    /// `background` holds `count` destination elements whose bytes are kept wherever the conversion does not write, otherwise those bytes are zeroed.
    ///
    /// # Panics
    /// Panics if `buffer` is smaller than `count` source or destination elements, or `background` is smaller than `count` destination elements.
    pub fn convert(&self, buffer: &mut [u8], count: usize, background: Option<&[u8]>) {
        let source_size = self.source_size();
        let destination_size = self.destination_size();
        match &self.kind {
            ConversionKind::NoOp => {}
            ConversionKind::ByteSwap => buffer[..count * source_size]
                .chunks_exact_mut(source_size)
                .for_each(<[u8]>::reverse),
            ConversionKind::Numeric { .. } | ConversionKind::Compound { .. } => {
                let mut source_element = vec![0; source_size];
                let mut destination_element = vec![0; destination_size];
                let mut convert_element = |i: usize| {
                    source_element
                        .copy_from_slice(&buffer[i * source_size..(i + 1) * source_size]);
                    let destination_range = i * destination_size..(i + 1) * destination_size;
                    if let Some(background) = background {
                        destination_element.copy_from_slice(&background[destination_range.clone()]);
                    } else {
                        destination_element.fill(0);
                    }
                    self.convert_element(&source_element, &mut destination_element);
                    buffer[destination_range].copy_from_slice(&destination_element);
                };
                // elements move towards the start of the buffer when shrinking, and towards the end when growing
                if destination_size <= source_size {
                    (0..count).for_each(&mut convert_element);
                } else {
                    (0..count).rev().for_each(&mut convert_element);
                }
            }
        }
    }

    fn convert_element(&self, source: &[u8], destination: &mut [u8]) {
        match &self.kind {
            ConversionKind::NoOp => destination.copy_from_slice(source),
            ConversionKind::ByteSwap => {
                destination.copy_from_slice(source);
                destination.reverse();
            }
            ConversionKind::Numeric {
                source: (source_kind, source_order),
                destination: (destination_kind, destination_order),
            } => Scalar::read(*source_kind, *source_order, source).write(
                *destination_kind,
                *destination_order,
                destination,
            ),
            ConversionKind::Compound { members, .. } => {
                for member in members {
                    let source_end = member.source_offset + member.path.source_size();
                    let destination_end =
                        member.destination_offset + member.path.destination_size();
                    member.path.convert_element(
                        &source[member.source_offset..source_end],
                        &mut destination[member.destination_offset..destination_end],
                    );
                }
            }
        }
    }
}

/// An intermediate numeric value.
#[derive(Copy, Clone, Debug)]
enum Scalar {
    Signed(i64),
    Unsigned(u64),
    Float(f64),
}

macro_rules! from_bytes {
    ($type:ty, $order:expr, $bytes:expr) => {{
        let mut array = [0; size_of::<$type>()];
        array.copy_from_slice($bytes);
        match $order {
            ByteOrder::Little => <$type>::from_le_bytes(array),
            ByteOrder::Big => <$type>::from_be_bytes(array),
        }
    }};
}

macro_rules! to_bytes {
    ($value:expr, $order:expr, $bytes:expr) => {{
        let value = $value;
        $bytes.copy_from_slice(&match $order {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        });
    }};
}

impl Scalar {
    fn read(kind: NumericKind, order: ByteOrder, bytes: &[u8]) -> Self {
        match kind {
            NumericKind::Int8 => Self::Signed(from_bytes!(i8, order, bytes).into()),
            NumericKind::Int16 => Self::Signed(from_bytes!(i16, order, bytes).into()),
            NumericKind::Int32 => Self::Signed(from_bytes!(i32, order, bytes).into()),
            NumericKind::Int64 => Self::Signed(from_bytes!(i64, order, bytes)),
            NumericKind::UInt8 => Self::Unsigned(from_bytes!(u8, order, bytes).into()),
            NumericKind::UInt16 => Self::Unsigned(from_bytes!(u16, order, bytes).into()),
            NumericKind::UInt32 => Self::Unsigned(from_bytes!(u32, order, bytes).into()),
            NumericKind::UInt64 => Self::Unsigned(from_bytes!(u64, order, bytes)),
            NumericKind::Float16 => Self::Float(from_bytes!(half::f16, order, bytes).to_f64()),
            NumericKind::Float32 => Self::Float(from_bytes!(f32, order, bytes).into()),
            NumericKind::Float64 => Self::Float(from_bytes!(f64, order, bytes)),
        }
    }

    /// The value as an integer, saturating floats and mapping `NaN` to zero.
    #[allow(clippy::cast_possible_truncation)]
    fn to_i128(self) -> i128 {
        match self {
            Self::Signed(value) => i128::from(value),
            Self::Unsigned(value) => i128::from(value),
            Self::Float(value) if value.is_nan() => 0,
            Self::Float(value) => value as i128,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn to_f64(self) -> f64 {
        match self {
            Self::Signed(value) => value as f64,
            Self::Unsigned(value) => value as f64,
            Self::Float(value) => value,
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn write(self, kind: NumericKind, order: ByteOrder, bytes: &mut [u8]) {
        let integer = self.to_i128();
        let float = self.to_f64();
        macro_rules! saturate {
            ($type:ty) => {
                num::clamp(
                    integer,
                    i128::from(<$type>::MIN),
                    i128::from(<$type>::MAX),
                ) as $type
            };
        }
        match kind {
            NumericKind::Int8 => to_bytes!(saturate!(i8), order, bytes),
            NumericKind::Int16 => to_bytes!(saturate!(i16), order, bytes),
            NumericKind::Int32 => to_bytes!(saturate!(i32), order, bytes),
            NumericKind::Int64 => to_bytes!(saturate!(i64), order, bytes),
            NumericKind::UInt8 => to_bytes!(saturate!(u8), order, bytes),
            NumericKind::UInt16 => to_bytes!(saturate!(u16), order, bytes),
            NumericKind::UInt32 => to_bytes!(saturate!(u32), order, bytes),
            NumericKind::UInt64 => to_bytes!(saturate!(u64), order, bytes),
            NumericKind::Float16 => to_bytes!(half::f16::from_f64(float), order, bytes),
            NumericKind::Float32 => to_bytes!(float as f32, order, bytes),
            NumericKind::Float64 => to_bytes!(float, order, bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element_type::{CompoundMember, CompoundType};

    fn convert<S: bytemuck::Pod, D: bytemuck::Pod>(
        source: &ElementType,
        destination: &ElementType,
        values: &[S],
    ) -> Vec<D> {
        let path = ConversionPath::new(source, destination).unwrap();
        let mut buffer = bytemuck::cast_slice::<S, u8>(values).to_vec();
        buffer.resize(values.len() * path.source_size().max(path.destination_size()), 0);
        path.convert(&mut buffer, values.len(), None);
        buffer.truncate(values.len() * path.destination_size());
        bytemuck::pod_collect_to_vec(&buffer)
    }

    #[test]
    fn conversion_noop() {
        let path = ConversionPath::new(&ElementType::INT32, &ElementType::INT32).unwrap();
        assert!(path.is_noop());
        assert!(!path.needs_background());
        let path = ConversionPath::new(
            &ElementType::UINT8.with_byte_order(ByteOrder::Big),
            &ElementType::UINT8.with_byte_order(ByteOrder::Little),
        )
        .unwrap();
        assert!(path.is_noop());
    }

    #[test]
    fn conversion_byte_swap() {
        let big = ElementType::UINT16.with_byte_order(ByteOrder::Big);
        let little = ElementType::UINT16.with_byte_order(ByteOrder::Little);
        let path = ConversionPath::new(&big, &little).unwrap();
        assert!(!path.is_noop());
        let mut buffer = vec![0x01, 0x02, 0x03, 0x04];
        path.convert(&mut buffer, 2, None);
        assert_eq!(buffer, vec![0x02, 0x01, 0x04, 0x03]);
    }

    #[test]
    fn conversion_numeric_widen() {
        let out: Vec<i64> = convert(&ElementType::INT16, &ElementType::INT64, &[-3i16, 0, 7, i16::MAX]);
        assert_eq!(out, vec![-3, 0, 7, i64::from(i16::MAX)]);
        let out: Vec<f64> = convert(&ElementType::INT32, &ElementType::FLOAT64, &[1i32, -2, 3]);
        assert_eq!(out, vec![1.0, -2.0, 3.0]);
    }

    #[test]
    fn conversion_numeric_saturate() {
        let out: Vec<u8> = convert(&ElementType::INT32, &ElementType::UINT8, &[-5i32, 100, 300]);
        assert_eq!(out, vec![0, 100, 255]);
        let out: Vec<i16> = convert(
            &ElementType::FLOAT64,
            &ElementType::INT16,
            &[f64::NAN, 1.9, -1.9, 1e9, f64::NEG_INFINITY],
        );
        assert_eq!(out, vec![0, 1, -1, i16::MAX, i16::MIN]);
    }

    #[test]
    fn conversion_numeric_float() {
        let out: Vec<f32> = convert(&ElementType::FLOAT64, &ElementType::FLOAT32, &[0.1f64, 2.5]);
        assert_eq!(out, vec![0.1f32, 2.5f32]);
        let out: Vec<half::f16> = convert(&ElementType::FLOAT32, &ElementType::FLOAT16, &[1.5f32]);
        assert_eq!(out, vec![half::f16::from_f32(1.5)]);
    }

    #[test]
    fn conversion_numeric_byte_order() {
        let big = ElementType::INT32.with_byte_order(ByteOrder::Big);
        let path = ConversionPath::new(&big, &ElementType::FLOAT64).unwrap();
        let mut buffer = vec![0; 8];
        buffer[..4].copy_from_slice(&(-7i32).to_be_bytes());
        path.convert(&mut buffer, 1, None);
        assert_eq!(buffer, (-7.0f64).to_ne_bytes());
    }

    fn compound_ab() -> ElementType {
        ElementType::Compound(
            CompoundType::new(
                8,
                vec![
                    CompoundMember::new("a", 0, ElementType::INT32),
                    CompoundMember::new("b", 4, ElementType::INT32),
                ],
            )
            .unwrap(),
        )
    }

    fn compound_a() -> ElementType {
        ElementType::Compound(
            CompoundType::new(2, vec![CompoundMember::new("a", 0, ElementType::INT16)]).unwrap(),
        )
    }

    #[test]
    fn conversion_compound_background() {
        let path = ConversionPath::new(&compound_a(), &compound_ab()).unwrap();
        assert!(path.needs_background());

        // two source elements {a: 1}, {a: 2} grow into {a, b} using the background for `b`
        let mut buffer = vec![0; 16];
        buffer[0..2].copy_from_slice(&1i16.to_ne_bytes());
        buffer[2..4].copy_from_slice(&2i16.to_ne_bytes());
        let background: Vec<u8> = [10i32, 11, 20, 21]
            .iter()
            .flat_map(|v| v.to_ne_bytes())
            .collect();
        path.convert(&mut buffer, 2, Some(&background));
        let out: Vec<i32> = bytemuck::pod_collect_to_vec(&buffer);
        assert_eq!(out, vec![1, 11, 2, 21]);

        let mut buffer = vec![0; 8];
        buffer[0..2].copy_from_slice(&3i16.to_ne_bytes());
        path.convert(&mut buffer, 1, None);
        let out: Vec<i32> = bytemuck::pod_collect_to_vec(&buffer);
        assert_eq!(out, vec![3, 0]);
    }

    #[test]
    fn conversion_compound_subset() {
        let path = ConversionPath::new(&compound_ab(), &compound_a()).unwrap();
        assert!(!path.needs_background());
        let mut buffer: Vec<u8> = [5i32, 6, 70000, 8]
            .iter()
            .flat_map(|v| v.to_ne_bytes())
            .collect();
        path.convert(&mut buffer, 2, None);
        let out: Vec<i16> = bytemuck::pod_collect_to_vec(&buffer[..4]);
        assert_eq!(out, vec![5, i16::MAX]);
    }

    #[test]
    fn conversion_unsupported() {
        assert!(ConversionPath::new(&compound_ab(), &ElementType::INT32).is_err());
        assert!(ConversionPath::new(&ElementType::INT32, &compound_ab()).is_err());
        let disjoint = ElementType::Compound(
            CompoundType::new(4, vec![CompoundMember::new("z", 0, ElementType::INT32)]).unwrap(),
        );
        let err = ConversionPath::new(&compound_ab(), &disjoint).unwrap_err();
        assert_eq!(err.destination_type, disjoint);
    }
}
