//! # Datapoint Value Encoding and Decoding
//!
//! This module converts the value bytes of a message to and from typed values.
//! Integers are big-endian at widths of 8, 16 or 32 bits and may carry a
//! fixed-point factor (decoded value = raw / factor). List values map a raw
//! index onto named states, and text is decoded on a best-effort basis.

use std::fmt;

use nom::{
    number::complete::{be_i16, be_i32, be_i8, be_u16, be_u32, be_u8},
    IResult,
};
use serde::{Deserialize, Serialize};

/// Errors raised by the datatype codec.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DatatypeError {
    #[error("Value too short: expected {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },
    #[error("Value {value} does not fit into {bits} bits")]
    OutOfRange { value: String, bits: u8 },
    #[error("Unsupported integer width: {0} bits")]
    UnsupportedWidth(u8),
    #[error("Unsupported factor: {0}")]
    UnsupportedFactor(u32),
    #[error("Unknown state: {0}")]
    UnknownState(String),
    #[error("Value {value} is not compatible with type {datatype}")]
    Incompatible { value: String, datatype: String },
}

fn default_factor() -> u32 {
    1
}

fn default_list_bits() -> u8 {
    8
}

/// A named state of a list datapoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListState {
    pub value: u32,
    pub label: String,
}

/// The declared type of a datapoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DataType {
    Signed {
        bits: u8,
        #[serde(default = "default_factor")]
        factor: u32,
    },
    Unsigned {
        bits: u8,
        #[serde(default = "default_factor")]
        factor: u32,
    },
    List {
        #[serde(default = "default_list_bits")]
        bits: u8,
        #[serde(default)]
        states: Vec<ListState>,
    },
    String,
}

/// A decoded datapoint value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Integer without fixed-point scaling.
    Integer(i64),
    /// Integer scaled by a fixed-point factor.
    Decimal(f64),
    /// A recognized list state.
    State(String),
    /// A list index without a named state.
    Unrecognized(u32),
    Text(String),
    /// Bytes that could not be decoded as text.
    Raw(Vec<u8>),
}

impl Value {
    /// Numeric view of the value, used for limit checks.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Decimal(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{v}"),
            Value::Decimal(v) => write!(f, "{v}"),
            Value::State(s) => write!(f, "{s}"),
            Value::Unrecognized(v) => write!(f, "unrecognized({v})"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Raw(bytes) => write!(f, "raw({})", hex::encode(bytes)),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Signed { bits, factor } => write!(f, "signed({bits}, /{factor})"),
            DataType::Unsigned { bits, factor } => write!(f, "unsigned({bits}, /{factor})"),
            DataType::List { bits, .. } => write!(f, "list({bits})"),
            DataType::String => write!(f, "string"),
        }
    }
}

fn check_width(bits: u8) -> Result<usize, DatatypeError> {
    match bits {
        8 | 16 | 32 => Ok(bits as usize / 8),
        _ => Err(DatatypeError::UnsupportedWidth(bits)),
    }
}

fn too_short(expected: usize, actual: usize) -> DatatypeError {
    DatatypeError::TooShort { expected, actual }
}

/// Decodes a big-endian two's-complement integer of the given width.
pub fn decode_signed(input: &[u8], bits: u8) -> Result<i64, DatatypeError> {
    let size = check_width(bits)?;
    let result: IResult<&[u8], i64> = match size {
        1 => be_i8(input).map(|(i, v)| (i, v as i64)),
        2 => be_i16(input).map(|(i, v)| (i, v as i64)),
        _ => be_i32(input).map(|(i, v)| (i, v as i64)),
    };
    result.map(|(_, v)| v).map_err(|_| too_short(size, input.len()))
}

/// Decodes a big-endian unsigned integer of the given width.
pub fn decode_unsigned(input: &[u8], bits: u8) -> Result<u64, DatatypeError> {
    let size = check_width(bits)?;
    let result: IResult<&[u8], u64> = match size {
        1 => be_u8(input).map(|(i, v)| (i, v as u64)),
        2 => be_u16(input).map(|(i, v)| (i, v as u64)),
        _ => be_u32(input).map(|(i, v)| (i, v as u64)),
    };
    result.map(|(_, v)| v).map_err(|_| too_short(size, input.len()))
}

/// Encodes a signed integer big-endian at the given width.
pub fn encode_signed(value: i64, bits: u8) -> Result<Vec<u8>, DatatypeError> {
    let out_of_range = || DatatypeError::OutOfRange {
        value: value.to_string(),
        bits,
    };
    match check_width(bits)? {
        1 => i8::try_from(value)
            .map(|v| v.to_be_bytes().to_vec())
            .map_err(|_| out_of_range()),
        2 => i16::try_from(value)
            .map(|v| v.to_be_bytes().to_vec())
            .map_err(|_| out_of_range()),
        _ => i32::try_from(value)
            .map(|v| v.to_be_bytes().to_vec())
            .map_err(|_| out_of_range()),
    }
}

/// Encodes an unsigned integer big-endian at the given width.
pub fn encode_unsigned(value: u64, bits: u8) -> Result<Vec<u8>, DatatypeError> {
    let out_of_range = || DatatypeError::OutOfRange {
        value: value.to_string(),
        bits,
    };
    match check_width(bits)? {
        1 => u8::try_from(value)
            .map(|v| vec![v])
            .map_err(|_| out_of_range()),
        2 => u16::try_from(value)
            .map(|v| v.to_be_bytes().to_vec())
            .map_err(|_| out_of_range()),
        _ => u32::try_from(value)
            .map(|v| v.to_be_bytes().to_vec())
            .map_err(|_| out_of_range()),
    }
}

/// Folds up to the first four bytes into a big-endian list index.
pub fn list_index(input: &[u8]) -> u32 {
    input
        .iter()
        .take(4)
        .fold(0u32, |acc, b| (acc << 8) | *b as u32)
}

fn scale(raw: i64, factor: u32) -> Value {
    if factor <= 1 {
        Value::Integer(raw)
    } else {
        Value::Decimal(raw as f64 / factor as f64)
    }
}

/// Converts a numeric value to the raw integer sent on the wire.
fn unscale(value: &Value, factor: u32, datatype: &DataType) -> Result<i64, DatatypeError> {
    match value {
        Value::Integer(v) => v
            .checked_mul(factor.max(1) as i64)
            .ok_or_else(|| DatatypeError::OutOfRange {
                value: v.to_string(),
                bits: 64,
            }),
        Value::Decimal(v) => {
            let raw = (v * factor.max(1) as f64).round();
            if !raw.is_finite() || raw < i64::MIN as f64 || raw > i64::MAX as f64 {
                return Err(DatatypeError::OutOfRange {
                    value: v.to_string(),
                    bits: 64,
                });
            }
            Ok(raw as i64)
        }
        other => Err(DatatypeError::Incompatible {
            value: other.to_string(),
            datatype: datatype.to_string(),
        }),
    }
}

impl DataType {
    /// Checks widths and factors of a declared type.
    pub fn validate(&self) -> Result<(), DatatypeError> {
        match self {
            DataType::Signed { bits, factor } | DataType::Unsigned { bits, factor } => {
                check_width(*bits)?;
                if *factor == 0 {
                    return Err(DatatypeError::UnsupportedFactor(*factor));
                }
                Ok(())
            }
            DataType::List { bits, .. } => check_width(*bits).map(|_| ()),
            DataType::String => Ok(()),
        }
    }

    /// Decodes value bytes with this type.
    ///
    /// Only integer types can fail, when fewer bytes than their width are present.
    pub fn decode(&self, input: &[u8]) -> Result<Value, DatatypeError> {
        match self {
            DataType::Signed { bits, factor } => {
                decode_signed(input, *bits).map(|raw| scale(raw, *factor))
            }
            DataType::Unsigned { bits, factor } => {
                decode_unsigned(input, *bits).map(|raw| scale(raw as i64, *factor))
            }
            DataType::List { bits, states } => {
                let width = check_width(*bits)?;
                let index = list_index(&input[..input.len().min(width)]);
                Ok(states
                    .iter()
                    .find(|s| s.value == index)
                    .map(|s| Value::State(s.label.clone()))
                    .unwrap_or(Value::Unrecognized(index)))
            }
            DataType::String => match std::str::from_utf8(input) {
                Ok(s) => Ok(Value::Text(s.trim_end_matches('\0').to_string())),
                Err(e) => {
                    log::debug!("Text value is not valid UTF-8 ({e}), keeping raw bytes");
                    Ok(Value::Raw(input.to_vec()))
                }
            },
        }
    }

    /// Encodes a value with this type.
    ///
    /// Values outside of the representable range are rejected, never truncated.
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>, DatatypeError> {
        match self {
            DataType::Signed { bits, factor } => encode_signed(unscale(value, *factor, self)?, *bits),
            DataType::Unsigned { bits, factor } => {
                let raw = unscale(value, *factor, self)?;
                let raw = u64::try_from(raw).map_err(|_| DatatypeError::OutOfRange {
                    value: raw.to_string(),
                    bits: *bits,
                })?;
                encode_unsigned(raw, *bits)
            }
            DataType::List { bits, states } => {
                let index = match value {
                    Value::Integer(v) => u64::try_from(*v).map_err(|_| DatatypeError::OutOfRange {
                        value: v.to_string(),
                        bits: *bits,
                    })?,
                    Value::Unrecognized(v) => *v as u64,
                    Value::State(label) | Value::Text(label) => states
                        .iter()
                        .find(|s| s.label == *label)
                        .map(|s| s.value as u64)
                        .ok_or_else(|| DatatypeError::UnknownState(label.clone()))?,
                    other => {
                        return Err(DatatypeError::Incompatible {
                            value: other.to_string(),
                            datatype: self.to_string(),
                        })
                    }
                };
                encode_unsigned(index, *bits)
            }
            DataType::String => match value {
                Value::Text(s) | Value::State(s) => Ok(s.as_bytes().to_vec()),
                Value::Raw(bytes) => Ok(bytes.clone()),
                other => Err(DatatypeError::Incompatible {
                    value: other.to_string(),
                    datatype: self.to_string(),
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn heating_mode() -> DataType {
        DataType::List {
            bits: 8,
            states: vec![
                ListState { value: 0, label: "standby".into() },
                ListState { value: 1, label: "week1".into() },
                ListState { value: 4, label: "constant".into() },
            ],
        }
    }

    #[test]
    fn test_decode_signed_widths() {
        assert_eq!(decode_signed(&[0xFF], 8).unwrap(), -1);
        assert_eq!(decode_signed(&[0x00, 0xD7], 16).unwrap(), 215);
        assert_eq!(decode_signed(&[0xFF, 0x38], 16).unwrap(), -200);
        assert_eq!(decode_signed(&[0x80, 0x00, 0x00, 0x00], 32).unwrap(), i32::MIN as i64);
    }

    #[test]
    fn test_decode_unsigned_ignores_trailing_bytes() {
        assert_eq!(decode_unsigned(&[0x2A, 0x01, 0x02], 8).unwrap(), 42);
        assert_eq!(decode_unsigned(&[0xFF, 0xFF], 16).unwrap(), 65535);
    }

    #[test]
    fn test_decode_too_short() {
        assert_eq!(
            decode_unsigned(&[0x01], 16),
            Err(DatatypeError::TooShort { expected: 2, actual: 1 })
        );
        assert!(matches!(
            DataType::Signed { bits: 32, factor: 1 }.decode(&[0, 0]),
            Err(DatatypeError::TooShort { .. })
        ));
    }

    #[test]
    fn test_unsupported_width() {
        assert_eq!(decode_signed(&[0; 8], 64), Err(DatatypeError::UnsupportedWidth(64)));
        assert!(DataType::Unsigned { bits: 12, factor: 1 }.validate().is_err());
        assert!(DataType::Unsigned { bits: 16, factor: 0 }.validate().is_err());
        assert!(heating_mode().validate().is_ok());
    }

    #[test]
    fn test_factor_scaling() {
        let temp = DataType::Signed { bits: 16, factor: 10 };
        assert_eq!(temp.decode(&[0x00, 0xD7]).unwrap(), Value::Decimal(21.5));
        assert_eq!(temp.encode(&Value::Decimal(21.5)).unwrap(), vec![0x00, 0xD7]);
        assert_eq!(temp.encode(&Value::Integer(-20)).unwrap(), vec![0xFF, 0x38]);
    }

    #[test]
    fn test_list_decode_and_encode() {
        let mode = heating_mode();
        assert_eq!(mode.decode(&[0x04]).unwrap(), Value::State("constant".into()));
        assert_eq!(mode.decode(&[0x09]).unwrap(), Value::Unrecognized(9));
        assert_eq!(mode.decode(&[]).unwrap(), Value::State("standby".into()));
        // trailing bytes past the declared width are not part of the index
        assert_eq!(
            mode.decode(&[0x04, 0xAA, 0xBB]).unwrap(),
            Value::State("constant".into())
        );
        assert_eq!(mode.encode(&Value::Text("week1".into())).unwrap(), vec![0x01]);
        assert_eq!(mode.encode(&Value::Integer(4)).unwrap(), vec![0x04]);
        assert_eq!(
            mode.encode(&Value::Text("holiday".into())),
            Err(DatatypeError::UnknownState("holiday".into()))
        );
    }

    #[test]
    fn test_text_decode_degrades_to_raw() {
        assert_eq!(
            DataType::String.decode(b"WP\0\0").unwrap(),
            Value::Text("WP".into())
        );
        assert_eq!(
            DataType::String.decode(&[0xC3, 0x28]).unwrap(),
            Value::Raw(vec![0xC3, 0x28])
        );
    }

    #[test]
    fn test_encode_out_of_range_is_rejected() {
        assert!(matches!(
            encode_unsigned(256, 8),
            Err(DatatypeError::OutOfRange { bits: 8, .. })
        ));
        assert!(matches!(
            encode_signed(-129, 8),
            Err(DatatypeError::OutOfRange { .. })
        ));
        assert!(DataType::Unsigned { bits: 8, factor: 1 }
            .encode(&Value::Integer(-1))
            .is_err());
        assert!(DataType::Unsigned { bits: 8, factor: 1 }
            .encode(&Value::Text("x".into()))
            .is_err());
    }

    #[test]
    fn test_value_limits_view() {
        assert_eq!(Value::Integer(3).as_f64(), Some(3.0));
        assert_eq!(Value::Decimal(1.5).as_f64(), Some(1.5));
        assert_eq!(Value::State("on".into()).as_f64(), None);
    }

    proptest! {
        #[test]
        fn prop_signed_round_trip_8(v in i8::MIN..=i8::MAX) {
            let bytes = encode_signed(v as i64, 8).unwrap();
            prop_assert_eq!(decode_signed(&bytes, 8).unwrap(), v as i64);
        }

        #[test]
        fn prop_signed_round_trip_16(v in i16::MIN..=i16::MAX) {
            let bytes = encode_signed(v as i64, 16).unwrap();
            prop_assert_eq!(decode_signed(&bytes, 16).unwrap(), v as i64);
        }

        #[test]
        fn prop_signed_round_trip_32(v in i32::MIN..=i32::MAX) {
            let bytes = encode_signed(v as i64, 32).unwrap();
            prop_assert_eq!(decode_signed(&bytes, 32).unwrap(), v as i64);
        }

        #[test]
        fn prop_unsigned_round_trip_8(v in 0u64..=u8::MAX as u64) {
            let bytes = encode_unsigned(v, 8).unwrap();
            prop_assert_eq!(decode_unsigned(&bytes, 8).unwrap(), v);
        }

        #[test]
        fn prop_unsigned_round_trip_16(v in 0u64..=u16::MAX as u64) {
            let bytes = encode_unsigned(v, 16).unwrap();
            prop_assert_eq!(decode_unsigned(&bytes, 16).unwrap(), v);
        }

        #[test]
        fn prop_unsigned_round_trip_32(v in 0u64..=u32::MAX as u64) {
            let bytes = encode_unsigned(v, 32).unwrap();
            prop_assert_eq!(decode_unsigned(&bytes, 32).unwrap(), v);
        }

        #[test]
        fn prop_list_decode_never_fails(bytes in proptest::collection::vec(any::<u8>(), 0..8)) {
            prop_assert!(heating_mode().decode(&bytes).is_ok());
        }
    }
}
