//! Response parameters
//!
//! A [`Parameter`] is one named field inside a positive response. The
//! descriptor that owns it asks it how many bytes it occupies, hands it
//! exactly those bytes, and later asks it to decode them.
//!
//! [`CodedParameter`] covers the common coded types found in diagnostic
//! data dictionaries: fixed length, leading length info, and min/max length
//! with a termination character.

use std::fmt;

use serde_json::{json, Value};

use super::UdsError;

/// One named field of a positive response
pub trait Parameter: Send + Sync + fmt::Debug {
    /// Output key; unique within a descriptor
    fn short_name(&self) -> &str;

    /// Number of bytes this parameter occupies at the start of `remaining`
    ///
    /// May inspect the parameter's own bytes (length prefixes,
    /// terminators) but never bytes that belong to later parameters.
    fn calculate_length(&self, remaining: &[u8]) -> Result<usize, UdsError>;

    /// Store the bytes assigned by the last successful parse
    fn set_data(&mut self, data: Vec<u8>);

    /// Bytes assigned by the last successful parse
    fn data(&self) -> Option<&[u8]>;

    /// Decode the assigned bytes
    fn decode(&self) -> Result<Value, UdsError>;
}

/// Base data type of a coded parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// Big-endian unsigned integer, up to 8 bytes
    Unsigned,
    /// Big-endian two's complement integer, up to 8 bytes
    Signed,
    /// IEEE 754 single precision, big-endian
    Float32,
    /// ASCII text
    AsciiString,
    /// Raw bytes, rendered as hex
    ByteField,
}

/// Terminator for min/max length fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Field ends with a 0x00 byte
    Zero,
    /// Field ends with a 0xFF byte
    HexFf,
    /// Field runs to the end of the response (or `max`)
    EndOfPdu,
}

impl Termination {
    fn byte(&self) -> Option<u8> {
        match self {
            Termination::Zero => Some(0x00),
            Termination::HexFf => Some(0xFF),
            Termination::EndOfPdu => None,
        }
    }
}

/// How a coded parameter's length is determined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthEncoding {
    /// Fixed number of bytes (may be zero)
    Standard { byte_length: usize },
    /// A big-endian length prefix of `length_bytes` bytes precedes the data
    LeadingLength { length_bytes: usize },
    /// Between `min` and `max` bytes, ended by `termination`
    MinMax {
        min: usize,
        max: Option<usize>,
        termination: Termination,
    },
}

/// Parameter described by a data type and a length encoding
#[derive(Debug, Clone)]
pub struct CodedParameter {
    short_name: String,
    data_type: DataType,
    encoding: LengthEncoding,
    scale: f64,
    offset: f64,
    data: Option<Vec<u8>>,
}

impl CodedParameter {
    pub fn new(short_name: impl Into<String>, data_type: DataType, encoding: LengthEncoding) -> Self {
        Self {
            short_name: short_name.into(),
            data_type,
            encoding,
            scale: 1.0,
            offset: 0.0,
            data: None,
        }
    }

    /// Fixed-length big-endian unsigned integer
    pub fn unsigned(short_name: impl Into<String>, byte_length: usize) -> Self {
        Self::new(
            short_name,
            DataType::Unsigned,
            LengthEncoding::Standard { byte_length },
        )
    }

    /// Fixed-length ASCII string
    pub fn ascii(short_name: impl Into<String>, byte_length: usize) -> Self {
        Self::new(
            short_name,
            DataType::AsciiString,
            LengthEncoding::Standard { byte_length },
        )
    }

    /// Fixed-length byte field
    pub fn bytes(short_name: impl Into<String>, byte_length: usize) -> Self {
        Self::new(
            short_name,
            DataType::ByteField,
            LengthEncoding::Standard { byte_length },
        )
    }

    /// Linear conversion: physical = raw * scale + offset
    pub fn with_linear(mut self, scale: f64, offset: f64) -> Self {
        self.scale = scale;
        self.offset = offset;
        self
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn encoding(&self) -> LengthEncoding {
        self.encoding
    }

    /// The value bytes, without length prefix or terminator
    fn payload<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        match self.encoding {
            LengthEncoding::Standard { .. } => data,
            LengthEncoding::LeadingLength { length_bytes } => &data[length_bytes.min(data.len())..],
            LengthEncoding::MinMax { termination, .. } => match (termination.byte(), data.split_last()) {
                (Some(term), Some((last, rest))) if *last == term => rest,
                _ => data,
            },
        }
    }

    fn malformed(&self, detail: impl fmt::Display) -> UdsError {
        UdsError::MalformedResponse(format!("parameter '{}': {}", self.short_name, detail))
    }

    fn physical(&self, raw: f64) -> Value {
        if self.scale == 1.0 && self.offset == 0.0 {
            return json!(raw);
        }
        let value = raw * self.scale + self.offset;
        let factor = 10_f64.powi(decimals_for_scale(self.scale) as i32);
        json!((value * factor).round() / factor)
    }
}

impl Parameter for CodedParameter {
    fn short_name(&self) -> &str {
        &self.short_name
    }

    fn calculate_length(&self, remaining: &[u8]) -> Result<usize, UdsError> {
        match self.encoding {
            LengthEncoding::Standard { byte_length } => Ok(byte_length),
            LengthEncoding::LeadingLength { length_bytes } => {
                if remaining.len() < length_bytes {
                    return Err(self.malformed(format!(
                        "length prefix needs {} bytes, {} remain",
                        length_bytes,
                        remaining.len()
                    )));
                }
                let length = be_uint(&remaining[..length_bytes])
                    .ok_or_else(|| self.malformed("length prefix wider than 8 bytes"))?;
                usize::try_from(length)
                    .ok()
                    .and_then(|length| length_bytes.checked_add(length))
                    .ok_or_else(|| {
                        self.malformed(format!("length prefix 0x{:X} out of range", length))
                    })
            }
            LengthEncoding::MinMax {
                min,
                max,
                termination,
            } => {
                if let Some(max) = max.filter(|max| *max < min) {
                    return Err(self.malformed(format!(
                        "maximum length {} is below minimum {}",
                        max, min
                    )));
                }
                if remaining.len() < min {
                    return Err(self.malformed(format!(
                        "needs at least {} bytes, {} remain",
                        min,
                        remaining.len()
                    )));
                }
                let limit = max.map_or(remaining.len(), |max| max.min(remaining.len()));
                let terminated = termination.byte().and_then(|term| {
                    remaining[min..limit]
                        .iter()
                        .position(|b| *b == term)
                        .map(|pos| min + pos + 1)
                });
                Ok(terminated.unwrap_or(limit))
            }
        }
    }

    fn set_data(&mut self, data: Vec<u8>) {
        self.data = Some(data);
    }

    fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    fn decode(&self) -> Result<Value, UdsError> {
        let data = self
            .data
            .as_deref()
            .ok_or_else(|| self.malformed("no data to decode; parse a response first"))?;
        let payload = self.payload(data);

        match self.data_type {
            DataType::AsciiString => Ok(json!(String::from_utf8_lossy(payload))),
            DataType::ByteField => Ok(json!(hex::encode(payload))),
            _ if payload.is_empty() => Ok(Value::Null),
            DataType::Unsigned => {
                let raw = be_uint(payload).ok_or_else(|| self.malformed("integer wider than 8 bytes"))?;
                if self.scale == 1.0 && self.offset == 0.0 {
                    Ok(json!(raw))
                } else {
                    Ok(self.physical(raw as f64))
                }
            }
            DataType::Signed => {
                let raw = be_uint(payload).ok_or_else(|| self.malformed("integer wider than 8 bytes"))?;
                let shift = 64 - 8 * payload.len() as u32;
                let signed = ((raw << shift) as i64) >> shift;
                if self.scale == 1.0 && self.offset == 0.0 {
                    Ok(json!(signed))
                } else {
                    Ok(self.physical(signed as f64))
                }
            }
            DataType::Float32 => {
                let bytes: [u8; 4] = payload
                    .try_into()
                    .map_err(|_| self.malformed(format!("float32 needs 4 bytes, got {}", payload.len())))?;
                Ok(self.physical(f32::from_be_bytes(bytes) as f64))
            }
        }
    }
}

/// Big-endian unsigned integer from up to 8 bytes
pub(crate) fn be_uint(bytes: &[u8]) -> Option<u64> {
    if bytes.len() > 8 {
        return None;
    }
    Some(bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64))
}

/// Decimal places needed to represent multiples of `scale`
fn decimals_for_scale(scale: f64) -> u32 {
    let mut temp = scale.abs();
    if temp == 0.0 || temp >= 1.0 {
        return 0;
    }
    let mut decimals = 0;
    while decimals < 6 && (temp - temp.round()).abs() >= 1e-9 {
        temp *= 10.0;
        decimals += 1;
    }
    decimals
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(mut param: CodedParameter, bytes: &[u8]) -> CodedParameter {
        let len = param.calculate_length(bytes).unwrap();
        param.set_data(bytes[..len].to_vec());
        param
    }

    #[test]
    fn test_unsigned_big_endian() {
        let param = parsed(CodedParameter::unsigned("value", 2), &[0x00, 0x2A, 0xFF]);
        assert_eq!(param.decode().unwrap(), json!(42));
    }

    #[test]
    fn test_signed_sign_extension() {
        let param = parsed(
            CodedParameter::new(
                "temp",
                DataType::Signed,
                LengthEncoding::Standard { byte_length: 1 },
            ),
            &[0xF6],
        );
        assert_eq!(param.decode().unwrap(), json!(-10));
    }

    #[test]
    fn test_linear_scaling_is_rounded() {
        // rpm = raw * 0.25
        let param = parsed(
            CodedParameter::unsigned("rpm", 2).with_linear(0.25, 0.0),
            &[0x0B, 0xB8],
        );
        assert_eq!(param.decode().unwrap(), json!(750.0));

        // coolant = raw - 40
        let param = parsed(
            CodedParameter::unsigned("coolant", 1).with_linear(1.0, -40.0),
            &[0x5A],
        );
        assert_eq!(param.decode().unwrap(), json!(50.0));
    }

    #[test]
    fn test_float32() {
        let param = parsed(
            CodedParameter::new(
                "voltage",
                DataType::Float32,
                LengthEncoding::Standard { byte_length: 4 },
            ),
            &12.5f32.to_be_bytes(),
        );
        assert_eq!(param.decode().unwrap(), json!(12.5));
    }

    #[test]
    fn test_leading_length_info() {
        let param = CodedParameter::new(
            "name",
            DataType::AsciiString,
            LengthEncoding::LeadingLength { length_bytes: 1 },
        );
        let bytes = [0x03, b'E', b'C', b'U', 0x99];
        assert_eq!(param.calculate_length(&bytes).unwrap(), 4);

        let param = parsed(param, &bytes);
        assert_eq!(param.decode().unwrap(), json!("ECU"));
    }

    #[test]
    fn test_leading_length_prefix_truncated() {
        let param = CodedParameter::new(
            "blob",
            DataType::ByteField,
            LengthEncoding::LeadingLength { length_bytes: 2 },
        );
        assert!(matches!(
            param.calculate_length(&[0x00]),
            Err(UdsError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_leading_length_prefix_too_large() {
        let param = CodedParameter::new(
            "blob",
            DataType::ByteField,
            LengthEncoding::LeadingLength { length_bytes: 8 },
        );
        let mut bytes = vec![0xFF; 8];
        bytes.extend_from_slice(&[0xAA; 4]);

        let err = param.calculate_length(&bytes).unwrap_err();

        assert!(matches!(err, UdsError::MalformedResponse(msg) if msg.contains("out of range")));
    }

    #[test]
    fn test_min_max_rejects_max_below_min() {
        let param = CodedParameter::new(
            "label",
            DataType::AsciiString,
            LengthEncoding::MinMax {
                min: 3,
                max: Some(2),
                termination: Termination::Zero,
            },
        );

        let err = param.calculate_length(&[b'a', b'b', b'c', 0x00]).unwrap_err();

        assert!(matches!(err, UdsError::MalformedResponse(msg) if msg.contains("below minimum")));
    }

    #[test]
    fn test_min_max_zero_terminated() {
        let param = CodedParameter::new(
            "part",
            DataType::AsciiString,
            LengthEncoding::MinMax {
                min: 1,
                max: Some(16),
                termination: Termination::Zero,
            },
        );
        let bytes = [b'A', b'B', 0x00, b'Z'];
        assert_eq!(param.calculate_length(&bytes).unwrap(), 3);
        assert_eq!(parsed(param, &bytes).decode().unwrap(), json!("AB"));
    }

    #[test]
    fn test_min_max_stops_at_max_or_end() {
        let bounded = CodedParameter::new(
            "code",
            DataType::ByteField,
            LengthEncoding::MinMax {
                min: 0,
                max: Some(2),
                termination: Termination::HexFf,
            },
        );
        assert_eq!(bounded.calculate_length(&[0x01, 0x02, 0x03]).unwrap(), 2);

        let rest = CodedParameter::new(
            "tail",
            DataType::ByteField,
            LengthEncoding::MinMax {
                min: 0,
                max: None,
                termination: Termination::EndOfPdu,
            },
        );
        assert_eq!(rest.calculate_length(&[0x01, 0x02, 0x03]).unwrap(), 3);
        assert_eq!(rest.calculate_length(&[]).unwrap(), 0);
    }

    #[test]
    fn test_zero_length_decodes_to_null() {
        let param = parsed(CodedParameter::unsigned("flag", 0), &[0x01]);
        assert_eq!(param.data(), Some(&[][..]));
        assert_eq!(param.decode().unwrap(), Value::Null);
    }

    #[test]
    fn test_decode_without_data_fails() {
        let param = CodedParameter::bytes("raw", 2);
        assert!(matches!(
            param.decode(),
            Err(UdsError::MalformedResponse(msg)) if msg.contains("raw")
        ));
    }
}
