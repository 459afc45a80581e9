//! Positive response decoding for DID-style services
//!
//! A [`PositiveResponseDescriptor`] knows the SID and DID a response block
//! must carry and the ordered parameters that follow the DID. Several DID
//! blocks may be concatenated in one response; callers slide a window
//! forward by the length each descriptor consumed.

use serde_json::{Map, Value};
use tracing::trace;

use super::param::{be_uint, Parameter};
use super::UdsError;

/// Expected identifiers and ordered parameters of one DID block
#[derive(Debug)]
pub struct PositiveResponseDescriptor {
    params: Vec<Box<dyn Parameter>>,
    did_length: usize,
    did: u32,
    sid_length: usize,
    sid: u32,
}

impl PositiveResponseDescriptor {
    pub fn new(
        params: Vec<Box<dyn Parameter>>,
        did_length: usize,
        did: u32,
        sid_length: usize,
        sid: u32,
    ) -> Self {
        Self {
            params,
            did_length,
            did,
            sid_length,
            sid,
        }
    }

    /// Descriptor for a ReadDataByIdentifier (0x62) block with a 2-byte DID
    pub fn read_data_by_identifier(did: u16, params: Vec<Box<dyn Parameter>>) -> Self {
        Self::new(params, 2, did as u32, 1, 0x62)
    }

    pub fn did(&self) -> u32 {
        self.did
    }

    pub fn sid(&self) -> u32 {
        self.sid
    }

    pub fn did_length(&self) -> usize {
        self.did_length
    }

    pub fn sid_length(&self) -> usize {
        self.sid_length
    }

    pub fn params(&self) -> &[Box<dyn Parameter>] {
        &self.params
    }

    /// Verify the leading `sid_length` bytes carry the expected SID
    pub fn check_sid_in_response(&self, response: &[u8]) -> Result<(), UdsError> {
        let actual = read_identifier(response, self.sid_length, "SID")?;
        if actual != self.sid {
            return Err(UdsError::SidMismatch {
                expected: self.sid,
                actual,
            });
        }
        Ok(())
    }

    /// Verify the leading `did_length` bytes of `tail` carry the expected DID
    pub fn check_did_in_response(&self, tail: &[u8]) -> Result<(), UdsError> {
        let actual = read_identifier(tail, self.did_length, "DID")?;
        if actual != self.did {
            return Err(UdsError::DidMismatch {
                expected: self.did,
                actual,
            });
        }
        Ok(())
    }

    /// Split the DID block at the start of `tail` across the parameters
    ///
    /// Returns the bytes consumed, DID field included. Parameter data is only
    /// replaced once every length resolved, so a failed parse leaves the
    /// previous data in place.
    pub fn parse_did_response_length(&mut self, tail: &[u8]) -> Result<usize, UdsError> {
        self.check_did_in_response(tail)?;

        let mut cursor = self.did_length;
        let mut spans = Vec::with_capacity(self.params.len());
        for param in &self.params {
            let remaining = &tail[cursor..];
            let length = param.calculate_length(remaining)?;
            if length > remaining.len() {
                return Err(UdsError::MalformedResponse(format!(
                    "parameter '{}' of DID 0x{:X} claims {} bytes, only {} remain",
                    param.short_name(),
                    self.did,
                    length,
                    remaining.len()
                )));
            }
            spans.push(cursor..cursor + length);
            cursor += length;
        }

        for (param, span) in self.params.iter_mut().zip(spans) {
            param.set_data(tail[span].to_vec());
        }

        trace!(did = self.did, consumed = cursor, "Parsed DID block");
        Ok(cursor)
    }

    /// Decode every parameter into a short name → value map
    pub fn decode(&self) -> Result<Map<String, Value>, UdsError> {
        self.params
            .iter()
            .map(|param| Ok((param.short_name().to_string(), param.decode()?)))
            .collect()
    }

    /// Parse the DID block at the start of `tail` and decode it
    pub fn parse_and_decode(&mut self, tail: &[u8]) -> Result<(usize, Map<String, Value>), UdsError> {
        let consumed = self.parse_did_response_length(tail)?;
        Ok((consumed, self.decode()?))
    }
}

/// Decode a response carrying one DID block per descriptor, in order
///
/// The SID is checked with the first descriptor. Bytes left over after the
/// last block make the response malformed.
pub fn decode_read_data_by_identifier(
    descriptors: &mut [PositiveResponseDescriptor],
    response: &[u8],
) -> Result<Vec<Map<String, Value>>, UdsError> {
    let Some(first) = descriptors.first() else {
        return Ok(Vec::new());
    };
    first.check_sid_in_response(response)?;
    let sid_length = first.sid_length;

    decode_did_blocks(response, sid_length, descriptors.len(), |index, tail| {
        descriptors[index].parse_and_decode(tail)
    })
}

/// Walk `blocks` concatenated DID blocks following the SID
///
/// `parse_block` is handed the block index and the unparsed tail and
/// returns the bytes it consumed with the decoded values.
pub(crate) fn decode_did_blocks<F>(
    response: &[u8],
    sid_length: usize,
    blocks: usize,
    mut parse_block: F,
) -> Result<Vec<Map<String, Value>>, UdsError>
where
    F: FnMut(usize, &[u8]) -> Result<(usize, Map<String, Value>), UdsError>,
{
    let mut cursor = sid_length;
    let mut decoded = Vec::with_capacity(blocks);
    for index in 0..blocks {
        let tail = response.get(cursor..).unwrap_or_default();
        let (consumed, values) = parse_block(index, tail)?;
        cursor += consumed;
        decoded.push(values);
    }

    if cursor != response.len() {
        return Err(UdsError::MalformedResponse(format!(
            "{} trailing bytes after last DID block",
            response.len().saturating_sub(cursor)
        )));
    }
    Ok(decoded)
}

fn read_identifier(bytes: &[u8], length: usize, what: &str) -> Result<u32, UdsError> {
    if bytes.len() < length {
        return Err(UdsError::MalformedResponse(format!(
            "{} field needs {} bytes, got {}",
            what,
            length,
            bytes.len()
        )));
    }
    be_uint(&bytes[..length])
        .and_then(|value| u32::try_from(value).ok())
        .ok_or_else(|| UdsError::MalformedResponse(format!("{} field wider than 4 bytes", what)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uds::param::CodedParameter;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn descriptor(did: u16, lengths: &[usize]) -> PositiveResponseDescriptor {
        let params = lengths
            .iter()
            .enumerate()
            .map(|(i, len)| Box::new(CodedParameter::bytes(format!("p{}", i), *len)) as Box<dyn Parameter>)
            .collect();
        PositiveResponseDescriptor::read_data_by_identifier(did, params)
    }

    fn data(descriptor: &PositiveResponseDescriptor) -> Vec<Option<Vec<u8>>> {
        descriptor
            .params()
            .iter()
            .map(|p| p.data().map(<[u8]>::to_vec))
            .collect()
    }

    #[test]
    fn test_parse_assigns_exact_slices() {
        let mut desc = descriptor(0xF187, &[2, 0, 3]);
        let tail = [0xF1, 0x87, 0xA1, 0xA2, 0xB1, 0xB2, 0xB3, 0xEE];

        let consumed = desc.parse_did_response_length(&tail).unwrap();

        assert_eq!(consumed, 2 + 5);
        assert_eq!(
            data(&desc),
            vec![
                Some(vec![0xA1, 0xA2]),
                Some(vec![]),
                Some(vec![0xB1, 0xB2, 0xB3]),
            ]
        );
    }

    #[test]
    fn test_did_mismatch_leaves_data_untouched() {
        let mut desc = descriptor(0xF187, &[1]);
        desc.parse_did_response_length(&[0xF1, 0x87, 0x11]).unwrap();

        let err = desc.parse_did_response_length(&[0xF1, 0x88, 0x22]).unwrap_err();

        assert_eq!(
            err,
            UdsError::DidMismatch {
                expected: 0xF187,
                actual: 0xF188
            }
        );
        assert_eq!(data(&desc), vec![Some(vec![0x11])]);
    }

    #[test]
    fn test_overrun_is_malformed_and_mutates_nothing() {
        let mut desc = descriptor(0x0100, &[1, 4]);

        let err = desc.parse_did_response_length(&[0x01, 0x00, 0xAA, 0xBB]).unwrap_err();

        assert!(matches!(err, UdsError::MalformedResponse(msg) if msg.contains("p1")));
        assert_eq!(data(&desc), vec![None, None]);
    }

    #[test]
    fn test_oversized_length_prefix_is_malformed() {
        use crate::uds::param::{DataType, LengthEncoding};

        let mut desc = PositiveResponseDescriptor::read_data_by_identifier(
            0x1234,
            vec![Box::new(CodedParameter::new(
                "blob",
                DataType::ByteField,
                LengthEncoding::LeadingLength { length_bytes: 8 },
            ))],
        );
        let mut tail = vec![0x12, 0x34];
        tail.extend_from_slice(&[0xFF; 8]);
        tail.extend_from_slice(&[0xAA; 4]);

        let err = desc.parse_did_response_length(&tail).unwrap_err();

        assert!(matches!(err, UdsError::MalformedResponse(_)));
        assert_eq!(data(&desc), vec![None]);
    }

    #[test]
    fn test_round_trip_decode() {
        let mut desc = PositiveResponseDescriptor::read_data_by_identifier(
            0x1234,
            vec![Box::new(CodedParameter::unsigned("value", 2))],
        );

        desc.parse_did_response_length(&[0x12, 0x34, 0x00, 0x2A]).unwrap();

        let mut expected = Map::new();
        expected.insert("value".to_string(), json!(42));
        assert_eq!(desc.decode().unwrap(), expected);
    }

    #[test]
    fn test_decode_before_parse_fails() {
        let desc = descriptor(0x1234, &[2]);
        assert!(matches!(desc.decode(), Err(UdsError::MalformedResponse(_))));
    }

    #[test]
    fn test_sid_check() {
        let desc = descriptor(0x1234, &[]);
        assert!(desc.check_sid_in_response(&[0x62, 0x12, 0x34]).is_ok());
        assert_eq!(
            desc.check_sid_in_response(&[0x6E, 0x12, 0x34]),
            Err(UdsError::SidMismatch {
                expected: 0x62,
                actual: 0x6E
            })
        );
        assert!(matches!(
            desc.check_sid_in_response(&[]),
            Err(UdsError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_multiple_did_blocks() {
        let mut descriptors = vec![
            PositiveResponseDescriptor::read_data_by_identifier(
                0xF190,
                vec![Box::new(CodedParameter::ascii("vin", 3))],
            ),
            PositiveResponseDescriptor::read_data_by_identifier(
                0x0101,
                vec![Box::new(CodedParameter::unsigned("rpm", 2).with_linear(0.25, 0.0))],
            ),
        ];
        let response = [0x62, 0xF1, 0x90, b'W', b'V', b'W', 0x01, 0x01, 0x0B, 0xB8];

        let decoded = decode_read_data_by_identifier(&mut descriptors, &response).unwrap();

        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0]["vin"], json!("WVW"));
        assert_eq!(decoded[1]["rpm"], json!(750.0));
    }

    #[test]
    fn test_trailing_bytes_are_malformed() {
        let mut descriptors = vec![descriptor(0x1234, &[1])];
        let err = decode_read_data_by_identifier(&mut descriptors, &[0x62, 0x12, 0x34, 0x01, 0x02])
            .unwrap_err();
        assert!(matches!(err, UdsError::MalformedResponse(msg) if msg.contains("trailing")));
    }
}
