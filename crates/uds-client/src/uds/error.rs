//! UDS protocol errors

use std::time::Duration;

use thiserror::Error;

use super::NegativeResponseCode;
use crate::transport::TransportError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum UdsError {
    #[error("Negative response: {nrc} (0x{nrc:02X}) for service 0x{service_id:02X}")]
    NegativeResponse {
        service_id: u8,
        nrc: NegativeResponseCode,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Response timeout")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),

    /// Only response-pending frames arrived before the patience ceiling
    #[error("Gave up after {pending} response-pending frames in {elapsed:?}")]
    ResponsePendingTimeout { pending: u32, elapsed: Duration },

    #[error("Expected SID 0x{expected:X} but response carries 0x{actual:X}")]
    SidMismatch { expected: u32, actual: u32 },

    #[error("Expected DID 0x{expected:X} but response carries 0x{actual:X}")]
    DidMismatch { expected: u32, actual: u32 },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("No response descriptor registered for DID 0x{0:04X}")]
    UnknownDid(u16),
}

impl From<TransportError> for UdsError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(_) => UdsError::Timeout,
            other => UdsError::Transport(other.to_string()),
        }
    }
}
