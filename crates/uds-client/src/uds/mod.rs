//! UDS (Unified Diagnostic Services) protocol implementation
//!
//! This module provides the UDS protocol layer for communicating with ECUs:
//! the request/response engine, positive response decoding and the
//! services used for flashing.

mod engine;
mod error;
mod nrc;
pub mod param;
pub mod response;
mod services;

pub use engine::{
    answers_request, is_response_pending, EngineTiming, LastSendHook, ReceiveFn,
    TransactionEngine, TransmitFn,
};
pub use error::UdsError;
pub use nrc::NegativeResponseCode;
pub use param::{CodedParameter, DataType, LengthEncoding, Parameter, Termination};
pub use response::{decode_read_data_by_identifier, PositiveResponseDescriptor};
pub use services::UdsService;

/// Standard UDS service ID constants
pub mod service_id {
    pub const READ_DATA_BY_ID: u8 = 0x22;
    pub const REQUEST_DOWNLOAD: u8 = 0x34;
    pub const TRANSFER_DATA: u8 = 0x36;
    pub const REQUEST_TRANSFER_EXIT: u8 = 0x37;
    pub const TESTER_PRESENT: u8 = 0x3E;
    pub const NEGATIVE_RESPONSE: u8 = 0x7F;

    /// Positive responses echo the request SID with bit 6 set
    pub const POSITIVE_RESPONSE_OFFSET: u8 = 0x40;
}

/// TesterPresent (0x3E) sub-functions
pub mod tester_present_sub_function {
    pub const ZERO_SUB_FUNCTION: u8 = 0x00;
    /// suppressPosRspMsgIndicationBit set
    pub const SUPPRESS_POSITIVE_RESPONSE: u8 = 0x80;
}

/// RequestDownload dataFormatIdentifier (ISO 14229-1 10.14)
///
/// High nibble selects the compression method, low nibble the
/// encryption method; `0x00` means neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataFormatIdentifier(pub u8);

impl DataFormatIdentifier {
    pub const NO_COMPRESSION_NO_ENCRYPTION: Self = Self(0x00);

    pub fn new(compression: u8, encryption: u8) -> Self {
        Self(((compression & 0x0F) << 4) | (encryption & 0x0F))
    }

    pub fn compression(&self) -> u8 {
        self.0 >> 4
    }

    pub fn encryption(&self) -> u8 {
        self.0 & 0x0F
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_format_identifier_nibbles() {
        let dfi = DataFormatIdentifier::new(0x1, 0x2);
        assert_eq!(dfi.0, 0x12);
        assert_eq!(dfi.compression(), 0x1);
        assert_eq!(dfi.encryption(), 0x2);
        assert_eq!(DataFormatIdentifier::default(), DataFormatIdentifier::NO_COMPRESSION_NO_ENCRYPTION);
    }
}
