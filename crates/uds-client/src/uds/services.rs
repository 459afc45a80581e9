//! UDS service layer used by the client and the transfer workflow

use std::sync::Arc;

use super::{
    service_id, tester_present_sub_function, DataFormatIdentifier, NegativeResponseCode,
    TransactionEngine, UdsError,
};

/// Typed wrappers for the services this crate drives
#[derive(Clone)]
pub struct UdsService {
    engine: Arc<TransactionEngine>,
}

impl UdsService {
    pub fn new(engine: Arc<TransactionEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<TransactionEngine> {
        &self.engine
    }

    /// Send a physical request and reject terminal negative responses
    async fn send_request(&self, request: &[u8]) -> Result<Vec<u8>, UdsError> {
        let response = self.engine.request(request).await?;
        check_response(request[0], response)
    }

    /// Tester Present (0x3E)
    pub async fn tester_present(&self, suppress_response: bool) -> Result<(), UdsError> {
        let sub_function = if suppress_response {
            tester_present_sub_function::SUPPRESS_POSITIVE_RESPONSE
        } else {
            tester_present_sub_function::ZERO_SUB_FUNCTION
        };
        let request = [service_id::TESTER_PRESENT, sub_function];

        if suppress_response {
            self.engine
                .send(&request, false, false, self.engine.timing().tp_wait)
                .await?;
        } else {
            self.send_request(&request).await?;
        }
        Ok(())
    }

    /// Read Data By Identifier (0x22)
    ///
    /// Returns the whole positive response, SID included, for descriptor
    /// decoding.
    pub async fn read_data_by_id(&self, dids: &[u16]) -> Result<Vec<u8>, UdsError> {
        let mut request = Vec::with_capacity(1 + dids.len() * 2);
        request.push(service_id::READ_DATA_BY_ID);
        for did in dids {
            request.extend_from_slice(&did.to_be_bytes());
        }
        self.send_request(&request).await
    }

    /// Request Download (0x34) - Initiate download session
    ///
    /// `addr_len_format` high nibble is the byte width of `memory_size`, low
    /// nibble the width of `memory_address`. Returns the usable payload per
    /// TransferData request (maxNumberOfBlockLength minus SID and counter).
    pub async fn request_download(
        &self,
        data_format: DataFormatIdentifier,
        addr_len_format: u8,
        memory_address: u32,
        memory_size: u32,
    ) -> Result<u32, UdsError> {
        let size_width = (addr_len_format >> 4) as usize;
        let address_width = (addr_len_format & 0x0F) as usize;

        let mut request = vec![service_id::REQUEST_DOWNLOAD, data_format.0, addr_len_format];
        request.extend_from_slice(&be_field(memory_address, address_width)?);
        request.extend_from_slice(&be_field(memory_size, size_width)?);

        let response = self.send_request(&request).await?;

        if response.len() < 2 {
            return Err(UdsError::InvalidResponse(
                "RequestDownload response too short".to_string(),
            ));
        }

        let length_format = response[1];
        let num_bytes = (length_format >> 4) as usize;

        if num_bytes > 4 || response.len() < 2 + num_bytes {
            return Err(UdsError::InvalidResponse(
                "RequestDownload response missing maxBlockLength".to_string(),
            ));
        }

        let max_block_length = response[2..2 + num_bytes]
            .iter()
            .fold(0u32, |acc, b| (acc << 8) | *b as u32);

        Ok(max_block_length.saturating_sub(2))
    }

    /// Transfer Data (0x36) - Transfer data block
    ///
    /// The response must echo the block sequence counter.
    pub async fn transfer_data(&self, block_counter: u8, data: &[u8]) -> Result<(), UdsError> {
        let mut request = Vec::with_capacity(2 + data.len());
        request.push(service_id::TRANSFER_DATA);
        request.push(block_counter);
        request.extend_from_slice(data);

        let response = self.send_request(&request).await?;

        match response.get(1) {
            Some(echo) if *echo == block_counter => Ok(()),
            Some(echo) => Err(UdsError::InvalidResponse(format!(
                "TransferData echoed block counter 0x{:02X}, expected 0x{:02X}",
                echo, block_counter
            ))),
            None => Err(UdsError::InvalidResponse(
                "TransferData response too short".to_string(),
            )),
        }
    }

    /// Request Transfer Exit (0x37) - Complete transfer session
    ///
    /// Returns the transferResponseParameterRecord.
    pub async fn request_transfer_exit(&self, params: &[u8]) -> Result<Vec<u8>, UdsError> {
        let mut request = vec![service_id::REQUEST_TRANSFER_EXIT];
        request.extend_from_slice(params);

        let response = self.send_request(&request).await?;
        Ok(response[1..].to_vec())
    }
}

/// Turn a final frame into the positive response or a typed error
pub(crate) fn check_response(request_sid: u8, response: Vec<u8>) -> Result<Vec<u8>, UdsError> {
    match response.first() {
        None => Err(UdsError::InvalidResponse("Empty response".to_string())),
        Some(&service_id::NEGATIVE_RESPONSE) => {
            if response.len() < 3 {
                return Err(UdsError::InvalidResponse(
                    "Negative response too short".to_string(),
                ));
            }
            Err(UdsError::NegativeResponse {
                service_id: response[1],
                nrc: NegativeResponseCode::from(response[2]),
            })
        }
        Some(&sid) if sid == request_sid.wrapping_add(service_id::POSITIVE_RESPONSE_OFFSET) => {
            Ok(response)
        }
        Some(&sid) => Err(UdsError::InvalidResponse(format!(
            "Unexpected response SID 0x{:02X} to request 0x{:02X}",
            sid, request_sid
        ))),
    }
}

fn be_field(value: u32, width: usize) -> Result<Vec<u8>, UdsError> {
    if width == 0 || width > 4 {
        return Err(UdsError::InvalidResponse(format!(
            "Unsupported addressAndLengthFormatIdentifier field width {}",
            width
        )));
    }
    if width < 4 && value >> (8 * width) != 0 {
        return Err(UdsError::InvalidResponse(format!(
            "Value 0x{:X} does not fit in {} bytes",
            value, width
        )));
    }
    Ok(value.to_be_bytes()[4 - width..].to_vec())
}
