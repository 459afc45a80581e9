//! File download over RequestDownload / TransferData / RequestTransferExit

mod image;

pub use image::{IntelHexImage, DEFAULT_CHUNK_SIZE};

use std::path::Path;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::TransferConfig;
use crate::uds::{DataFormatIdentifier, UdsError, UdsService};

/// File extensions accepted by [`check_file_type`]
pub const SUPPORTED_EXTENSIONS: [&str; 2] = ["hex", "ihex"];

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransferError {
    #[error("File to transfer has not been recognised as a supported type {supported:?}: {path}")]
    UnsupportedFileType {
        path: String,
        supported: [&'static str; 2],
    },

    #[error("No file to transfer has been specified")]
    NoFileSpecified,

    #[error("Invalid Intel-HEX image: {0}")]
    Image(String),

    #[error("Failed to read {path}: {message}")]
    Io { path: String, message: String },

    #[error("Transfer chunk size must be greater than zero, got {0}")]
    InvalidChunkSize(usize),

    #[error(transparent)]
    Uds(#[from] UdsError),
}

/// Reject anything that is not an Intel-HEX file by extension
pub fn check_file_type(path: &Path) -> Result<(), TransferError> {
    let supported = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|s| ext.eq_ignore_ascii_case(s))
        });
    if supported {
        Ok(())
    } else {
        Err(TransferError::UnsupportedFileType {
            path: path.display().to_string(),
            supported: SUPPORTED_EXTENSIONS,
        })
    }
}

/// Block sequence counter following `current`
pub fn next_block_counter(current: u8, wrap_to: u8) -> u8 {
    if current == u8::MAX {
        wrap_to
    } else {
        current + 1
    }
}

/// Run the download triad for `image`
///
/// Returns the RequestTransferExit response parameter record.
pub async fn download_image(
    service: &UdsService,
    image: &IntelHexImage,
    data_format: DataFormatIdentifier,
    config: &TransferConfig,
) -> Result<Vec<u8>, TransferError> {
    info!(
        address = %format!("0x{:08X}", image.transmit_address()),
        length = image.transmit_length(),
        chunk_size = image.transmit_chunk_size(),
        "Starting download"
    );

    let max_payload = service
        .request_download(
            data_format,
            config.address_and_length_format,
            image.transmit_address(),
            image.transmit_length(),
        )
        .await?;
    if max_payload > 0 && image.transmit_chunk_size() > max_payload as usize {
        warn!(
            chunk_size = image.transmit_chunk_size(),
            max_payload, "Chunk size exceeds the ECU's maxNumberOfBlockLength"
        );
    }

    let mut counter = config.block_counter_start;
    let mut sent = 0usize;
    for chunk in image.chunks() {
        service.transfer_data(counter, chunk).await?;
        sent += chunk.len();
        debug!(
            block_counter = counter,
            sent,
            total = image.transmit_length(),
            "TransferData"
        );
        counter = next_block_counter(counter, config.block_counter_wrap);
    }

    let record = service.request_transfer_exit(&[]).await?;
    info!(bytes = sent, "Download complete");
    Ok(record)
}
