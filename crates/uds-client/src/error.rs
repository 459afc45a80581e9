//! Crate-level error

use thiserror::Error;

use crate::config::ConfigError;
use crate::transfer::TransferError;
use crate::transport::TransportError;
use crate::uds::UdsError;

/// Any failure surfaced by [`crate::UdsClient`] construction or use
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Uds(#[from] UdsError),

    #[error(transparent)]
    Transfer(#[from] TransferError),
}

impl ClientError {
    /// Negative response code, if the ECU rejected the request
    pub fn nrc(&self) -> Option<crate::uds::NegativeResponseCode> {
        match self {
            ClientError::Uds(UdsError::NegativeResponse { nrc, .. })
            | ClientError::Transfer(TransferError::Uds(UdsError::NegativeResponse { nrc, .. })) => {
                Some(*nrc)
            }
            _ => None,
        }
    }
}
