//! uds-client - UDS (ISO 14229) diagnostic client over ISO-TP
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        UdsClient                            │
//! │                                                             │
//! │  ┌──────────────────┐  ┌──────────────┐  ┌───────────────┐  │
//! │  │ DID descriptors  │  │ IntelHexImage│  │  KeepAlive    │  │
//! │  │ (response decode)│  │ (download)   │  │ (3E 80 task)  │  │
//! │  └──────────────────┘  └──────────────┘  └───────────────┘  │
//! │                          │                                  │
//! │                    ┌─────┴─────┐                            │
//! │                    │UdsService │                            │
//! │                    └─────┬─────┘                            │
//! │                 ┌────────┴──────────┐                       │
//! │                 │ TransactionEngine │                       │
//! │                 │ (pending, busy)   │                       │
//! │                 └────────┬──────────┘                       │
//! │                 ┌────────┴────────┐                         │
//! │                 │TransportAdapter │                         │
//! │                 │(SocketCAN/mock) │                         │
//! │                 └─────────────────┘                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod keepalive;
pub mod transfer;
pub mod transport;
pub mod uds;

pub use client::UdsClient;
pub use config::{ConfigError, UdsConfig};
pub use error::ClientError;
pub use keepalive::KeepAlive;
pub use transfer::{IntelHexImage, TransferError};
pub use transport::{create_transport, TransportAdapter, TransportError};
pub use uds::{
    CodedParameter, DataFormatIdentifier, NegativeResponseCode, Parameter,
    PositiveResponseDescriptor, TransactionEngine, UdsError, UdsService,
};
