//! Transport layer for UDS communication
//!
//! This module provides transport adapters that move complete UDS messages
//! to and from an ECU:
//! - SocketCAN adapter for CAN/ISO-TP (Linux only)
//! - Mock adapter for testing and simulation
//!
//! # Example
//!
//! ```ignore
//! use uds_client::transport::{create_transport, TransportAdapter};
//! use uds_client::config::TransportConfig;
//!
//! let config = TransportConfig::Mock(Default::default());
//! let transport = create_transport(&config).await?;
//! transport.send(&[0x22, 0xF1, 0x90], false, Duration::from_millis(10)).await?;
//! let response = transport.recv(Duration::from_secs(1)).await?;
//! ```

mod adapter;
pub mod error;
pub mod mock;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub mod socketcan;

pub use adapter::{AddressInfo, TransportAdapter};
pub use error::TransportError;
pub use mock::{MockTransportAdapter, SentMessage};

use std::sync::Arc;

use crate::config::TransportConfig;

/// Create a transport adapter based on configuration
pub async fn create_transport(
    config: &TransportConfig,
) -> Result<Arc<dyn TransportAdapter>, TransportError> {
    match config {
        #[cfg(all(target_os = "linux", feature = "socketcan"))]
        TransportConfig::SocketCan(cfg) => {
            let adapter = socketcan::SocketCanAdapter::new(cfg).await?;
            Ok(Arc::new(adapter))
        }
        #[cfg(not(all(target_os = "linux", feature = "socketcan")))]
        TransportConfig::SocketCan(_) => Err(TransportError::Unsupported(
            "SocketCAN requires Linux and the 'socketcan' feature".to_string(),
        )),
        TransportConfig::Mock(cfg) => {
            let adapter = mock::MockTransportAdapter::new(cfg);
            Ok(Arc::new(adapter))
        }
    }
}
