//! Transport adapter trait and types

use std::time::Duration;

use async_trait::async_trait;

use super::TransportError;

/// Address information for CAN/ISO-TP
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressInfo {
    /// Physical transmit ID (tester -> ECU)
    pub tx_id: u32,
    /// Receive ID (ECU -> tester)
    pub rx_id: u32,
    /// Functional (broadcast) transmit ID, if the transport supports one
    pub functional_tx_id: Option<u32>,
}

/// Byte-frame transport used by the transaction engine
///
/// Framing and segmentation (e.g. ISO-TP) are the implementation's
/// responsibility; the engine only ever sees complete UDS messages.
/// Sending and receiving are separate operations so that the engine
/// can poll for several frames (response pending) after one request.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    /// Transmit one complete UDS message
    ///
    /// # Arguments
    /// * `request` - The raw UDS request bytes
    /// * `functional` - Use functional (broadcast) addressing instead of physical
    /// * `wait_time` - Transport-level pacing hint between segments
    async fn send(
        &self,
        request: &[u8],
        functional: bool,
        wait_time: Duration,
    ) -> Result<(), TransportError>;

    /// Return the next buffered message, waiting at most `timeout`
    ///
    /// Returns `TransportError::Timeout` if nothing arrives in time.
    async fn recv(&self, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Drop every buffered incoming message, returning how many were dropped
    ///
    /// Called before each request so a late reply to an earlier request is
    /// never taken as the answer to the next one.
    async fn clear_buffered(&self) -> usize;

    /// Check if the transport is connected
    async fn is_connected(&self) -> bool;

    /// Attempt to reconnect if disconnected
    async fn reconnect(&self) -> Result<(), TransportError>;

    /// Get the current address configuration
    fn address_info(&self) -> AddressInfo;
}
