//! Mock transport adapter for testing and simulation

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{mpsc, Mutex};

use super::{AddressInfo, TransportAdapter, TransportError};
use crate::config::MockConfig;

/// A message the mock transport was asked to transmit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub data: Vec<u8>,
    pub functional: bool,
}

/// Mock transport adapter
///
/// Physical requests are answered from a scripted table. A request may map
/// to several frames (e.g. a run of `7F xx 78` followed by the final
/// answer); all of them are queued for `recv` in order.
pub struct MockTransportAdapter {
    config: MockConfig,
    connected: AtomicBool,
    incoming_tx: mpsc::UnboundedSender<Vec<u8>>,
    incoming_rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    /// Predefined responses for testing (request -> response frames)
    responses: RwLock<Vec<(Vec<u8>, Vec<Vec<u8>>)>>,
    sent: RwLock<Vec<SentMessage>>,
    in_transmit: AtomicBool,
    overlapping_transmits: AtomicUsize,
    recv_calls: AtomicUsize,
}

impl MockTransportAdapter {
    pub fn new(config: &MockConfig) -> Self {
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        Self {
            config: config.clone(),
            connected: AtomicBool::new(true),
            incoming_tx,
            incoming_rx: Mutex::new(incoming_rx),
            responses: RwLock::new(Self::default_responses()),
            sent: RwLock::new(Vec::new()),
            in_transmit: AtomicBool::new(false),
            overlapping_transmits: AtomicUsize::new(0),
            recv_calls: AtomicUsize::new(0),
        }
    }

    /// Add a mock response for a given request
    ///
    /// Newer entries take precedence over older ones for the same request.
    pub fn add_response(&self, request: Vec<u8>, response: Vec<u8>) {
        self.add_response_sequence(request, vec![response]);
    }

    /// Add a sequence of frames to be queued when `request` is sent
    pub fn add_response_sequence(&self, request: Vec<u8>, frames: Vec<Vec<u8>>) {
        self.responses.write().insert(0, (request, frames));
    }

    /// Answer `request` with `pending` response-pending frames, then `response`
    pub fn add_pending_response(&self, request: Vec<u8>, pending: usize, response: Vec<u8>) {
        let sid = request.first().copied().unwrap_or(0);
        let mut frames = vec![vec![0x7F, sid, 0x78]; pending];
        frames.push(response);
        self.add_response_sequence(request, frames);
    }

    /// Inject an incoming message without a preceding request
    pub fn inject_incoming(&self, data: Vec<u8>) {
        let _ = self.incoming_tx.send(data);
    }

    /// Set connection state
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// All messages transmitted so far, in order
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.read().clone()
    }

    /// Number of times a transmit started while another was still in progress
    pub fn overlapping_transmits(&self) -> usize {
        self.overlapping_transmits.load(Ordering::SeqCst)
    }

    /// Number of `recv` calls made
    pub fn recv_calls(&self) -> usize {
        self.recv_calls.load(Ordering::SeqCst)
    }

    fn default_responses() -> Vec<(Vec<u8>, Vec<Vec<u8>>)> {
        vec![
            // Diagnostic Session Control - Default (0x10 01 -> 0x50 01)
            (
                vec![0x10, 0x01],
                vec![vec![0x50, 0x01, 0x00, 0x19, 0x01, 0xF4]],
            ),
            // Diagnostic Session Control - Programming (0x10 02 -> 0x50 02)
            (
                vec![0x10, 0x02],
                vec![vec![0x50, 0x02, 0x00, 0x19, 0x01, 0xF4]],
            ),
            // Tester Present (0x3E 00 -> 0x7E 00)
            (vec![0x3E, 0x00], vec![vec![0x7E, 0x00]]),
            // Tester Present suppress response (0x3E 80 -> no response)
            (vec![0x3E, 0x80], vec![]),
            // ReadDataByIdentifier - VIN (0x22 F1 90 -> 0x62 F1 90 + 17-byte VIN)
            (vec![0x22, 0xF1, 0x90], {
                let mut resp = vec![0x62, 0xF1, 0x90];
                resp.extend_from_slice(b"1HGCM82633A123456");
                vec![resp]
            }),
            // RequestDownload (0x34 -> 0x74, maxNumberOfBlockLength 0x0402)
            (vec![0x34], vec![vec![0x74, 0x20, 0x04, 0x02]]),
            // RequestTransferExit (0x37 -> 0x77)
            (vec![0x37], vec![vec![0x77]]),
        ]
    }

    fn find_response(&self, request: &[u8]) -> Vec<Vec<u8>> {
        let responses = self.responses.read();

        // First try exact match
        if let Some((_, frames)) = responses.iter().find(|(req, _)| req == request) {
            return frames.clone();
        }

        // Then try prefix match for variable-length requests
        if let Some((_, frames)) = responses.iter().find(|(req, _)| request.starts_with(req)) {
            return frames.clone();
        }

        // TransferData echoes the block sequence counter
        if request.len() >= 2 && request[0] == 0x36 {
            return vec![vec![0x76, request[1]]];
        }

        // Generate default response based on service ID
        match request.first() {
            Some(service_id) => vec![vec![service_id.wrapping_add(0x40)]],
            None => vec![],
        }
    }
}

#[async_trait]
impl TransportAdapter for MockTransportAdapter {
    async fn send(
        &self,
        request: &[u8],
        functional: bool,
        _wait_time: Duration,
    ) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        if self.in_transmit.swap(true, Ordering::SeqCst) {
            self.overlapping_transmits.fetch_add(1, Ordering::SeqCst);
        }

        // Simulate time on the wire
        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }

        self.sent.write().push(SentMessage {
            data: request.to_vec(),
            functional,
        });
        self.in_transmit.store(false, Ordering::SeqCst);

        tracing::debug!(request = %hex::encode(request), functional, "Mock transport: sent message");

        // Functional requests never get a unicast reply
        if !functional {
            for frame in self.find_response(request) {
                let _ = self.incoming_tx.send(frame);
            }
        }
        Ok(())
    }

    async fn recv(&self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        self.recv_calls.fetch_add(1, Ordering::SeqCst);

        // Simulate per-frame latency
        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }

        let mut rx = self.incoming_rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(frame)) => Ok(frame),
            Ok(None) => Err(TransportError::ConnectionClosed),
            Err(_) => Err(TransportError::Timeout("No response from mock ECU".to_string())),
        }
    }

    async fn clear_buffered(&self) -> usize {
        let mut rx = self.incoming_rx.lock().await;
        let mut dropped = 0;
        while let Ok(frame) = rx.try_recv() {
            tracing::debug!(data = %hex::encode(&frame), "Dropped buffered message");
            dropped += 1;
        }
        dropped
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn reconnect(&self) -> Result<(), TransportError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn address_info(&self) -> AddressInfo {
        AddressInfo {
            tx_id: 0x7E0,
            rx_id: 0x7E8,
            functional_tx_id: Some(0x7DF),
        }
    }
}
