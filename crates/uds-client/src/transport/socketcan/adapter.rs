//! SocketCAN adapter using kernel ISO-TP sockets

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use socketcan::{ExtendedId, Id, StandardId};
use socketcan_isotp::IsoTpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::SocketCanConfig;
use crate::transport::{AddressInfo, TransportAdapter, TransportError};

/// SocketCAN adapter using ISO-TP for UDS communication
///
/// Segmentation and flow control are done by the kernel. A blocking
/// listener drains the physical socket into a buffer which `recv` pops
/// from, so frames that arrive between two polls are not lost.
pub struct SocketCanAdapter {
    config: SocketCanConfig,
    socket: Arc<Mutex<IsoTpSocket>>,
    functional_socket: Option<Arc<Mutex<IsoTpSocket>>>,
    address_info: AddressInfo,
    connected: Arc<AtomicBool>,
    incoming_tx: mpsc::UnboundedSender<Vec<u8>>,
    incoming_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    listener_handle: Mutex<Option<JoinHandle<()>>>,
}

impl SocketCanAdapter {
    pub async fn new(config: &SocketCanConfig) -> Result<Self, TransportError> {
        let tx_id = parse_can_id(&config.isotp.tx_id)?;
        let rx_id = parse_can_id(&config.isotp.rx_id)?;
        let functional_tx_id = config
            .isotp
            .functional_tx_id
            .as_deref()
            .map(parse_can_id)
            .transpose()?;

        let mut socket = Self::create_socket(&config.interface, tx_id, rx_id)?;

        // Drain any stale data from the socket (from previous sessions/processes)
        Self::drain_socket(&mut socket);

        // The functional socket is only ever written to
        let functional_socket = match functional_tx_id {
            Some(id) => Some(Arc::new(Mutex::new(Self::create_socket(
                &config.interface,
                id,
                rx_id,
            )?))),
            None => None,
        };

        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();

        let adapter = Self {
            config: config.clone(),
            socket: Arc::new(Mutex::new(socket)),
            functional_socket,
            address_info: AddressInfo {
                tx_id,
                rx_id,
                functional_tx_id,
            },
            connected: Arc::new(AtomicBool::new(true)),
            incoming_tx,
            incoming_rx: tokio::sync::Mutex::new(incoming_rx),
            listener_handle: Mutex::new(None),
        };

        adapter.start_listener();

        Ok(adapter)
    }

    /// Drain any pending data from the socket to clear stale messages
    fn drain_socket(socket: &mut IsoTpSocket) {
        while let Ok(data) = socket.read() {
            if data.is_empty() {
                break;
            }
            tracing::debug!(data = %hex::encode(data), "Drained stale message from socket");
        }
    }

    fn create_socket(interface: &str, tx_id: u32, rx_id: u32) -> Result<IsoTpSocket, TransportError> {
        let socket = IsoTpSocket::open(interface, can_id(rx_id)?, can_id(tx_id)?).map_err(|e| {
            TransportError::ConnectionFailed(format!("Failed to open ISO-TP socket: {}", e))
        })?;

        // Set socket to non-blocking for async operation
        socket.set_nonblocking(true).map_err(|e| {
            TransportError::InvalidConfig(format!("Failed to set non-blocking: {}", e))
        })?;

        Ok(socket)
    }

    fn start_listener(&self) {
        let socket = self.socket.clone();
        let incoming_tx = self.incoming_tx.clone();
        let connected = self.connected.clone();

        let handle = tokio::task::spawn_blocking(move || {
            while connected.load(Ordering::SeqCst) {
                // Copy out before sleeping so writers are not blocked on the lock
                let result = socket.lock().read().map(|data| data.to_vec());
                match result {
                    Ok(data) if !data.is_empty() => {
                        tracing::debug!(data = %hex::encode(&data), "Incoming message received");
                        if incoming_tx.send(data).is_err() {
                            break;
                        }
                    }
                    Ok(_) => std::thread::sleep(Duration::from_millis(1)),
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        std::thread::sleep(Duration::from_millis(1));
                    }
                    Err(e) => {
                        tracing::error!(?e, "SocketCAN read error");
                        std::thread::sleep(Duration::from_millis(100));
                    }
                }
            }
            tracing::debug!("SocketCAN listener stopped");
        });

        if let Some(old) = self.listener_handle.lock().replace(handle) {
            old.abort();
        }
    }
}

#[async_trait]
impl TransportAdapter for SocketCanAdapter {
    async fn send(
        &self,
        request: &[u8],
        functional: bool,
        wait_time: Duration,
    ) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        let socket = if functional {
            self.functional_socket.clone().ok_or_else(|| {
                TransportError::Unsupported(
                    "functional addressing requires isotp.functional_tx_id".to_string(),
                )
            })?
        } else {
            self.socket.clone()
        };
        let request = request.to_vec();

        // Segment pacing is handled by the kernel (STmin); wait_time is advisory here
        tracing::trace!(?wait_time, functional, "ISO-TP write");

        tokio::task::spawn_blocking(move || {
            let socket_guard = socket.lock();
            socket_guard
                .write(&request)
                .map_err(|e| TransportError::SendFailed(e.to_string()))
        })
        .await
        .map_err(|e| TransportError::SendFailed(format!("Task join error: {}", e)))??;

        Ok(())
    }

    async fn recv(&self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        let mut rx = self.incoming_rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(data)) => Ok(data),
            Ok(None) => Err(TransportError::ConnectionClosed),
            Err(_) => Err(TransportError::Timeout("Response timeout".to_string())),
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
        let tx_id = parse_can_id(&self.config.isotp.tx_id)?;
        let rx_id = parse_can_id(&self.config.isotp.rx_id)?;

        let socket = Self::create_socket(&self.config.interface, tx_id, rx_id)?;
        *self.socket.lock() = socket;
        self.connected.store(true, Ordering::SeqCst);

        self.start_listener();

        Ok(())
    }

    fn address_info(&self) -> AddressInfo {
        self.address_info.clone()
    }
}

impl Drop for SocketCanAdapter {
    fn drop(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

/// 11-bit identifiers use standard frames, anything larger extended frames
fn can_id(raw: u32) -> Result<Id, TransportError> {
    if raw <= 0x7FF {
        StandardId::new(raw as u16).map(Id::Standard)
    } else {
        ExtendedId::new(raw).map(Id::Extended)
    }
    .ok_or_else(|| TransportError::InvalidConfig(format!("Invalid CAN ID: 0x{:X}", raw)))
}

/// Parse a CAN ID from string (supports hex with 0x prefix)
pub(crate) fn parse_can_id(s: &str) -> Result<u32, TransportError> {
    let s = s.trim();
    let (digits, radix) = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => (hex, 16),
        None => (s, 10),
    };

    u32::from_str_radix(digits, radix)
        .map_err(|e| TransportError::InvalidConfig(format!("Invalid CAN ID '{}': {}", s, e)))
}
