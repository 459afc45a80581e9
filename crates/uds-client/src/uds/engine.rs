//! Request/response transaction engine
//!
//! One logical exchange is: drop anything still buffered from earlier
//! exchanges, transmit a request, then poll the transport until a final
//! (non response-pending) frame answering that request arrives or the
//! patience ceiling is exceeded. Frames for any other service are discarded.
//!
//! # Concurrency
//!
//! Two mechanisms keep a background tester present from colliding with
//! foreground traffic:
//!
//! - `transmission_active` is an advisory flag, true for the whole exchange
//!   including every pending retry. The keep-alive checks it and skips a beat.
//! - `send_lock` is held only around the physical transmit call. It is the
//!   backstop for the window where the keep-alive has already read the flag
//!   as false. It is not held while receiving, so a long pending wait never
//!   blocks the keep-alive task.
//!
//! The keep-alive can therefore still transmit during an exchange if it
//! read the flag just before it was set; the lock only guarantees the two
//! transmissions do not interleave on the wire.
//!
//! The engine is not reentrant: concurrent foreground `send` calls on one
//! engine are not supported.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{service_id, NegativeResponseCode, UdsError};
use crate::config::TimingConfig;
use crate::transport::{TransportAdapter, TransportError};

/// Replacement for the physical transmit primitive
pub type TransmitFn = Arc<
    dyn Fn(Vec<u8>, bool, Duration) -> BoxFuture<'static, Result<(), TransportError>>
        + Send
        + Sync,
>;

/// Replacement for the next-buffered-message accessor
pub type ReceiveFn =
    Arc<dyn Fn(Duration) -> BoxFuture<'static, Result<Vec<u8>, TransportError>> + Send + Sync>;

/// Called after every successful exchange (session timing for keep-alive)
pub type LastSendHook = Arc<dyn Fn() + Send + Sync>;

/// Timing used by the engine
#[derive(Debug, Clone, Copy)]
pub struct EngineTiming {
    /// Per-poll receive timeout
    pub p2_client: Duration,
    /// Per-poll receive timeout once the ECU has sent response pending
    pub p2_server: Duration,
    /// Total patience while only response-pending frames arrive
    pub pending_ceiling: Duration,
    /// Mean pending interval above which a warning is logged
    pub pending_warn_interval: Duration,
    /// Default pacing hint handed to the transport
    pub tp_wait: Duration,
}

impl Default for EngineTiming {
    fn default() -> Self {
        (&TimingConfig::default()).into()
    }
}

impl From<&TimingConfig> for EngineTiming {
    fn from(config: &TimingConfig) -> Self {
        Self {
            p2_client: config.p2_client(),
            p2_server: config.p2_server(),
            pending_ceiling: config.pending_ceiling(),
            pending_warn_interval: config.pending_warn_interval(),
            tp_wait: config.tp_wait(),
        }
    }
}

/// Sets the busy flag on creation and clears it on every exit path
struct ActiveGuard<'a>(&'a AtomicBool);

impl<'a> ActiveGuard<'a> {
    fn engage(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// True for `7F <sid> 78 ...`
pub fn is_response_pending(frame: &[u8]) -> bool {
    frame.len() >= 3
        && frame[0] == service_id::NEGATIVE_RESPONSE
        && NegativeResponseCode::from(frame[2]) == NegativeResponseCode::ResponsePending
}

/// True when `frame` is the positive (`sid + 0x40`) or negative (`7F sid`)
/// response to `request`
pub fn answers_request(request: &[u8], frame: &[u8]) -> bool {
    let Some(&sid) = request.first() else {
        return true;
    };
    match frame {
        [first, ..] if *first == sid.wrapping_add(service_id::POSITIVE_RESPONSE_OFFSET) => true,
        [service_id::NEGATIVE_RESPONSE, echoed, ..] => *echoed == sid,
        _ => false,
    }
}

/// Serialises UDS request/response exchanges over one transport
pub struct TransactionEngine {
    transport: Arc<dyn TransportAdapter>,
    transmit: RwLock<TransmitFn>,
    receive: RwLock<ReceiveFn>,
    transmission_active: AtomicBool,
    send_lock: tokio::sync::Mutex<()>,
    timing: EngineTiming,
    last_send_hook: RwLock<Option<LastSendHook>>,
}

impl TransactionEngine {
    pub fn new(transport: Arc<dyn TransportAdapter>) -> Self {
        Self::with_timing(transport, EngineTiming::default())
    }

    pub fn with_timing(transport: Arc<dyn TransportAdapter>, timing: EngineTiming) -> Self {
        Self {
            transmit: RwLock::new(default_transmit(&transport)),
            receive: RwLock::new(default_receive(&transport)),
            transport,
            transmission_active: AtomicBool::new(false),
            send_lock: tokio::sync::Mutex::new(()),
            timing,
            last_send_hook: RwLock::new(None),
        }
    }

    pub fn timing(&self) -> &EngineTiming {
        &self.timing
    }

    pub fn transport(&self) -> &Arc<dyn TransportAdapter> {
        &self.transport
    }

    /// Whether a foreground exchange is in progress
    pub fn is_transmitting(&self) -> bool {
        self.transmission_active.load(Ordering::SeqCst)
    }

    /// Send a request and, if required, wait for its final response
    ///
    /// Returns `Ok(None)` when no response was required (always the case
    /// for functional requests). Response-pending frames are absorbed until
    /// a final frame arrives; a terminal negative response is returned as
    /// bytes like any other final frame.
    pub async fn send(
        &self,
        request: &[u8],
        response_required: bool,
        functional: bool,
        tp_wait_time: Duration,
    ) -> Result<Option<Vec<u8>>, UdsError> {
        let _active = ActiveGuard::engage(&self.transmission_active);

        let stale = self.transport.clear_buffered().await;
        if stale > 0 {
            debug!(stale, "Discarded buffered frames before request");
        }

        debug!(request = %hex::encode(request), functional, "UDS request");
        self.transmit_locked(request, functional, tp_wait_time)
            .await?;

        // Functional requests never expect a unicast reply
        let response_required = response_required && !functional;
        if !response_required {
            self.notify_last_send();
            return Ok(None);
        }

        let response = self.await_final_response(request).await?;
        self.notify_last_send();
        Ok(Some(response))
    }

    /// Physical request with the default pacing; the final frame is required
    pub async fn request(&self, request: &[u8]) -> Result<Vec<u8>, UdsError> {
        self.send(request, true, false, self.timing.tp_wait)
            .await?
            .ok_or_else(|| UdsError::InvalidResponse("No response received".to_string()))
    }

    /// Transmit outside of a foreground exchange (tester present)
    ///
    /// Skips and returns `Ok(false)` while a foreground exchange is active.
    /// Does not touch the busy flag.
    pub async fn transmit_unsolicited(
        &self,
        request: &[u8],
        functional: bool,
    ) -> Result<bool, UdsError> {
        if self.is_transmitting() {
            debug!(request = %hex::encode(request), "Transmission active, skipping");
            return Ok(false);
        }
        self.transmit_locked(request, functional, self.timing.tp_wait)
            .await?;
        Ok(true)
    }

    /// Replace the physical transmit primitive; applies from the next call
    pub fn overwrite_transmit_method<F, Fut>(&self, func: F)
    where
        F: Fn(Vec<u8>, bool, Duration) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TransportError>> + Send + 'static,
    {
        *self.transmit.write() =
            Arc::new(move |request, functional, wait| func(request, functional, wait).boxed());
    }

    /// Replace the next-message accessor; applies from the next call
    pub fn overwrite_receive_method<F, Fut>(&self, func: F)
    where
        F: Fn(Duration) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<u8>, TransportError>> + Send + 'static,
    {
        *self.receive.write() = Arc::new(move |timeout| func(timeout).boxed());
    }

    /// Go back to the transport's own send/recv
    pub fn restore_transport_methods(&self) {
        *self.transmit.write() = default_transmit(&self.transport);
        *self.receive.write() = default_receive(&self.transport);
    }

    pub fn set_last_send_hook(&self, hook: LastSendHook) {
        *self.last_send_hook.write() = Some(hook);
    }

    pub fn clear_last_send_hook(&self) {
        *self.last_send_hook.write() = None;
    }

    async fn transmit_locked(
        &self,
        request: &[u8],
        functional: bool,
        wait: Duration,
    ) -> Result<(), UdsError> {
        // Looked up per call so an override applies immediately
        let transmit = self.transmit.read().clone();
        let _wire = self.send_lock.lock().await;
        transmit(request.to_vec(), functional, wait).await?;
        Ok(())
    }

    async fn await_final_response(&self, request: &[u8]) -> Result<Vec<u8>, UdsError> {
        // Fresh baseline for every exchange
        let start = Instant::now();
        let mut pending: u32 = 0;

        loop {
            let remaining = self.timing.pending_ceiling.saturating_sub(start.elapsed());
            let receive = self.receive.read().clone();

            let poll_timeout = if pending == 0 {
                self.timing.p2_client
            } else {
                self.timing.p2_server
            };

            let frame = match tokio::time::timeout(remaining, receive(poll_timeout)).await {
                Ok(frame) => frame?,
                Err(_) => {
                    return Err(UdsError::ResponsePendingTimeout {
                        pending,
                        elapsed: start.elapsed(),
                    })
                }
            };

            if !answers_request(request, &frame) {
                debug!(frame = %hex::encode(&frame), "Discarding frame for another request");
                continue;
            }

            if !is_response_pending(&frame) {
                debug!(response = %hex::encode(&frame), pending, "UDS response");
                return Ok(frame);
            }

            pending += 1;
            let elapsed = start.elapsed();
            info!(
                pending,
                elapsed_ms = elapsed.as_millis() as u64,
                frame = %hex::encode(&frame),
                "UDS response pending message received"
            );
            if elapsed / pending > self.timing.pending_warn_interval {
                warn!(
                    pending,
                    mean_interval_ms = (elapsed / pending).as_millis() as u64,
                    "Response pending took more than {:?} per message",
                    self.timing.pending_warn_interval
                );
            }

            if elapsed >= self.timing.pending_ceiling {
                return Err(UdsError::ResponsePendingTimeout { pending, elapsed });
            }
        }
    }

    fn notify_last_send(&self) {
        let hook = self.last_send_hook.read().clone();
        if let Some(hook) = hook {
            hook();
        }
    }
}

fn default_transmit(transport: &Arc<dyn TransportAdapter>) -> TransmitFn {
    let transport = transport.clone();
    Arc::new(move |request: Vec<u8>, functional, wait| {
        let transport = transport.clone();
        async move { transport.send(&request, functional, wait).await }.boxed()
    })
}

fn default_receive(transport: &Arc<dyn TransportAdapter>) -> ReceiveFn {
    let transport = transport.clone();
    Arc::new(move |timeout| {
        let transport = transport.clone();
        async move { transport.recv(timeout).await }.boxed()
    })
}
