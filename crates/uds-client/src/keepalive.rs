//! Background tester present
//!
//! Keeps a non-default diagnostic session open by sending `3E 80` whenever
//! the link has been quiet for one interval. Ticks are skipped while the
//! engine runs a foreground exchange or when real traffic went out recently.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::KeepaliveConfig;
use crate::uds::{service_id, tester_present_sub_function, TransactionEngine};

const TESTER_PRESENT_SUPPRESSED: [u8; 2] = [
    service_id::TESTER_PRESENT,
    tester_present_sub_function::SUPPRESS_POSITIVE_RESPONSE,
];

/// Handle to a running keep-alive task; stops the task when dropped
pub struct KeepAlive {
    engine: Arc<TransactionEngine>,
    handle: Option<JoinHandle<()>>,
}

impl KeepAlive {
    /// Spawn the keep-alive task and register the engine's last-send hook
    pub fn start(engine: Arc<TransactionEngine>, config: &KeepaliveConfig) -> Self {
        let interval = Duration::from_millis(config.interval_ms);
        let functional = config.functional;

        let last_traffic: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));
        {
            let last_traffic = last_traffic.clone();
            engine.set_last_send_hook(Arc::new(move || {
                *last_traffic.lock() = Some(Instant::now());
            }));
        }

        let task_engine = engine.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                if task_engine.is_transmitting() {
                    debug!("Foreground exchange active, tester present skipped");
                    continue;
                }
                let quiet_for = last_traffic.lock().map(|at| at.elapsed());
                if matches!(quiet_for, Some(quiet) if quiet < interval) {
                    continue;
                }

                match task_engine
                    .transmit_unsolicited(&TESTER_PRESENT_SUPPRESSED, functional)
                    .await
                {
                    Ok(true) => debug!(functional, "Tester present sent"),
                    Ok(false) => {}
                    Err(e) => error!(error = %e, "Tester present failed"),
                }
            }
        });

        info!(interval_ms = config.interval_ms, functional, "Keepalive started");
        Self {
            engine,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Abort the task and unregister the last-send hook
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            self.engine.clear_last_send_hook();
            debug!("Keepalive stopped");
        }
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.stop();
    }
}
