//! Keepalive command - hold the session open with tester present

use std::time::Duration;

use anyhow::{bail, Result};
use uds_client::UdsClient;

use crate::output::OutputContext;

/// Send tester present until Ctrl+C or `duration` elapses
pub async fn keepalive(
    client: &UdsClient,
    duration: Option<Duration>,
    ctx: &OutputContext,
) -> Result<()> {
    let Some(mut keepalive) = client.start_keepalive() else {
        bail!("Keepalive is disabled in the configuration");
    };
    ctx.info("Sending tester present (Ctrl+C to stop)...");

    match duration {
        Some(duration) => {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
        }
    }

    keepalive.stop();
    ctx.success("Keepalive stopped");
    Ok(())
}
