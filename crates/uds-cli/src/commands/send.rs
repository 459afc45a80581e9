//! Send command - raw UDS request

use anyhow::{Context, Result};
use uds_client::uds::service_id;
use uds_client::{NegativeResponseCode, UdsClient};

use super::parse_hex_bytes;
use crate::output::{OutputContext, ResponseRow};

/// Send one raw request and print the final response
pub async fn send(
    client: &UdsClient,
    request: &str,
    functional: bool,
    no_response: bool,
    ctx: &OutputContext,
) -> Result<()> {
    let request = parse_hex_bytes(request)?;

    let response = client
        .send(&request, !no_response, functional)
        .await
        .context("Request failed")?;

    let Some(response) = response else {
        ctx.success("Request sent (no response expected)");
        return Ok(());
    };

    let nrc = match response.as_slice() {
        [service_id::NEGATIVE_RESPONSE, _, code, ..] => {
            let nrc = NegativeResponseCode::from(*code);
            ctx.warn(&format!("Negative response: {} (0x{:02X})", nrc, code));
            nrc.to_string()
        }
        _ => String::new(),
    };

    ctx.print_one(&ResponseRow {
        request: hex::encode_upper(&request),
        response: hex::encode_upper(&response),
        nrc,
    });
    Ok(())
}
