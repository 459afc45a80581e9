//! Command implementations for uds-cli

pub mod keepalive;
pub mod read;
pub mod send;
pub mod transfer;

pub use keepalive::keepalive;
pub use read::read;
pub use send::send;
pub use transfer::transfer;

use anyhow::{bail, Context, Result};

/// Parse hex bytes written as `22F190`, `22 f1 90` or `0x22F190`
pub fn parse_hex_bytes(input: &str) -> Result<Vec<u8>> {
    let compact: String = input
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .collect();
    if compact.is_empty() {
        bail!("Empty request");
    }
    hex::decode(&compact).with_context(|| format!("Invalid hex bytes: {}", input))
}

/// Parse a 16-bit DID given in hex, with or without `0x`
pub fn parse_did(input: &str) -> Result<u16> {
    let digits = input
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    u16::from_str_radix(digits, 16).with_context(|| format!("Invalid DID: {}", input))
}
