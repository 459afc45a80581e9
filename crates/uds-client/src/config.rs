//! UDS client configuration
//!
//! This module contains configuration types for the client: transport
//! selection, protocol timing, keep-alive and flash transfer settings.
//! Configuration is read from TOML.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UdsConfig {
    /// Transport configuration
    #[serde(default)]
    pub transport: TransportConfig,
    /// Protocol timing
    #[serde(default)]
    pub timing: TimingConfig,
    /// Tester present keep-alive
    #[serde(default)]
    pub keepalive: KeepaliveConfig,
    /// Download/TransferData settings
    #[serde(default)]
    pub transfer: TransferConfig,
}

impl UdsConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.timing.p2_client_ms == 0 {
            return Err(ConfigError::Invalid(
                "timing.p2_client_ms must be greater than zero".to_string(),
            ));
        }
        if self.keepalive.enabled && self.keepalive.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "keepalive.interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.transfer.address_and_length_format != 0x44 {
            return Err(ConfigError::Invalid(format!(
                "transfer.address_and_length_format 0x{:02X} is not supported (expected 0x44)",
                self.transfer.address_and_length_format
            )));
        }
        Ok(())
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// =============================================================================
// Transport Configuration
// =============================================================================

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// SocketCAN with ISO-TP (Linux only)
    SocketCan(SocketCanConfig),
    /// Mock transport for testing
    Mock(MockConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Mock(MockConfig::default())
    }
}

/// SocketCAN configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketCanConfig {
    /// CAN interface name (e.g., "can0")
    pub interface: String,
    /// ISO-TP addressing
    pub isotp: IsoTpConfig,
}

/// ISO-TP addressing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsoTpConfig {
    /// Transmit CAN ID (tester -> ECU)
    pub tx_id: String,
    /// Receive CAN ID (ECU -> tester)
    pub rx_id: String,
    /// Functional request CAN ID (e.g., "0x7DF")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub functional_tx_id: Option<String>,
}

/// Mock transport configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MockConfig {
    /// Simulated latency in milliseconds
    #[serde(default)]
    pub latency_ms: u64,
}

// =============================================================================
// Timing Configuration
// =============================================================================

/// Protocol timing (ISO 14229-2 P2 values and response-pending limits)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// P2 client: per-receive timeout in milliseconds
    #[serde(default = "default_p2_client")]
    pub p2_client_ms: u64,
    /// P2* server: per-receive timeout after a response-pending frame, in milliseconds
    #[serde(default = "default_p2_server")]
    pub p2_server_ms: u64,
    /// Give up after this long while only response-pending frames arrive
    #[serde(default = "default_pending_ceiling")]
    pub pending_ceiling_ms: u64,
    /// Warn when the mean interval between pending frames exceeds this
    #[serde(default = "default_pending_warn_interval")]
    pub pending_warn_interval_ms: u64,
    /// Pacing hint passed to the transport on every send
    #[serde(default = "default_tp_wait")]
    pub tp_wait_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            p2_client_ms: default_p2_client(),
            p2_server_ms: default_p2_server(),
            pending_ceiling_ms: default_pending_ceiling(),
            pending_warn_interval_ms: default_pending_warn_interval(),
            tp_wait_ms: default_tp_wait(),
        }
    }
}

impl TimingConfig {
    pub fn p2_client(&self) -> Duration {
        Duration::from_millis(self.p2_client_ms)
    }

    pub fn p2_server(&self) -> Duration {
        Duration::from_millis(self.p2_server_ms)
    }

    pub fn pending_ceiling(&self) -> Duration {
        Duration::from_millis(self.pending_ceiling_ms)
    }

    pub fn pending_warn_interval(&self) -> Duration {
        Duration::from_millis(self.pending_warn_interval_ms)
    }

    pub fn tp_wait(&self) -> Duration {
        Duration::from_millis(self.tp_wait_ms)
    }
}

fn default_p2_client() -> u64 {
    1000
}

fn default_p2_server() -> u64 {
    5000
}

fn default_pending_ceiling() -> u64 {
    20_000
}

fn default_pending_warn_interval() -> u64 {
    3500
}

fn default_tp_wait() -> u64 {
    10
}

// =============================================================================
// Keep-alive Configuration
// =============================================================================

/// Tester present keep-alive configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeepaliveConfig {
    #[serde(default = "default_keepalive_enabled")]
    pub enabled: bool,
    #[serde(default = "default_keepalive_interval")]
    pub interval_ms: u64,
    /// Send tester present functionally addressed
    #[serde(default)]
    pub functional: bool,
}

fn default_keepalive_enabled() -> bool {
    true
}

fn default_keepalive_interval() -> u64 {
    2000
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            enabled: default_keepalive_enabled(),
            interval_ms: default_keepalive_interval(),
            functional: false,
        }
    }
}

// =============================================================================
// Transfer Configuration
// =============================================================================

/// RequestDownload / TransferData configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// TransferData block counter start (0 or 1)
    #[serde(default = "default_block_counter_start")]
    pub block_counter_start: u8,
    /// TransferData block counter value used after 0xFF
    #[serde(default)]
    pub block_counter_wrap: u8,
    /// addressAndLengthFormatIdentifier for RequestDownload
    #[serde(default = "default_address_and_length_format")]
    pub address_and_length_format: u8,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            block_counter_start: default_block_counter_start(),
            block_counter_wrap: 0,
            address_and_length_format: default_address_and_length_format(),
        }
    }
}

fn default_block_counter_start() -> u8 {
    1
}

fn default_address_and_length_format() -> u8 {
    0x44
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = UdsConfig::from_toml_str("").unwrap();

        assert!(matches!(config.transport, TransportConfig::Mock(_)));
        assert_eq!(config.timing.pending_ceiling(), Duration::from_secs(20));
        assert_eq!(config.timing.pending_warn_interval(), Duration::from_millis(3500));
        assert_eq!(config.transfer.block_counter_start, 1);
        assert_eq!(config.transfer.block_counter_wrap, 0);
        assert!(config.keepalive.enabled);
    }

    #[test]
    fn test_socketcan_config() {
        let config = UdsConfig::from_toml_str(
            r#"
            [transport]
            type = "socketcan"
            interface = "vcan0"

            [transport.isotp]
            tx_id = "0x7E0"
            rx_id = "0x7E8"
            functional_tx_id = "0x7DF"

            [timing]
            p2_client_ms = 150
            "#,
        )
        .unwrap();

        match config.transport {
            TransportConfig::SocketCan(cfg) => {
                assert_eq!(cfg.interface, "vcan0");
                assert_eq!(cfg.isotp.functional_tx_id.as_deref(), Some("0x7DF"));
            }
            other => panic!("Expected SocketCan, got {:?}", other),
        }
        assert_eq!(config.timing.p2_client(), Duration::from_millis(150));
        assert_eq!(config.timing.p2_server_ms, 5000);
    }

    #[test]
    fn test_rejects_zero_p2_client() {
        let err = UdsConfig::from_toml_str("[timing]\np2_client_ms = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let err = UdsConfig::from_toml_str("[timing\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
