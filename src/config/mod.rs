//! # Decommission Configuration
//!
//! Typed settings for streaming, the transfer ledger and event fan-out. Values are
//! layered by [`ConfigManager`]: built-in defaults, then a TOML file, then an
//! environment-specific TOML overlay, then `DECOMMISSION__SECTION__KEY`
//! environment variables.
//!
//! ```rust,no_run
//! use range_decommission::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let throttle = manager.config().streaming.throughput_bytes_per_sec();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Bytes per megabit used to turn the outbound throttle into a byte rate
pub const BYTES_PER_MEGABIT: u64 = 125_000;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DecommissionConfig {
    pub streaming: StreamingConfig,
    pub ledger: LedgerConfig,
    pub events: EventConfig,
}

impl DecommissionConfig {
    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        self.streaming.validate()?;
        self.ledger.validate()?;
        self.events.validate()
    }
}

/// Outbound streaming settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Aggregate outbound throttle for all transfers from the leaving node; 0 disables it
    pub stream_throughput_outbound_megabits_per_sec: u32,
    /// Ranges streamed at the same time
    pub max_concurrent_transfers: usize,
    /// Upper bound on the payload of one chunk
    pub chunk_size_bytes: usize,
    /// A chunk or commit that makes no progress for this long fails the transfer
    pub inactivity_timeout_ms: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            stream_throughput_outbound_megabits_per_sec: 200,
            max_concurrent_transfers: 4,
            chunk_size_bytes: 64 * 1024,
            inactivity_timeout_ms: 30_000,
        }
    }
}

impl StreamingConfig {
    /// Throttle as bytes per second, `None` when unthrottled
    pub fn throughput_bytes_per_sec(&self) -> Option<u64> {
        match self.stream_throughput_outbound_megabits_per_sec {
            0 => None,
            megabits => Some(u64::from(megabits) * BYTES_PER_MEGABIT),
        }
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_millis(self.inactivity_timeout_ms)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.max_concurrent_transfers == 0 {
            return Err(ConfigurationError::invalid_value(
                "streaming.max_concurrent_transfers",
                self.max_concurrent_transfers,
                "at least one transfer must be allowed to run",
            ));
        }
        if self.chunk_size_bytes == 0 {
            return Err(ConfigurationError::invalid_value(
                "streaming.chunk_size_bytes",
                self.chunk_size_bytes,
                "chunk size must be positive",
            ));
        }
        if self.inactivity_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "streaming.inactivity_timeout_ms",
                self.inactivity_timeout_ms,
                "a zero timeout would fail every transfer",
            ));
        }
        Ok(())
    }
}

/// Durable transfer ledger location
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub directory: PathBuf,
    pub file_name: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("data/decommission"),
            file_name: "transfer_ledger.jsonl".to_string(),
        }
    }
}

impl LedgerConfig {
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.file_name.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "ledger.file_name",
                &self.file_name,
                "ledger file name must not be empty",
            ));
        }
        Ok(())
    }
}

/// Lifecycle event fan-out
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EventConfig {
    pub channel_capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

impl EventConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "events.channel_capacity",
                self.channel_capacity,
                "broadcast channels need a positive capacity",
            ));
        }
        Ok(())
    }
}
