//! # Dispatch Configuration
//!
//! Typed settings for the consumer loop, the produce bridge, lifecycle and
//! logging. Every field has a default, so an empty configuration is valid.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dispatch_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Defaults, then config/dispatch.toml, then config/dispatch.{env}.toml,
//! // then DISPATCH__SECTION__KEY environment variables
//! let manager = ConfigManager::load()?;
//! let poll_timeout = manager.config().consumer.poll_timeout();
//! let ack_timeout = manager.config().producer.ack_timeout();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring dispatch.toml
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Consume loop settings
    pub consumer: ConsumerConfig,

    /// Produce-acknowledge settings
    pub producer: ProducerConfig,

    /// Signal handling settings
    pub lifecycle: LifecycleConfig,

    /// Log output settings
    pub logging: LoggingConfig,
}

impl DispatchConfig {
    /// Reject values the dispatch core cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.consumer.poll_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "consumer.poll_timeout_ms",
                "0",
                "poll timeout must be greater than zero",
            ));
        }
        if self.consumer.max_poll_records == 0 {
            return Err(ConfigurationError::invalid_value(
                "consumer.max_poll_records",
                "0",
                "batch size must be greater than zero",
            ));
        }
        if self.producer.ack_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "producer.ack_timeout_ms",
                "0",
                "acknowledgment timeout must be greater than zero",
            ));
        }
        match self.logging.format.as_str() {
            "pretty" | "json" => Ok(()),
            other => Err(ConfigurationError::invalid_value(
                "logging.format",
                other,
                "expected 'pretty' or 'json'",
            )),
        }
    }
}

/// Consume loop configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Upper bound for a single poll
    pub poll_timeout_ms: u64,
    /// Upper bound on records returned by one poll, for providers that honour it
    pub max_poll_records: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 100,
            max_poll_records: 500,
        }
    }
}

impl ConsumerConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// Produce-acknowledge configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProducerConfig {
    /// How long a publish waits for the broker acknowledgment
    pub ack_timeout_ms: u64,
    /// Flush the producer after a failed or timed-out send
    pub flush_on_failure: bool,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 10_000,
            flush_on_failure: true,
        }
    }
}

impl ProducerConfig {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

/// Lifecycle configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Install SIGINT/SIGTERM/SIGQUIT/SIGHUP handlers when the service runs
    pub install_signal_handlers: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            install_signal_handlers: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set
    pub level: Option<String>,
    /// `pretty` or `json`
    pub format: String,
    pub ansi: bool,
    /// Also write JSON logs to a file in this directory
    pub file_directory: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: None,
            format: "pretty".to_string(),
            ansi: true,
            file_directory: None,
        }
    }
}
