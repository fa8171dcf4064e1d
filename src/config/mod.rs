//! # Command Core Configuration
//!
//! Layered configuration for the exchange executor, macro command worker
//! pools and logging. Every field has a default, so an empty source yields a
//! working configuration; files and environment variables override it.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use command_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load(Some("config/command_core.toml"))?;
//! let workers = manager.config().exchange.dispatch_workers;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::constants::defaults;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandCoreConfig {
    pub exchange: ExchangeConfig,
    pub macro_commands: MacroCommandConfig,
    pub logging: LoggingConfig,
}

impl CommandCoreConfig {
    /// Environment-only configuration on top of the defaults
    pub fn from_env() -> ConfigResult<Self> {
        ConfigManager::load(None::<&str>).map(|manager| manager.config().clone())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.exchange.validate()?;
        self.macro_commands.validate()?;
        Ok(())
    }
}

/// Exchange executor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub request_queue_capacity: usize,
    pub response_queue_capacity: usize,
    /// Workers handling request messages
    pub dispatch_workers: usize,
    pub start_timeout_ms: u64,
    pub shutdown_timeout_ms: u64,
    /// Deadline for a caller waiting on its result; `None` waits indefinitely
    pub completion_timeout_ms: Option<u64>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            request_queue_capacity: defaults::REQUEST_QUEUE_CAPACITY,
            response_queue_capacity: defaults::RESPONSE_QUEUE_CAPACITY,
            dispatch_workers: defaults::DISPATCH_WORKERS,
            start_timeout_ms: defaults::START_TIMEOUT_MS,
            shutdown_timeout_ms: defaults::SHUTDOWN_TIMEOUT_MS,
            completion_timeout_ms: None,
        }
    }
}

impl ExchangeConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn completion_timeout(&self) -> Option<Duration> {
        self.completion_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        require_positive("exchange.request_queue_capacity", self.request_queue_capacity as u64)?;
        require_positive("exchange.response_queue_capacity", self.response_queue_capacity as u64)?;
        require_positive("exchange.dispatch_workers", self.dispatch_workers as u64)?;
        require_positive("exchange.start_timeout_ms", self.start_timeout_ms)?;
        require_positive("exchange.shutdown_timeout_ms", self.shutdown_timeout_ms)?;
        if let Some(timeout) = self.completion_timeout_ms {
            require_positive("exchange.completion_timeout_ms", timeout)?;
        }
        Ok(())
    }
}

/// Worker pool bounds for parallel macro commands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacroCommandConfig {
    /// Upper bound on one macro's pool; the base size is its member count
    pub max_parallel_workers: usize,
    pub shutdown_timeout_ms: u64,
}

impl Default for MacroCommandConfig {
    fn default() -> Self {
        Self {
            max_parallel_workers: defaults::MAX_PARALLEL_WORKERS,
            shutdown_timeout_ms: defaults::MACRO_SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl MacroCommandConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        require_positive("macro_commands.max_parallel_workers", self.max_parallel_workers as u64)?;
        require_positive("macro_commands.shutdown_timeout_ms", self.shutdown_timeout_ms)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive such as `info` or `command_core=debug`
    pub level: Option<String>,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

fn require_positive(field: &str, value: u64) -> ConfigResult<()> {
    if value == 0 {
        return Err(ConfigurationError::invalid_value(
            field,
            value,
            "must be greater than zero",
        ));
    }
    Ok(())
}
