//! # System Constants
//!
//! Defaults and names shared by the command engine, the exchange and the
//! configuration loader.

/// Environment variable names
pub mod env {
    pub const COMMAND_CORE_ENV: &str = "COMMAND_CORE_ENV";
    pub const APP_ENV: &str = "APP_ENV";
    /// Prefix of configuration overrides, e.g. `COMMAND_CORE__EXCHANGE__DISPATCH_WORKERS`
    pub const CONFIG_PREFIX: &str = "COMMAND_CORE";
    pub const CONFIG_SEPARATOR: &str = "__";
}

/// Default capacities and timings
pub mod defaults {
    pub const REQUEST_QUEUE_CAPACITY: usize = 1024;
    pub const RESPONSE_QUEUE_CAPACITY: usize = 1024;
    pub const DISPATCH_WORKERS: usize = 8;
    pub const START_TIMEOUT_MS: u64 = 5_000;
    pub const SHUTDOWN_TIMEOUT_MS: u64 = 5_000;
    pub const MAX_PARALLEL_WORKERS: usize = 16;
    pub const MACRO_SHUTDOWN_TIMEOUT_MS: u64 = 5_000;
}

/// Names used in logs and worker pools
pub mod components {
    pub const EXCHANGE: &str = "command_exchange";
    pub const REQUEST_PROCESSOR: &str = "exchange-requests";
    pub const RESPONSE_PROCESSOR: &str = "exchange-responses";
    pub const EXCHANGE_POOL: &str = "exchange-workers";
    /// Worker slots reserved for the two processor loops
    pub const PROCESSOR_LOOPS: usize = 2;
}
