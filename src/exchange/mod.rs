//! # Message Exchange
//!
//! Correlation-id based request/response exchange on top of the command
//! engine: watchdogs, their registry, the processor loop and the executor
//! tying them together.

pub mod executor;
pub mod handlers;
pub mod processor;
pub mod registry;
pub mod watchdog;

pub use executor::{CommandExchangeExecutor, ExchangeStats};
pub use handlers::{RequestHandler, ResponseHandler};
pub use processor::{
    channel, ChannelSink, ChannelSource, DispatchMode, MessageHandler, MessageSink, MessageSource,
    Processor, ProcessorError, ProcessorSignal, Rejected,
};
pub use registry::ExchangeRegistry;
pub use watchdog::{Watchdog, WatchdogState};
