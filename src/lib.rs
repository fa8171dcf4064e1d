#![allow(clippy::doc_markdown)] // Allow technical terms in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Command Core
//!
//! Reversible command execution engine with macro composition and an
//! asynchronous, correlation-id based message exchange.
//!
//! ## Overview
//!
//! Every business operation is a [`Command`](execution::Command) driving a
//! [`Context`](execution::Context) through one state machine:
//! `INIT → READY → WORK → DONE | FAIL`, and back from `DONE`/`FAIL` through
//! `WORK` to `UNDONE` on undo. Failures are captured into the context, never
//! raised past `do_command`/`undo_command`.
//!
//! Commands compose into macro commands that run their members sequentially
//! (each member consuming the previous result) or in parallel on a bounded
//! worker pool, rolling back completed members when one fails.
//!
//! The [`CommandExchangeExecutor`](exchange::CommandExchangeExecutor) decouples
//! submission from completion: a request processor executes commands, a
//! response processor completes the watchdog the caller waits on.
//!
//! ## Module Organization
//!
//! - [`state_machine`] - Context states, transitions and change events
//! - [`execution`] - Context, command contract, macro commands, worker pool, command registry
//! - [`messaging`] - Command message envelope
//! - [`exchange`] - Watchdogs, correlation registry, processors and the exchange executor
//! - [`persistence`] - Repository and payload-mapper collaborators
//! - [`commands`] - Generic reversible entity commands
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging bootstrap
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use command_core::commands::CreateEntityCommand;
//! use command_core::config::ExchangeConfig;
//! use command_core::exchange::CommandExchangeExecutor;
//! use command_core::execution::{CommandRegistry, Input};
//! use command_core::persistence::{Entity, InMemoryRepository};
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
//! struct Course {
//!     id: Option<i64>,
//!     name: String,
//! }
//!
//! impl Entity for Course {
//!     const KIND: &'static str = "course";
//!     fn id(&self) -> Option<i64> { self.id }
//!     fn set_id(&mut self, id: i64) { self.id = Some(id); }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let courses = Arc::new(InMemoryRepository::<Course>::new());
//! let commands = Arc::new(CommandRegistry::new());
//! commands.register(Arc::new(CreateEntityCommand::<Course>::new("course:create", courses)));
//!
//! let exchange = CommandExchangeExecutor::new(ExchangeConfig::default(), commands);
//! exchange.start().await?;
//!
//! let response = exchange
//!     .submit("course:create", Input::value(serde_json::json!({"name": "Algebra"})), Some("c-1".into()))
//!     .await?;
//! assert!(response.context.is_done());
//!
//! exchange.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! Unit tests live next to the code; integration tests under `tests/` cover
//! macro rollback, processor shutdown and the exchange end to end.

pub mod commands;
pub mod config;
pub mod constants;
pub mod error;
pub mod exchange;
pub mod execution;
pub mod logging;
pub mod messaging;
pub mod persistence;
pub mod state_machine;

pub use error::{CommandError, CommandResult};
pub use execution::{Command, Context, Input};
