//! # Command Error Types
//!
//! Structured error taxonomy shared by the command engine, the macro composer
//! and the message exchange. Every failure a caller can observe is one of
//! these variants, either captured inside a [`Context`](crate::execution::Context)
//! or returned synchronously by the exchange at admission time.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors recorded into contexts and surfaced by the exchange
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Concurrency error: {message}")]
    Concurrency { message: String },

    #[error("Interrupted: {message}")]
    Interrupted { message: String },

    #[error("Correlation {correlation_id} expired after {waited_ms}ms")]
    Expired {
        correlation_id: String,
        waited_ms: u64,
    },

    #[error("Persistence error: {operation}: {message}")]
    Persistence { operation: String, message: String },

    #[error("Unknown error: {message}")]
    Unknown { message: String },
}

impl CommandError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not-found error for an entity kind and id
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Create a conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create a concurrency error
    pub fn concurrency(message: impl Into<String>) -> Self {
        Self::Concurrency {
            message: message.into(),
        }
    }

    /// Create an interruption error
    pub fn interrupted(message: impl Into<String>) -> Self {
        Self::Interrupted {
            message: message.into(),
        }
    }

    /// Create an expiry error for a correlation id
    pub fn expired(correlation_id: impl Into<String>, waited_ms: u64) -> Self {
        Self::Expired {
            correlation_id: correlation_id.into(),
            waited_ms,
        }
    }

    /// Create a persistence error
    pub fn persistence(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Persistence {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create an unknown error
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown {
            message: message.into(),
        }
    }

    /// Short machine-readable name of the error kind, used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::Concurrency { .. } => "concurrency",
            Self::Interrupted { .. } => "interrupted",
            Self::Expired { .. } => "expired",
            Self::Persistence { .. } => "persistence",
            Self::Unknown { .. } => "unknown",
        }
    }

    /// Whether resubmitting the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Concurrency { .. }
                | Self::Interrupted { .. }
                | Self::Expired { .. }
                | Self::Persistence { .. }
        )
    }
}

impl From<serde_json::Error> for CommandError {
    fn from(error: serde_json::Error) -> Self {
        Self::validation(format!("payload could not be mapped: {error}"))
    }
}

pub type CommandResult<T> = std::result::Result<T, CommandError>;
