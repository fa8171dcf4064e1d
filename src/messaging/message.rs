//! # Command Message Envelope
//!
//! Carries a command context between the submitting caller, the request
//! processor and the response processor. The correlation id links the
//! envelope to the watchdog its caller waits on and is never lost, even when
//! the message is failed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::error::CommandError;
use crate::execution::{Command, Context, Input};

/// Which leg of the exchange the message is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    Request,
    Response,
}

impl fmt::Display for MessageDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => write!(f, "request"),
            Self::Response => write!(f, "response"),
        }
    }
}

/// How the response reached its watchdog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Through the response processor
    #[default]
    Normal,
    /// Completed directly by the request side after the response queue refused it
    Degraded,
}

/// Metadata for command messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Unique id of this envelope
    pub message_id: Uuid,
    /// When the message was created
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub direction: MessageDirection,
    pub delivery: DeliveryMode,
    /// Number of times the message was handed to a queue
    pub attempts: u32,
}

impl Default for MessageMetadata {
    fn default() -> Self {
        Self {
            message_id: Uuid::new_v4(),
            created_at: chrono::Utc::now(),
            direction: MessageDirection::Request,
            delivery: DeliveryMode::Normal,
            attempts: 0,
        }
    }
}

/// Envelope `{correlation_id, command_id, context, metadata}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandMessage {
    pub correlation_id: String,
    pub command_id: String,
    pub context: Context,
    pub metadata: MessageMetadata,
}

impl CommandMessage {
    /// Wrap an existing context
    pub fn new(correlation_id: impl Into<String>, context: Context) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            command_id: context.command_id().to_string(),
            context,
            metadata: MessageMetadata::default(),
        }
    }

    /// Build a message from an input and a freshly created context
    ///
    /// A missing correlation id is generated.
    pub async fn for_command(
        correlation_id: Option<String>,
        command: &dyn Command,
        input: Input,
    ) -> Self {
        let correlation_id = correlation_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let context = command.create_context(input).await;
        Self::new(correlation_id, context)
    }

    /// Turn this request into the response carrying the same correlation id
    pub fn into_response(mut self) -> Self {
        self.metadata.direction = MessageDirection::Response;
        self
    }

    /// Record a failure on the carried context
    pub fn fail(&mut self, error: CommandError) {
        self.context.fail(error);
    }

    pub fn mark_degraded(&mut self) {
        self.metadata.delivery = DeliveryMode::Degraded;
    }

    pub fn record_attempt(&mut self) {
        self.metadata.attempts = self.metadata.attempts.saturating_add(1);
    }

    pub fn is_failed(&self) -> bool {
        self.context.is_failed()
    }

    pub fn is_degraded(&self) -> bool {
        self.metadata.delivery == DeliveryMode::Degraded
    }

    pub fn result(&self) -> Option<&Value> {
        self.context.result()
    }

    pub fn error(&self) -> Option<&CommandError> {
        self.context.error()
    }

    /// Convert to JSON for an external transport
    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Parse from JSON received over an external transport
    pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::ContextState;
    use serde_json::json;

    #[test]
    fn test_new_message_is_request() {
        let message = CommandMessage::new(
            "c-1",
            Context::with_input("course:create", Input::value(json!({"name": "Algebra"}))),
        );

        assert_eq!(message.command_id, "course:create");
        assert_eq!(message.metadata.direction, MessageDirection::Request);
        assert_eq!(message.metadata.delivery, DeliveryMode::Normal);
        assert_eq!(message.metadata.attempts, 0);
    }

    #[test]
    fn test_fail_keeps_correlation_id() {
        let mut message = CommandMessage::new("c-7", Context::with_input("x", Input::value(1)));
        message.fail(CommandError::not_found("command", "x"));

        assert!(message.is_failed());
        assert_eq!(message.correlation_id, "c-7");
        assert_eq!(message.context.state(), ContextState::Fail);
    }

    #[test]
    fn test_into_response_preserves_identity() {
        let message = CommandMessage::new("c-2", Context::with_input("x", Input::value(1)));
        let message_id = message.metadata.message_id;
        let response = message.into_response();

        assert_eq!(response.metadata.direction, MessageDirection::Response);
        assert_eq!(response.metadata.message_id, message_id);
        assert_eq!(response.correlation_id, "c-2");
    }

    #[test]
    fn test_json_shape() {
        let message = CommandMessage::new("c-3", Context::with_input("x", Input::value(5)));
        let json = message.to_json().unwrap();

        assert_eq!(json["correlation_id"], "c-3");
        assert_eq!(json["command_id"], "x");
        assert_eq!(json["context"]["state"], "ready");
        assert_eq!(json["context"]["redo_input"]["data"], 5);

        let parsed = CommandMessage::from_json(json).unwrap();
        assert_eq!(parsed.correlation_id, "c-3");
    }
}
