//! # Messaging
//!
//! The envelope exchanged between the command submitter and the exchange
//! processors.

pub mod message;

pub use message::{CommandMessage, DeliveryMode, MessageDirection, MessageMetadata};
