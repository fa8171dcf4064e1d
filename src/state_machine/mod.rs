//! # Context State Machine
//!
//! States, transition table and change notifications for command contexts.
//! Every context moves through the same table; commands and macro commands
//! drive it, listeners observe it.

pub mod errors;
pub mod events;
pub mod states;

pub use errors::{StateMachineError, StateMachineResult};
pub use events::StateChange;
pub use states::ContextState;
