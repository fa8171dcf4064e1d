use crate::error::CommandError;
use thiserror::Error;

use super::states::ContextState;

/// Errors raised when a context is driven through an illegal transition
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateMachineError {
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: ContextState, to: ContextState },

    #[error("Context for {command_id} is not ready: state is {state}")]
    NotReady {
        command_id: String,
        state: ContextState,
    },
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;

impl From<StateMachineError> for CommandError {
    fn from(error: StateMachineError) -> Self {
        CommandError::validation(error.to_string())
    }
}
