use serde::{Deserialize, Serialize};

use super::states::ContextState;

/// Notification delivered to context listeners after every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub from: ContextState,
    pub to: ContextState,
}

impl StateChange {
    pub fn new(from: ContextState, to: ContextState) -> Self {
        Self { from, to }
    }

    /// True when this change finished a do-direction execution successfully
    pub fn is_completion(&self) -> bool {
        self.from == ContextState::Work && self.to == ContextState::Done
    }

    /// True when this change recorded a failure
    pub fn is_failure(&self) -> bool {
        self.to == ContextState::Fail
    }
}
