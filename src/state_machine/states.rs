use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::{StateMachineError, StateMachineResult};

/// Lifecycle states of a command context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContextState {
    /// Created without input
    #[default]
    Init,
    /// Input present, waiting for `do_command`
    Ready,
    /// Business logic is running (either direction)
    Work,
    /// Do-direction finished successfully
    Done,
    /// Undo-direction finished successfully
    Undone,
    /// Either direction failed; the context carries the error
    Fail,
}

impl ContextState {
    /// States from which `do_command` may start
    pub fn accepts_do(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// States from which `undo_command` may start
    pub fn accepts_undo(&self) -> bool {
        matches!(self, Self::Done | Self::Fail)
    }

    /// Terminal for the current execution direction
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Undone | Self::Fail)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Work)
    }

    /// Validate a transition against the context transition table
    pub fn validate_transition(self, to: ContextState) -> StateMachineResult<ContextState> {
        let allowed = match (self, to) {
            (Self::Init, Self::Ready) => true,
            (Self::Ready, Self::Ready) => true,
            (Self::Ready, Self::Work) => true,
            (Self::Done, Self::Work) => true,
            (Self::Fail, Self::Work) => true,
            (Self::Work, Self::Done) => true,
            (Self::Work, Self::Undone) => true,
            (from, Self::Fail) => from != Self::Fail,
            _ => false,
        };

        if allowed {
            Ok(to)
        } else {
            Err(StateMachineError::InvalidTransition { from: self, to })
        }
    }
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::Ready => write!(f, "ready"),
            Self::Work => write!(f, "work"),
            Self::Done => write!(f, "done"),
            Self::Undone => write!(f, "undone"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

impl std::str::FromStr for ContextState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(Self::Init),
            "ready" => Ok(Self::Ready),
            "work" => Ok(Self::Work),
            "done" => Ok(Self::Done),
            "undone" => Ok(Self::Undone),
            "fail" => Ok(Self::Fail),
            _ => Err(format!("Invalid context state: {s}")),
        }
    }
}
