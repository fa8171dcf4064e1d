//! # Command Context
//!
//! Per-invocation state holder driven by a [`Command`](super::Command):
//! redo-input, undo-input, result, captured error and the current
//! [`ContextState`]. Listeners registered on a context are notified
//! synchronously after every successful transition.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, warn};

use crate::error::CommandError;
use crate::state_machine::{ContextState, StateChange, StateMachineResult};

/// Input carried by a context in either direction
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Input {
    /// Nothing supplied
    #[default]
    Empty,
    /// A plain value: an entity payload, an id, a previous result
    Value(Value),
    /// Nested contexts owned by a macro command, in member order
    Contexts(VecDeque<Context>),
}

impl Input {
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Value(Value::Null) => true,
            Self::Value(_) => false,
            Self::Contexts(contexts) => contexts.is_empty(),
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_contexts(&self) -> Option<&VecDeque<Context>> {
        match self {
            Self::Contexts(contexts) => Some(contexts),
            _ => None,
        }
    }
}

impl From<Value> for Input {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// Handle returned by [`Context::add_state_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type StateListener = Box<dyn Fn(&Context, &StateChange) + Send + Sync>;

/// Per-invocation state of a command
#[derive(Serialize, Deserialize)]
pub struct Context {
    command_id: String,
    state: ContextState,
    redo_input: Input,
    undo_input: Input,
    result: Option<Value>,
    error: Option<CommandError>,
    #[serde(skip)]
    listeners: Vec<(ListenerId, StateListener)>,
    #[serde(skip)]
    next_listener_id: u64,
}

impl Context {
    /// Create a context in `Init` for the given command
    pub fn new(command_id: impl Into<String>) -> Self {
        Self {
            command_id: command_id.into(),
            state: ContextState::Init,
            redo_input: Input::Empty,
            undo_input: Input::Empty,
            result: None,
            error: None,
            listeners: Vec::new(),
            next_listener_id: 0,
        }
    }

    /// Create a context already carrying its redo-input, in `Ready`
    pub fn with_input(command_id: impl Into<String>, input: Input) -> Self {
        let mut context = Self::new(command_id);
        context.redo_input = input;
        context.state = ContextState::Ready;
        context
    }

    /// Create a context that failed before execution (e.g. rejected input)
    pub fn failed(command_id: impl Into<String>, input: Input, error: CommandError) -> Self {
        let mut context = Self::new(command_id);
        context.redo_input = input;
        context.error = Some(error);
        context.state = ContextState::Fail;
        context
    }

    pub fn command_id(&self) -> &str {
        &self.command_id
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn redo_input(&self) -> &Input {
        &self.redo_input
    }

    pub fn undo_input(&self) -> &Input {
        &self.undo_input
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&CommandError> {
        self.error.as_ref()
    }

    pub fn is_done(&self) -> bool {
        self.state == ContextState::Done
    }

    pub fn is_undone(&self) -> bool {
        self.state == ContextState::Undone
    }

    pub fn is_failed(&self) -> bool {
        self.state == ContextState::Fail
    }

    /// Replace the redo-input; moves `Init` to `Ready`
    pub fn set_redo_input(&mut self, input: Input) -> StateMachineResult<()> {
        let target = self.state.validate_transition(ContextState::Ready)?;
        self.redo_input = input;
        self.apply(target);
        Ok(())
    }

    /// Take the redo-input out of the context, leaving `Input::Empty`
    pub fn take_redo_input(&mut self) -> Input {
        std::mem::take(&mut self.redo_input)
    }

    pub fn set_undo_input(&mut self, input: Input) {
        self.undo_input = input;
    }

    /// Take the undo-input out of the context, leaving `Input::Empty`
    pub fn take_undo_input(&mut self) -> Input {
        std::mem::take(&mut self.undo_input)
    }

    pub fn set_result(&mut self, result: Option<Value>) {
        self.result = result;
    }

    /// Move the context to a new state, notifying listeners
    pub fn transition(&mut self, to: ContextState) -> StateMachineResult<()> {
        let target = self.state.validate_transition(to)?;
        self.apply(target);
        Ok(())
    }

    /// Record a failure and move to `Fail`
    ///
    /// A context already in `Fail` keeps the error it was first failed with.
    pub fn fail(&mut self, error: CommandError) {
        if self.state == ContextState::Fail {
            warn!(
                command_id = %self.command_id,
                kept = %self.error.as_ref().map(|e| e.to_string()).unwrap_or_default(),
                dropped = %error,
                "Context already failed, keeping first error"
            );
            if self.error.is_none() {
                self.error = Some(error);
            }
            return;
        }

        self.error = Some(error);
        self.apply(ContextState::Fail);
    }

    /// Register a listener notified after every transition of this context
    pub fn add_state_listener<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&Context, &StateChange) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener; returns false when it was not registered
    pub fn remove_state_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        before != self.listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn apply(&mut self, to: ContextState) {
        let change = StateChange::new(self.state, to);
        self.state = to;

        debug!(
            command_id = %self.command_id,
            from = %change.from,
            to = %change.to,
            "Context transition"
        );

        for (_, listener) in &self.listeners {
            listener(self, &change);
        }
    }
}

impl Clone for Context {
    /// Listeners belong to one driver and are not carried over
    fn clone(&self) -> Self {
        Self {
            command_id: self.command_id.clone(),
            state: self.state,
            redo_input: self.redo_input.clone(),
            undo_input: self.undo_input.clone(),
            result: self.result.clone(),
            error: self.error.clone(),
            listeners: Vec::new(),
            next_listener_id: 0,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("command_id", &self.command_id)
            .field("state", &self.state)
            .field("redo_input", &self.redo_input)
            .field("undo_input", &self.undo_input)
            .field("result", &self.result)
            .field("error", &self.error)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
