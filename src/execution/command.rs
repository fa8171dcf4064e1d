//! # Reversible Command Contract
//!
//! Every business operation implements [`Command`]: a factory for its
//! [`Context`], the do/undo business logic, and the nested-execution hooks a
//! macro command uses to compose it. The provided `do_command` and
//! `undo_command` methods own the state machine; implementors only write
//! `execute_do` and `execute_undo`.
//!
//! Failures never escape `do_command`/`undo_command`. Returned errors and
//! panics alike are captured into the context, which ends in `Fail`.

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tracing::{debug, warn};

use crate::error::{CommandError, CommandResult};
use crate::execution::context::{Context, Input};
use crate::state_machine::{ContextState, StateMachineError};

#[async_trait]
pub trait Command: Send + Sync {
    /// Stable identifier, e.g. `course:create`
    fn command_id(&self) -> &str;

    /// Build a context for this command from its input
    ///
    /// Implementations that validate input return a failed context
    /// ([`Context::failed`]) instead of an error.
    async fn create_context(&self, input: Input) -> Context {
        Context::with_input(self.command_id(), input)
    }

    /// Business logic of the do-direction
    ///
    /// Runs with the context in `Work`. Store the result with
    /// [`Context::set_result`] and whatever is needed to reverse the work with
    /// [`Context::set_undo_input`].
    async fn execute_do(&self, context: &mut Context) -> CommandResult<()>;

    /// Business logic of the undo-direction, reading the undo-input
    async fn execute_undo(&self, context: &mut Context) -> CommandResult<()>;

    /// Drive `context` from `Ready` to `Done` or `Fail`
    async fn do_command(&self, context: &mut Context) {
        if !context.state().accepts_do() {
            if context.is_failed() && context.error().is_some() {
                debug!(
                    command_id = %self.command_id(),
                    "Context failed before execution, keeping its error"
                );
                return;
            }
            let error = StateMachineError::NotReady {
                command_id: self.command_id().to_string(),
                state: context.state(),
            };
            warn!(command_id = %self.command_id(), error = %error, "do_command rejected");
            context.fail(error.into());
            return;
        }

        if let Err(error) = context.transition(ContextState::Work) {
            context.fail(error.into());
            return;
        }

        let outcome = AssertUnwindSafe(self.execute_do(context))
            .catch_unwind()
            .await;
        settle(self.command_id(), "do", context, outcome, ContextState::Done);
    }

    /// Drive a `Done` or `Fail` context back to `Undone`, or to `Fail`
    async fn undo_command(&self, context: &mut Context) {
        if !context.state().accepts_undo() {
            let error = CommandError::validation(format!(
                "cannot undo {} from state {}",
                self.command_id(),
                context.state()
            ));
            warn!(command_id = %self.command_id(), error = %error, "undo_command rejected");
            context.fail(error);
            return;
        }

        if context.undo_input().is_empty() {
            let error = CommandError::validation(format!(
                "nothing to undo for {}",
                self.command_id()
            ));
            warn!(command_id = %self.command_id(), error = %error, "undo_command rejected");
            context.fail(error);
            return;
        }

        if let Err(error) = context.transition(ContextState::Work) {
            context.fail(error.into());
            return;
        }

        let outcome = AssertUnwindSafe(self.execute_undo(context))
            .catch_unwind()
            .await;
        settle(self.command_id(), "undo", context, outcome, ContextState::Undone);
    }

    /// Build the nested context this command runs with inside a macro
    ///
    /// Override when the nested input must be derived from the macro input,
    /// e.g. resolving a related id before the context can be created.
    async fn prepare_nested_context(&self, macro_input: &Input) -> Context {
        self.create_context(macro_input.clone()).await
    }

    /// Feed the previous member's result into this command's nested context
    ///
    /// A member that finished without a result hands on `Input::Empty`, so
    /// the target still becomes `Ready`.
    fn transfer_result(&self, previous_result: Option<&Value>, target: &mut Context) {
        let input = previous_result.cloned().map_or(Input::Empty, Input::Value);
        if let Err(error) = target.set_redo_input(input) {
            target.fail(error.into());
        }
    }

    /// Execute this command as a member of a macro command
    async fn execute_as_nested(&self, context: &mut Context) {
        self.do_command(context).await;
    }
}

/// Record the outcome of an execution direction into the context
fn settle(
    command_id: &str,
    direction: &'static str,
    context: &mut Context,
    outcome: Result<CommandResult<()>, Box<dyn Any + Send>>,
    success: ContextState,
) {
    match outcome {
        Ok(Ok(())) => {
            if context.state() == ContextState::Work {
                if let Err(error) = context.transition(success) {
                    context.fail(error.into());
                }
            }
            debug!(
                command_id = %command_id,
                direction = direction,
                state = %context.state(),
                "Command execution finished"
            );
        }
        Ok(Err(error)) => {
            warn!(
                command_id = %command_id,
                direction = direction,
                error_kind = error.kind(),
                error = %error,
                "Command execution failed"
            );
            context.fail(error);
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            warn!(
                command_id = %command_id,
                direction = direction,
                panic = %message,
                "Command execution panicked"
            );
            context.fail(CommandError::unknown(message));
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "command panicked".to_string()
    }
}
