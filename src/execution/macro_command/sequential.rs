//! Sequential macro command: members run back-to-back, each consuming the
//! previous member's result as its redo-input.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{info, warn};

use super::{expect_contexts, failure_of, undo_in_reverse, MacroMember};
use crate::error::{CommandError, CommandResult};
use crate::execution::command::Command;
use crate::execution::context::{Context, Input};
use crate::logging::log_command_operation;

pub struct SequentialMacroCommand {
    command_id: String,
    members: Vec<MacroMember>,
}

impl SequentialMacroCommand {
    pub fn new(command_id: impl Into<String>, members: Vec<MacroMember>) -> Self {
        Self {
            command_id: command_id.into(),
            members,
        }
    }

    pub fn members(&self) -> &[MacroMember] {
        &self.members
    }

    /// First member is prepared from the macro input; the others start in
    /// `Init` and receive their input from the member before them.
    async fn build_nested(&self, input: &Input) -> VecDeque<Context> {
        let mut nested = VecDeque::with_capacity(self.members.len());
        for (index, member) in self.members.iter().enumerate() {
            if index == 0 {
                nested.push_back(member.prepare_nested_context(input).await);
            } else {
                nested.push_back(Context::new(member.command_id()));
            }
        }
        nested
    }
}

#[async_trait]
impl Command for SequentialMacroCommand {
    fn command_id(&self) -> &str {
        &self.command_id
    }

    async fn create_context(&self, input: Input) -> Context {
        if self.members.is_empty() {
            return Context::failed(
                &self.command_id,
                input,
                CommandError::validation(format!("{} has no members", self.command_id)),
            );
        }

        let nested = self.build_nested(&input).await;
        Context::with_input(&self.command_id, Input::Contexts(nested))
    }

    async fn execute_do(&self, context: &mut Context) -> CommandResult<()> {
        let mut pending = match context.take_redo_input() {
            input @ Input::Contexts(_) => {
                expect_contexts(&self.command_id, input, self.members.len())?
            }
            other => self.build_nested(&other).await,
        };

        info!(
            macro_id = %self.command_id,
            members = self.members.len(),
            "Starting sequential macro command"
        );

        let mut executed = VecDeque::with_capacity(self.members.len());
        let mut previous: Option<Value> = None;
        let mut failure = None;

        for (index, member) in self.members.iter().enumerate() {
            let Some(mut nested) = pending.pop_front() else {
                break;
            };

            if index > 0 {
                member.transfer_result(previous.as_ref(), &mut nested);
            }

            let slot: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
            let sink = Arc::clone(&slot);
            let listener = nested.add_state_listener(move |ctx, change| {
                if change.is_completion() {
                    *sink.lock() = ctx.result().cloned();
                }
            });

            member.execute_as_nested(&mut nested).await;
            nested.remove_state_listener(listener);

            let member_failure = failure_of(&nested);
            executed.push_back(nested);

            if let Some(error) = member_failure {
                warn!(
                    macro_id = %self.command_id,
                    member = index,
                    error = %error,
                    "Sequential member failed, stopping"
                );
                failure = Some(error);
                break;
            }

            previous = slot.lock().take();
        }

        if let Some(error) = failure {
            if let Some(undo_error) =
                undo_in_reverse(&self.command_id, &self.members, &mut executed).await
            {
                warn!(
                    macro_id = %self.command_id,
                    error = %undo_error,
                    "Rollback after sequential failure was incomplete"
                );
            }
            context.set_undo_input(Input::Contexts(executed));
            return Err(error);
        }

        log_command_operation(
            "sequential_macro",
            &self.command_id,
            "done",
            Some(&format!("{} members", self.members.len())),
        );
        context.set_result(previous);
        context.set_undo_input(Input::Contexts(executed));
        Ok(())
    }

    async fn execute_undo(&self, context: &mut Context) -> CommandResult<()> {
        let input = context.take_undo_input();
        let mut executed = match input {
            Input::Contexts(contexts) if contexts.len() <= self.members.len() => contexts,
            other => {
                context.set_undo_input(other);
                return Err(CommandError::validation(format!(
                    "{} undo-input does not match its members",
                    self.command_id
                )));
            }
        };

        let failure = undo_in_reverse(&self.command_id, &self.members, &mut executed).await;
        context.set_undo_input(Input::Contexts(executed));

        match failure {
            Some(error) => Err(error),
            None => {
                context.set_result(None);
                Ok(())
            }
        }
    }
}
