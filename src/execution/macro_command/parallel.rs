//! Parallel macro command: members run concurrently on a shared worker pool.
//!
//! Every nested context is prepared up front from the same macro input. When
//! any member fails, every member that reached `Done` is undone before the
//! macro context settles in `Fail`.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::{expect_contexts, failure_of, undo_concurrently, MacroMember};
use crate::config::MacroCommandConfig;
use crate::constants::defaults;
use crate::error::{CommandError, CommandResult};
use crate::execution::command::Command;
use crate::execution::context::{Context, Input};
use crate::execution::worker_pool::{WorkerPool, WorkerPoolError};
use crate::logging::log_command_operation;

pub struct ParallelMacroCommand {
    command_id: String,
    members: Vec<MacroMember>,
    pool: Arc<WorkerPool>,
    shutdown_timeout: Duration,
}

impl ParallelMacroCommand {
    /// Build a macro running its members on an existing long-lived pool
    pub fn new(
        command_id: impl Into<String>,
        members: Vec<MacroMember>,
        pool: Arc<WorkerPool>,
    ) -> Self {
        Self {
            command_id: command_id.into(),
            members,
            pool,
            shutdown_timeout: Duration::from_millis(defaults::MACRO_SHUTDOWN_TIMEOUT_MS),
        }
    }

    /// Build a macro with its own pool, one worker per member up to the configured bound
    pub fn with_config(
        command_id: impl Into<String>,
        members: Vec<MacroMember>,
        config: &MacroCommandConfig,
    ) -> Self {
        let command_id = command_id.into();
        let pool = WorkerPool::for_members(
            format!("{command_id}-workers"),
            members.len(),
            config.max_parallel_workers,
        );
        let mut command = Self::new(command_id, members, Arc::new(pool));
        command.shutdown_timeout = config.shutdown_timeout();
        command
    }

    pub fn members(&self) -> &[MacroMember] {
        &self.members
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// How long `shutdown` waits for in-flight members
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Tear down the worker pool; call once at component shutdown
    pub async fn shutdown(&self) -> Result<(), WorkerPoolError> {
        self.pool.shutdown(self.shutdown_timeout).await
    }

    async fn build_nested(&self, input: &Input) -> VecDeque<Context> {
        let mut nested = VecDeque::with_capacity(self.members.len());
        for member in &self.members {
            nested.push_back(member.prepare_nested_context(input).await);
        }
        nested
    }

    /// Run every nested context on the pool and join them all, in member order
    async fn run_members(&self, pending: VecDeque<Context>) -> VecDeque<Context> {
        let mut joins = Vec::with_capacity(pending.len());

        for (member, mut nested) in self.members.iter().zip(pending) {
            let fallback = nested.clone();
            let worker_member = Arc::clone(member);
            let handle = self.pool.spawn(async move {
                worker_member.execute_as_nested(&mut nested).await;
                nested
            });
            joins.push((handle, fallback));
        }

        let mut settled = VecDeque::with_capacity(joins.len());
        for (handle, mut fallback) in joins {
            let nested = match handle {
                Ok(handle) => match handle.await {
                    Ok(nested) => nested,
                    Err(join_error) => {
                        fallback.fail(CommandError::unknown(format!(
                            "nested worker aborted: {join_error}"
                        )));
                        fallback
                    }
                },
                Err(pool_error) => {
                    fallback.fail(pool_error.into());
                    fallback
                }
            };
            settled.push_back(nested);
        }

        settled
    }
}

#[async_trait]
impl Command for ParallelMacroCommand {
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
        let pending = match context.take_redo_input() {
            input @ Input::Contexts(_) => {
                expect_contexts(&self.command_id, input, self.members.len())?
            }
            other => self.build_nested(&other).await,
        };

        info!(
            macro_id = %self.command_id,
            members = self.members.len(),
            pool = %self.pool.name(),
            "Starting parallel macro command"
        );

        let settled = self.run_members(pending).await;

        if let Some((index, error)) = settled
            .iter()
            .enumerate()
            .find_map(|(index, nested)| failure_of(nested).map(|error| (index, error)))
        {
            warn!(
                macro_id = %self.command_id,
                member = index,
                error = %error,
                "Parallel member failed, rolling back completed members"
            );

            let (rolled_back, undo_failure) =
                undo_concurrently(&self.command_id, &self.pool, &self.members, settled).await;
            if let Some(undo_error) = undo_failure {
                warn!(
                    macro_id = %self.command_id,
                    error = %undo_error,
                    "Rollback after parallel failure was incomplete"
                );
            }

            context.set_undo_input(Input::Contexts(rolled_back));
            return Err(error);
        }

        let results: Vec<Value> = settled
            .iter()
            .map(|nested| nested.result().cloned().unwrap_or(Value::Null))
            .collect();

        log_command_operation(
            "parallel_macro",
            &self.command_id,
            "done",
            Some(&format!("{} members", self.members.len())),
        );
        context.set_result(Some(Value::Array(results)));
        context.set_undo_input(Input::Contexts(settled));
        Ok(())
    }

    async fn execute_undo(&self, context: &mut Context) -> CommandResult<()> {
        let nested = match context.take_undo_input() {
            Input::Contexts(contexts) if contexts.len() == self.members.len() => contexts,
            other => {
                context.set_undo_input(other);
                return Err(CommandError::validation(format!(
                    "{} undo-input does not match its members",
                    self.command_id
                )));
            }
        };

        let (undone, failure) =
            undo_concurrently(&self.command_id, &self.pool, &self.members, nested).await;
        context.set_undo_input(Input::Contexts(undone));

        match failure {
            Some(error) => Err(error),
            None => {
                context.set_result(None);
                Ok(())
            }
        }
    }
}
