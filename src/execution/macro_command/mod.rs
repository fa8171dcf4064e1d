//! # Macro Commands
//!
//! Commands composed of an ordered, fixed set of member commands. The macro
//! context owns one nested context per member as its redo-input
//! (`Input::Contexts`, in member order) and, after execution, as its
//! undo-input. Nested contexts never point back at the macro context.
//!
//! - [`SequentialMacroCommand`] chains members, feeding each result forward.
//! - [`ParallelMacroCommand`] runs members concurrently on a long-lived
//!   [`WorkerPool`] and rolls back the completed ones when any member fails.

pub mod parallel;
pub mod sequential;

pub use parallel::ParallelMacroCommand;
pub use sequential::SequentialMacroCommand;

use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{CommandError, CommandResult};
use crate::execution::command::Command;
use crate::execution::context::{Context, Input};
use crate::execution::worker_pool::WorkerPool;

/// A macro member, shared between the macro and the workers running it
pub type MacroMember = Arc<dyn Command>;

/// Error captured by a failed context, or a generic one if none was recorded
pub(crate) fn failure_of(context: &Context) -> Option<CommandError> {
    if !context.is_failed() {
        return None;
    }
    Some(context.error().cloned().unwrap_or_else(|| {
        CommandError::unknown(format!("{} failed without an error", context.command_id()))
    }))
}

/// Unwrap the nested contexts carried by a macro input
pub(crate) fn expect_contexts(
    macro_id: &str,
    input: Input,
    member_count: usize,
) -> CommandResult<VecDeque<Context>> {
    let contexts = match input {
        Input::Contexts(contexts) => contexts,
        other => {
            return Err(CommandError::validation(format!(
                "{macro_id} expected nested contexts, got {}",
                input_kind(&other)
            )))
        }
    };

    if contexts.len() != member_count {
        return Err(CommandError::validation(format!(
            "{macro_id} has {member_count} members but {} nested contexts",
            contexts.len()
        )));
    }

    Ok(contexts)
}

fn input_kind(input: &Input) -> &'static str {
    match input {
        Input::Empty => "empty input",
        Input::Value(_) => "a value",
        Input::Contexts(_) => "nested contexts",
    }
}

/// Undo every `Done` nested context, last member first
///
/// Keeps going after a failed undo and returns the first failure.
pub(crate) async fn undo_in_reverse(
    macro_id: &str,
    members: &[MacroMember],
    contexts: &mut VecDeque<Context>,
) -> Option<CommandError> {
    let mut first_failure = None;

    for (index, nested) in contexts.iter_mut().enumerate().rev() {
        if !nested.is_done() {
            debug!(
                macro_id = %macro_id,
                member = index,
                state = %nested.state(),
                "Skipping undo of member"
            );
            continue;
        }

        members[index].undo_command(nested).await;

        if let Some(error) = failure_of(nested) {
            warn!(
                macro_id = %macro_id,
                member = index,
                command_id = %nested.command_id(),
                error = %error,
                "Undo of macro member failed, continuing rollback"
            );
            first_failure.get_or_insert(error);
        }
    }

    first_failure
}

enum PendingUndo {
    Skipped(Context),
    Inline(Context),
    Spawned(tokio::task::JoinHandle<Context>, Context),
}

/// Undo every `Done` nested context concurrently on the pool
///
/// Returns once all undos have finished, with the contexts back in member
/// order and the first failure in member order. Members the pool refuses
/// are undone inline so the rollback always completes.
pub(crate) async fn undo_concurrently(
    macro_id: &str,
    pool: &WorkerPool,
    members: &[MacroMember],
    contexts: VecDeque<Context>,
) -> (VecDeque<Context>, Option<CommandError>) {
    let mut pending = Vec::with_capacity(contexts.len());

    for (member, mut nested) in members.iter().zip(contexts) {
        if !nested.is_done() {
            pending.push(PendingUndo::Skipped(nested));
            continue;
        }

        let fallback = nested.clone();
        let worker_member = Arc::clone(member);
        match pool.spawn(async move {
            worker_member.undo_command(&mut nested).await;
            nested
        }) {
            Ok(handle) => pending.push(PendingUndo::Spawned(handle, fallback)),
            Err(error) => {
                warn!(macro_id = %macro_id, error = %error, "Undoing macro member inline");
                let mut nested = fallback;
                member.undo_command(&mut nested).await;
                pending.push(PendingUndo::Inline(nested));
            }
        }
    }

    let mut settled = VecDeque::with_capacity(pending.len());
    let mut first_failure = None;

    for (index, entry) in pending.into_iter().enumerate() {
        let nested = match entry {
            PendingUndo::Skipped(nested) => {
                settled.push_back(nested);
                continue;
            }
            PendingUndo::Inline(nested) => nested,
            PendingUndo::Spawned(handle, mut fallback) => match handle.await {
                Ok(nested) => nested,
                Err(join_error) => {
                    fallback.fail(CommandError::unknown(format!(
                        "undo worker aborted: {join_error}"
                    )));
                    fallback
                }
            },
        };

        if let Some(error) = failure_of(&nested) {
            warn!(
                macro_id = %macro_id,
                member = index,
                command_id = %nested.command_id(),
                error = %error,
                "Undo of macro member failed"
            );
            first_failure.get_or_insert(error);
        }
        settled.push_back(nested);
    }

    (settled, first_failure)
}
