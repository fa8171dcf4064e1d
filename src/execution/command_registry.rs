//! Command Registry
//!
//! Maps command identifiers (`course:create`, `student:delete`, ...) to the
//! command that handles them. The exchange resolves every request message
//! through this registry.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{CommandError, CommandResult};
use crate::execution::command::Command;

/// Registry of commands by command id
///
/// # Examples
///
/// ```rust,ignore
/// use command_core::execution::CommandRegistry;
/// use std::sync::Arc;
///
/// let registry = CommandRegistry::new();
/// registry.register(Arc::new(CreateEntityCommand::<Course>::new("course:create", repository)));
/// assert!(registry.contains("course:create"));
/// ```
#[derive(Default)]
pub struct CommandRegistry {
    commands: RwLock<HashMap<String, Arc<dyn Command>>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command under its own id, replacing any previous one
    pub fn register(&self, command: Arc<dyn Command>) {
        let command_id = command.command_id().to_string();
        let mut commands = self.commands.write();

        if commands.contains_key(&command_id) {
            warn!(command_id = %command_id, "Replacing existing command registration");
        }

        commands.insert(command_id.clone(), command);
        info!(command_id = %command_id, "Registered command");
    }

    /// Unregister a command; returns false when it was not registered
    pub fn unregister(&self, command_id: &str) -> bool {
        let removed = self.commands.write().remove(command_id).is_some();

        if removed {
            info!(command_id = %command_id, "Unregistered command");
        } else {
            warn!(command_id = %command_id, "Attempted to unregister unknown command");
        }

        removed
    }

    pub fn get(&self, command_id: &str) -> Option<Arc<dyn Command>> {
        self.commands.read().get(command_id).cloned()
    }

    /// Resolve a command or fail with `NotFound`
    pub fn resolve(&self, command_id: &str) -> CommandResult<Arc<dyn Command>> {
        self.get(command_id)
            .ok_or_else(|| CommandError::not_found("command", command_id))
    }

    pub fn contains(&self, command_id: &str) -> bool {
        self.commands.read().contains_key(command_id)
    }

    /// Registered ids, sorted
    pub fn command_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.commands.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.commands.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.read().is_empty()
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("command_ids", &self.command_ids())
            .finish()
    }
}
