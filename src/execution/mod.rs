pub mod command;
pub mod command_registry;
pub mod context;
pub mod macro_command;
pub mod worker_pool;

pub use command::Command;
pub use command_registry::CommandRegistry;
pub use context::{Context, Input, ListenerId};
pub use macro_command::{MacroMember, ParallelMacroCommand, SequentialMacroCommand};
pub use worker_pool::{WorkerPool, WorkerPoolError, WorkerPoolStats};
