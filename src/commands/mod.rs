//! Ready-made reversible commands.

pub mod entity;

pub use entity::{
    parse_id, CreateEntityCommand, DeleteEntityCommand, DeleteGuard, NestedInputResolver,
    UpdateEntityCommand,
};
