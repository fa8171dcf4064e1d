//! # Persistence Collaborators
//!
//! The narrow surface entity commands need from storage: find, save and
//! delete by id, plus a mapper producing detached payloads that are safe to
//! keep as undo-input. How a repository stores entities is up to the
//! adapter; [`InMemoryRepository`] is the in-process one.

pub mod memory;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Debug;
use thiserror::Error;

pub use memory::InMemoryRepository;

use crate::error::CommandError;

/// A persisted domain entity
pub trait Entity:
    Clone + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Entity kind used in errors and logs, e.g. `course`
    const KIND: &'static str;

    /// `None` until the entity has been saved
    fn id(&self) -> Option<i64>;

    fn set_id(&mut self, id: i64);
}

#[derive(Debug, Clone, Error)]
pub enum PersistenceError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: i64 },

    #[error("Storage error during {operation}: {message}")]
    Storage { operation: String, message: String },
}

impl PersistenceError {
    pub fn not_found(entity: impl Into<String>, id: i64) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id,
        }
    }

    pub fn storage(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

impl From<PersistenceError> for CommandError {
    fn from(error: PersistenceError) -> Self {
        match error {
            PersistenceError::NotFound { entity, id } => CommandError::not_found(entity, id),
            PersistenceError::Storage { operation, message } => {
                CommandError::persistence(operation, message)
            }
        }
    }
}

pub type PersistenceResult<T> = std::result::Result<T, PersistenceError>;

#[async_trait]
pub trait Repository<E: Entity>: Send + Sync {
    async fn find_by_id(&self, id: i64) -> PersistenceResult<Option<E>>;

    /// Insert when the entity has no id (assigning one), update otherwise
    async fn save(&self, entity: E) -> PersistenceResult<E>;

    /// Delete by id; deleting a missing entity is `NotFound`
    async fn delete(&self, id: i64) -> PersistenceResult<()>;
}

/// Converts entities to and from detached payloads
pub trait PayloadMapper<E: Entity>: Send + Sync {
    fn to_detached(&self, entity: &E) -> Result<Value, CommandError>;

    fn from_detached(&self, payload: &Value) -> Result<E, CommandError>;
}

/// Maps entities through their serde representation
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPayloadMapper;

impl<E: Entity> PayloadMapper<E> for JsonPayloadMapper {
    fn to_detached(&self, entity: &E) -> Result<Value, CommandError> {
        Ok(serde_json::to_value(entity)?)
    }

    fn from_detached(&self, payload: &Value) -> Result<E, CommandError> {
        Ok(serde_json::from_value(payload.clone())?)
    }
}
