//! In-process repository backed by a concurrent map.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::debug;

use super::{Entity, PersistenceError, PersistenceResult, Repository};

#[derive(Debug)]
pub struct InMemoryRepository<E: Entity> {
    entities: DashMap<i64, E>,
    sequence: AtomicI64,
}

impl<E: Entity> Default for InMemoryRepository<E> {
    fn default() -> Self {
        Self {
            entities: DashMap::new(),
            sequence: AtomicI64::new(0),
        }
    }
}

impl<E: Entity> InMemoryRepository<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Stored entities ordered by id
    pub fn snapshot(&self) -> Vec<E> {
        let mut entities: Vec<(i64, E)> = self
            .entities
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        entities.sort_by_key(|(id, _)| *id);
        entities.into_iter().map(|(_, entity)| entity).collect()
    }
}

#[async_trait]
impl<E: Entity> Repository<E> for InMemoryRepository<E> {
    async fn find_by_id(&self, id: i64) -> PersistenceResult<Option<E>> {
        Ok(self.entities.get(&id).map(|entry| entry.value().clone()))
    }

    async fn save(&self, mut entity: E) -> PersistenceResult<E> {
        let id = match entity.id() {
            Some(id) => {
                // Keep generated ids ahead of explicitly restored ones
                self.sequence.fetch_max(id, Ordering::AcqRel);
                id
            }
            None => {
                let id = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
                entity.set_id(id);
                id
            }
        };

        self.entities.insert(id, entity.clone());
        debug!(entity = E::KIND, id = id, "Saved entity");
        Ok(entity)
    }

    async fn delete(&self, id: i64) -> PersistenceResult<()> {
        match self.entities.remove(&id) {
            Some(_) => {
                debug!(entity = E::KIND, id = id, "Deleted entity");
                Ok(())
            }
            None => Err(PersistenceError::not_found(E::KIND, id)),
        }
    }
}
