//! # Reversible Entity Commands
//!
//! Generic create/update/delete commands over any [`Entity`]. Each one keeps
//! a detached payload (or the generated id) as its undo-input, so undo never
//! touches a live persistence object.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::error::{CommandError, CommandResult};
use crate::execution::{Command, Context, Input};
use crate::persistence::{Entity, JsonPayloadMapper, PayloadMapper, Repository};

/// Business rule checked before an entity is deleted
#[async_trait]
pub trait DeleteGuard<E: Entity>: Send + Sync {
    /// Return `Conflict` to refuse the deletion
    async fn check(&self, entity: &E) -> CommandResult<()>;
}

/// Derives a member's own input from a macro input, e.g. looking up a related id
#[async_trait]
pub trait NestedInputResolver: Send + Sync {
    async fn resolve(&self, macro_input: &Input) -> CommandResult<Input>;
}

/// Read an id from `42` or `{"id": 42}`
pub fn parse_id(input: &Input) -> CommandResult<i64> {
    let value = input
        .as_value()
        .ok_or_else(|| CommandError::validation("an id is required"))?;

    value
        .as_i64()
        .or_else(|| value.get("id").and_then(Value::as_i64))
        .ok_or_else(|| CommandError::validation(format!("not an id: {value}")))
}

fn parse_entity<E: Entity>(mapper: &dyn PayloadMapper<E>, input: &Input) -> CommandResult<E> {
    let payload = input
        .as_value()
        .filter(|value| value.is_object())
        .ok_or_else(|| CommandError::validation(format!("{} payload must be an object", E::KIND)))?;
    mapper.from_detached(payload)
}

/// Persist a new entity; undo deletes it again
pub struct CreateEntityCommand<E: Entity> {
    command_id: String,
    repository: Arc<dyn Repository<E>>,
    mapper: Arc<dyn PayloadMapper<E>>,
}

impl<E: Entity> CreateEntityCommand<E> {
    pub fn new(command_id: impl Into<String>, repository: Arc<dyn Repository<E>>) -> Self {
        Self::with_mapper(command_id, repository, Arc::new(JsonPayloadMapper))
    }

    pub fn with_mapper(
        command_id: impl Into<String>,
        repository: Arc<dyn Repository<E>>,
        mapper: Arc<dyn PayloadMapper<E>>,
    ) -> Self {
        Self {
            command_id: command_id.into(),
            repository,
            mapper,
        }
    }

    fn new_entity(&self, input: &Input) -> CommandResult<E> {
        let entity = parse_entity(self.mapper.as_ref(), input)?;
        if let Some(id) = entity.id() {
            return Err(CommandError::validation(format!(
                "new {} must not carry an id, got {id}",
                E::KIND
            )));
        }
        Ok(entity)
    }
}

#[async_trait]
impl<E: Entity> Command for CreateEntityCommand<E> {
    fn command_id(&self) -> &str {
        &self.command_id
    }

    async fn create_context(&self, input: Input) -> Context {
        match self.new_entity(&input) {
            Ok(_) => Context::with_input(&self.command_id, input),
            Err(error) => Context::failed(&self.command_id, input, error),
        }
    }

    async fn execute_do(&self, context: &mut Context) -> CommandResult<()> {
        let entity = self.new_entity(context.redo_input())?;
        let saved = self.repository.save(entity).await?;
        let id = saved.id().ok_or_else(|| {
            CommandError::persistence("save", format!("{} saved without an id", E::KIND))
        })?;

        debug!(command_id = %self.command_id, entity = E::KIND, id = id, "Created entity");
        context.set_undo_input(Input::value(id));
        context.set_result(Some(self.mapper.to_detached(&saved)?));
        Ok(())
    }

    async fn execute_undo(&self, context: &mut Context) -> CommandResult<()> {
        let id = parse_id(context.undo_input())?;
        self.repository.delete(id).await?;
        context.set_result(None);
        Ok(())
    }
}

/// Replace an existing entity; undo restores the previous state
pub struct UpdateEntityCommand<E: Entity> {
    command_id: String,
    repository: Arc<dyn Repository<E>>,
    mapper: Arc<dyn PayloadMapper<E>>,
}

impl<E: Entity> UpdateEntityCommand<E> {
    pub fn new(command_id: impl Into<String>, repository: Arc<dyn Repository<E>>) -> Self {
        Self::with_mapper(command_id, repository, Arc::new(JsonPayloadMapper))
    }

    pub fn with_mapper(
        command_id: impl Into<String>,
        repository: Arc<dyn Repository<E>>,
        mapper: Arc<dyn PayloadMapper<E>>,
    ) -> Self {
        Self {
            command_id: command_id.into(),
            repository,
            mapper,
        }
    }

    fn changed_entity(&self, input: &Input) -> CommandResult<(i64, E)> {
        let entity = parse_entity(self.mapper.as_ref(), input)?;
        let id = entity
            .id()
            .ok_or_else(|| CommandError::validation(format!("{} update needs an id", E::KIND)))?;
        Ok((id, entity))
    }
}

#[async_trait]
impl<E: Entity> Command for UpdateEntityCommand<E> {
    fn command_id(&self) -> &str {
        &self.command_id
    }

    async fn create_context(&self, input: Input) -> Context {
        match self.changed_entity(&input) {
            Ok(_) => Context::with_input(&self.command_id, input),
            Err(error) => Context::failed(&self.command_id, input, error),
        }
    }

    async fn execute_do(&self, context: &mut Context) -> CommandResult<()> {
        let (id, entity) = self.changed_entity(context.redo_input())?;
        let previous = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| CommandError::not_found(E::KIND, id))?;

        context.set_undo_input(Input::Value(self.mapper.to_detached(&previous)?));
        let saved = self.repository.save(entity).await?;
        context.set_result(Some(self.mapper.to_detached(&saved)?));
        Ok(())
    }

    async fn execute_undo(&self, context: &mut Context) -> CommandResult<()> {
        let previous = parse_entity(self.mapper.as_ref(), context.undo_input())?;
        let restored = self.repository.save(previous).await?;
        context.set_result(Some(self.mapper.to_detached(&restored)?));
        Ok(())
    }
}

/// Delete an entity by id; undo saves the snapshot back under the same id
pub struct DeleteEntityCommand<E: Entity> {
    command_id: String,
    repository: Arc<dyn Repository<E>>,
    mapper: Arc<dyn PayloadMapper<E>>,
    guard: Option<Arc<dyn DeleteGuard<E>>>,
    resolver: Option<Arc<dyn NestedInputResolver>>,
}

impl<E: Entity> DeleteEntityCommand<E> {
    pub fn new(command_id: impl Into<String>, repository: Arc<dyn Repository<E>>) -> Self {
        Self {
            command_id: command_id.into(),
            repository,
            mapper: Arc::new(JsonPayloadMapper),
            guard: None,
            resolver: None,
        }
    }

    pub fn with_mapper(mut self, mapper: Arc<dyn PayloadMapper<E>>) -> Self {
        self.mapper = mapper;
        self
    }

    /// Refuse deletions the guard rejects
    pub fn with_guard(mut self, guard: Arc<dyn DeleteGuard<E>>) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Derive the id to delete from the macro input when run as a member
    pub fn with_nested_resolver(mut self, resolver: Arc<dyn NestedInputResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }
}

#[async_trait]
impl<E: Entity> Command for DeleteEntityCommand<E> {
    fn command_id(&self) -> &str {
        &self.command_id
    }

    async fn create_context(&self, input: Input) -> Context {
        match parse_id(&input) {
            Ok(_) => Context::with_input(&self.command_id, input),
            Err(error) => Context::failed(&self.command_id, input, error),
        }
    }

    async fn execute_do(&self, context: &mut Context) -> CommandResult<()> {
        let id = parse_id(context.redo_input())?;
        let entity = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| CommandError::not_found(E::KIND, id))?;

        if let Some(guard) = &self.guard {
            guard.check(&entity).await?;
        }

        let snapshot = self.mapper.to_detached(&entity)?;
        context.set_undo_input(Input::Value(snapshot.clone()));
        self.repository.delete(id).await?;

        debug!(command_id = %self.command_id, entity = E::KIND, id = id, "Deleted entity");
        context.set_result(Some(snapshot));
        Ok(())
    }

    async fn execute_undo(&self, context: &mut Context) -> CommandResult<()> {
        let snapshot = parse_entity(self.mapper.as_ref(), context.undo_input())?;
        let restored = self.repository.save(snapshot).await?;
        context.set_result(Some(self.mapper.to_detached(&restored)?));
        Ok(())
    }

    async fn prepare_nested_context(&self, macro_input: &Input) -> Context {
        let Some(resolver) = &self.resolver else {
            return self.create_context(macro_input.clone()).await;
        };

        match resolver.resolve(macro_input).await {
            Ok(input) => self.create_context(input).await,
            Err(error) => Context::failed(&self.command_id, macro_input.clone(), error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryRepository;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Course {
        id: Option<i64>,
        name: String,
    }

    impl Entity for Course {
        const KIND: &'static str = "course";

        fn id(&self) -> Option<i64> {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = Some(id);
        }
    }

    struct RefuseAll;

    #[async_trait]
    impl DeleteGuard<Course> for RefuseAll {
        async fn check(&self, course: &Course) -> CommandResult<()> {
            Err(CommandError::conflict(format!("{} has students", course.name)))
        }
    }

    fn repository() -> Arc<InMemoryRepository<Course>> {
        Arc::new(InMemoryRepository::new())
    }

    #[test]
    fn test_parse_id_forms() {
        assert_eq!(parse_id(&Input::value(4)).unwrap(), 4);
        assert_eq!(parse_id(&Input::value(json!({"id": 9}))).unwrap(), 9);
        assert!(parse_id(&Input::value("x")).is_err());
        assert!(parse_id(&Input::Empty).is_err());
    }

    #[tokio::test]
    async fn test_create_then_undo() {
        let repository = repository();
        let command = CreateEntityCommand::<Course>::new("course:create", repository.clone());

        let mut context = command
            .create_context(Input::value(json!({"id": null, "name": "Algebra"})))
            .await;
        command.do_command(&mut context).await;

        assert!(context.is_done());
        assert_eq!(context.result().unwrap()["id"], 1);
        assert_eq!(repository.len(), 1);

        command.undo_command(&mut context).await;
        assert!(context.is_undone());
        assert!(repository.is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_payload_with_id() {
        let command = CreateEntityCommand::<Course>::new("course:create", repository());
        let context = command
            .create_context(Input::value(json!({"id": 3, "name": "Algebra"})))
            .await;

        assert!(context.is_failed());
        assert_eq!(context.error().map(|e| e.kind()), Some("validation"));
    }

    #[tokio::test]
    async fn test_update_then_undo_restores_previous() {
        let repository = repository();
        let original = repository
            .save(Course {
                id: None,
                name: "Algebra".into(),
            })
            .await
            .unwrap();

        let command = UpdateEntityCommand::<Course>::new("course:update", repository.clone());
        let mut context = command
            .create_context(Input::value(json!({"id": 1, "name": "Geometry"})))
            .await;
        command.do_command(&mut context).await;
        assert_eq!(repository.find_by_id(1).await.unwrap().unwrap().name, "Geometry");

        command.undo_command(&mut context).await;
        assert!(context.is_undone());
        assert_eq!(repository.find_by_id(1).await.unwrap(), Some(original));
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let command = UpdateEntityCommand::<Course>::new("course:update", repository());
        let mut context = command
            .create_context(Input::value(json!({"id": 8, "name": "Geometry"})))
            .await;
        command.do_command(&mut context).await;

        assert_eq!(context.error(), Some(&CommandError::not_found("course", 8)));
    }

    #[tokio::test]
    async fn test_delete_then_undo_keeps_id() {
        let repository = repository();
        repository
            .save(Course {
                id: None,
                name: "Algebra".into(),
            })
            .await
            .unwrap();

        let command = DeleteEntityCommand::<Course>::new("course:delete", repository.clone());
        let mut context = command.create_context(Input::value(1)).await;
        command.do_command(&mut context).await;
        assert!(repository.is_empty());

        command.undo_command(&mut context).await;
        assert_eq!(repository.find_by_id(1).await.unwrap().unwrap().name, "Algebra");
    }

    #[tokio::test]
    async fn test_delete_guard_conflict() {
        let repository = repository();
        repository
            .save(Course {
                id: None,
                name: "Algebra".into(),
            })
            .await
            .unwrap();

        let command = DeleteEntityCommand::<Course>::new("course:delete", repository.clone())
            .with_guard(Arc::new(RefuseAll));
        let mut context = command.create_context(Input::value(1)).await;
        command.do_command(&mut context).await;

        assert_eq!(
            context.error(),
            Some(&CommandError::conflict("Algebra has students"))
        );
        assert_eq!(repository.len(), 1);
    }
}
