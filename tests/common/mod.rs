//! Shared fixtures for integration tests: small domain entities, repository
//! doubles and counting commands.

#![allow(dead_code)]

pub mod strategies;

use async_trait::async_trait;
use command_core::commands::{parse_id, DeleteEntityCommand, NestedInputResolver};
use command_core::error::{CommandError, CommandResult};
use command_core::execution::{Command, Context, Input};
use command_core::persistence::{
    Entity, InMemoryRepository, PersistenceError, PersistenceResult, Repository,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: Option<i64>,
    pub name: String,
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

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: Option<i64>,
    pub name: String,
    pub profile_id: Option<i64>,
}

impl Entity for Student {
    const KIND: &'static str = "student";

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Option<i64>,
    pub email: String,
}

impl Entity for Profile {
    const KIND: &'static str = "profile";

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
}

/// Repository whose deletes fail after a delay; reads and saves pass through
pub struct FailingDeleteRepository<E: Entity> {
    inner: Arc<InMemoryRepository<E>>,
    delay: Duration,
    deletes: AtomicUsize,
}

impl<E: Entity> FailingDeleteRepository<E> {
    pub fn new(inner: Arc<InMemoryRepository<E>>, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            deletes: AtomicUsize::new(0),
        }
    }

    pub fn delete_attempts(&self) -> usize {
        self.deletes.load(Ordering::Acquire)
    }
}

#[async_trait]
impl<E: Entity> Repository<E> for FailingDeleteRepository<E> {
    async fn find_by_id(&self, id: i64) -> PersistenceResult<Option<E>> {
        self.inner.find_by_id(id).await
    }

    async fn save(&self, entity: E) -> PersistenceResult<E> {
        self.inner.save(entity).await
    }

    async fn delete(&self, id: i64) -> PersistenceResult<()> {
        self.deletes.fetch_add(1, Ordering::AcqRel);
        tokio::time::sleep(self.delay).await;
        Err(PersistenceError::storage(
            "delete",
            format!("{} {id} is locked", E::KIND),
        ))
    }
}

/// Finds the profile of the student named by the macro input
pub struct StudentProfileResolver {
    pub students: Arc<InMemoryRepository<Student>>,
}

#[async_trait]
impl NestedInputResolver for StudentProfileResolver {
    async fn resolve(&self, macro_input: &Input) -> CommandResult<Input> {
        let student_id = parse_id(macro_input)?;
        let student = self
            .students
            .find_by_id(student_id)
            .await?
            .ok_or_else(|| CommandError::not_found(Student::KIND, student_id))?;
        let profile_id = student.profile_id.ok_or_else(|| {
            CommandError::not_found(Profile::KIND, format!("of student {student_id}"))
        })?;
        Ok(Input::value(profile_id))
    }
}

/// Seeded student/profile storage for delete-student scenarios
pub struct SchoolFixture {
    pub students: Arc<InMemoryRepository<Student>>,
    pub profiles: Arc<InMemoryRepository<Profile>>,
    pub student: Student,
    pub profile: Profile,
}

impl SchoolFixture {
    pub async fn seeded() -> Self {
        let students = Arc::new(InMemoryRepository::<Student>::new());
        let profiles = Arc::new(InMemoryRepository::<Profile>::new());

        let profile = profiles
            .save(Profile {
                id: None,
                email: "ada@example.org".to_string(),
            })
            .await
            .unwrap();
        let student = students
            .save(Student {
                id: None,
                name: "Ada".to_string(),
                profile_id: profile.id,
            })
            .await
            .unwrap();

        Self {
            students,
            profiles,
            student,
            profile,
        }
    }

    pub fn student_id(&self) -> i64 {
        self.student.id.unwrap()
    }

    pub fn delete_student_command(&self) -> Arc<DeleteEntityCommand<Student>> {
        Arc::new(DeleteEntityCommand::new(
            "student:delete",
            self.students.clone() as Arc<dyn Repository<Student>>,
        ))
    }

    /// Profile delete that finds its id through the student
    pub fn delete_profile_command(
        &self,
        repository: Arc<dyn Repository<Profile>>,
    ) -> Arc<DeleteEntityCommand<Profile>> {
        Arc::new(
            DeleteEntityCommand::new("profile:delete", repository).with_nested_resolver(Arc::new(
                StudentProfileResolver {
                    students: Arc::clone(&self.students),
                },
            )),
        )
    }
}

/// Adds a fixed amount to its numeric input, counting executions
pub struct CountingCommand {
    id: String,
    amount: i64,
    delay: Duration,
    fail: bool,
    pub done: AtomicUsize,
    pub undone: AtomicUsize,
}

impl CountingCommand {
    pub fn adding(id: &str, amount: i64) -> Arc<Self> {
        Arc::new(Self::build(id, amount, Duration::ZERO, false))
    }

    pub fn slow(id: &str, amount: i64, delay: Duration) -> Arc<Self> {
        Arc::new(Self::build(id, amount, delay, false))
    }

    pub fn failing(id: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self::build(id, 0, delay, true))
    }

    fn build(id: &str, amount: i64, delay: Duration, fail: bool) -> Self {
        Self {
            id: id.to_string(),
            amount,
            delay,
            fail,
            done: AtomicUsize::new(0),
            undone: AtomicUsize::new(0),
        }
    }

    pub fn done_count(&self) -> usize {
        self.done.load(Ordering::Acquire)
    }

    pub fn undone_count(&self) -> usize {
        self.undone.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Command for CountingCommand {
    fn command_id(&self) -> &str {
        &self.id
    }

    async fn execute_do(&self, context: &mut Context) -> CommandResult<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(CommandError::conflict(format!("{} refused", self.id)));
        }

        let value = context
            .redo_input()
            .as_value()
            .and_then(|value| value.as_i64())
            .ok_or_else(|| CommandError::validation("number expected"))?;

        self.done.fetch_add(1, Ordering::AcqRel);
        context.set_undo_input(Input::value(value));
        context.set_result(Some(json!(value + self.amount)));
        Ok(())
    }

    async fn execute_undo(&self, context: &mut Context) -> CommandResult<()> {
        self.undone.fetch_add(1, Ordering::AcqRel);
        let original = context.undo_input().as_value().cloned();
        context.set_result(original);
        Ok(())
    }
}

/// Ignores its input and finishes without a result
pub struct SilentCommand {
    id: String,
    pub done: AtomicUsize,
    pub undone: AtomicUsize,
}

impl SilentCommand {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            done: AtomicUsize::new(0),
            undone: AtomicUsize::new(0),
        })
    }

    pub fn done_count(&self) -> usize {
        self.done.load(Ordering::Acquire)
    }

    pub fn undone_count(&self) -> usize {
        self.undone.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Command for SilentCommand {
    fn command_id(&self) -> &str {
        &self.id
    }

    async fn execute_do(&self, context: &mut Context) -> CommandResult<()> {
        self.done.fetch_add(1, Ordering::AcqRel);
        context.set_undo_input(Input::value(json!({"ran": self.id})));
        Ok(())
    }

    async fn execute_undo(&self, _context: &mut Context) -> CommandResult<()> {
        self.undone.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}
