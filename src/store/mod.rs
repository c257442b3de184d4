//! Persistence for the `tasks` and `users` collections.
//!
//! Handlers never talk to a database directly; they go through the
//! [`TaskStore`] and [`UserStore`] traits carried in `AppState`. Every task
//! operation that touches an existing record takes the owner id alongside the
//! record id, so a record owned by someone else is simply not found.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::routes::tasks::model::{NewTask, Task, TaskChanges};
use crate::routes::users::model::{NewUser, User, UserChanges, UserCredentials};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint was violated.
    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be decoded into the domain model.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn list_by_owner(&self, owner: Uuid) -> Result<Vec<Task>, StoreError>;

    async fn insert(&self, task: NewTask) -> Result<Task, StoreError>;

    /// Returns `None` when no task matches both `id` and `owner`.
    async fn update_owned(
        &self,
        owner: Uuid,
        id: Uuid,
        changes: TaskChanges,
    ) -> Result<Option<Task>, StoreError>;

    /// Returns `false` when no task matches both `id` and `owner`.
    async fn delete_owned(&self, owner: Uuid, id: Uuid) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError>;

    async fn find(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_credentials(&self, email: &str) -> Result<Option<UserCredentials>, StoreError>;

    async fn update(&self, id: Uuid, changes: UserChanges) -> Result<Option<User>, StoreError>;

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
}

pub(crate) const EMAIL_TAKEN: &str = "Email is already registered";
