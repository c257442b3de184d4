use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use super::{StoreError, TaskStore, UserStore, EMAIL_TAKEN};
use crate::routes::tasks::model::{NewTask, Task, TaskChanges};
use crate::routes::users::model::{NewUser, User, UserChanges, UserCredentials};

/// In-process store selected with `DATABASE_URL=memory://`. Records live in
/// insertion order and vanish with the process.
#[derive(Default)]
pub struct MemoryStore {
    tasks: RwLock<Vec<Task>>,
    users: RwLock<Vec<UserCredentials>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn list_by_owner(&self, owner: Uuid) -> Result<Vec<Task>, StoreError> {
        Ok(self
            .tasks
            .read()
            .iter()
            .filter(|t| t.user_id == owner)
            .cloned()
            .collect())
    }

    async fn insert(&self, task: NewTask) -> Result<Task, StoreError> {
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            user_id: task.user_id,
            title: task.title,
            description: task.description,
            priority: task.priority,
            completed: task.completed,
            created_at: now,
            updated_at: now,
        };
        self.tasks.write().push(task.clone());
        Ok(task)
    }

    async fn update_owned(
        &self,
        owner: Uuid,
        id: Uuid,
        changes: TaskChanges,
    ) -> Result<Option<Task>, StoreError> {
        let mut tasks = self.tasks.write();
        let Some(task) = tasks.iter_mut().find(|t| t.id == id && t.user_id == owner) else {
            return Ok(None);
        };
        changes.apply(task);
        task.updated_at = Utc::now();
        Ok(Some(task.clone()))
    }

    async fn delete_owned(&self, owner: Uuid, id: Uuid) -> Result<bool, StoreError> {
        let mut tasks = self.tasks.write();
        let before = tasks.len();
        tasks.retain(|t| !(t.id == id && t.user_id == owner));
        Ok(tasks.len() < before)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.write();
        if users.iter().any(|c| c.user.email == user.email) {
            return Err(StoreError::Conflict(EMAIL_TAKEN.to_string()));
        }

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            name: user.name,
            created_at: now,
            updated_at: now,
        };
        users.push(UserCredentials {
            user: created.clone(),
            password_hash: user.password_hash,
        });
        Ok(created)
    }

    async fn find(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .read()
            .iter()
            .find(|c| c.user.id == id)
            .map(|c| c.user.clone()))
    }

    async fn find_credentials(&self, email: &str) -> Result<Option<UserCredentials>, StoreError> {
        Ok(self
            .users
            .read()
            .iter()
            .find(|c| c.user.email == email)
            .cloned())
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> Result<Option<User>, StoreError> {
        let mut users = self.users.write();
        if let Some(email) = &changes.email {
            if users.iter().any(|c| c.user.id != id && &c.user.email == email) {
                return Err(StoreError::Conflict(EMAIL_TAKEN.to_string()));
            }
        }

        let Some(entry) = users.iter_mut().find(|c| c.user.id == id) else {
            return Ok(None);
        };
        changes.apply(&mut entry.user);
        if let Some(hash) = changes.password_hash {
            entry.password_hash = hash;
        }
        entry.user.updated_at = Utc::now();
        Ok(Some(entry.user.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut users = self.users.write();
        let before = users.len();
        users.retain(|c| c.user.id != id);
        Ok(users.len() < before)
    }
}
