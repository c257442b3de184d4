use serde::{Deserialize, Deserializer};
use uuid::Uuid;

use super::model::{NewTask, Priority, TaskChanges};

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 1000;

// Unknown fields such as `userId` or `id` are dropped by serde.
#[derive(Debug, Deserialize)]
pub struct CreateTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub completed: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTask {
    pub title: Option<String>,
    /// `None` when absent, `Some(None)` when sent as `null` to clear it.
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
    pub priority: Option<Priority>,
    pub completed: Option<bool>,
}

impl CreateTask {
    pub fn into_new_task(self, owner: Uuid) -> Result<NewTask, String> {
        let title = validate_title(&self.title)?;
        if let Some(description) = &self.description {
            validate_description(description)?;
        }

        Ok(NewTask {
            user_id: owner,
            title,
            description: self.description,
            priority: self.priority.unwrap_or_default(),
            completed: self.completed.unwrap_or(false),
        })
    }
}

impl UpdateTask {
    pub fn into_changes(self) -> Result<TaskChanges, String> {
        let title = self.title.as_deref().map(validate_title).transpose()?;
        if let Some(Some(description)) = &self.description {
            validate_description(description)?;
        }

        Ok(TaskChanges {
            title,
            description: self.description,
            priority: self.priority,
            completed: self.completed,
        })
    }
}

fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// Titles are trimmed; a blank title is rejected.
pub fn validate_title(title: &str) -> Result<String, String> {
    let title = title.trim();
    if title.is_empty() {
        return Err("title is required".to_string());
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(format!("title must be at most {} characters", MAX_TITLE_LEN));
    }
    Ok(title.to_string())
}

pub fn validate_description(description: &str) -> Result<(), String> {
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(format!(
            "description must be at most {} characters",
            MAX_DESCRIPTION_LEN
        ));
    }
    Ok(())
}
