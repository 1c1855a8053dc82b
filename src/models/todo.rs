//! Todo and subtask models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A checklist owned by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(with = "super::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "super::timestamp")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_pinned: bool,
}

impl Todo {
    pub fn subtask(&self, subtask_id: &str) -> Option<&Subtask> {
        self.subtasks.iter().find(|s| s.id == subtask_id)
    }

    pub fn subtask_mut(&mut self, subtask_id: &str) -> Option<&mut Subtask> {
        self.subtasks.iter_mut().find(|s| s.id == subtask_id)
    }
}

/// A single checklist line.
///
/// Identity is the generated `id`, never the position in the list. A
/// subtask without one does not deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    /// `None` until the subtask is first completed
    #[serde(default, with = "super::timestamp::option")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(with = "super::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "super::timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Subtask {
    pub fn new(text: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: new_subtask_id(),
            text: text.into(),
            completed: false,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

fn new_subtask_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Request body for creating a new todo.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTodoRequest {
    #[serde(default)]
    pub title: String,
    /// Text of the single subtask the todo starts with
    #[serde(default)]
    pub subtask: String,
}

/// Request body for updating an existing todo.
///
/// `subtasks` replaces the whole list. The update timestamp is left alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTodoRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub subtasks: Option<Vec<Subtask>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub is_pinned: Option<bool>,
}

impl From<&Todo> for UpdateTodoRequest {
    fn from(todo: &Todo) -> Self {
        Self {
            title: Some(todo.title.clone()),
            subtasks: Some(todo.subtasks.clone()),
            tags: Some(todo.tags.clone()),
            is_pinned: Some(todo.is_pinned),
        }
    }
}

/// Request body for appending a subtask.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddSubtaskRequest {
    #[serde(default)]
    pub text: String,
}

/// Request body for editing one subtask.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSubtaskRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub completed: Option<bool>,
}
