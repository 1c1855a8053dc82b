//! Note model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A short text note owned by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub title: String,
    pub content: String,
    /// Display order matters; duplicates are allowed
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(with = "super::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "super::timestamp")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_pinned: bool,
}

/// Request body for creating a new note.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNoteRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

/// Request body for updating an existing note.
///
/// Absent fields keep their stored value. The update timestamp is never
/// changed by an update; touch it separately.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNoteRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub is_pinned: Option<bool>,
}

impl From<&Note> for UpdateNoteRequest {
    fn from(note: &Note) -> Self {
        Self {
            title: Some(note.title.clone()),
            content: Some(note.content.clone()),
            tags: Some(note.tags.clone()),
            is_pinned: Some(note.is_pinned),
        }
    }
}
