//! Combined feed entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Note, Todo};

/// Which collection an entity lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Note,
    Todo,
}

impl ItemKind {
    /// Collection name under `users/{uid}`.
    pub fn collection(&self) -> &'static str {
        match self {
            ItemKind::Note => "notes",
            ItemKind::Todo => "todos",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ItemKind::Note => "Note",
            ItemKind::Todo => "Todo",
        }
    }
}

/// A note or a todo, as shown in the combined feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Item {
    Note(Note),
    Todo(Todo),
}

impl Item {
    pub fn id(&self) -> &str {
        match self {
            Item::Note(n) => &n.id,
            Item::Todo(t) => &t.id,
        }
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            Item::Note(_) => ItemKind::Note,
            Item::Todo(_) => ItemKind::Todo,
        }
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        match self {
            Item::Note(n) => n.updated_at,
            Item::Todo(t) => t.updated_at,
        }
    }
}
