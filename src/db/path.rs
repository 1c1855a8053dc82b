//! Collection paths inside the document store.

use std::fmt;

use crate::errors::AppError;
use crate::models::ItemKind;
use crate::session::UserId;

/// Root collection holding one profile document per user.
pub const USERS_COLLECTION: &str = "users";

/// Slash-separated path of a collection, e.g. `users/{uid}/notes`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath(String);

impl CollectionPath {
    /// The `users` root collection.
    pub fn users() -> Self {
        Self(USERS_COLLECTION.to_string())
    }

    /// A user's notes or todos collection.
    pub fn for_user(user_id: &UserId, kind: ItemKind) -> Self {
        Self(format!(
            "{}/{}/{}",
            USERS_COLLECTION,
            user_id.as_str(),
            kind.collection()
        ))
    }

    /// Parse a raw path; segments must be non-empty and the count odd.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let segments: Vec<&str> = raw.split('/').collect();
        if segments.iter().any(|s| s.trim().is_empty()) || segments.len() % 2 == 0 {
            return Err(AppError::Validation(format!(
                "Invalid collection path: {:?}",
                raw
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_collections() {
        let uid = UserId::parse("abc123").unwrap();
        assert_eq!(
            CollectionPath::for_user(&uid, ItemKind::Note).as_str(),
            "users/abc123/notes"
        );
        assert_eq!(
            CollectionPath::for_user(&uid, ItemKind::Todo).as_str(),
            "users/abc123/todos"
        );
        assert_eq!(CollectionPath::users().as_str(), "users");
    }

    #[test]
    fn test_parse_rejects_document_paths() {
        assert!(CollectionPath::parse("users/abc123/notes").is_ok());
        assert!(CollectionPath::parse("users/abc123").is_err());
        assert!(CollectionPath::parse("users//notes").is_err());
    }
}
