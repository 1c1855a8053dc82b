//! Note operations.

use serde_json::Value;

use super::DataAccess;
use crate::db::{encode_document, Document};
use crate::errors::AppError;
use crate::models::{ItemKind, Note, UpdateNoteRequest};
use crate::session::SessionContext;

impl DataAccess {
    /// Create an unpinned, untagged note and return its identifier.
    pub async fn create_note(
        &self,
        ctx: &SessionContext,
        title: &str,
        content: &str,
    ) -> Result<String, AppError> {
        let now = self.clock.now();
        let note = Note {
            id: String::new(),
            title: title.to_string(),
            content: content.to_string(),
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            is_pinned: false,
        };

        let id = self
            .store
            .add(
                &Self::collection(ctx, ItemKind::Note),
                encode_document(&note)?,
            )
            .await?;

        tracing::debug!(user_id = %ctx.user_id, note_id = %id, "Created note");
        Ok(id)
    }

    /// All notes, newest update first.
    pub async fn list_notes(&self, ctx: &SessionContext) -> Result<Vec<Note>, AppError> {
        self.list(ctx, ItemKind::Note).await
    }

    /// `Ok(None)` when the note does not exist.
    pub async fn get_note(&self, ctx: &SessionContext, id: &str) -> Result<Option<Note>, AppError> {
        self.get(ctx, ItemKind::Note, id).await
    }

    /// Overwrite the provided fields. The update timestamp is not changed.
    pub async fn update_note(
        &self,
        ctx: &SessionContext,
        id: &str,
        request: &UpdateNoteRequest,
    ) -> Result<(), AppError> {
        let mut fields = Document::new();
        if let Some(title) = &request.title {
            fields.insert("title".to_string(), Value::String(title.clone()));
        }
        if let Some(content) = &request.content {
            fields.insert("content".to_string(), Value::String(content.clone()));
        }
        if let Some(tags) = &request.tags {
            fields.insert("tags".to_string(), serde_json::to_value(tags)?);
        }
        if let Some(is_pinned) = request.is_pinned {
            fields.insert("isPinned".to_string(), Value::Bool(is_pinned));
        }

        if fields.is_empty() {
            return match self.get_note(ctx, id).await? {
                Some(_) => Ok(()),
                None => Err(AppError::NotFound(format!("Note {} not found", id))),
            };
        }

        self.store
            .update(&Self::collection(ctx, ItemKind::Note), id, fields)
            .await
    }
}

#[cfg(test)]
mod tests {
    use crate::data::test_support::{data_access, session};
    use crate::errors::AppError;
    use crate::models::{ItemKind, UpdateNoteRequest};

    #[tokio::test]
    async fn test_create_then_get_note() {
        let (data, _dir) = data_access().await;
        let ctx = session("u1");

        let id = data.create_note(&ctx, "Groceries", "Milk, eggs").await.unwrap();
        assert!(!id.is_empty());

        let note = data.get_note(&ctx, &id).await.unwrap().unwrap();
        assert_eq!(note.id, id);
        assert_eq!(note.title, "Groceries");
        assert_eq!(note.content, "Milk, eggs");
        assert!(note.tags.is_empty());
        assert!(!note.is_pinned);
        assert!(note.created_at <= note.updated_at);
    }

    #[tokio::test]
    async fn test_get_missing_note_is_none() {
        let (data, _dir) = data_access().await;
        assert!(data
            .get_note(&session("u1"), "missing")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_update_keeps_updated_at() {
        let (data, _dir) = data_access().await;
        let ctx = session("u1");
        let id = data.create_note(&ctx, "a", "b").await.unwrap();
        let before = data.get_note(&ctx, &id).await.unwrap().unwrap();

        data.update_note(
            &ctx,
            &id,
            &UpdateNoteRequest {
                content: Some("changed".to_string()),
                tags: Some(vec!["home".to_string(), "home".to_string()]),
                is_pinned: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let after = data.get_note(&ctx, &id).await.unwrap().unwrap();
        assert_eq!(after.title, "a");
        assert_eq!(after.content, "changed");
        assert_eq!(after.tags, vec!["home", "home"]);
        assert!(after.is_pinned);
        assert_eq!(after.updated_at, before.updated_at);
        assert_eq!(after.created_at, before.created_at);
    }

    #[tokio::test]
    async fn test_update_from_entity() {
        let (data, _dir) = data_access().await;
        let ctx = session("u1");
        let id = data.create_note(&ctx, "a", "b").await.unwrap();

        let mut note = data.get_note(&ctx, &id).await.unwrap().unwrap();
        note.title = "renamed".to_string();
        data.update_note(&ctx, &id, &UpdateNoteRequest::from(&note))
            .await
            .unwrap();

        let stored = data.get_note(&ctx, &id).await.unwrap().unwrap();
        assert_eq!(stored, note);
    }

    #[tokio::test]
    async fn test_update_missing_note_is_not_found() {
        let (data, _dir) = data_access().await;
        let ctx = session("u1");

        for request in [
            UpdateNoteRequest::default(),
            UpdateNoteRequest {
                title: Some("x".to_string()),
                ..Default::default()
            },
        ] {
            let err = data.update_note(&ctx, "missing", &request).await.unwrap_err();
            assert!(matches!(err, AppError::NotFound(_)));
        }
    }

    #[tokio::test]
    async fn test_list_notes_newest_first() {
        let (data, _dir) = data_access().await;
        let ctx = session("u1");

        let a = data.create_note(&ctx, "a", "").await.unwrap();
        let b = data.create_note(&ctx, "b", "").await.unwrap();
        let c = data.create_note(&ctx, "c", "").await.unwrap();
        data.touch_updated_at(&ctx, ItemKind::Note, &b).await.unwrap();

        let ids: Vec<String> = data
            .list_notes(&ctx)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![b, c, a]);
    }
}
