//! Todo and subtask operations.
//!
//! Subtask edits are read-modify-write cycles on the whole todo document, run
//! atomically by the store, and always advance the todo's update timestamp.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::DataAccess;
use crate::db::{
    decode_document, encode_document, Document, DocumentMutation, StoredDocument,
};
use crate::errors::AppError;
use crate::models::{ItemKind, Subtask, Todo, UpdateSubtaskRequest, UpdateTodoRequest};
use crate::session::SessionContext;

impl DataAccess {
    /// Create a todo seeded with one open subtask and return its identifier.
    pub async fn create_todo(
        &self,
        ctx: &SessionContext,
        title: &str,
        subtask_text: &str,
    ) -> Result<String, AppError> {
        let now = self.clock.now();
        let todo = Todo {
            id: String::new(),
            title: title.to_string(),
            subtasks: vec![Subtask::new(subtask_text, now)],
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            is_pinned: false,
        };

        let id = self
            .store
            .add(
                &Self::collection(ctx, ItemKind::Todo),
                encode_document(&todo)?,
            )
            .await?;

        tracing::debug!(user_id = %ctx.user_id, todo_id = %id, "Created todo");
        Ok(id)
    }

    /// All todos, newest update first.
    pub async fn list_todos(&self, ctx: &SessionContext) -> Result<Vec<Todo>, AppError> {
        self.list(ctx, ItemKind::Todo).await
    }

    /// `Ok(None)` when the todo does not exist.
    pub async fn get_todo(&self, ctx: &SessionContext, id: &str) -> Result<Option<Todo>, AppError> {
        self.get(ctx, ItemKind::Todo, id).await
    }

    /// Overwrite the provided fields. The update timestamp is not changed.
    pub async fn update_todo(
        &self,
        ctx: &SessionContext,
        id: &str,
        request: &UpdateTodoRequest,
    ) -> Result<(), AppError> {
        let mut fields = Document::new();
        if let Some(title) = &request.title {
            fields.insert("title".to_string(), Value::String(title.clone()));
        }
        if let Some(subtasks) = &request.subtasks {
            ensure_unique_ids(subtasks)?;
            fields.insert("subtasks".to_string(), serde_json::to_value(subtasks)?);
        }
        if let Some(tags) = &request.tags {
            fields.insert("tags".to_string(), serde_json::to_value(tags)?);
        }
        if let Some(is_pinned) = request.is_pinned {
            fields.insert("isPinned".to_string(), Value::Bool(is_pinned));
        }

        if fields.is_empty() {
            return match self.get_todo(ctx, id).await? {
                Some(_) => Ok(()),
                None => Err(AppError::NotFound(format!("Todo {} not found", id))),
            };
        }

        self.store
            .update(&Self::collection(ctx, ItemKind::Todo), id, fields)
            .await
    }

    /// Append a subtask; returns it with its generated identifier.
    pub async fn add_subtask(
        &self,
        ctx: &SessionContext,
        todo_id: &str,
        text: &str,
    ) -> Result<Subtask, AppError> {
        let subtask_id = uuid::Uuid::new_v4().to_string();
        let text = text.to_string();

        let new_id = subtask_id.clone();
        let todo = self
            .modify_todo(ctx, todo_id, move |todo, now| {
                todo.subtasks.push(Subtask {
                    id: new_id,
                    ..Subtask::new(text, now)
                });
                Ok(())
            })
            .await?;

        todo.subtask(&subtask_id)
            .cloned()
            .ok_or_else(|| AppError::Internal(format!("Subtask {} vanished", subtask_id)))
    }

    /// Edit a subtask's text and/or completion state.
    ///
    /// Text changes bump the subtask update timestamp. Completing sets the
    /// completion timestamp; reopening clears it.
    pub async fn update_subtask(
        &self,
        ctx: &SessionContext,
        todo_id: &str,
        subtask_id: &str,
        request: &UpdateSubtaskRequest,
    ) -> Result<Todo, AppError> {
        let request = request.clone();
        self.edit_subtask(ctx, todo_id, subtask_id, move |subtask, now| {
            if let Some(text) = request.text {
                subtask.text = text;
                subtask.updated_at = now;
            }
            if let Some(completed) = request.completed {
                subtask.completed = completed;
                subtask.completed_at = completed.then_some(now);
            }
        })
        .await
    }

    /// Stamp the subtask's completion time and the todo's update time.
    pub async fn touch_subtask_completed_at(
        &self,
        ctx: &SessionContext,
        todo_id: &str,
        subtask_id: &str,
    ) -> Result<Todo, AppError> {
        self.edit_subtask(ctx, todo_id, subtask_id, |subtask, now| {
            subtask.completed_at = Some(now);
        })
        .await
    }

    /// Stamp the subtask's update time and the todo's update time.
    pub async fn touch_subtask_updated_at(
        &self,
        ctx: &SessionContext,
        todo_id: &str,
        subtask_id: &str,
    ) -> Result<Todo, AppError> {
        self.edit_subtask(ctx, todo_id, subtask_id, |subtask, now| {
            subtask.updated_at = now;
        })
        .await
    }

    pub async fn remove_subtask(
        &self,
        ctx: &SessionContext,
        todo_id: &str,
        subtask_id: &str,
    ) -> Result<Todo, AppError> {
        let target = subtask_id.to_string();
        self.modify_todo(ctx, todo_id, move |todo, _now| {
            let before = todo.subtasks.len();
            todo.subtasks.retain(|s| s.id != target);
            if todo.subtasks.len() == before {
                return Err(subtask_not_found(&todo.id, &target));
            }
            Ok(())
        })
        .await
    }

    async fn edit_subtask<F>(
        &self,
        ctx: &SessionContext,
        todo_id: &str,
        subtask_id: &str,
        edit: F,
    ) -> Result<Todo, AppError>
    where
        F: FnOnce(&mut Subtask, DateTime<Utc>) + Send + 'static,
    {
        let target = subtask_id.to_string();
        self.modify_todo(ctx, todo_id, move |todo, now| {
            let todo_id = todo.id.clone();
            let subtask = todo
                .subtask_mut(&target)
                .ok_or_else(|| subtask_not_found(&todo_id, &target))?;
            edit(subtask, now);
            Ok(())
        })
        .await
    }

    /// Apply `edit` to the stored todo and advance its update timestamp.
    ///
    /// The timestamp is read inside the store transaction, so commit order and
    /// timestamp order agree.
    async fn modify_todo<F>(
        &self,
        ctx: &SessionContext,
        todo_id: &str,
        edit: F,
    ) -> Result<Todo, AppError>
    where
        F: FnOnce(&mut Todo, DateTime<Utc>) -> Result<(), AppError> + Send + 'static,
    {
        let clock = self.clock.clone();
        let id = todo_id.to_string();
        let mutation: DocumentMutation = Box::new(move |doc: &mut Document| {
            let mut todo: Todo = decode_document(StoredDocument {
                id,
                data: doc.clone(),
            })?;
            let now = clock.now();
            edit(&mut todo, now)?;
            todo.updated_at = now;
            doc.extend(encode_document(&todo)?);
            Ok(())
        });

        let data = self
            .store
            .modify(&Self::collection(ctx, ItemKind::Todo), todo_id, mutation)
            .await?;

        decode_document(StoredDocument {
            id: todo_id.to_string(),
            data,
        })
    }
}

fn ensure_unique_ids(subtasks: &[Subtask]) -> Result<(), AppError> {
    let mut seen = HashSet::new();
    for subtask in subtasks {
        if subtask.id.trim().is_empty() {
            return Err(AppError::Validation("Subtask id is required".to_string()));
        }
        if !seen.insert(subtask.id.as_str()) {
            return Err(AppError::Validation(format!(
                "Duplicate subtask id {}",
                subtask.id
            )));
        }
    }
    Ok(())
}

fn subtask_not_found(todo_id: &str, subtask_id: &str) -> AppError {
    AppError::NotFound(format!(
        "Subtask {} not found in todo {}",
        subtask_id, todo_id
    ))
}
