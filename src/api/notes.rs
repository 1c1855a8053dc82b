//! Note API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{respond, session_for, ApiResult};
use crate::errors::AppError;
use crate::models::{CreateNoteRequest, ItemKind, Note, UpdateNoteRequest};
use crate::session::SessionContext;
use crate::AppState;

/// GET /api/users/{uid}/notes - Newest first.
pub async fn list_notes(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> ApiResult<Vec<Note>> {
    let result = async {
        let ctx = session_for(uid)?;
        state.data.list_notes(&ctx).await
    }
    .await;
    respond(&state, result).await
}

/// GET /api/users/{uid}/notes/{id}
pub async fn get_note(
    State(state): State<AppState>,
    Path((uid, id)): Path<(String, String)>,
) -> ApiResult<Note> {
    let result = async {
        let ctx = session_for(uid)?;
        fetch_note(&state, &ctx, &id).await
    }
    .await;
    respond(&state, result).await
}

/// POST /api/users/{uid}/notes
pub async fn create_note(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Json(request): Json<CreateNoteRequest>,
) -> ApiResult<Note> {
    let result = async {
        let ctx = session_for(uid)?;
        let id = state
            .data
            .create_note(&ctx, &request.title, &request.content)
            .await?;
        fetch_note(&state, &ctx, &id).await
    }
    .await;
    respond(&state, result).await
}

/// PUT /api/users/{uid}/notes/{id} - Absent fields are left alone.
pub async fn update_note(
    State(state): State<AppState>,
    Path((uid, id)): Path<(String, String)>,
    Json(request): Json<UpdateNoteRequest>,
) -> ApiResult<Note> {
    let result = async {
        let ctx = session_for(uid)?;
        state.data.update_note(&ctx, &id, &request).await?;
        fetch_note(&state, &ctx, &id).await
    }
    .await;
    respond(&state, result).await
}

/// DELETE /api/users/{uid}/notes/{id} - Succeeds for missing notes.
pub async fn delete_note(
    State(state): State<AppState>,
    Path((uid, id)): Path<(String, String)>,
) -> ApiResult<()> {
    let result = async {
        let ctx = session_for(uid)?;
        state.data.delete(&ctx, ItemKind::Note, &id).await
    }
    .await;
    respond(&state, result).await
}

/// POST /api/users/{uid}/notes/{id}/touch - Move the note to the top of the feed.
pub async fn touch_note(
    State(state): State<AppState>,
    Path((uid, id)): Path<(String, String)>,
) -> ApiResult<Note> {
    let result = async {
        let ctx = session_for(uid)?;
        state.data.touch_updated_at(&ctx, ItemKind::Note, &id).await?;
        fetch_note(&state, &ctx, &id).await
    }
    .await;
    respond(&state, result).await
}

async fn fetch_note(state: &AppState, ctx: &SessionContext, id: &str) -> Result<Note, AppError> {
    state
        .data
        .get_note(ctx, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Note {} not found", id)))
}
