//! Todo and subtask API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{respond, session_for, ApiResult};
use crate::errors::AppError;
use crate::models::{
    AddSubtaskRequest, CreateTodoRequest, ItemKind, Subtask, Todo, UpdateSubtaskRequest,
    UpdateTodoRequest,
};
use crate::session::SessionContext;
use crate::AppState;

/// GET /api/users/{uid}/todos - Newest first.
pub async fn list_todos(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> ApiResult<Vec<Todo>> {
    let result = async {
        let ctx = session_for(uid)?;
        state.data.list_todos(&ctx).await
    }
    .await;
    respond(&state, result).await
}

/// GET /api/users/{uid}/todos/{id}
pub async fn get_todo(
    State(state): State<AppState>,
    Path((uid, id)): Path<(String, String)>,
) -> ApiResult<Todo> {
    let result = async {
        let ctx = session_for(uid)?;
        fetch_todo(&state, &ctx, &id).await
    }
    .await;
    respond(&state, result).await
}

/// POST /api/users/{uid}/todos - Starts with exactly one subtask.
pub async fn create_todo(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Json(request): Json<CreateTodoRequest>,
) -> ApiResult<Todo> {
    let result = async {
        let ctx = session_for(uid)?;
        let id = state
            .data
            .create_todo(&ctx, &request.title, &request.subtask)
            .await?;
        fetch_todo(&state, &ctx, &id).await
    }
    .await;
    respond(&state, result).await
}

/// PUT /api/users/{uid}/todos/{id}
pub async fn update_todo(
    State(state): State<AppState>,
    Path((uid, id)): Path<(String, String)>,
    Json(request): Json<UpdateTodoRequest>,
) -> ApiResult<Todo> {
    let result = async {
        let ctx = session_for(uid)?;
        state.data.update_todo(&ctx, &id, &request).await?;
        fetch_todo(&state, &ctx, &id).await
    }
    .await;
    respond(&state, result).await
}

/// DELETE /api/users/{uid}/todos/{id} - Succeeds for missing todos.
pub async fn delete_todo(
    State(state): State<AppState>,
    Path((uid, id)): Path<(String, String)>,
) -> ApiResult<()> {
    let result = async {
        let ctx = session_for(uid)?;
        state.data.delete(&ctx, ItemKind::Todo, &id).await
    }
    .await;
    respond(&state, result).await
}

/// POST /api/users/{uid}/todos/{id}/touch
pub async fn touch_todo(
    State(state): State<AppState>,
    Path((uid, id)): Path<(String, String)>,
) -> ApiResult<Todo> {
    let result = async {
        let ctx = session_for(uid)?;
        state.data.touch_updated_at(&ctx, ItemKind::Todo, &id).await?;
        fetch_todo(&state, &ctx, &id).await
    }
    .await;
    respond(&state, result).await
}

/// POST /api/users/{uid}/todos/{id}/subtasks
pub async fn add_subtask(
    State(state): State<AppState>,
    Path((uid, id)): Path<(String, String)>,
    Json(request): Json<AddSubtaskRequest>,
) -> ApiResult<Subtask> {
    let result = async {
        let ctx = session_for(uid)?;
        state.data.add_subtask(&ctx, &id, &request.text).await
    }
    .await;
    respond(&state, result).await
}

/// PUT /api/users/{uid}/todos/{id}/subtasks/{sid}
pub async fn update_subtask(
    State(state): State<AppState>,
    Path((uid, id, sid)): Path<(String, String, String)>,
    Json(request): Json<UpdateSubtaskRequest>,
) -> ApiResult<Todo> {
    let result = async {
        let ctx = session_for(uid)?;
        state.data.update_subtask(&ctx, &id, &sid, &request).await
    }
    .await;
    respond(&state, result).await
}

/// DELETE /api/users/{uid}/todos/{id}/subtasks/{sid}
pub async fn remove_subtask(
    State(state): State<AppState>,
    Path((uid, id, sid)): Path<(String, String, String)>,
) -> ApiResult<Todo> {
    let result = async {
        let ctx = session_for(uid)?;
        state.data.remove_subtask(&ctx, &id, &sid).await
    }
    .await;
    respond(&state, result).await
}

/// POST /api/users/{uid}/todos/{id}/subtasks/{sid}/completed-at
pub async fn touch_subtask_completed_at(
    State(state): State<AppState>,
    Path((uid, id, sid)): Path<(String, String, String)>,
) -> ApiResult<Todo> {
    let result = async {
        let ctx = session_for(uid)?;
        state.data.touch_subtask_completed_at(&ctx, &id, &sid).await
    }
    .await;
    respond(&state, result).await
}

/// POST /api/users/{uid}/todos/{id}/subtasks/{sid}/updated-at
pub async fn touch_subtask_updated_at(
    State(state): State<AppState>,
    Path((uid, id, sid)): Path<(String, String, String)>,
) -> ApiResult<Todo> {
    let result = async {
        let ctx = session_for(uid)?;
        state.data.touch_subtask_updated_at(&ctx, &id, &sid).await
    }
    .await;
    respond(&state, result).await
}

async fn fetch_todo(state: &AppState, ctx: &SessionContext, id: &str) -> Result<Todo, AppError> {
    state
        .data
        .get_todo(ctx, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Todo {} not found", id)))
}
