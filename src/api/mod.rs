//! REST API module.
//!
//! Every per-user route carries the user identifier in its path; handlers
//! resolve it into a [`SessionContext`] before touching the data layer.

mod items;
mod meta;
mod notes;
mod todos;
mod watch;

pub use items::*;
pub use meta::*;
pub use notes::*;
pub use todos::*;
pub use watch::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::{AppError, AppErrorWithRevision};
use crate::session::{SessionContext, UserId};
use crate::AppState;

/// Success response envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub revision_id: i64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T, revision_id: i64) -> Self {
        Self {
            success: true,
            data,
            revision_id,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, AppErrorWithRevision>;

pub fn success<T: Serialize>(data: T, revision_id: i64) -> ApiResult<T> {
    Ok(ApiResponse::new(data, revision_id))
}

pub fn error<T: Serialize>(err: AppError, revision_id: i64) -> ApiResult<T> {
    Err(AppErrorWithRevision {
        error: err,
        revision_id,
    })
}

/// Wrap the outcome of an operation with the revision it left the store at.
pub async fn respond<T: Serialize>(state: &AppState, result: Result<T, AppError>) -> ApiResult<T> {
    let revision_id = current_revision(state).await;
    match result {
        Ok(data) => success(data, revision_id),
        Err(e) => error(e, revision_id),
    }
}

async fn current_revision(state: &AppState) -> i64 {
    match state.data.store().revision().await {
        Ok(info) => info.revision_id,
        Err(e) => {
            tracing::warn!("Failed to read revision: {}", e);
            0
        }
    }
}

/// Resolve the `{uid}` path segment.
fn session_for(uid: String) -> Result<SessionContext, AppError> {
    Ok(SessionContext::new(UserId::parse(uid)?))
}
