//! Store revision and build information endpoints.

use axum::extract::State;
use serde::Serialize;

use super::{success, ApiResult};
use crate::errors::AppErrorWithRevision;
use crate::models::RevisionInfo;
use crate::update_check::UpdateStatus;
use crate::AppState;

/// Payload of `GET /api/about`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AboutInfo {
    pub version: String,
    pub update: UpdateStatus,
}

/// GET /api/revision - Get the current revision info.
pub async fn get_revision(State(state): State<AppState>) -> ApiResult<RevisionInfo> {
    let revision_info = state
        .data
        .store()
        .revision()
        .await
        .map_err(|e| AppErrorWithRevision {
            error: e,
            revision_id: 0,
        })?;

    let revision_id = revision_info.revision_id;
    success(revision_info, revision_id)
}

/// GET /api/about - Running version and whether a newer release exists.
pub async fn get_about(State(state): State<AppState>) -> ApiResult<AboutInfo> {
    let update = state.updates.check().await;
    let revision_id = super::current_revision(&state).await;

    success(
        AboutInfo {
            version: state.updates.current_version().to_string(),
            update,
        },
        revision_id,
    )
}
