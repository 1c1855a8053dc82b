//! Combined feed and profile endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{respond, session_for, ApiResult};
use crate::errors::AppError;
use crate::models::{Item, UserProfile};
use crate::AppState;

/// GET /api/users/{uid}/items - Notes and todos, most recently updated first.
pub async fn list_items(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> ApiResult<Vec<Item>> {
    let result = async {
        let ctx = session_for(uid)?;
        state.data.list_items(&ctx).await
    }
    .await;
    respond(&state, result).await
}

/// GET /api/users/{uid}/profile - Empty profile when none was stored.
pub async fn get_profile(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> ApiResult<UserProfile> {
    let result = async {
        let ctx = session_for(uid)?;
        Ok::<_, AppError>(state.data.get_profile(&ctx).await?.unwrap_or_default())
    }
    .await;
    respond(&state, result).await
}

/// PUT /api/users/{uid}/profile
pub async fn put_profile(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Json(profile): Json<UserProfile>,
) -> ApiResult<UserProfile> {
    let result = async {
        let ctx = session_for(uid)?;
        state.data.save_profile(&ctx, &profile).await?;
        Ok::<_, AppError>(profile)
    }
    .await;
    respond(&state, result).await
}
