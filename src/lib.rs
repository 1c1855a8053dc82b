//! Per-user notes and todos over a SQLite document store, with live
//! collection subscriptions and a REST/SSE front.

pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod db;
pub mod errors;
pub mod models;
pub mod session;
pub mod update_check;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use data::DataAccess;
use update_check::UpdateChecker;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub data: Arc<DataAccess>,
    pub updates: Arc<UpdateChecker>,
    pub config: Arc<Config>,
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let psk = state.config.api_psk.clone();

    let user_routes = Router::new()
        // Notes
        .route("/notes", get(api::list_notes).post(api::create_note))
        .route("/notes/watch", get(api::watch_notes))
        .route(
            "/notes/{id}",
            get(api::get_note)
                .put(api::update_note)
                .delete(api::delete_note),
        )
        .route("/notes/{id}/touch", post(api::touch_note))
        // Todos
        .route("/todos", get(api::list_todos).post(api::create_todo))
        .route("/todos/watch", get(api::watch_todos))
        .route(
            "/todos/{id}",
            get(api::get_todo)
                .put(api::update_todo)
                .delete(api::delete_todo),
        )
        .route("/todos/{id}/touch", post(api::touch_todo))
        .route("/todos/{id}/subtasks", post(api::add_subtask))
        .route(
            "/todos/{id}/subtasks/{sid}",
            put(api::update_subtask).delete(api::remove_subtask),
        )
        .route(
            "/todos/{id}/subtasks/{sid}/completed-at",
            post(api::touch_subtask_completed_at),
        )
        .route(
            "/todos/{id}/subtasks/{sid}/updated-at",
            post(api::touch_subtask_updated_at),
        )
        // Feed and profile
        .route("/items", get(api::list_items))
        .route("/profile", get(api::get_profile).put(api::put_profile));

    let api_routes = Router::new()
        .route("/revision", get(api::get_revision))
        .route("/about", get(api::get_about))
        .nest("/users/{uid}", user_routes)
        // Apply PSK auth middleware
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
