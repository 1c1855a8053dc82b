//! Notes Sync server
//!
//! Serves per-user notes and todos from a SQLite document store, with live
//! snapshots over server-sent events.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use notes_sync::config::Config;
use notes_sync::data::DataAccess;
use notes_sync::db::{self, SqliteDocumentStore};
use notes_sync::update_check::UpdateChecker;
use notes_sync::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if config.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting Notes Sync {}", notes_sync::update_check::CURRENT_VERSION);
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (NOTES_API_PSK). Authentication is disabled!");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let store = Arc::new(SqliteDocumentStore::new(pool));
    let data = Arc::new(DataAccess::new(store));

    let updates = Arc::new(UpdateChecker::new(
        config.releases_url.clone(),
        config.update_timeout,
    )?);
    if config.releases_url.is_none() {
        tracing::info!("Release URL not set (NOTES_RELEASES_URL); update checks disabled");
    }

    let state = AppState {
        data,
        updates,
        config: Arc::new(config.clone()),
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
