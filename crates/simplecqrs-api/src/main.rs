//! SimpleCQRS API server entry point.

use std::sync::Arc;

use simplecqrs_api::config::AppConfig;
use simplecqrs_api::error::AppError;
use simplecqrs_api::routes;
use simplecqrs_api::state::{AppState, StorageProvider};
use simplecqrs_core::clock::SystemClock;
use simplecqrs_store::memory::InMemoryStore;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting SimpleCQRS API server");

    let config = AppConfig::from_env()?;

    let storage: Arc<dyn StorageProvider> = match &config.database_url {
        Some(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(database_url)
                .await?;
            simplecqrs_store::postgres::migrate(&pool).await?;
            tracing::info!("Using PostgreSQL event store");
            Arc::new(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, events are kept in memory only");
            Arc::new(InMemoryStore::new())
        }
    };

    let app_state = AppState::new(Arc::new(SystemClock), storage);

    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    let app = routes::app(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = config.socket_addr()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
