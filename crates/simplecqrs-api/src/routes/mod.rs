//! HTTP routes.

pub mod health;
pub mod users;

use axum::Router;

use crate::state::AppState;

/// Builds the application router: health check plus the versioned user API.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .nest("/api/v1/users", users::router())
        .with_state(state)
}
