//! Routes for the user-management sample.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use simplecqrs_core::event::DomainEvent;
use simplecqrs_users::application::query_handlers::{EventView, UserDetails, UserView};
use simplecqrs_users::application::{command_handlers, query_handlers};
use simplecqrs_users::domain::commands;
use simplecqrs_users::domain::events::UserEvent;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    /// The identifier of the new user.
    pub id: i64,
    /// The user's name.
    pub name: String,
    /// The user's email address.
    pub email: String,
    /// The user's age.
    pub age: i32,
}

/// Request body for the PUT endpoints that change a single field.
#[derive(Debug, Deserialize)]
pub struct ChangeRequest<T> {
    /// The new value.
    pub value: T,
    /// Version the client last observed. Omit to use the loaded version.
    pub expected_version: Option<i64>,
}

/// Query string for GET /{id}.
#[derive(Debug, Deserialize)]
pub struct UserQuery {
    /// Return the user as it was at this instant (RFC 3339).
    pub as_of: Option<DateTime<Utc>>,
}

/// Response body returned after a command is successfully handled.
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    /// IDs of the domain events produced and persisted.
    pub event_ids: Vec<Uuid>,
    /// Version after the last persisted event, `null` when nothing changed.
    pub version: Option<i64>,
}

impl CommandResponse {
    fn from_events(events: &[UserEvent]) -> Self {
        Self {
            event_ids: events.iter().map(|e| e.metadata.event_id()).collect(),
            version: events.last().map(DomainEvent::sequence_number),
        }
    }
}

/// POST /
#[instrument(skip(state, request), fields(user_id = request.id))]
async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<CommandResponse>), ApiError> {
    let command = commands::CreateUser {
        correlation_id: Uuid::new_v4(),
        user_id: request.id,
        name: request.name,
        email: request.email,
        age: request.age,
    };

    info!(correlation_id = %command.correlation_id, "handling create_user command");

    let events =
        command_handlers::handle_create_user(&command, state.clock.as_ref(), &state.users())
            .await?;

    Ok((
        StatusCode::CREATED,
        Json(CommandResponse::from_events(&events)),
    ))
}

/// PUT /{id}/name
#[instrument(skip(state, request))]
async fn change_name(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(request): Json<ChangeRequest<String>>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::ChangeName {
        correlation_id: Uuid::new_v4(),
        user_id,
        name: request.value,
        expected_version: request.expected_version,
    };

    info!(correlation_id = %command.correlation_id, "handling change_name command");

    let events =
        command_handlers::handle_change_name(&command, state.clock.as_ref(), &state.users())
            .await?;

    Ok(Json(CommandResponse::from_events(&events)))
}

/// PUT /{id}/email
#[instrument(skip(state, request))]
async fn change_email(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(request): Json<ChangeRequest<String>>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::ChangeEmail {
        correlation_id: Uuid::new_v4(),
        user_id,
        email: request.value,
        expected_version: request.expected_version,
    };

    info!(correlation_id = %command.correlation_id, "handling change_email command");

    let events =
        command_handlers::handle_change_email(&command, state.clock.as_ref(), &state.users())
            .await?;

    Ok(Json(CommandResponse::from_events(&events)))
}

/// PUT /{id}/age
#[instrument(skip(state, request))]
async fn change_age(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(request): Json<ChangeRequest<i32>>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::ChangeAge {
        correlation_id: Uuid::new_v4(),
        user_id,
        age: request.value,
        expected_version: request.expected_version,
    };

    info!(correlation_id = %command.correlation_id, "handling change_age command");

    let events =
        command_handlers::handle_change_age(&command, state.clock.as_ref(), &state.users())
            .await?;

    Ok(Json(CommandResponse::from_events(&events)))
}

/// GET /
#[instrument(skip(state))]
async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserDetails>>, ApiError> {
    let listing = state.user_listing();
    let users = query_handlers::list_users(listing.as_ref(), &state.users()).await?;
    Ok(Json(users))
}

/// GET /{id}
#[instrument(skip(state))]
async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<UserQuery>,
) -> Result<Json<UserView>, ApiError> {
    let repo = state.users();
    let view = match query.as_of {
        Some(cutoff) => query_handlers::get_user_as_of(user_id, cutoff, &repo).await?,
        None => query_handlers::get_user(user_id, &repo).await?,
    };
    Ok(Json(view))
}

/// GET /{id}/events
#[instrument(skip(state))]
async fn get_user_events(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<EventView>>, ApiError> {
    let history = query_handlers::get_user_history(user_id, &state.users()).await?;
    Ok(Json(history))
}

/// Returns the router for the user endpoints.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_user).get(list_users))
        .route("/{id}", get(get_user))
        .route("/{id}/events", get(get_user_events))
        .route("/{id}/name", put(change_name))
        .route("/{id}/email", put(change_email))
        .route("/{id}/age", put(change_age))
}
