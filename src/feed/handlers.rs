use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::extractors::CurrentUser,
    error::AppError,
    feed::{
        repo_types::{AuditEntry, Notification},
        services,
    },
    state::AppState,
};

pub fn feed_routes() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list))
        .route("/notifications/unread-count", get(unread_count))
        .route("/notifications/read-all", post(mark_all_read))
        .route("/notifications/:id/read", post(mark_read))
        .route("/admin/audit", get(audit_log))
}

pub async fn list(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<Vec<Notification>>, AppError> {
    Ok(Json(services::notifications_for(&state, current.user.id).await?))
}

pub async fn unread_count(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<Value>, AppError> {
    let unread = services::unread_count(&state, current.user.id).await?;
    Ok(Json(json!({ "unread": unread })))
}

#[instrument(skip(state, current))]
pub async fn mark_read(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    services::mark_read(&state, current.user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, current))]
pub async fn mark_all_read(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<Value>, AppError> {
    let updated = services::mark_all_read(&state, current.user.id).await?;
    Ok(Json(json!({ "updated": updated })))
}

pub async fn audit_log(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<Vec<AuditEntry>>, AppError> {
    Ok(Json(services::audit_log(&state, &current.user).await?))
}
