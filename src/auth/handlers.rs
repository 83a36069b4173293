use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::instrument;

use crate::{
    auth::{
        dto::{ChangePasswordRequest, LoginRequest, LoginResponse, SessionView},
        extractors::CurrentUser,
        services,
    },
    error::AppError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/refresh", post(refresh))
        .route("/auth/session", get(session))
        .route("/auth/password", post(change_password))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let outcome = services::login(&state, &payload.email, &payload.password, payload.portal).await?;
    Ok(Json(outcome.into()))
}

#[instrument(skip(state, current))]
pub async fn logout(State(state): State<AppState>, current: CurrentUser) -> Result<StatusCode, AppError> {
    services::logout(&state, current.session.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, current))]
pub async fn refresh(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<SessionView>, AppError> {
    let session = services::refresh(&state, current.session.id)
        .await?
        .ok_or(AppError::Unauthorized)?;
    Ok(Json(SessionView::from(&session)))
}

#[instrument(skip(current))]
pub async fn session(current: CurrentUser) -> Json<Value> {
    Json(json!({
        "session": SessionView::from(&current.session),
        "user": current.user,
    }))
}

#[instrument(skip(state, current, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<StatusCode, AppError> {
    services::change_password(
        &state,
        &current.user,
        &payload.current_password,
        &payload.new_password,
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
