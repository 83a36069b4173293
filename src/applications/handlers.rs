use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    applications::{
        dto::{ApplicantView, ApplicantsQuery, MyApplicationView, UpdateStatusRequest},
        repo_types::Application,
        services,
    },
    auth::extractors::CurrentUser,
    error::AppError,
    state::AppState,
};

pub fn application_routes() -> Router<AppState> {
    Router::new()
        .route("/opportunities/:id/apply", post(apply))
        .route("/opportunities/:id/applications", get(applicants))
        .route("/applications/mine", get(mine))
        .route("/applications/:id", delete(withdraw))
        .route("/applications/:id/status", put(update_status))
}

#[instrument(skip(state, current))]
pub async fn apply(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(opportunity_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Application>), AppError> {
    let application = services::apply_to_opportunity(&state, &current.user, opportunity_id).await?;
    Ok((StatusCode::CREATED, Json(application)))
}

#[instrument(skip(state, current))]
pub async fn applicants(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(opportunity_id): Path<Uuid>,
    Query(query): Query<ApplicantsQuery>,
) -> Result<Json<Vec<ApplicantView>>, AppError> {
    let list =
        services::list_for_opportunity(&state, &current.user, opportunity_id, query.sort).await?;
    Ok(Json(list))
}

pub async fn mine(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<Vec<MyApplicationView>>, AppError> {
    Ok(Json(services::list_for_student(&state, &current.user).await?))
}

#[instrument(skip(state, current))]
pub async fn withdraw(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    services::withdraw_application(&state, &current.user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, current))]
pub async fn update_status(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Application>, AppError> {
    let application =
        services::update_application_status(&state, &current.user, id, payload.status).await?;
    Ok(Json(application))
}
