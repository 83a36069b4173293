use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::extractors::CurrentUser,
    error::AppError,
    opportunities::{
        dto::{CreateOpportunityRequest, EligibilityReport, SetStatusRequest, UpdateOpportunityRequest},
        repo_types::Opportunity,
        services,
    },
    state::AppState,
};

pub fn opportunity_routes() -> Router<AppState> {
    Router::new()
        .route("/opportunities", get(list_open).post(create))
        .route("/opportunities/mine", get(list_mine))
        .route(
            "/opportunities/:id",
            get(get_one).patch(update).delete(delete),
        )
        .route("/opportunities/:id/status", put(set_status))
        .route("/opportunities/:id/eligibility", get(eligibility))
}

pub async fn list_open(
    State(state): State<AppState>,
    _current: CurrentUser,
) -> Result<Json<Vec<Opportunity>>, AppError> {
    Ok(Json(services::list_open(&state).await?))
}

pub async fn list_mine(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<Vec<Opportunity>>, AppError> {
    Ok(Json(services::list_by_owner(&state, current.user.id).await?))
}

#[instrument(skip(state, _current))]
pub async fn get_one(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Opportunity>, AppError> {
    Ok(Json(services::get(&state, id).await?))
}

#[instrument(skip(state, current, payload))]
pub async fn create(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<CreateOpportunityRequest>,
) -> Result<(StatusCode, Json<Opportunity>), AppError> {
    let opp = services::create_opportunity(&state, &current.user, payload).await?;
    Ok((StatusCode::CREATED, Json(opp)))
}

#[instrument(skip(state, current, payload))]
pub async fn update(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOpportunityRequest>,
) -> Result<Json<Opportunity>, AppError> {
    Ok(Json(services::update_opportunity(&state, &current.user, id, payload).await?))
}

#[instrument(skip(state, current))]
pub async fn set_status(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetStatusRequest>,
) -> Result<Json<Opportunity>, AppError> {
    Ok(Json(services::set_status(&state, &current.user, id, payload.status).await?))
}

#[instrument(skip(state, current))]
pub async fn delete(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    services::delete_opportunity(&state, &current.user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, current))]
pub async fn eligibility(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<EligibilityReport>, AppError> {
    Ok(Json(services::check_eligibility(&state, &current.user, id).await?))
}
