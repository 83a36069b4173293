use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::extractors::CurrentUser,
    error::AppError,
    scoring::ErsBreakdown,
    state::AppState,
    users::{
        dto::{
            AcademicScoreRequest, AddCertificationRequest, AddProjectRequest, CandidateFilter,
            CandidateSummary, CoopEligibilityRequest, LeaderboardEntry, LeaderboardQuery,
            RecordActivityRequest, RecordConductRequest, RegisterRequest, SetDisabledRequest,
            StudentProfileUpdate, TranscriptReviewRequest, TranscriptUpload,
            VerifyCertificationRequest,
        },
        ranking,
        repo_types::{ConductRecord, Role, User},
        services,
    },
};

// --- public routers ---

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(me))
        .route("/me/ers", get(my_ers))
        .route("/catalog", get(catalog))
        .route("/leaderboard", get(leaderboard))
        .route("/students/search", get(search))
        .route("/students/:id", get(student))
        .route("/admin/users", get(list_users))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/me/profile", put(update_profile))
        .route("/me/projects", post(add_project))
        .route("/me/certifications", post(add_certification))
        .route("/me/transcript", post(report_transcript))
        .route("/students/:id/transcript/review", post(review_transcript))
        .route("/students/:id/certifications/verify", post(verify_certification))
        .route("/students/:id/academic-score", put(set_academic_score))
        .route("/students/:id/activities", post(record_activity))
        .route("/students/:id/conduct", post(record_conduct))
        .route("/students/:id/coop-eligibility", put(set_coop_eligibility))
        .route("/admin/users/:id/disabled", put(set_disabled))
}

// --- handlers ---

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let user = services::register(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn me(current: CurrentUser) -> Json<User> {
    Json(current.user)
}

pub async fn my_ers(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<ErsBreakdown>, AppError> {
    Ok(Json(ranking::scorecard(&state, &current.user)?))
}

pub async fn catalog(State(state): State<AppState>, _current: CurrentUser) -> Json<Value> {
    Json(json!({
        "certifications": state.catalog.certifications(),
        "activities": state.catalog.activities(),
    }))
}

#[instrument(skip(state, current))]
pub async fn leaderboard(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<Vec<LeaderboardEntry>>, AppError> {
    Ok(Json(ranking::leaderboard(&state, &current.user, &query).await?))
}

#[instrument(skip(state, current))]
pub async fn search(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(filter): Query<CandidateFilter>,
) -> Result<Json<Vec<CandidateSummary>>, AppError> {
    Ok(Json(ranking::search_candidates(&state, &current.user, &filter).await?))
}

/// Full student record for recruiters and staff.
#[instrument(skip(state, current))]
pub async fn student(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, AppError> {
    if current.user.id != id && current.user.role() == Role::Student {
        return Err(AppError::Forbidden);
    }
    let user = services::find_by_id(&state, id).await?;
    if user.student().is_none() {
        return Err(AppError::NotFound("Student"));
    }
    Ok(Json(user))
}

#[instrument(skip(state, current, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<StudentProfileUpdate>,
) -> Result<Json<User>, AppError> {
    Ok(Json(services::update_student_profile(&state, &current.user, payload).await?))
}

#[instrument(skip(state, current, payload))]
pub async fn add_project(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<AddProjectRequest>,
) -> Result<Json<User>, AppError> {
    Ok(Json(services::add_project(&state, &current.user, &payload.title).await?))
}

#[instrument(skip(state, current, payload))]
pub async fn add_certification(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<AddCertificationRequest>,
) -> Result<Json<User>, AppError> {
    let user =
        services::add_certification(&state, &current.user, &payload.name, payload.external_id).await?;
    Ok(Json(user))
}

#[instrument(skip(state, current))]
pub async fn report_transcript(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<TranscriptUpload>,
) -> Result<Json<User>, AppError> {
    Ok(Json(services::report_transcript_upload(&state, &current.user, &payload).await?))
}

#[instrument(skip(state, current))]
pub async fn review_transcript(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<TranscriptReviewRequest>,
) -> Result<Json<User>, AppError> {
    Ok(Json(services::review_transcript(&state, &current.user, id, payload.approve).await?))
}

#[instrument(skip(state, current))]
pub async fn verify_certification(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<VerifyCertificationRequest>,
) -> Result<Json<User>, AppError> {
    Ok(Json(services::verify_certification(&state, &current.user, id, &payload.name).await?))
}

#[instrument(skip(state, current))]
pub async fn set_academic_score(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AcademicScoreRequest>,
) -> Result<Json<User>, AppError> {
    Ok(Json(services::set_academic_score(&state, &current.user, id, payload.score).await?))
}

#[instrument(skip(state, current))]
pub async fn record_activity(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<RecordActivityRequest>,
) -> Result<Json<User>, AppError> {
    let user = services::record_activity(
        &state,
        &current.user,
        id,
        &payload.name,
        payload.points,
        payload.date,
    )
    .await?;
    Ok(Json(user))
}

#[instrument(skip(state, current))]
pub async fn record_conduct(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<RecordConductRequest>,
) -> Result<Json<User>, AppError> {
    let record = ConductRecord {
        kind: payload.kind,
        description: payload.description,
        date: payload.date,
        impact_points: payload.impact_points,
    };
    Ok(Json(services::record_conduct(&state, &current.user, id, record).await?))
}

#[instrument(skip(state, current))]
pub async fn set_coop_eligibility(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<CoopEligibilityRequest>,
) -> Result<Json<User>, AppError> {
    Ok(Json(services::set_coop_eligibility(&state, &current.user, id, payload.eligible).await?))
}

#[instrument(skip(state, current))]
pub async fn list_users(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(services::list_users(&state, &current.user).await?))
}

#[instrument(skip(state, current))]
pub async fn set_disabled(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetDisabledRequest>,
) -> Result<Json<User>, AppError> {
    Ok(Json(services::set_disabled(&state, &current.user, id, payload.disabled).await?))
}
