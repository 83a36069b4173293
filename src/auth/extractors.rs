use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, Method},
};
use tracing::warn;

use crate::auth::repo_types::Session;
use crate::auth::services::authenticate;
use crate::error::AppError;
use crate::state::AppState;
use crate::users::repo_types::User;

pub const CSRF_HEADER: &str = "x-csrf-token";

/// Caller resolved from the bearer token: live session plus the current user record.
/// State-changing requests must echo the session's CSRF token.
pub struct CurrentUser {
    pub session: Session,
    pub user: User,
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(AppError::Unauthorized)?;

        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or(AppError::Unauthorized)?;

        let (session, user) = authenticate(state, token).await?;

        if !matches!(parts.method, Method::GET | Method::HEAD | Method::OPTIONS) {
            let csrf = parts
                .headers
                .get(CSRF_HEADER)
                .and_then(|h| h.to_str().ok())
                .unwrap_or_default();
            if csrf != session.csrf_token {
                warn!(user_id = %user.id, method = %parts.method, "csrf token mismatch");
                return Err(AppError::Forbidden);
            }
        }

        Ok(CurrentUser { session, user })
    }
}
