use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::storage::StoreError;

/// Error kinds surfaced by the services. Handlers return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Email already registered.")]
    DuplicateEmail,

    #[error("{0}")]
    WeakPassword(String),

    #[error("Invalid credentials. {remaining_attempts} attempts remaining.")]
    InvalidCredentials { remaining_attempts: u32 },

    #[error("This account has been disabled. Contact admin.")]
    AccountDisabled,

    #[error("Too many attempts. Try again in {retry_after_seconds}s.")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Invalid credentials for this login portal.")]
    WrongPortal,

    #[error("{0} not found.")]
    NotFound(&'static str),

    #[error("Already applied.")]
    AlreadyApplied,

    #[error("Opportunity is closed.")]
    OpportunityClosed,

    #[error("Forbidden")]
    Forbidden,

    #[error("{0}")]
    StateConflict(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        AppError::InvalidInput(msg.into())
    }

    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            AppError::DuplicateEmail => (StatusCode::CONFLICT, "DUPLICATE_EMAIL"),
            AppError::WeakPassword(_) => (StatusCode::BAD_REQUEST, "WEAK_PASSWORD"),
            AppError::InvalidCredentials { .. } => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            AppError::AccountDisabled => (StatusCode::FORBIDDEN, "ACCOUNT_DISABLED"),
            AppError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            AppError::WrongPortal => (StatusCode::UNAUTHORIZED, "WRONG_PORTAL"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::AlreadyApplied => (StatusCode::CONFLICT, "ALREADY_APPLIED"),
            AppError::OpportunityClosed => (StatusCode::CONFLICT, "OPPORTUNITY_CLOSED"),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            AppError::StateConflict(_) => (StatusCode::CONFLICT, "STATE_CONFLICT"),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            AppError::Storage(StoreError::Conflict) => (StatusCode::CONFLICT, "CONFLICT"),
            AppError::Storage(StoreError::NotFound) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Storage(StoreError::Unavailable(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR")
            }
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        let message = match &self {
            AppError::Storage(StoreError::Unavailable(e)) => {
                tracing::error!(error = %e, "storage error");
                "A storage error occurred".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!(error = ?e, "internal error");
                "An internal server error occurred".to_string()
            }
            other => other.to_string(),
        };

        let mut error = json!({ "code": code, "message": message });
        match &self {
            AppError::InvalidCredentials { remaining_attempts } => {
                error["remaining_attempts"] = json!(remaining_attempts);
            }
            AppError::RateLimited { retry_after_seconds } => {
                error["retry_after_seconds"] = json!(retry_after_seconds);
            }
            _ => {}
        }

        let mut response = (status, Json(json!({ "error": error }))).into_response();
        if let AppError::RateLimited { retry_after_seconds } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_credentials_message_carries_remaining_attempts() {
        let err = AppError::InvalidCredentials { remaining_attempts: 3 };
        assert_eq!(err.to_string(), "Invalid credentials. 3 attempts remaining.");
    }

    #[test]
    fn rate_limited_sets_retry_after() {
        let response = AppError::RateLimited { retry_after_seconds: 120 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "120");
    }

    #[test]
    fn storage_faults_render_as_500() {
        let response = AppError::Storage(StoreError::Unavailable("pool timed out".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(AppError::AlreadyApplied.into_response().status(), StatusCode::CONFLICT);
    }
}
