use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::Session;
use crate::auth::services::LoginOutcome;
use crate::users::repo_types::{Portal, Role, User};

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub portal: Option<Portal>,
}

/// Request body for a password change.
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Returned once per login. The CSRF token must be echoed on every write.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub csrf_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub user: User,
}

impl From<LoginOutcome> for LoginResponse {
    fn from(o: LoginOutcome) -> Self {
        Self {
            token: o.token,
            csrf_token: o.session.csrf_token,
            expires_at: o.session.expires_at,
            user: o.user,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub role: Role,
    #[serde(with = "time::serde::rfc3339")]
    pub login_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl From<&Session> for SessionView {
    fn from(s: &Session) -> Self {
        Self {
            session_id: s.id,
            role: s.role,
            login_at: s.login_at,
            expires_at: s.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_request_accepts_university_as_admin_portal() {
        let req: LoginRequest = serde_json::from_str(
            r#"{"email":"registrar@ksu.edu.sa","password":"x","portal":"university"}"#,
        )
        .unwrap();
        assert_eq!(req.portal, Some(Portal::Admin));

        let req: LoginRequest = serde_json::from_str(r#"{"email":"a@b.sa","password":"x"}"#).unwrap();
        assert!(req.portal.is_none());
    }
}
