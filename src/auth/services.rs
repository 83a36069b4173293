use rand::{distributions::Alphanumeric, Rng};
use time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::password::{validate_password_strength, MAX_PASSWORD_LEN};
use crate::auth::rate_limit::{self, RateLimitDecision};
use crate::auth::repo_types::Session;
use crate::error::AppError;
use crate::feed::services::audit;
use crate::state::AppState;
use crate::storage::{SessionRepo, UserRepo};
use crate::users::repo_types::{Portal, User};

pub const MAX_EMAIL_LEN: usize = 255;
const CSRF_TOKEN_LEN: usize = 32;

/// A freshly issued session and the bearer token naming it.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub session: Session,
    pub token: String,
    pub user: User,
}

fn generate_csrf_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CSRF_TOKEN_LEN)
        .map(char::from)
        .collect()
}

fn session_timeout(state: &AppState) -> Duration {
    Duration::minutes(state.config.session.timeout_minutes)
}

async fn issue_session(state: &AppState, user: User) -> Result<LoginOutcome, AppError> {
    let now = state.clock.now();
    let session = Session {
        id: Uuid::new_v4(),
        user_id: user.id,
        role: user.role(),
        login_at: now,
        expires_at: now + session_timeout(state),
        csrf_token: generate_csrf_token(),
    };
    state.store.insert_session(&session).await?;
    let token = state.tokens.sign(&session)?;
    Ok(LoginOutcome { session, token, user })
}

/// Password login. `portal` is the entry point the caller used; when given,
/// the account's role must be admitted by it.
#[instrument(skip(state, password))]
pub async fn login(
    state: &AppState,
    email: &str,
    password: &str,
    portal: Option<Portal>,
) -> Result<LoginOutcome, AppError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || password.is_empty() {
        return Err(AppError::invalid("Please fill in all fields."));
    }
    if email.chars().count() > MAX_EMAIL_LEN || password.chars().count() > MAX_PASSWORD_LEN {
        return Err(AppError::invalid("Email or password is too long."));
    }

    let user = state.store.find_user_by_email(&email).await?;
    if let Some(user) = user.as_ref().filter(|u| u.disabled) {
        warn!(user_id = %user.id, "login on disabled account");
        return Err(AppError::AccountDisabled);
    }

    let remaining_attempts = match rate_limit::reserve_attempt(state, &email).await? {
        RateLimitDecision::Blocked { retry_after_seconds } => {
            warn!(email = %email, retry_after_seconds, "login rejected while locked out");
            return Err(AppError::RateLimited { retry_after_seconds });
        }
        RateLimitDecision::Allowed { remaining_attempts } => remaining_attempts,
    };

    let Some(user) = user else {
        state.passwords.verify_dummy(password);
        warn!(email = %email, "login unknown email");
        return Err(AppError::InvalidCredentials { remaining_attempts });
    };

    if !state.passwords.verify(password, &user.password_hash)? {
        warn!(email = %email, user_id = %user.id, "login invalid password");
        return Err(AppError::InvalidCredentials { remaining_attempts });
    }
    rate_limit::record_attempt(state, &email, true).await?;

    if let Some(portal) = portal {
        if !portal.admits(user.role()) {
            warn!(user_id = %user.id, ?portal, "login through wrong portal");
            return Err(AppError::WrongPortal);
        }
    }

    let message = format!("Login: {} ({})", user.email, user.role());
    let outcome = issue_session(state, user).await?;
    audit(state, message).await?;
    info!(user_id = %outcome.user.id, session_id = %outcome.session.id, "user logged in");
    Ok(outcome)
}

/// Session for an identity already verified by an external provider.
/// The password path is skipped; account status and portal still apply.
#[instrument(skip(state))]
pub async fn login_external(
    state: &AppState,
    email: &str,
    portal: Option<Portal>,
) -> Result<LoginOutcome, AppError> {
    let email = email.trim().to_lowercase();
    let user = state
        .store
        .find_user_by_email(&email)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    if user.disabled {
        return Err(AppError::AccountDisabled);
    }
    if let Some(portal) = portal {
        if !portal.admits(user.role()) {
            return Err(AppError::WrongPortal);
        }
    }

    let message = format!("Login: {} ({}) via identity provider", user.email, user.role());
    let outcome = issue_session(state, user).await?;
    audit(state, message).await?;
    info!(user_id = %outcome.user.id, session_id = %outcome.session.id, "external login");
    Ok(outcome)
}

/// Returns the live session, or `None`. An expired session is revoked on the way.
pub async fn validate(state: &AppState, session_id: Uuid) -> Result<Option<Session>, AppError> {
    let Some(session) = state.store.find_session(session_id).await? else {
        return Ok(None);
    };
    if !session.is_expired(state.clock.now()) {
        return Ok(Some(session));
    }

    state.store.delete_session(session.id).await?;
    let message = match state.store.find_user_by_id(session.user_id).await? {
        Some(user) => format!("Session expired: {}", user.email),
        None => "Session expired".to_string(),
    };
    audit(state, message).await?;
    info!(session_id = %session.id, "session expired");
    Ok(None)
}

/// Slides the expiry forward. No-op for a missing or expired session.
pub async fn refresh(state: &AppState, session_id: Uuid) -> Result<Option<Session>, AppError> {
    let Some(mut session) = validate(state, session_id).await? else {
        return Ok(None);
    };
    session.expires_at = state.clock.now() + session_timeout(state);
    if !state.store.touch_session(session.id, session.expires_at).await? {
        return Ok(None);
    }
    Ok(Some(session))
}

/// Revokes the session unconditionally.
pub async fn logout(state: &AppState, session_id: Uuid) -> Result<(), AppError> {
    if let Some(session) = state.store.find_session(session_id).await? {
        if let Some(user) = state.store.find_user_by_id(session.user_id).await? {
            audit(state, format!("Logout: {}", user.email)).await?;
        }
    }
    state.store.delete_session(session_id).await?;
    info!(session_id = %session_id, "session revoked");
    Ok(())
}

/// Resolves a bearer token to its live session and the current user record.
pub async fn authenticate(state: &AppState, token: &str) -> Result<(Session, User), AppError> {
    let claims = state.tokens.verify(token).map_err(|_| {
        warn!("invalid or expired token");
        AppError::Unauthorized
    })?;
    let session = validate(state, claims.sid)
        .await?
        .filter(|s| s.user_id == claims.sub)
        .ok_or(AppError::Unauthorized)?;
    let user = state
        .store
        .find_user_by_id(session.user_id)
        .await?
        .ok_or(AppError::Unauthorized)?;
    if user.disabled {
        state.store.delete_session(session.id).await?;
        return Err(AppError::AccountDisabled);
    }
    Ok((session, user))
}

#[instrument(skip(state, user, current_password, new_password), fields(user_id = %user.id))]
pub async fn change_password(
    state: &AppState,
    user: &User,
    current_password: &str,
    new_password: &str,
) -> Result<(), AppError> {
    if !state.passwords.verify(current_password, &user.password_hash)? {
        warn!("password change with wrong current password");
        return Err(AppError::invalid("Current password is incorrect."));
    }
    validate_password_strength(new_password)?;

    let mut updated = state
        .store
        .find_user_by_id(user.id)
        .await?
        .ok_or(AppError::NotFound("User"))?;
    updated.password_hash = state.passwords.hash(new_password)?;
    state.store.update_user(&updated).await?;
    audit(state, format!("Password changed: {}", updated.email)).await?;
    info!("password changed");
    Ok(())
}
