use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::auth::repo_types::Session;
use crate::config::SessionConfig;
use crate::users::repo_types::Role;

/// JWT payload. The token only names a server-side session; the session
/// record decides whether it is still alive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,   // user ID
    pub sid: Uuid,   // session ID
    pub role: Role,  // role at login
    pub iat: usize,  // issued at
    pub exp: usize,  // absolute lifetime cap
    pub iss: String, // issuer
    pub aud: String, // audience
}

/// Signing and verification keys plus the claims they stamp.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    max_lifetime: Duration,
}

impl TokenKeys {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            max_lifetime: Duration::minutes(config.max_lifetime_minutes),
        }
    }

    pub fn sign(&self, session: &Session) -> anyhow::Result<String> {
        let exp = session.login_at + self.max_lifetime;
        let claims = Claims {
            sub: session.user_id,
            sid: session.id,
            role: session.role,
            iat: session.login_at.unix_timestamp().max(0) as usize,
            exp: exp.unix_timestamp().max(0) as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %session.user_id, session_id = %session.id, "session token signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(user_id = %data.claims.sub, session_id = %data.claims.sid, "session token verified");
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn config(secret: &str, issuer: &str, audience: &str) -> SessionConfig {
        SessionConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            timeout_minutes: 30,
            max_lifetime_minutes: 720,
        }
    }

    fn session() -> Session {
        let now = OffsetDateTime::now_utc();
        Session {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            role: Role::Hr,
            login_at: now,
            expires_at: now + Duration::minutes(30),
            csrf_token: "csrf".into(),
        }
    }

    #[test]
    fn sign_and_verify_session_token() {
        let keys = TokenKeys::new(&config("dev-secret", "test-issuer", "test-aud"));
        let session = session();
        let token = keys.sign(&session).expect("sign");
        let claims = keys.verify(&token).expect("verify token");
        assert_eq!(claims.sub, session.user_id);
        assert_eq!(claims.sid, session.id);
        assert_eq!(claims.role, Role::Hr);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.exp - claims.iat, 720 * 60);
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_audience() {
        let good = TokenKeys::new(&config("same-secret", "good-iss", "good-aud"));
        let bad = TokenKeys::new(&config("same-secret", "bad-iss", "bad-aud"));
        let token = good.sign(&session()).expect("sign");
        assert!(bad.verify(&token).is_err());
    }

    #[test]
    fn verify_rejects_other_secret() {
        let a = TokenKeys::new(&config("secret-a", "iss", "aud"));
        let b = TokenKeys::new(&config("secret-b", "iss", "aud"));
        let token = a.sign(&session()).expect("sign");
        assert!(b.verify(&token).is_err());
    }

    #[test]
    fn verify_rejects_token_past_lifetime() {
        let keys = TokenKeys::new(&config("dev-secret", "iss", "aud"));
        let mut old = session();
        old.login_at -= Duration::days(2);
        let token = keys.sign(&old).expect("sign");
        assert!(keys.verify(&token).is_err());
    }
}
