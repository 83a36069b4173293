use rand::{distributions::Alphanumeric, Rng};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    /// Sliding idle timeout, extended by every refresh.
    pub timeout_minutes: i64,
    /// Absolute lifetime of the bearer token, regardless of refreshes.
    pub max_lifetime_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub max_attempts: u32,
    pub lockout_seconds: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    pub notifications: usize,
    pub audit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub session: SessionConfig,
    pub rate_limit: RateLimitConfig,
    pub retention: RetentionConfig,
    pub password: PasswordConfig,
    /// Students must register with an address ending in this suffix; empty disables the rule.
    pub student_email_suffix: String,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: random_secret(),
            issuer: "hireqimah".into(),
            audience: "hireqimah-users".into(),
            timeout_minutes: 30,
            max_lifetime_minutes: 12 * 60,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_seconds: 5 * 60,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            notifications: 500,
            audit: 100,
        }
    }
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            session: SessionConfig::default(),
            rate_limit: RateLimitConfig::default(),
            retention: RetentionConfig::default(),
            password: PasswordConfig::default(),
            student_email_suffix: ".edu.sa".into(),
            bootstrap_admin: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = AppConfig::default();
        let database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());

        let secret = match std::env::var("SESSION_SECRET") {
            Ok(s) if !s.is_empty() => s,
            _ if database_url.is_some() => {
                anyhow::bail!("SESSION_SECRET must be set when DATABASE_URL is configured")
            }
            _ => {
                tracing::warn!("SESSION_SECRET not set; using a per-process random secret");
                defaults.session.secret.clone()
            }
        };

        let session = SessionConfig {
            secret,
            issuer: std::env::var("SESSION_ISSUER").unwrap_or_else(|_| "hireqimah".into()),
            audience: std::env::var("SESSION_AUDIENCE")
                .unwrap_or_else(|_| "hireqimah-users".into()),
            timeout_minutes: env_parse("SESSION_TIMEOUT_MINUTES", defaults.session.timeout_minutes),
            max_lifetime_minutes: env_parse(
                "SESSION_MAX_LIFETIME_MINUTES",
                defaults.session.max_lifetime_minutes,
            ),
        };

        let rate_limit = RateLimitConfig {
            max_attempts: env_parse("LOGIN_MAX_ATTEMPTS", defaults.rate_limit.max_attempts),
            lockout_seconds: env_parse("LOGIN_LOCKOUT_SECONDS", defaults.rate_limit.lockout_seconds),
        };

        let retention = RetentionConfig {
            notifications: env_parse("NOTIFICATION_RETENTION", defaults.retention.notifications),
            audit: env_parse("AUDIT_RETENTION", defaults.retention.audit),
        };

        let password = PasswordConfig {
            memory_kib: env_parse("ARGON2_MEMORY_KIB", defaults.password.memory_kib),
            iterations: env_parse("ARGON2_ITERATIONS", defaults.password.iterations),
            parallelism: env_parse("ARGON2_PARALLELISM", defaults.password.parallelism),
        };

        let bootstrap_admin = match (
            std::env::var("ADMIN_EMAIL"),
            std::env::var("ADMIN_PASSWORD"),
        ) {
            (Ok(email), Ok(password)) if !email.is_empty() && !password.is_empty() => {
                Some(BootstrapAdmin {
                    email,
                    password,
                    name: std::env::var("ADMIN_NAME").unwrap_or_else(|_| "Platform Admin".into()),
                })
            }
            _ => None,
        };

        Ok(Self {
            database_url,
            session,
            rate_limit,
            retention,
            password,
            student_email_suffix: std::env::var("STUDENT_EMAIL_SUFFIX")
                .unwrap_or(defaults.student_email_suffix),
            bootstrap_admin,
        })
    }
}

/// Unset keeps the default; a malformed value is logged and ignored.
fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display,
{
    let Ok(raw) = std::env::var(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(key, value = %raw, default = %default, "ignoring malformed config value");
            default
        }
    }
}

fn random_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(48)
        .map(char::from)
        .collect()
}
