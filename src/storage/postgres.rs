use anyhow::Context;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{postgres::PgPoolOptions, types::Json, FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    ApplicationRepo, FeedRepo, OpportunityRepo, RateLimitRepo, RateLimitUpdate, SessionRepo,
    StoreError, UserRepo,
};
use crate::applications::repo_types::{Application, ApplicationStatus};
use crate::auth::repo_types::{RateLimitEntry, Session};
use crate::feed::repo_types::{AuditEntry, Notification};
use crate::opportunities::repo_types::Opportunity;
use crate::users::repo_types::{Profile, User};

/// Postgres-backed store. Schema lives in `migrations/`.
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;
        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("run database migrations")?;
        Ok(Self { db })
    }

    pub fn from_pool(db: PgPool) -> Self {
        Self { db }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict,
            sqlx::Error::RowNotFound => StoreError::NotFound,
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}

// Enum columns are stored as their serde names.
fn to_text<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}

fn from_text<T: DeserializeOwned>(column: &str, value: String) -> Result<T, StoreError> {
    serde_json::from_value(serde_json::Value::String(value))
        .map_err(|e| StoreError::Unavailable(format!("invalid {} column: {}", column, e)))
}

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    name: String,
    disabled: bool,
    created_at: OffsetDateTime,
    profile: Json<Profile>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            name: row.name,
            disabled: row.disabled,
            created_at: row.created_at,
            profile: row.profile.0,
        }
    }
}

#[derive(FromRow)]
struct SessionRow {
    id: Uuid,
    user_id: Uuid,
    role: String,
    login_at: OffsetDateTime,
    expires_at: OffsetDateTime,
    csrf_token: String,
}

impl TryFrom<SessionRow> for Session {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(Session {
            id: row.id,
            user_id: row.user_id,
            role: from_text("sessions.role", row.role)?,
            login_at: row.login_at,
            expires_at: row.expires_at,
            csrf_token: row.csrf_token,
        })
    }
}

#[derive(FromRow)]
struct RateLimitRow {
    attempts: i32,
    last_attempt_at: OffsetDateTime,
    locked_until: Option<OffsetDateTime>,
}

impl From<RateLimitRow> for RateLimitEntry {
    fn from(row: RateLimitRow) -> Self {
        RateLimitEntry {
            attempts: u32::try_from(row.attempts).unwrap_or(0),
            last_attempt_at: row.last_attempt_at,
            locked_until: row.locked_until,
        }
    }
}

#[derive(FromRow)]
struct OpportunityRow {
    id: Uuid,
    hr_id: Uuid,
    title: String,
    kind: String,
    company: String,
    department: String,
    required_majors: Vec<String>,
    min_ers: i16,
    min_gpa: f64,
    required_certs: Vec<String>,
    skills: Vec<String>,
    location: String,
    work_mode: String,
    duration: String,
    deadline: String,
    positions: i32,
    description: String,
    status: String,
    created_at: OffsetDateTime,
}

impl TryFrom<OpportunityRow> for Opportunity {
    type Error = StoreError;

    fn try_from(row: OpportunityRow) -> Result<Self, Self::Error> {
        Ok(Opportunity {
            id: row.id,
            hr_id: row.hr_id,
            title: row.title,
            kind: from_text("opportunities.kind", row.kind)?,
            company: row.company,
            department: row.department,
            required_majors: row.required_majors,
            min_ers: row.min_ers.clamp(0, 100) as u8,
            min_gpa: row.min_gpa,
            required_certs: row.required_certs,
            skills: row.skills,
            location: row.location,
            work_mode: from_text("opportunities.work_mode", row.work_mode)?,
            duration: row.duration,
            deadline: row.deadline,
            positions: u32::try_from(row.positions).unwrap_or(0),
            description: row.description,
            status: from_text("opportunities.status", row.status)?,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct ApplicationRow {
    id: Uuid,
    opportunity_id: Uuid,
    student_id: Uuid,
    status: String,
    applied_at: OffsetDateTime,
    match_score: i16,
}

impl TryFrom<ApplicationRow> for Application {
    type Error = StoreError;

    fn try_from(row: ApplicationRow) -> Result<Self, Self::Error> {
        Ok(Application {
            id: row.id,
            opportunity_id: row.opportunity_id,
            student_id: row.student_id,
            status: from_text("applications.status", row.status)?,
            applied_at: row.applied_at,
            match_score: row.match_score.clamp(0, 100) as u8,
        })
    }
}

#[derive(FromRow)]
struct NotificationRow {
    id: Uuid,
    user_id: Uuid,
    text: String,
    created_at: OffsetDateTime,
    read: bool,
}

#[derive(FromRow)]
struct AuditRow {
    id: Uuid,
    message: String,
    created_at: OffsetDateTime,
}

const USER_COLUMNS: &str = "id, email, password_hash, name, disabled, created_at, profile";
const OPPORTUNITY_COLUMNS: &str = "id, hr_id, title, kind, company, department, required_majors, \
     min_ers, min_gpa, required_certs, skills, location, work_mode, duration, deadline, positions, \
     description, status, created_at";
const APPLICATION_COLUMNS: &str = "id, opportunity_id, student_id, status, applied_at, match_score";

#[async_trait]
impl UserRepo for PgStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE lower(email) = lower($1)",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(User::from))
    }

    async fn create_user(&self, user: User) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, email, password_hash, name, role, disabled, created_at, profile)
            VALUES ($1, lower($2), $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(user.role().as_str())
        .bind(user.disabled)
        .bind(user.created_at)
        .bind(Json(&user.profile))
        .fetch_one(&self.db)
        .await?;
        Ok(row.into())
    }

    async fn update_user(&self, user: &User) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email = lower($2), password_hash = $3, name = $4, role = $5, disabled = $6, profile = $7
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(user.role().as_str())
        .bind(user.disabled)
        .bind(Json(&user.profile))
        .execute(&self.db)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users ORDER BY created_at, email",
            USER_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn list_students(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE role = 'student' ORDER BY created_at, email",
            USER_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }
}

#[async_trait]
impl SessionRepo for PgStore {
    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, role, login_at, expires_at, csrf_token)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(session.role.as_str())
        .bind(session.login_at)
        .bind(session.expires_at)
        .bind(&session.csrf_token)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT id, user_id, role, login_at, expires_at, csrf_token FROM sessions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        row.map(Session::try_from).transpose()
    }

    async fn touch_session(&self, id: Uuid, expires_at: OffsetDateTime) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE sessions SET expires_at = $2 WHERE id = $1")
            .bind(id)
            .bind(expires_at)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_session(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn delete_sessions_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }

    async fn purge_expired_sessions(&self, now: OffsetDateTime) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < $1")
            .bind(now)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RateLimitRepo for PgStore {
    async fn modify_rate_limit(
        &self,
        key: &str,
        update: RateLimitUpdate,
    ) -> Result<Option<RateLimitEntry>, StoreError> {
        let mut tx = self.db.begin().await?;
        // serialises concurrent attempts for the same email until commit
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(key)
            .execute(&mut *tx)
            .await?;

        let current = sqlx::query_as::<_, RateLimitRow>(
            "SELECT attempts, last_attempt_at, locked_until FROM login_rate_limits WHERE email_key = $1",
        )
        .bind(key)
        .fetch_optional(&mut *tx)
        .await?
        .map(RateLimitEntry::from);

        let next = update(current);
        match next {
            Some(entry) => {
                sqlx::query(
                    r#"
                    INSERT INTO login_rate_limits (email_key, attempts, last_attempt_at, locked_until)
                    VALUES ($1, $2, $3, $4)
                    ON CONFLICT (email_key) DO UPDATE
                    SET attempts = EXCLUDED.attempts,
                        last_attempt_at = EXCLUDED.last_attempt_at,
                        locked_until = EXCLUDED.locked_until
                    "#,
                )
                .bind(key)
                .bind(i32::try_from(entry.attempts).unwrap_or(i32::MAX))
                .bind(entry.last_attempt_at)
                .bind(entry.locked_until)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query("DELETE FROM login_rate_limits WHERE email_key = $1")
                    .bind(key)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        tx.commit().await?;
        Ok(next)
    }

    async fn purge_rate_limits(&self, now: OffsetDateTime) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM login_rate_limits WHERE locked_until IS NOT NULL AND locked_until <= $1",
        )
        .bind(now)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl OpportunityRepo for PgStore {
    async fn insert_opportunity(&self, o: &Opportunity) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO opportunities (id, hr_id, title, kind, company, department, required_majors,
                min_ers, min_gpa, required_certs, skills, location, work_mode, duration, deadline,
                positions, description, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(o.id)
        .bind(o.hr_id)
        .bind(&o.title)
        .bind(to_text(&o.kind))
        .bind(&o.company)
        .bind(&o.department)
        .bind(&o.required_majors)
        .bind(i16::from(o.min_ers))
        .bind(o.min_gpa)
        .bind(&o.required_certs)
        .bind(&o.skills)
        .bind(&o.location)
        .bind(to_text(&o.work_mode))
        .bind(&o.duration)
        .bind(&o.deadline)
        .bind(i32::try_from(o.positions).unwrap_or(i32::MAX))
        .bind(&o.description)
        .bind(to_text(&o.status))
        .bind(o.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn find_opportunity(&self, id: Uuid) -> Result<Option<Opportunity>, StoreError> {
        let row = sqlx::query_as::<_, OpportunityRow>(&format!(
            "SELECT {} FROM opportunities WHERE id = $1",
            OPPORTUNITY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        row.map(Opportunity::try_from).transpose()
    }

    async fn update_opportunity(&self, o: &Opportunity) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE opportunities
            SET title = $2, kind = $3, company = $4, department = $5, required_majors = $6,
                min_ers = $7, min_gpa = $8, required_certs = $9, skills = $10, location = $11,
                work_mode = $12, duration = $13, deadline = $14, positions = $15,
                description = $16, status = $17
            WHERE id = $1
            "#,
        )
        .bind(o.id)
        .bind(&o.title)
        .bind(to_text(&o.kind))
        .bind(&o.company)
        .bind(&o.department)
        .bind(&o.required_majors)
        .bind(i16::from(o.min_ers))
        .bind(o.min_gpa)
        .bind(&o.required_certs)
        .bind(&o.skills)
        .bind(&o.location)
        .bind(to_text(&o.work_mode))
        .bind(&o.duration)
        .bind(&o.deadline)
        .bind(i32::try_from(o.positions).unwrap_or(i32::MAX))
        .bind(&o.description)
        .bind(to_text(&o.status))
        .execute(&self.db)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_opportunity(&self, id: Uuid) -> Result<bool, StoreError> {
        // applications go with it via ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM opportunities WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_opportunities(&self) -> Result<Vec<Opportunity>, StoreError> {
        let rows = sqlx::query_as::<_, OpportunityRow>(&format!(
            "SELECT {} FROM opportunities ORDER BY created_at DESC, title",
            OPPORTUNITY_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(Opportunity::try_from).collect()
    }
}

#[async_trait]
impl ApplicationRepo for PgStore {
    async fn insert_application(&self, a: &Application) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO applications (id, opportunity_id, student_id, status, applied_at, match_score)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(a.id)
        .bind(a.opportunity_id)
        .bind(a.student_id)
        .bind(a.status.label())
        .bind(a.applied_at)
        .bind(i16::from(a.match_score))
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn find_application(&self, id: Uuid) -> Result<Option<Application>, StoreError> {
        let row = sqlx::query_as::<_, ApplicationRow>(&format!(
            "SELECT {} FROM applications WHERE id = $1",
            APPLICATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        row.map(Application::try_from).transpose()
    }

    async fn find_application_for(
        &self,
        student_id: Uuid,
        opportunity_id: Uuid,
    ) -> Result<Option<Application>, StoreError> {
        let row = sqlx::query_as::<_, ApplicationRow>(&format!(
            "SELECT {} FROM applications WHERE student_id = $1 AND opportunity_id = $2",
            APPLICATION_COLUMNS
        ))
        .bind(student_id)
        .bind(opportunity_id)
        .fetch_optional(&self.db)
        .await?;
        row.map(Application::try_from).transpose()
    }

    async fn transition_application(
        &self,
        id: Uuid,
        from: ApplicationStatus,
        to: ApplicationStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE applications SET status = $3 WHERE id = $1 AND status = $2")
            .bind(id)
            .bind(from.label())
            .bind(to.label())
            .execute(&self.db)
            .await?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }
        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM applications WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        match exists {
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound),
        }
    }

    async fn withdraw_application(&self, id: Uuid, student_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM applications
            WHERE id = $1 AND student_id = $2 AND status IN ($3, $4)
            "#,
        )
        .bind(id)
        .bind(student_id)
        .bind(ApplicationStatus::Submitted.label())
        .bind(ApplicationStatus::UnderReview.label())
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_applications_by_student(&self, student_id: Uuid) -> Result<Vec<Application>, StoreError> {
        let rows = sqlx::query_as::<_, ApplicationRow>(&format!(
            "SELECT {} FROM applications WHERE student_id = $1 ORDER BY applied_at DESC",
            APPLICATION_COLUMNS
        ))
        .bind(student_id)
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(Application::try_from).collect()
    }

    async fn list_applications_by_opportunity(
        &self,
        opportunity_id: Uuid,
    ) -> Result<Vec<Application>, StoreError> {
        let rows = sqlx::query_as::<_, ApplicationRow>(&format!(
            "SELECT {} FROM applications WHERE opportunity_id = $1 ORDER BY applied_at DESC",
            APPLICATION_COLUMNS
        ))
        .bind(opportunity_id)
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(Application::try_from).collect()
    }
}

#[async_trait]
impl FeedRepo for PgStore {
    async fn push_notification(&self, n: &Notification, retain: usize) -> Result<(), StoreError> {
        let mut tx = self.db.begin().await?;
        sqlx::query(
            "INSERT INTO notifications (id, user_id, text, created_at, read) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(n.id)
        .bind(n.user_id)
        .bind(&n.text)
        .bind(n.time)
        .bind(n.read)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            r#"
            DELETE FROM notifications
            WHERE seq <= (SELECT seq FROM notifications ORDER BY seq DESC OFFSET $1 LIMIT 1)
            "#,
        )
        .bind(retain as i64)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn notifications_for(&self, user_id: Uuid) -> Result<Vec<Notification>, StoreError> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            "SELECT id, user_id, text, created_at, read FROM notifications WHERE user_id = $1 ORDER BY seq DESC",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| Notification {
                id: r.id,
                user_id: r.user_id,
                text: r.text,
                time: r.created_at,
                read: r.read,
            })
            .collect())
    }

    async fn mark_notification_read(&self, id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE notifications SET read = TRUE WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE notifications SET read = TRUE WHERE user_id = $1 AND NOT read")
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }

    async fn push_audit(&self, entry: &AuditEntry, retain: usize) -> Result<(), StoreError> {
        let mut tx = self.db.begin().await?;
        sqlx::query("INSERT INTO audit_log (id, message, created_at) VALUES ($1, $2, $3)")
            .bind(entry.id)
            .bind(&entry.message)
            .bind(entry.time)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            DELETE FROM audit_log
            WHERE seq <= (SELECT seq FROM audit_log ORDER BY seq DESC OFFSET $1 LIMIT 1)
            "#,
        )
        .bind(retain as i64)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn audit_log(&self, limit: usize) -> Result<Vec<AuditEntry>, StoreError> {
        let rows = sqlx::query_as::<_, AuditRow>(
            "SELECT id, message, created_at FROM audit_log ORDER BY seq DESC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.db)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| AuditEntry { id: r.id, message: r.message, time: r.created_at })
            .collect())
    }
}
