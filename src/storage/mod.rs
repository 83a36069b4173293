//! Repository traits for every table the core touches.
//!
//! Components never hold process-wide state; they receive an `Arc<dyn Store>`
//! through `AppState`. Uniqueness and per-key atomicity are the store's job:
//! `create_user` and `insert_application` enforce their unique keys, and
//! `modify_rate_limit` runs its update closure under a per-key lock.

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::applications::repo_types::{Application, ApplicationStatus};
use crate::auth::repo_types::{RateLimitEntry, Session};
use crate::feed::repo_types::{AuditEntry, Notification};
use crate::opportunities::repo_types::Opportunity;
use crate::users::repo_types::User;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Storage failures. Business outcomes are decided by the services on top.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Case-insensitive lookup.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    /// Fails with [`StoreError::Conflict`] when the email is taken.
    async fn create_user(&self, user: User) -> Result<User, StoreError>;
    /// Replaces the stored record entirely.
    async fn update_user(&self, user: &User) -> Result<(), StoreError>;
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;
    async fn list_students(&self) -> Result<Vec<User>, StoreError>;
}

#[async_trait]
pub trait SessionRepo: Send + Sync {
    async fn insert_session(&self, session: &Session) -> Result<(), StoreError>;
    async fn find_session(&self, id: Uuid) -> Result<Option<Session>, StoreError>;
    /// Last writer wins. Returns false when the session is gone.
    async fn touch_session(&self, id: Uuid, expires_at: OffsetDateTime) -> Result<bool, StoreError>;
    async fn delete_session(&self, id: Uuid) -> Result<(), StoreError>;
    async fn delete_sessions_for_user(&self, user_id: Uuid) -> Result<u64, StoreError>;
    async fn purge_expired_sessions(&self, now: OffsetDateTime) -> Result<u64, StoreError>;
}

/// Read-modify-write step applied to one rate-limit key while it is locked.
/// Returning `None` removes the entry.
pub type RateLimitUpdate =
    Box<dyn FnOnce(Option<RateLimitEntry>) -> Option<RateLimitEntry> + Send>;

#[async_trait]
pub trait RateLimitRepo: Send + Sync {
    async fn modify_rate_limit(
        &self,
        key: &str,
        update: RateLimitUpdate,
    ) -> Result<Option<RateLimitEntry>, StoreError>;
    /// Drops entries whose lockout has passed.
    async fn purge_rate_limits(&self, now: OffsetDateTime) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait OpportunityRepo: Send + Sync {
    async fn insert_opportunity(&self, opportunity: &Opportunity) -> Result<(), StoreError>;
    async fn find_opportunity(&self, id: Uuid) -> Result<Option<Opportunity>, StoreError>;
    async fn update_opportunity(&self, opportunity: &Opportunity) -> Result<(), StoreError>;
    /// Removes the opportunity together with its applications.
    async fn delete_opportunity(&self, id: Uuid) -> Result<bool, StoreError>;
    /// Newest first.
    async fn list_opportunities(&self) -> Result<Vec<Opportunity>, StoreError>;
}

#[async_trait]
pub trait ApplicationRepo: Send + Sync {
    /// Fails with [`StoreError::Conflict`] when the student already applied to the opportunity.
    async fn insert_application(&self, application: &Application) -> Result<(), StoreError>;
    async fn find_application(&self, id: Uuid) -> Result<Option<Application>, StoreError>;
    async fn find_application_for(
        &self,
        student_id: Uuid,
        opportunity_id: Uuid,
    ) -> Result<Option<Application>, StoreError>;
    /// Compare-and-swap on the status. Returns false when the current status is not `from`.
    async fn transition_application(
        &self,
        id: Uuid,
        from: ApplicationStatus,
        to: ApplicationStatus,
    ) -> Result<bool, StoreError>;
    /// Deletes the application only if it belongs to the student and is still withdrawable.
    async fn withdraw_application(&self, id: Uuid, student_id: Uuid) -> Result<bool, StoreError>;
    async fn list_applications_by_student(&self, student_id: Uuid) -> Result<Vec<Application>, StoreError>;
    async fn list_applications_by_opportunity(
        &self,
        opportunity_id: Uuid,
    ) -> Result<Vec<Application>, StoreError>;
}

#[async_trait]
pub trait FeedRepo: Send + Sync {
    /// Appends and trims the feed to the `retain` most recent items.
    async fn push_notification(&self, notification: &Notification, retain: usize) -> Result<(), StoreError>;
    /// Newest first.
    async fn notifications_for(&self, user_id: Uuid) -> Result<Vec<Notification>, StoreError>;
    async fn mark_notification_read(&self, id: Uuid, user_id: Uuid) -> Result<bool, StoreError>;
    async fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<u64, StoreError>;
    async fn push_audit(&self, entry: &AuditEntry, retain: usize) -> Result<(), StoreError>;
    /// Newest first.
    async fn audit_log(&self, limit: usize) -> Result<Vec<AuditEntry>, StoreError>;
}

pub trait Store:
    UserRepo + SessionRepo + RateLimitRepo + OpportunityRepo + ApplicationRepo + FeedRepo
{
}

impl<T> Store for T where
    T: UserRepo + SessionRepo + RateLimitRepo + OpportunityRepo + ApplicationRepo + FeedRepo
{
}
