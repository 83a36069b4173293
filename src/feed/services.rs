use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::feed::repo_types::{AuditEntry, Notification};
use crate::state::AppState;
use crate::storage::FeedRepo;
use crate::users::repo_types::{Role, User};

pub async fn notify(state: &AppState, user_id: Uuid, text: impl Into<String>) -> Result<(), AppError> {
    let notification = Notification {
        id: Uuid::new_v4(),
        user_id,
        text: text.into(),
        time: state.clock.now(),
        read: false,
    };
    state
        .store
        .push_notification(&notification, state.config.retention.notifications)
        .await?;
    debug!(user_id = %user_id, notification_id = %notification.id, "notification queued");
    Ok(())
}

pub async fn audit(state: &AppState, message: impl Into<String>) -> Result<(), AppError> {
    let entry = AuditEntry {
        id: Uuid::new_v4(),
        message: message.into(),
        time: state.clock.now(),
    };
    state.store.push_audit(&entry, state.config.retention.audit).await?;
    info!(audit = %entry.message, "audit");
    Ok(())
}

/// Notification for a change that is already stored. A failed write is
/// logged and dropped so the stored change is still reported as done.
pub async fn notify_after_commit(state: &AppState, user_id: Uuid, text: impl Into<String>) {
    if let Err(e) = notify(state, user_id, text).await {
        warn!(user_id = %user_id, error = %e, "notification dropped");
    }
}

/// Audit counterpart of [`notify_after_commit`].
pub async fn audit_after_commit(state: &AppState, message: impl Into<String>) {
    if let Err(e) = audit(state, message).await {
        warn!(error = %e, "audit entry dropped");
    }
}

/// Newest first.
pub async fn notifications_for(state: &AppState, user_id: Uuid) -> Result<Vec<Notification>, AppError> {
    Ok(state.store.notifications_for(user_id).await?)
}

pub async fn unread_count(state: &AppState, user_id: Uuid) -> Result<usize, AppError> {
    let all = state.store.notifications_for(user_id).await?;
    Ok(all.iter().filter(|n| !n.read).count())
}

/// Someone else's notification is reported as missing.
pub async fn mark_read(state: &AppState, user_id: Uuid, notification_id: Uuid) -> Result<(), AppError> {
    if state.store.mark_notification_read(notification_id, user_id).await? {
        Ok(())
    } else {
        Err(AppError::NotFound("Notification"))
    }
}

pub async fn mark_all_read(state: &AppState, user_id: Uuid) -> Result<u64, AppError> {
    Ok(state.store.mark_all_notifications_read(user_id).await?)
}

pub async fn audit_log(state: &AppState, actor: &User) -> Result<Vec<AuditEntry>, AppError> {
    if actor.role() != Role::Admin {
        return Err(AppError::Forbidden);
    }
    Ok(state.store.audit_log(state.config.retention.audit).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestApp;

    #[tokio::test]
    async fn notifications_are_scoped_and_newest_first() {
        let app = TestApp::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        notify(&app.state, a, "first").await.unwrap();
        notify(&app.state, b, "other user").await.unwrap();
        notify(&app.state, a, "second").await.unwrap();

        let texts: Vec<String> = notifications_for(&app.state, a)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.text)
            .collect();
        assert_eq!(texts, vec!["second", "first"]);
        assert_eq!(unread_count(&app.state, a).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn cannot_mark_someone_elses_notification() {
        let app = TestApp::new();
        let (owner, intruder) = (Uuid::new_v4(), Uuid::new_v4());
        notify(&app.state, owner, "Shortlisted for SOC Analyst at Aramco").await.unwrap();
        let id = notifications_for(&app.state, owner).await.unwrap()[0].id;

        let err = mark_read(&app.state, intruder, id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(unread_count(&app.state, owner).await.unwrap(), 1);

        mark_read(&app.state, owner, id).await.unwrap();
        assert_eq!(unread_count(&app.state, owner).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn mark_all_read_only_touches_own_feed() {
        let app = TestApp::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        for i in 0..3 {
            notify(&app.state, a, format!("a{}", i)).await.unwrap();
        }
        notify(&app.state, b, "b0").await.unwrap();
        assert_eq!(mark_all_read(&app.state, a).await.unwrap(), 3);
        assert_eq!(unread_count(&app.state, b).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn audit_retention_keeps_most_recent() {
        let app = TestApp::new();
        let admin = app.admin().await;
        for i in 0..150 {
            audit(&app.state, format!("event {}", i)).await.unwrap();
        }
        let log = audit_log(&app.state, &admin).await.unwrap();
        assert_eq!(log.len(), 100);
        assert_eq!(log[0].message, "event 149");
        assert_eq!(log[99].message, "event 50");
    }

    #[tokio::test]
    async fn audit_log_is_admin_only() {
        let app = TestApp::new();
        let hr = app.hr("hr@stc.com.sa", "STC").await;
        assert!(matches!(audit_log(&app.state, &hr).await, Err(AppError::Forbidden)));
    }
}
