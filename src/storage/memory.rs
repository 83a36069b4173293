use std::collections::{HashMap, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
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
use crate::users::repo_types::{Role, User};

#[derive(Default)]
struct UserTable {
    by_id: HashMap<Uuid, User>,
    by_email: HashMap<String, Uuid>,
}

#[derive(Default)]
struct ApplicationTable {
    by_id: HashMap<Uuid, Application>,
    by_pair: HashMap<(Uuid, Uuid), Uuid>,
}

/// In-process store. Used when no database is configured and by the tests.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<UserTable>,
    sessions: RwLock<HashMap<Uuid, Session>>,
    rate_limits: DashMap<String, RateLimitEntry>,
    opportunities: RwLock<HashMap<Uuid, Opportunity>>,
    applications: RwLock<ApplicationTable>,
    // newest at the front
    notifications: RwLock<VecDeque<Notification>>,
    audit: RwLock<VecDeque<AuditEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Poisons the feed tables so every later feed call fails.
    #[cfg(test)]
    pub(crate) fn break_feed(&self) {
        std::thread::scope(|s| {
            let _ = s
                .spawn(|| {
                    let _notifications = self.notifications.write();
                    let _audit = self.audit.write();
                    panic!("feed tables poisoned");
                })
                .join();
        });
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StoreError> {
    lock.read()
        .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StoreError> {
    lock.write()
        .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
}

#[async_trait]
impl UserRepo for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let table = read(&self.users)?;
        Ok(table
            .by_email
            .get(&email.to_lowercase())
            .and_then(|id| table.by_id.get(id))
            .cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(read(&self.users)?.by_id.get(&id).cloned())
    }

    async fn create_user(&self, mut user: User) -> Result<User, StoreError> {
        user.email = user.email.to_lowercase();
        let mut table = write(&self.users)?;
        if table.by_email.contains_key(&user.email) || table.by_id.contains_key(&user.id) {
            return Err(StoreError::Conflict);
        }
        table.by_email.insert(user.email.clone(), user.id);
        table.by_id.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_user(&self, user: &User) -> Result<(), StoreError> {
        let mut table = write(&self.users)?;
        let email = user.email.to_lowercase();
        let previous = table
            .by_id
            .get(&user.id)
            .map(|u| u.email.clone())
            .ok_or(StoreError::NotFound)?;
        if previous != email {
            if table.by_email.contains_key(&email) {
                return Err(StoreError::Conflict);
            }
            table.by_email.remove(&previous);
            table.by_email.insert(email.clone(), user.id);
        }
        let mut stored = user.clone();
        stored.email = email;
        table.by_id.insert(user.id, stored);
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = read(&self.users)?.by_id.values().cloned().collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.email.cmp(&b.email)));
        Ok(users)
    }

    async fn list_students(&self) -> Result<Vec<User>, StoreError> {
        let mut users = self.list_users().await?;
        users.retain(|u| u.role() == Role::Student);
        Ok(users)
    }
}

#[async_trait]
impl SessionRepo for MemoryStore {
    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut sessions = write(&self.sessions)?;
        if sessions.contains_key(&session.id) {
            return Err(StoreError::Conflict);
        }
        sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        Ok(read(&self.sessions)?.get(&id).cloned())
    }

    async fn touch_session(&self, id: Uuid, expires_at: OffsetDateTime) -> Result<bool, StoreError> {
        let mut sessions = write(&self.sessions)?;
        match sessions.get_mut(&id) {
            Some(session) => {
                session.expires_at = expires_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_session(&self, id: Uuid) -> Result<(), StoreError> {
        write(&self.sessions)?.remove(&id);
        Ok(())
    }

    async fn delete_sessions_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let mut sessions = write(&self.sessions)?;
        let before = sessions.len();
        sessions.retain(|_, s| s.user_id != user_id);
        Ok((before - sessions.len()) as u64)
    }

    async fn purge_expired_sessions(&self, now: OffsetDateTime) -> Result<u64, StoreError> {
        let mut sessions = write(&self.sessions)?;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now));
        Ok((before - sessions.len()) as u64)
    }
}

#[async_trait]
impl RateLimitRepo for MemoryStore {
    async fn modify_rate_limit(
        &self,
        key: &str,
        update: RateLimitUpdate,
    ) -> Result<Option<RateLimitEntry>, StoreError> {
        // the shard lock is held for the whole closure
        let next = match self.rate_limits.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => match update(Some(*occupied.get())) {
                Some(entry) => {
                    occupied.insert(entry);
                    Some(entry)
                }
                None => {
                    occupied.remove();
                    None
                }
            },
            Entry::Vacant(vacant) => match update(None) {
                Some(entry) => {
                    vacant.insert(entry);
                    Some(entry)
                }
                None => None,
            },
        };
        Ok(next)
    }

    async fn purge_rate_limits(&self, now: OffsetDateTime) -> Result<u64, StoreError> {
        let before = self.rate_limits.len();
        self.rate_limits
            .retain(|_, entry| !matches!(entry.locked_until, Some(until) if until <= now));
        Ok(before.saturating_sub(self.rate_limits.len()) as u64)
    }
}

#[async_trait]
impl OpportunityRepo for MemoryStore {
    async fn insert_opportunity(&self, opportunity: &Opportunity) -> Result<(), StoreError> {
        let mut table = write(&self.opportunities)?;
        if table.contains_key(&opportunity.id) {
            return Err(StoreError::Conflict);
        }
        table.insert(opportunity.id, opportunity.clone());
        Ok(())
    }

    async fn find_opportunity(&self, id: Uuid) -> Result<Option<Opportunity>, StoreError> {
        Ok(read(&self.opportunities)?.get(&id).cloned())
    }

    async fn update_opportunity(&self, opportunity: &Opportunity) -> Result<(), StoreError> {
        let mut table = write(&self.opportunities)?;
        match table.get_mut(&opportunity.id) {
            Some(stored) => {
                *stored = opportunity.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn delete_opportunity(&self, id: Uuid) -> Result<bool, StoreError> {
        // lock order: opportunities, then applications
        let mut opportunities = write(&self.opportunities)?;
        if opportunities.remove(&id).is_none() {
            return Ok(false);
        }
        let mut applications = write(&self.applications)?;
        applications.by_id.retain(|_, a| a.opportunity_id != id);
        applications.by_pair.retain(|(_, opportunity_id), _| *opportunity_id != id);
        Ok(true)
    }

    async fn list_opportunities(&self) -> Result<Vec<Opportunity>, StoreError> {
        let mut list: Vec<Opportunity> = read(&self.opportunities)?.values().cloned().collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.title.cmp(&b.title)));
        Ok(list)
    }
}

#[async_trait]
impl ApplicationRepo for MemoryStore {
    async fn insert_application(&self, application: &Application) -> Result<(), StoreError> {
        let mut table = write(&self.applications)?;
        let pair = (application.student_id, application.opportunity_id);
        if table.by_pair.contains_key(&pair) || table.by_id.contains_key(&application.id) {
            return Err(StoreError::Conflict);
        }
        table.by_pair.insert(pair, application.id);
        table.by_id.insert(application.id, application.clone());
        Ok(())
    }

    async fn find_application(&self, id: Uuid) -> Result<Option<Application>, StoreError> {
        Ok(read(&self.applications)?.by_id.get(&id).cloned())
    }

    async fn find_application_for(
        &self,
        student_id: Uuid,
        opportunity_id: Uuid,
    ) -> Result<Option<Application>, StoreError> {
        let table = read(&self.applications)?;
        Ok(table
            .by_pair
            .get(&(student_id, opportunity_id))
            .and_then(|id| table.by_id.get(id))
            .cloned())
    }

    async fn transition_application(
        &self,
        id: Uuid,
        from: ApplicationStatus,
        to: ApplicationStatus,
    ) -> Result<bool, StoreError> {
        let mut table = write(&self.applications)?;
        match table.by_id.get_mut(&id) {
            Some(application) if application.status == from => {
                application.status = to;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound),
        }
    }

    async fn withdraw_application(&self, id: Uuid, student_id: Uuid) -> Result<bool, StoreError> {
        let mut table = write(&self.applications)?;
        let removable = matches!(
            table.by_id.get(&id),
            Some(a) if a.student_id == student_id && a.status.is_withdrawable()
        );
        if !removable {
            return Ok(false);
        }
        if let Some(application) = table.by_id.remove(&id) {
            table
                .by_pair
                .remove(&(application.student_id, application.opportunity_id));
        }
        Ok(true)
    }

    async fn list_applications_by_student(&self, student_id: Uuid) -> Result<Vec<Application>, StoreError> {
        let mut list: Vec<Application> = read(&self.applications)?
            .by_id
            .values()
            .filter(|a| a.student_id == student_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.applied_at.cmp(&a.applied_at));
        Ok(list)
    }

    async fn list_applications_by_opportunity(
        &self,
        opportunity_id: Uuid,
    ) -> Result<Vec<Application>, StoreError> {
        let mut list: Vec<Application> = read(&self.applications)?
            .by_id
            .values()
            .filter(|a| a.opportunity_id == opportunity_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.applied_at.cmp(&a.applied_at));
        Ok(list)
    }
}

#[async_trait]
impl FeedRepo for MemoryStore {
    async fn push_notification(&self, notification: &Notification, retain: usize) -> Result<(), StoreError> {
        let mut feed = write(&self.notifications)?;
        feed.push_front(notification.clone());
        feed.truncate(retain);
        Ok(())
    }

    async fn notifications_for(&self, user_id: Uuid) -> Result<Vec<Notification>, StoreError> {
        Ok(read(&self.notifications)?
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn mark_notification_read(&self, id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        let mut feed = write(&self.notifications)?;
        match feed.iter_mut().find(|n| n.id == id && n.user_id == user_id) {
            Some(n) => {
                n.read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let mut feed = write(&self.notifications)?;
        let mut changed = 0;
        for n in feed.iter_mut().filter(|n| n.user_id == user_id && !n.read) {
            n.read = true;
            changed += 1;
        }
        Ok(changed)
    }

    async fn push_audit(&self, entry: &AuditEntry, retain: usize) -> Result<(), StoreError> {
        let mut log = write(&self.audit)?;
        log.push_front(entry.clone());
        log.truncate(retain);
        Ok(())
    }

    async fn audit_log(&self, limit: usize) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(read(&self.audit)?.iter().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo_types::Profile;

    fn admin(email: &str) -> User {
        User {
            id: Uuid::new_v4(),
            email: email.into(),
            password_hash: "x".into(),
            name: "Admin".into(),
            disabled: false,
            created_at: OffsetDateTime::UNIX_EPOCH,
            profile: Profile::Admin,
        }
    }

    #[tokio::test]
    async fn email_uniqueness_is_case_insensitive() {
        let store = MemoryStore::new();
        store.create_user(admin("Ops@HireQimah.sa")).await.unwrap();

        let err = store.create_user(admin("ops@hireqimah.sa")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));

        let found = store.find_user_by_email("OPS@hireqimah.SA").await.unwrap();
        assert_eq!(found.unwrap().email, "ops@hireqimah.sa");
    }

    #[tokio::test]
    async fn rate_limit_modify_removes_on_none() {
        let store = MemoryStore::new();
        let now = OffsetDateTime::UNIX_EPOCH;
        let entry = store
            .modify_rate_limit(
                "a@b.sa",
                Box::new(move |_: Option<RateLimitEntry>| {
                    Some(RateLimitEntry { attempts: 1, last_attempt_at: now, locked_until: None })
                }),
            )
            .await
            .unwrap();
        assert_eq!(entry.map(|e| e.attempts), Some(1));

        let cleared = store.modify_rate_limit("a@b.sa", Box::new(|_: Option<RateLimitEntry>| None)).await.unwrap();
        assert!(cleared.is_none());
        assert!(store.rate_limits.is_empty());
    }

    #[tokio::test]
    async fn feed_keeps_most_recent_items() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        for i in 0..5 {
            let n = Notification {
                id: Uuid::new_v4(),
                user_id: user,
                text: format!("n{}", i),
                time: OffsetDateTime::UNIX_EPOCH,
                read: false,
            };
            store.push_notification(&n, 3).await.unwrap();
        }
        let texts: Vec<String> = store
            .notifications_for(user)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.text)
            .collect();
        assert_eq!(texts, vec!["n4", "n3", "n2"]);
    }
}
