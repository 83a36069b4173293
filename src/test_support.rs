use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::clock::{Clock, ManualClock};
use crate::config::{AppConfig, PasswordConfig, SessionConfig};
use crate::state::AppState;
use crate::storage::{FeedRepo, MemoryStore, UserRepo};
use crate::users::repo_types::{GpaScale, HrProfile, Profile, StudentProfile, UniversityProfile, User};

pub const TEST_PASSWORD: &str = "Str0ng!Password";

pub fn test_config() -> AppConfig {
    AppConfig {
        session: SessionConfig {
            secret: "test-secret".into(),
            ..SessionConfig::default()
        },
        password: PasswordConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        },
        ..AppConfig::default()
    }
}

/// In-memory state with a hand-driven clock.
pub struct TestApp {
    pub state: AppState,
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let clock = Arc::new(ManualClock::new(OffsetDateTime::now_utc()));
        let state = AppState::in_memory(config, clock.clone()).expect("test state");
        Self { state, clock }
    }

    /// Test state over a store the caller keeps a handle to.
    pub fn on_store(store: Arc<MemoryStore>) -> Self {
        let clock = Arc::new(ManualClock::new(OffsetDateTime::now_utc()));
        let state = AppState::from_parts(test_config(), store, clock.clone()).expect("test state");
        Self { state, clock }
    }

    pub async fn insert_user(&self, email: &str, name: &str, profile: Profile) -> User {
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_lowercase(),
            password_hash: self.state.passwords.hash(TEST_PASSWORD).expect("hash"),
            name: name.into(),
            disabled: false,
            created_at: self.clock.now(),
            profile,
        };
        self.state.store.create_user(user).await.expect("insert user")
    }

    pub async fn admin(&self) -> User {
        self.insert_user("admin@hireqimah.sa", "Platform Admin", Profile::Admin).await
    }

    pub async fn hr(&self, email: &str, company: &str) -> User {
        let profile = Profile::Hr(HrProfile {
            company: company.into(),
            position: "Talent Partner".into(),
            industry: String::new(),
        });
        self.insert_user(email, &format!("{} Recruiter", company), profile).await
    }

    pub async fn university(&self, email: &str, name: &str) -> User {
        let profile = Profile::University(UniversityProfile {
            university_name: name.into(),
            official_domain: String::new(),
            admin_contact: String::new(),
        });
        self.insert_user(email, name, profile).await
    }

    pub async fn student(&self, email: &str, major: &str) -> User {
        let name = email.split('@').next().unwrap_or("student").to_string();
        let profile = Profile::Student(StudentProfile::new(
            "King Saud University".into(),
            major.into(),
            3.5,
            GpaScale::Four,
        ));
        self.insert_user(email, &name, profile).await
    }

    pub async fn reload(&self, id: Uuid) -> User {
        self.state
            .store
            .find_user_by_id(id)
            .await
            .expect("store")
            .expect("user exists")
    }

    pub async fn last_audit(&self) -> String {
        self.state
            .store
            .audit_log(1)
            .await
            .expect("store")
            .into_iter()
            .next()
            .map(|e| e.message)
            .unwrap_or_default()
    }

    pub async fn notification_texts(&self, user_id: Uuid) -> Vec<String> {
        self.state
            .store
            .notifications_for(user_id)
            .await
            .expect("store")
            .into_iter()
            .map(|n| n.text)
            .collect()
    }
}
