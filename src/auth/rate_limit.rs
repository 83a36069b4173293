use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use crate::auth::repo_types::RateLimitEntry;
use crate::config::RateLimitConfig;
use crate::state::AppState;
use crate::storage::{RateLimitRepo, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining_attempts: u32 },
    Blocked { retry_after_seconds: u64 },
}

pub fn rate_limit_key(email: &str) -> String {
    email.trim().to_lowercase()
}

fn remaining(config: &RateLimitConfig, entry: Option<&RateLimitEntry>) -> u32 {
    config
        .max_attempts
        .saturating_sub(entry.map(|e| e.attempts).unwrap_or(0))
}

fn retry_after(now: OffsetDateTime, until: OffsetDateTime) -> u64 {
    (until - now).as_seconds_f64().ceil().max(1.0) as u64
}

/// Entry after one more failed attempt. An expired lockout starts over.
fn after_failure(
    current: Option<RateLimitEntry>,
    now: OffsetDateTime,
    max_attempts: u32,
    lockout: Duration,
) -> RateLimitEntry {
    let previous = match current {
        Some(e) if matches!(e.locked_until, Some(until) if now >= until) => 0,
        Some(e) => e.attempts,
        None => 0,
    };
    let attempts = previous.saturating_add(1);
    RateLimitEntry {
        attempts,
        last_attempt_at: now,
        locked_until: (attempts >= max_attempts).then(|| now + lockout),
    }
}

/// Claims one attempt for `email` before its password is checked, or refuses
/// while the key is locked. The check and the increment are a single store
/// update, so concurrent logins can never verify more guesses than the
/// threshold allows. The claimed attempt counts as a failure until
/// `record_attempt(.., true)` clears the entry.
pub async fn reserve_attempt(
    state: &AppState,
    email: &str,
) -> Result<RateLimitDecision, StoreError> {
    let now = state.clock.now();
    let key = rate_limit_key(email);
    let config = state.config.rate_limit.clone();
    let max_attempts = config.max_attempts;
    let lockout = Duration::seconds(config.lockout_seconds);

    let reserved = Arc::new(AtomicBool::new(false));
    let claimed = Arc::clone(&reserved);
    let entry = state
        .store
        .modify_rate_limit(
            &key,
            Box::new(move |current: Option<RateLimitEntry>| match current {
                Some(e) if matches!(e.locked_until, Some(until) if now < until) => Some(e),
                other => {
                    claimed.store(true, Ordering::SeqCst);
                    Some(after_failure(other, now, max_attempts, lockout))
                }
            }),
        )
        .await?;

    let decision = match entry {
        Some(RateLimitEntry {
            locked_until: Some(until),
            ..
        }) if !reserved.load(Ordering::SeqCst) => RateLimitDecision::Blocked {
            retry_after_seconds: retry_after(now, until),
        },
        other => {
            if let Some(RateLimitEntry {
                locked_until: Some(until),
                ..
            }) = other
            {
                warn!(key = %key, %until, "login locked out");
            }
            RateLimitDecision::Allowed {
                remaining_attempts: remaining(&config, other.as_ref()),
            }
        }
    };
    debug!(key = %key, ?decision, "login attempt reserved");
    Ok(decision)
}

/// Whether a login attempt for `email` may proceed. A lockout that has
/// passed clears the entry.
pub async fn check_allowed(state: &AppState, email: &str) -> Result<RateLimitDecision, StoreError> {
    let now = state.clock.now();
    let key = rate_limit_key(email);
    let entry = state
        .store
        .modify_rate_limit(
            &key,
            Box::new(move |current: Option<RateLimitEntry>| match current {
                Some(e) if matches!(e.locked_until, Some(until) if now >= until) => None,
                other => other,
            }),
        )
        .await?;

    let decision = match entry {
        Some(RateLimitEntry {
            locked_until: Some(until),
            ..
        }) if now < until => RateLimitDecision::Blocked {
            retry_after_seconds: retry_after(now, until),
        },
        other => RateLimitDecision::Allowed {
            remaining_attempts: remaining(&state.config.rate_limit, other.as_ref()),
        },
    };
    debug!(key = %key, ?decision, "rate limit checked");
    Ok(decision)
}

/// Records the outcome of a login attempt. Success clears the entry; a
/// failure increments it and locks the key once the threshold is reached.
/// Returns the attempts left before lockout.
pub async fn record_attempt(state: &AppState, email: &str, success: bool) -> Result<u32, StoreError> {
    let now = state.clock.now();
    let key = rate_limit_key(email);
    let config = state.config.rate_limit.clone();

    if success {
        state.store.modify_rate_limit(&key, Box::new(|_: Option<RateLimitEntry>| None)).await?;
        return Ok(config.max_attempts);
    }

    let max_attempts = config.max_attempts;
    let lockout = Duration::seconds(config.lockout_seconds);
    let entry = state
        .store
        .modify_rate_limit(
            &key,
            Box::new(move |current: Option<RateLimitEntry>| {
                Some(after_failure(current, now, max_attempts, lockout))
            }),
        )
        .await?;

    if let Some(RateLimitEntry {
        locked_until: Some(until),
        ..
    }) = entry
    {
        warn!(key = %key, %until, "login locked out");
    }
    Ok(remaining(&config, entry.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestApp;

    #[tokio::test]
    async fn fresh_key_is_allowed_with_full_budget() {
        let app = TestApp::new();
        let decision = check_allowed(&app.state, "new@student.edu.sa").await.unwrap();
        assert_eq!(decision, RateLimitDecision::Allowed { remaining_attempts: 5 });
    }

    #[tokio::test]
    async fn five_failures_lock_then_lockout_expires() {
        let app = TestApp::new();
        let email = "Sara@KSU.edu.sa";
        for expected in (0..5).rev() {
            let left = record_attempt(&app.state, email, false).await.unwrap();
            assert_eq!(left, expected);
        }

        match check_allowed(&app.state, "sara@ksu.edu.sa").await.unwrap() {
            RateLimitDecision::Blocked { retry_after_seconds } => assert_eq!(retry_after_seconds, 300),
            other => panic!("expected lockout, got {:?}", other),
        }

        app.clock.advance(Duration::seconds(299));
        assert!(matches!(
            check_allowed(&app.state, email).await.unwrap(),
            RateLimitDecision::Blocked { retry_after_seconds: 1 }
        ));

        app.clock.advance(Duration::seconds(1));
        assert_eq!(
            check_allowed(&app.state, email).await.unwrap(),
            RateLimitDecision::Allowed { remaining_attempts: 5 }
        );
    }

    #[tokio::test]
    async fn success_clears_warning_state() {
        let app = TestApp::new();
        record_attempt(&app.state, "a@ksu.edu.sa", false).await.unwrap();
        record_attempt(&app.state, "a@ksu.edu.sa", false).await.unwrap();
        assert_eq!(
            check_allowed(&app.state, "a@ksu.edu.sa").await.unwrap(),
            RateLimitDecision::Allowed { remaining_attempts: 3 }
        );

        record_attempt(&app.state, "a@ksu.edu.sa", true).await.unwrap();
        assert_eq!(
            check_allowed(&app.state, "a@ksu.edu.sa").await.unwrap(),
            RateLimitDecision::Allowed { remaining_attempts: 5 }
        );
    }

    #[tokio::test]
    async fn reservation_counts_until_cleared() {
        let app = TestApp::new();
        for expected in (0..5).rev() {
            assert_eq!(
                reserve_attempt(&app.state, "Huda@ksu.edu.sa").await.unwrap(),
                RateLimitDecision::Allowed { remaining_attempts: expected }
            );
        }
        assert_eq!(
            reserve_attempt(&app.state, "huda@ksu.edu.sa").await.unwrap(),
            RateLimitDecision::Blocked { retry_after_seconds: 300 }
        );

        app.clock.advance(Duration::seconds(300));
        assert_eq!(
            reserve_attempt(&app.state, "huda@ksu.edu.sa").await.unwrap(),
            RateLimitDecision::Allowed { remaining_attempts: 4 }
        );
        record_attempt(&app.state, "huda@ksu.edu.sa", true).await.unwrap();
        assert_eq!(
            check_allowed(&app.state, "huda@ksu.edu.sa").await.unwrap(),
            RateLimitDecision::Allowed { remaining_attempts: 5 }
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_reservations_never_exceed_threshold() {
        let app = TestApp::new();
        let mut handles = Vec::new();
        for _ in 0..40 {
            let state = app.state.clone();
            handles.push(tokio::spawn(async move {
                reserve_attempt(&state, "burst@ksu.edu.sa").await.unwrap()
            }));
        }
        let mut allowed = 0;
        for h in handles {
            if matches!(h.await.unwrap(), RateLimitDecision::Allowed { .. }) {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 5);
    }

    #[tokio::test]
    async fn concurrent_failures_are_all_counted() {
        let app = TestApp::new();
        let mut handles = Vec::new();
        for _ in 0..5 {
            let state = app.state.clone();
            handles.push(tokio::spawn(async move {
                record_attempt(&state, "race@ksu.edu.sa", false).await.unwrap()
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert!(matches!(
            check_allowed(&app.state, "race@ksu.edu.sa").await.unwrap(),
            RateLimitDecision::Blocked { .. }
        ));
    }
}
