use std::time::Duration;

use hireqimah::{
    app::{build_app, serve},
    state::AppState,
    storage::{RateLimitRepo, SessionRepo},
};

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// Drops expired sessions and stale rate-limit entries.
fn spawn_maintenance(state: AppState) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(MAINTENANCE_INTERVAL);
        loop {
            ticker.tick().await;
            let now = state.clock.now();
            match state.store.purge_expired_sessions(now).await {
                Ok(0) => {}
                Ok(n) => tracing::debug!(purged = n, "expired sessions removed"),
                Err(e) => tracing::warn!(error = %e, "session purge failed"),
            }
            if let Err(e) = state.store.purge_rate_limits(now).await {
                tracing::warn!(error = %e, "rate limit purge failed");
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "hireqimah=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let state = AppState::init().await?;
    spawn_maintenance(state.clone());

    serve(build_app(state)).await
}
