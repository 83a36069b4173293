use std::sync::Arc;

use crate::auth::password::PasswordHasher;
use crate::auth::tokens::TokenKeys;
use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::scoring::Catalog;
use crate::storage::{MemoryStore, PgStore, Store};
use crate::users;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub passwords: Arc<PasswordHasher>,
    pub tokens: Arc<TokenKeys>,
    pub catalog: Arc<Catalog>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let store: Arc<dyn Store> = match &config.database_url {
            Some(url) => Arc::new(PgStore::connect(url).await?),
            None => {
                tracing::warn!("DATABASE_URL not set; using the in-memory store");
                Arc::new(MemoryStore::new())
            }
        };

        let state = Self::from_parts(config, store, Arc::new(SystemClock))?;
        users::services::ensure_admin(&state).await?;
        Ok(state)
    }

    pub fn from_parts(
        config: AppConfig,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let passwords = Arc::new(PasswordHasher::new(&config.password)?);
        let tokens = Arc::new(TokenKeys::new(&config.session));
        Ok(Self {
            config: Arc::new(config),
            store,
            clock,
            passwords,
            tokens,
            catalog: Arc::new(Catalog::default()),
        })
    }

    pub fn in_memory(config: AppConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        Self::from_parts(config, Arc::new(MemoryStore::new()), clock)
    }
}
