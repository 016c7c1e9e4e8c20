use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use saasbill_auth::{Hs256SessionTokens, PasswordError, PasswordHasher, TokenIssuer, TokenValidator};
#[cfg(feature = "redis")]
use saasbill_infra::rate_limit::RedisRateLimiter;
use saasbill_infra::rate_limit::{InMemoryRateLimiter, RateLimitError, RateLimiter};
use saasbill_infra::services::{
    read_plan_catalog, CatalogError, CredentialError, CredentialStore, LedgerError, OrganizationDirectory,
    SubscriptionLedger,
};
use saasbill_infra::store::{
    BillingStore, InMemoryStore, OrganizationStore, PostgresStore, Store, StoreError, StoreHealth, UserStore,
};
use saasbill_infra::AppConfig;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid token lifetime: {0}")]
    TokenTtl(String),

    #[error(transparent)]
    Hashing(#[from] PasswordError),

    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("failed to seed plans: {0}")]
    Seed(#[from] LedgerError),

    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    #[error("REDIS_URL is set but this binary was built without the `redis` feature")]
    RedisUnsupported,
}

/// Everything the handlers and middleware need, shared behind one `Arc`.
#[derive(Clone)]
pub struct AppServices {
    pub credentials: CredentialStore,
    pub directory: OrganizationDirectory,
    pub ledger: SubscriptionLedger,
    pub health: Arc<dyn StoreHealth>,
    pub store_timeout: Duration,
    /// `None` when rate limiting is disabled.
    pub rate_limiter: Option<Arc<dyn RateLimiter>>,
}

impl AppServices {
    /// Wire the services over `store`. The rate limiter, if configured, is
    /// process-local.
    pub fn with_store<S>(store: Arc<S>, config: &AppConfig) -> Result<Self, StartupError>
    where
        S: Store + 'static,
    {
        let ttl = chrono::Duration::from_std(config.token_ttl).map_err(|e| StartupError::TokenTtl(e.to_string()))?;
        let tokens = Arc::new(Hs256SessionTokens::new(config.jwt_secret.expose().as_bytes(), ttl));
        let issuer: Arc<dyn TokenIssuer> = tokens.clone();
        let validator: Arc<dyn TokenValidator> = tokens;

        let users: Arc<dyn UserStore> = store.clone();
        let orgs: Arc<dyn OrganizationStore> = store.clone();
        let billing: Arc<dyn BillingStore> = store.clone();
        let health: Arc<dyn StoreHealth> = store;

        let credentials = CredentialStore::new(
            users,
            PasswordHasher::new(config.hash_cost)?,
            issuer,
            validator,
            config.store_timeout,
        )?;

        Ok(Self {
            credentials,
            directory: OrganizationDirectory::new(orgs, config.store_timeout),
            ledger: SubscriptionLedger::new(billing, config.store_timeout),
            health,
            store_timeout: config.store_timeout,
            rate_limiter: config
                .rate_limit
                .map(|limits| Arc::new(InMemoryRateLimiter::new(limits)) as Arc<dyn RateLimiter>),
        })
    }

    pub fn in_memory(config: &AppConfig) -> Result<Self, StartupError> {
        Self::with_store(Arc::new(InMemoryStore::new()), config)
    }

    /// Production wiring: PostgreSQL when `DATABASE_URL` is set (schema applied
    /// on connect), Redis-backed rate limiting when `REDIS_URL` is set, and the
    /// optional plan catalog seeded into an empty store.
    pub async fn from_config(config: &AppConfig) -> Result<Self, StartupError> {
        let mut services = match &config.database {
            Some(db) => {
                let store = PostgresStore::connect(db.url.expose(), db.max_connections).await?;
                store.migrate().await?;
                info!(max_connections = db.max_connections, "connected to postgres");
                Self::with_store(Arc::new(store), config)?
            }
            None => {
                warn!("DATABASE_URL not set; using in-memory store (data is lost on restart)");
                Self::in_memory(config)?
            }
        };

        if config.rate_limit.is_some() && config.redis_url.is_some() {
            services.rate_limiter = Some(redis_rate_limiter(config).await?);
        }

        if let Some(path) = &config.plans_file {
            let plans = read_plan_catalog(path)?;
            let seeded = services.ledger.seed_plans(plans).await?;
            info!(path = %path.display(), seeded, "plan catalog processed");
        }

        Ok(services)
    }
}

#[cfg(feature = "redis")]
async fn redis_rate_limiter(config: &AppConfig) -> Result<Arc<dyn RateLimiter>, StartupError> {
    match (&config.redis_url, config.rate_limit) {
        (Some(url), Some(limits)) => Ok(Arc::new(RedisRateLimiter::connect(url.expose(), limits).await?)),
        _ => Err(StartupError::RedisUnsupported),
    }
}

#[cfg(not(feature = "redis"))]
async fn redis_rate_limiter(_config: &AppConfig) -> Result<Arc<dyn RateLimiter>, StartupError> {
    Err(StartupError::RedisUnsupported)
}
