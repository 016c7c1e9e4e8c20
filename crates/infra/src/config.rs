//! Process configuration loaded from environment variables.
//!
//! ```bash
//! BIND_ADDR=0.0.0.0:8080            # or PORT=9000 to change only the port
//! DATABASE_URL=postgres://...       # unset: in-memory store
//! DATABASE_MAX_CONNECTIONS=10
//! STORE_TIMEOUT_MS=5000
//! JWT_SECRET=...                    # unset: insecure dev default (warned at start-up)
//! TOKEN_TTL_SECS=86400
//! ARGON2_MEMORY_KIB=19456
//! ARGON2_ITERATIONS=2
//! RATE_LIMIT_REQUESTS=100           # unset: rate limiting disabled
//! RATE_LIMIT_WINDOW_SECS=60
//! REDIS_URL=redis://127.0.0.1/      # rate-limit backend, needs the `redis` feature
//! PLANS_FILE=plans.json             # seeded into an empty plan catalog
//! LOG_FORMAT=json                   # or pretty
//! LOG_FILTER=info
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use saasbill_auth::HashCost;
use saasbill_observability::{LogConfig, LogFormat};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEV_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}' ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

impl ConfigError {
    fn invalid(var: &'static str, value: &str, reason: impl ToString) -> Self {
        Self::InvalidValue {
            var,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// String wrapper whose `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Debug for Secret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: Secret,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// `None` selects the in-memory store.
    pub database: Option<DatabaseConfig>,
    pub store_timeout: Duration,
    pub jwt_secret: Secret,
    /// Set when `JWT_SECRET` was absent and the dev default is in use.
    pub jwt_secret_defaulted: bool,
    pub token_ttl: Duration,
    pub hash_cost: HashCost,
    /// `None` disables rate limiting.
    pub rate_limit: Option<RateLimitConfig>,
    pub redis_url: Option<Secret>,
    pub plans_file: Option<PathBuf>,
    pub log: LogConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut bind_addr: SocketAddr = match var("BIND_ADDR") {
            Some(raw) => raw
                .parse()
                .map_err(|e| ConfigError::invalid("BIND_ADDR", &raw, e))?,
            None => DEFAULT_BIND_ADDR
                .parse()
                .map_err(|e| ConfigError::invalid("BIND_ADDR", DEFAULT_BIND_ADDR, e))?,
        };
        if let Some(port) = parse_opt::<u16>("PORT", var("PORT"))? {
            bind_addr.set_port(port);
        }

        let database = match var("DATABASE_URL") {
            Some(url) => Some(DatabaseConfig {
                url: Secret::new(url),
                max_connections: positive("DATABASE_MAX_CONNECTIONS", var("DATABASE_MAX_CONNECTIONS"), 10)?,
            }),
            None => None,
        };

        let store_timeout =
            Duration::from_millis(positive("STORE_TIMEOUT_MS", var("STORE_TIMEOUT_MS"), 5_000)?);

        let (jwt_secret, jwt_secret_defaulted) = match var("JWT_SECRET") {
            Some(secret) => (Secret::new(secret), false),
            None => (Secret::new(DEV_JWT_SECRET), true),
        };
        let token_ttl = Duration::from_secs(positive("TOKEN_TTL_SECS", var("TOKEN_TTL_SECS"), 86_400)?);

        let defaults = HashCost::default();
        let hash_cost = HashCost {
            memory_kib: positive("ARGON2_MEMORY_KIB", var("ARGON2_MEMORY_KIB"), defaults.memory_kib)?,
            iterations: positive("ARGON2_ITERATIONS", var("ARGON2_ITERATIONS"), defaults.iterations)?,
            parallelism: defaults.parallelism,
        };

        let rate_limit = match parse_opt::<u32>("RATE_LIMIT_REQUESTS", var("RATE_LIMIT_REQUESTS"))? {
            Some(0) => return Err(ConfigError::invalid("RATE_LIMIT_REQUESTS", "0", "must be positive")),
            Some(max_requests) => Some(RateLimitConfig {
                max_requests,
                window: Duration::from_secs(positive(
                    "RATE_LIMIT_WINDOW_SECS",
                    var("RATE_LIMIT_WINDOW_SECS"),
                    60,
                )?),
            }),
            None => None,
        };

        let format = match var("LOG_FORMAT") {
            Some(raw) => LogFormat::from_str(&raw).map_err(|e| ConfigError::invalid("LOG_FORMAT", &raw, e))?,
            None => LogFormat::Json,
        };
        let log = LogConfig {
            filter: var("LOG_FILTER").unwrap_or_else(|| "info".to_string()),
            format,
        };

        Ok(Self {
            bind_addr,
            database,
            store_timeout,
            jwt_secret,
            jwt_secret_defaulted,
            token_ttl,
            hash_cost,
            rate_limit,
            redis_url: var("REDIS_URL").map(Secret::new),
            plans_file: var("PLANS_FILE").map(PathBuf::from),
            log,
        })
    }
}

fn parse_opt<T>(var: &'static str, raw: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    raw.map(|raw| raw.parse::<T>().map_err(|e| ConfigError::invalid(var, &raw, e)))
        .transpose()
}

fn positive<T>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default + ToString,
    T::Err: ToString,
{
    match parse_opt::<T>(var, raw)? {
        Some(v) if v <= T::default() => Err(ConfigError::invalid(var, &v.to_string(), "must be positive")),
        Some(v) => Ok(v),
        None => Ok(default),
    }
}
