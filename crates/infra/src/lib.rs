//! Infrastructure layer: configuration, storage backends, services and rate limiting.

pub mod config;
pub mod rate_limit;
pub mod services;
pub mod store;

pub use config::{AppConfig, ConfigError, DatabaseConfig, RateLimitConfig, Secret};
