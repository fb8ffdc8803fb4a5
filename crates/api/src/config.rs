//! Environment-driven configuration.
//!
//! | Variable                  | Default        |
//! |---------------------------|----------------|
//! | `BIND_ADDR`               | `0.0.0.0:8080` |
//! | `USE_PERSISTENT_STORES`   | `false`        |
//! | `DATABASE_URL`            | required when persistent |
//! | `NUMBERING_MAX_ATTEMPTS`  | `64`           |
//! | `NUMBERING_BASE_DELAY_MS` | `5`            |
//! | `NUMBERING_OVERFLOW`      | `widen`        |

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use freightdesk_infra::RetryPolicy;
use freightdesk_numbering::OverflowPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")]
    MissingDatabaseUrl,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    InMemory,
    Postgres { database_url: String },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NumberingConfig {
    pub retry: RetryPolicy,
    pub overflow: OverflowPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub storage: StorageConfig,
    pub numbering: NumberingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            storage: StorageConfig::InMemory,
            numbering: NumberingConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("BIND_ADDR") {
            config.bind_addr = parse("BIND_ADDR", &addr)?;
        }

        let persistent = match lookup("USE_PERSISTENT_STORES") {
            Some(v) => parse::<bool>("USE_PERSISTENT_STORES", &v)?,
            None => false,
        };
        if persistent {
            let database_url = lookup("DATABASE_URL")
                .filter(|u| !u.trim().is_empty())
                .ok_or(ConfigError::MissingDatabaseUrl)?;
            config.storage = StorageConfig::Postgres { database_url };
        }

        if let Some(v) = lookup("NUMBERING_MAX_ATTEMPTS") {
            let attempts: u32 = parse("NUMBERING_MAX_ATTEMPTS", &v)?;
            if attempts == 0 {
                return Err(ConfigError::Invalid {
                    name: "NUMBERING_MAX_ATTEMPTS",
                    reason: "must be at least 1".to_string(),
                });
            }
            config.numbering.retry.max_attempts = attempts;
        }
        if let Some(v) = lookup("NUMBERING_BASE_DELAY_MS") {
            let ms: u64 = parse("NUMBERING_BASE_DELAY_MS", &v)?;
            config.numbering.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(v) = lookup("NUMBERING_OVERFLOW") {
            config.numbering.overflow = parse("NUMBERING_OVERFLOW", &v)?;
        }

        Ok(config)
    }
}

fn parse<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}
