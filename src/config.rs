//! Application configuration loaded from the environment.
//!
//! # Environment Variables
//!
//! - `DATABASE_URL`: PostgreSQL connection string. When unset the app keeps
//!   its data in memory.
//! - `DATABASE_MAX_CONNECTIONS`: pool size (default: 10)
//! - `RUN_MIGRATIONS`: apply embedded migrations on startup (default: true)
//! - `SESSION_TTL_HOURS`: lifetime of a sign-in session (default: 720)
//! - `DEFAULT_LOCALE`: locale used when negotiation finds nothing (default: en)
//! - `CACHE_VIEWS`: cache rendered todo lists in process (default: true). Turn
//!   it off when several instances share one database.
//!
//! Bind address and port are Rocket's own (`ROCKET_ADDRESS`, `ROCKET_PORT`).

use chrono::Duration;
use std::env;

use crate::i18n::Locale;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: Option<DatabaseConfig>,
    pub session_ttl: Duration,
    pub default_locale: Locale,
    pub cache_views: bool,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub run_migrations: bool,
}

impl AppConfig {
    /// Loads configuration, reading a `.env` file first if one is present.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// A configuration with no database, for development and tests.
    pub fn in_memory() -> Self {
        AppConfig {
            database: None,
            session_ttl: Duration::hours(DEFAULT_SESSION_TTL_HOURS),
            default_locale: Locale::default(),
            cache_views: true,
        }
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database = match lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()) {
            Some(url) => {
                let max_connections = lookup("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|| "10".to_string())
                    .parse::<u32>()
                    .map_err(|e| anyhow::anyhow!("DATABASE_MAX_CONNECTIONS is not a number: {e}"))?;
                if max_connections == 0 {
                    anyhow::bail!("DATABASE_MAX_CONNECTIONS must be at least 1");
                }
                let run_migrations = lookup("RUN_MIGRATIONS")
                    .unwrap_or_else(|| "true".to_string())
                    .parse::<bool>()
                    .map_err(|e| anyhow::anyhow!("RUN_MIGRATIONS must be true or false: {e}"))?;
                Some(DatabaseConfig {
                    url,
                    max_connections,
                    run_migrations,
                })
            }
            None => None,
        };

        let ttl_hours = lookup("SESSION_TTL_HOURS")
            .map(|value| value.parse::<i64>())
            .transpose()
            .map_err(|e| anyhow::anyhow!("SESSION_TTL_HOURS is not a number: {e}"))?
            .unwrap_or(DEFAULT_SESSION_TTL_HOURS);
        if ttl_hours <= 0 {
            anyhow::bail!("SESSION_TTL_HOURS must be positive");
        }

        let default_locale = match lookup("DEFAULT_LOCALE") {
            Some(code) => Locale::from_code(&code)
                .ok_or_else(|| anyhow::anyhow!("DEFAULT_LOCALE {code:?} is not a supported locale"))?,
            None => Locale::default(),
        };

        let cache_views = lookup("CACHE_VIEWS")
            .unwrap_or_else(|| "true".to_string())
            .parse::<bool>()
            .map_err(|e| anyhow::anyhow!("CACHE_VIEWS must be true or false: {e}"))?;

        Ok(AppConfig {
            database,
            session_ttl: Duration::hours(ttl_hours),
            default_locale,
            cache_views,
        })
    }
}

const DEFAULT_SESSION_TTL_HOURS: i64 = 24 * 30;
