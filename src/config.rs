use std::env;
use std::str::FromStr;

use thiserror::Error;

use crate::domain::settings::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(ConfigError::Invalid {
                key: "STORE_BACKEND",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has an invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: StoreBackend,
    /// Required for the Postgres backend.
    pub database_url: Option<String>,
    pub snapshot_path: Option<String>,
    pub host: String,
    pub port: u16,
    /// Settings in force until the first stored update.
    pub default_settings: Settings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = match lookup("STORE_BACKEND") {
            Some(v) => v.parse()?,
            None => StoreBackend::Postgres,
        };
        let database_url = lookup("DATABASE_URL");
        if backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let defaults = Settings::default();
        let default_settings = Settings {
            commission_rate_cents: parse_or(
                &lookup,
                "COMMISSION_RATE_CENTS",
                defaults.commission_rate_cents,
            )?,
            unit_price: parse_or(&lookup, "UNIT_PRICE", defaults.unit_price)?,
            reward_units: parse_or(&lookup, "REWARD_UNITS", defaults.reward_units)?,
            low_stock_threshold: parse_or(
                &lookup,
                "LOW_STOCK_THRESHOLD",
                defaults.low_stock_threshold,
            )?,
        };
        default_settings
            .validate()
            .map_err(|e| ConfigError::Invalid {
                key: "settings",
                value: e.to_string(),
            })?;

        Ok(Self {
            backend,
            database_url,
            snapshot_path: lookup("SNAPSHOT_PATH"),
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 8080)?,
            default_settings,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) => match value.trim().parse() {
            Ok(parsed) => Ok(parsed),
            Err(_) => Err(ConfigError::Invalid { key, value }),
        },
        None => Ok(default),
    }
}
