//! Configuration management for the election engine
//!
//! Loads settings from environment variables (and a `.env` file if present)
//! with validation.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for the vote-casting path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotingConfig {
    /// Upper bound for one vote-casting transaction in milliseconds
    pub transaction_timeout_ms: u64,

    /// Operator switch that permits synthetic fixture generation
    pub allow_synthetic_data: bool,
}

impl VotingConfig {
    /// Load voting settings from environment variables
    pub fn from_env() -> Result<Self> {
        let transaction_timeout_ms = parse_var("VOTE_TX_TIMEOUT_MS", 5000)?;
        let allow_synthetic_data = parse_var("VOTE_ALLOW_SYNTHETIC_DATA", false)?;

        let config = Self {
            transaction_timeout_ms,
            allow_synthetic_data,
        };
        config.validate()?;
        Ok(config)
    }

    /// Timeout as a [`Duration`]
    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_millis(self.transaction_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.transaction_timeout_ms == 0 {
            return Err(Error::config("VOTE_TX_TIMEOUT_MS must be greater than zero"));
        }
        Ok(())
    }
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            transaction_timeout_ms: 5000,
            allow_synthetic_data: false,
        }
    }
}

/// PostgreSQL connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    /// Load database settings; `None` when `DATABASE_URL` is unset
    pub fn from_env() -> Result<Option<Self>> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            return Ok(None);
        };

        let max_connections = parse_var("DATABASE_MAX_CONNECTIONS", 5)?;
        if max_connections == 0 {
            return Err(Error::config("DATABASE_MAX_CONNECTIONS must be greater than zero"));
        }

        Ok(Some(Self {
            url,
            max_connections,
        }))
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub voting: VotingConfig,
    pub database: Option<DatabaseConfig>,
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Config {
    /// Load configuration from environment
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let voting = VotingConfig::from_env()?;
        let database = DatabaseConfig::from_env()?;

        let logging = LoggingConfig {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
        };

        Ok(Self {
            voting,
            database,
            logging,
        })
    }

    /// Create configuration for testing
    pub fn for_testing() -> Self {
        Self {
            voting: VotingConfig {
                transaction_timeout_ms: 2000,
                allow_synthetic_data: true, // fixtures are the point of tests
            },
            database: None,
            logging: LoggingConfig {
                level: "debug".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::config(format!("Invalid {name}: {raw:?}"))),
        Err(_) => Ok(default),
    }
}
