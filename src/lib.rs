//! Election voting core
//!
//! One ballot per voter per poll, polls that open on a single calendar day,
//! per-choice running tallies kept consistent with the ballot ledger, and
//! read-side statistics per poll and per department.
//!
//! Storage is pluggable through [`Store`]: [`MemoryStore`] for tests and
//! single-process use, [`PgStore`] for PostgreSQL.

pub mod casting;
pub mod config;
pub mod engine;
pub mod errors;
pub mod lifecycle;
pub mod seed;
pub mod stats;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use engine::ElectionEngine;
pub use errors::{Error, Result};
pub use store::{MemoryStore, PgStore, Store};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging with the default filter
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "election_core=info".into()),
        )
        .try_init()
        .map_err(|e| Error::config(format!("failed to install log subscriber: {e}")))?;

    tracing::info!("🗳️  Election core v{} initialized", VERSION);
    Ok(())
}

/// Initialize logging from [`config::LoggingConfig`]
///
/// `RUST_LOG` still takes precedence over the configured level.
pub fn init_with_config(logging: &config::LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("election_core={}", logging.level).into());

    let installed = match logging.format.as_str() {
        "compact" => tracing_subscriber::fmt()
            .compact()
            .with_env_filter(filter)
            .try_init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
    };
    installed.map_err(|e| Error::config(format!("failed to install log subscriber: {e}")))?;

    tracing::info!("🗳️  Election core v{} initialized", VERSION);
    Ok(())
}
