//! Error handling for the election engine

use crate::types::{ChoiceId, PollId, VoterId};

/// Result type alias for the election engine
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the election engine
///
/// The first five variants are the vote-casting taxonomy seen by callers.
/// Only [`Error::TransientStoreFailure`] is safe to retry, and a retry must
/// start again from the precondition checks.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A referenced poll, choice, voter or candidate does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The poll is not open for voting today
    #[error("Election {poll_id} is not open for voting today")]
    ElectionClosed { poll_id: PollId },

    /// A ballot already exists for this (voter, poll) pair
    #[error("Voter {voter_id} has already voted in election {poll_id}")]
    AlreadyVoted { voter_id: VoterId, poll_id: PollId },

    /// The choice exists but belongs to another poll
    #[error("Choice {choice_id} does not belong to election {poll_id}")]
    InvalidChoice { choice_id: ChoiceId, poll_id: PollId },

    /// Timeout or conflict at the storage layer
    #[error("Transient store failure: {message}")]
    TransientStoreFailure { message: String },

    /// Rejected administrative input
    #[error("Validation failed: {field}")]
    Validation { field: String },

    /// A unique profile attribute is already taken
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Invalid or missing configuration
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Non-retryable storage errors
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Create a new not-found error
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create a new transient store error
    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientStoreFailure {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation(field: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
        }
    }

    /// Create a new conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a new internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the caller may retry the whole operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStoreFailure { .. })
    }

    /// Message shown to end users by request handlers
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "The requested election or choice could not be found.",
            Self::ElectionClosed { .. } => {
                "This election is not active for today. Voting is only allowed on the scheduled election date."
            }
            Self::AlreadyVoted { .. } => "You have already voted in this election.",
            Self::InvalidChoice { .. } => "The selected choice does not exist.",
            Self::TransientStoreFailure { .. } => "Something went wrong. Please try again.",
            Self::Validation { .. } | Self::Conflict { .. } => "The submitted data is not valid.",
            Self::Config { .. }
            | Self::Storage { .. }
            | Self::Serialization(_)
            | Self::Internal { .. } => "An internal error occurred.",
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::transient(err.to_string())
            }
            sqlx::Error::Database(db) => match db.code().as_deref() {
                // serialization_failure, deadlock_detected, lock_not_available
                Some("40001") | Some("40P01") | Some("55P03") => Self::transient(err.to_string()),
                _ => Self::storage(err.to_string()),
            },
            _ => Self::storage(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for Error {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::storage(format!("migration failed: {err}"))
    }
}

/// Convenience macros for creating specific error types
#[macro_export]
macro_rules! store_error {
    ($msg:expr) => {
        $crate::Error::storage($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::storage(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! validation_error {
    ($msg:expr) => {
        $crate::Error::validation($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::validation(format!($fmt, $($arg)*))
    };
}
