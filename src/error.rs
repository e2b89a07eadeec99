//! Error taxonomy for settlement and storage operations.

use thiserror::Error;

/// Errors raised while opening or migrating the database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from SQLite
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Could not determine data directory
    #[error("could not determine data directory")]
    NoDataDirectory,
    /// Schema version mismatch (future version)
    #[error("database schema version {found} is newer than supported version {supported}")]
    FutureSchemaVersion { found: u32, supported: u32 },
    /// Failed to create data directory
    #[error("failed to create data directory: {0}")]
    CreateDirFailed(std::io::Error),
}

/// Errors surfaced by the settlement engine.
///
/// Validation failures are raised before any transaction opens. Everything
/// raised after that point aborts the transaction and rolls it back.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// Malformed telemetry, roster, or arguments
    #[error("validation failed: {0}")]
    Validation(String),
    /// Referenced match or player does not exist
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    /// Business rule violation on an administrative operation
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Persistent state contradicts an invariant (e.g. missing stats row)
    #[error("integrity violation: {0}")]
    Integrity(String),
    /// Unexpected database failure
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SettlementError {
    pub fn validation(msg: impl Into<String>) -> Self {
        SettlementError::Validation(msg.into())
    }

    pub fn match_not_found(id: &str) -> Self {
        SettlementError::NotFound {
            kind: "match",
            id: id.to_string(),
        }
    }

    pub fn player_not_found(id: &str) -> Self {
        SettlementError::NotFound {
            kind: "player",
            id: id.to_string(),
        }
    }
}

pub type Result<T, E = SettlementError> = std::result::Result<T, E>;
