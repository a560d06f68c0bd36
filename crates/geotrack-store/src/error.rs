//! Error types for geotrack-store.

use std::path::PathBuf;

/// Result type for geotrack-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in geotrack-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Work unit not found in the queue.
    #[error("Work unit not found: {0}")]
    WorkNotFound(i64),

    /// The unit was reclaimed by another worker after its lease expired.
    #[error("Lease on work unit {0} was lost")]
    LeaseLost(i64),

    /// The database was written by a newer version of geotrack.
    #[error("Unsupported schema version {found} (this build supports up to {supported})")]
    UnsupportedSchema { found: i32, supported: i32 },

    /// A stored value could not be decoded.
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV export error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
