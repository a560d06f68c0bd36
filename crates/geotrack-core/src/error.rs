//! Error types for geotrack-core.
//!
//! # Where errors surface
//!
//! | Error | Raised by | Reaches the UI? |
//! |-------|-----------|-----------------|
//! | [`Error::Store`] | repository, worker | Yes, via the view model's error field |
//! | [`Error::Enqueue`] | [`crate::WorkDispatcher::enqueue`] | Yes, from a refresh intent |
//! | [`Error::InvalidConfig`] | constructors | No, fix configuration and restart |
//! | [`Error::Cancelled`] | worker shutdown | No |
//!
//! A provider that cannot produce a fix does not return an [`Error`]. It
//! reports an [`AcquisitionOutcome`](crate::AcquisitionOutcome), and the
//! worker decides whether the unit of work is retried or failed. Expected
//! conditions such as "no fix yet" therefore never reach the UI.

use thiserror::Error;

/// Errors that can occur in the acquisition and persistence pipeline.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Local persistence failed.
    #[error("Storage error: {0}")]
    Store(#[from] geotrack_store::Error),

    /// A unit of work could not be enqueued.
    #[error("Failed to enqueue location update: {0}")]
    Enqueue(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// HTTP transport error.
    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Create an enqueue error.
    pub fn enqueue(message: impl Into<String>) -> Self {
        Self::Enqueue(message.into())
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

/// Result type alias using geotrack-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
