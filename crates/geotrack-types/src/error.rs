//! Error types for geotrack-types.

use thiserror::Error;

/// Errors produced when building or parsing coordinates.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum CoordinateError {
    /// Latitude outside of `-90..=90` or not finite.
    #[error("Invalid latitude {0}: must be a finite value between -90 and 90")]
    InvalidLatitude(f64),

    /// Longitude outside of `-180..=180` or not finite.
    #[error("Invalid longitude {0}: must be a finite value between -180 and 180")]
    InvalidLongitude(f64),

    /// Text could not be parsed as a `lat,lon` pair.
    #[error("Invalid coordinate '{0}': expected format 'lat,lon'")]
    Parse(String),
}

/// Result type alias using geotrack-types' CoordinateError type.
pub type CoordinateResult<T> = std::result::Result<T, CoordinateError>;
