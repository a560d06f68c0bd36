//! Platform-agnostic types for geotrack.
//!
//! This crate holds the pieces every other geotrack crate agrees on:
//!
//! - The coordinate normalizer used as the deduplication key
//! - The raw [`Location`] fix a provider returns
//! - The [`LocationRecord`] the store persists
//! - [`CoordinateError`] for validation and parsing
//!
//! # Example
//!
//! ```
//! use geotrack_types::{Location, normalize_pair};
//!
//! let fix = Location::new(37.56650001, 126.97800001, 1_700_000_000_000);
//! let record = fix.to_record(fix.captured_at).normalized();
//! assert_eq!((record.latitude, record.longitude), normalize_pair(37.5665, 126.978));
//! ```

pub mod coordinate;
pub mod error;
pub mod types;

pub use coordinate::{COORDINATE_PRECISION, Coordinate, normalize, normalize_pair};
pub use error::{CoordinateError, CoordinateResult};
pub use types::{Location, LocationRecord, UNASSIGNED_ID, millis_to_datetime, now_millis};
