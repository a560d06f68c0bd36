//! Core location types.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use time::OffsetDateTime;

use crate::coordinate::{Coordinate, normalize_pair};

/// Identifier value meaning "not yet assigned by the store".
pub const UNASSIGNED_ID: i64 = 0;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Convert milliseconds since the Unix epoch to an `OffsetDateTime`.
///
/// Returns `None` when the value is outside the range `time` can represent.
pub fn millis_to_datetime(millis: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
}

/// A raw position fix returned by a location provider.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Location {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Horizontal accuracy radius in metres, when the source reports one.
    pub accuracy_m: Option<f64>,
    /// When the fix was taken (milliseconds since Unix epoch).
    pub captured_at: i64,
}

impl Location {
    /// Create a fix without an accuracy estimate.
    pub fn new(latitude: f64, longitude: f64, captured_at: i64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_m: None,
            captured_at,
        }
    }

    /// Attach an accuracy radius in metres.
    #[must_use]
    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = Some(accuracy_m);
        self
    }

    /// The fix as a plain coordinate pair (unvalidated).
    pub fn coordinate(&self) -> Coordinate {
        Coordinate {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    /// Build an unsaved record from this fix, stamped with `timestamp`.
    ///
    /// Coordinates are kept raw; normalization happens when the record is
    /// saved.
    pub fn to_record(&self, timestamp: i64) -> LocationRecord {
        LocationRecord::new(self.latitude, self.longitude, timestamp)
    }
}

/// A stored (or about to be stored) location point.
///
/// Records handed to the repository carry raw coordinates and
/// [`UNASSIGNED_ID`]. Records read back from the store carry normalized
/// coordinates and the identifier the store assigned.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LocationRecord {
    /// Store-assigned identifier, or [`UNASSIGNED_ID`].
    pub id: i64,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Capture time in milliseconds since Unix epoch.
    pub timestamp: i64,
}

impl LocationRecord {
    /// Create an unsaved record.
    pub fn new(latitude: f64, longitude: f64, timestamp: i64) -> Self {
        Self {
            id: UNASSIGNED_ID,
            latitude,
            longitude,
            timestamp,
        }
    }

    /// Whether the store has assigned this record an identifier.
    pub fn is_persisted(&self) -> bool {
        self.id != UNASSIGNED_ID
    }

    /// Copy of this record with both coordinates normalized.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let (latitude, longitude) = normalize_pair(self.latitude, self.longitude);
        Self {
            latitude,
            longitude,
            ..*self
        }
    }

    /// The record's position as a coordinate pair.
    pub fn coordinate(&self) -> Coordinate {
        Coordinate {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}
