//! Coordinate normalization.
//!
//! GPS fixes taken a few centimetres apart should land on the same stored
//! point. Both axes are rounded to five fractional digits (about 1.1 m at
//! the equator) and the rounded pair is the deduplication key used by the
//! store.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::CoordinateError;

/// Number of fractional decimal digits kept by [`normalize`].
pub const COORDINATE_PRECISION: i32 = 5;

/// Scale factor matching [`COORDINATE_PRECISION`].
const SCALE: f64 = 100_000.0;

/// Round a coordinate component to [`COORDINATE_PRECISION`] decimal places.
///
/// Uses [`f64::round`], so exact halves round away from zero. Non-finite
/// input is returned unchanged.
///
/// # Examples
///
/// ```
/// use geotrack_types::normalize;
///
/// assert_eq!(normalize(37.123456789), 37.12346);
/// assert_eq!(normalize(127.987654321), 127.98765);
/// assert_eq!(normalize(-180.0), -180.0);
/// ```
#[must_use]
pub fn normalize(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    (value * SCALE).round() / SCALE
}

/// Normalize a latitude/longitude pair. The axes are rounded independently.
#[must_use]
pub fn normalize_pair(latitude: f64, longitude: f64) -> (f64, f64) {
    (normalize(latitude), normalize(longitude))
}

/// A validated latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Coordinate {
    /// Latitude in degrees, `-90..=90`.
    pub latitude: f64,
    /// Longitude in degrees, `-180..=180`.
    pub longitude: f64,
}

impl Coordinate {
    /// Create a coordinate, rejecting out-of-range or non-finite values.
    ///
    /// # Examples
    ///
    /// ```
    /// use geotrack_types::Coordinate;
    ///
    /// assert!(Coordinate::new(37.5665, 126.9780).is_ok());
    /// assert!(Coordinate::new(91.0, 0.0).is_err());
    /// ```
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(CoordinateError::InvalidLatitude(latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError::InvalidLongitude(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Return this coordinate with both axes normalized.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let (latitude, longitude) = normalize_pair(self.latitude, self.longitude);
        Self {
            latitude,
            longitude,
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

impl FromStr for Coordinate {
    type Err = CoordinateError;

    /// Parse `"lat,lon"`, with optional whitespace around either part.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lon) = s
            .split_once(',')
            .ok_or_else(|| CoordinateError::Parse(s.to_string()))?;
        let latitude = lat
            .trim()
            .parse::<f64>()
            .map_err(|_| CoordinateError::Parse(s.to_string()))?;
        let longitude = lon
            .trim()
            .parse::<f64>()
            .map_err(|_| CoordinateError::Parse(s.to_string()))?;
        Self::new(latitude, longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_rounds_to_five_places() {
        assert_eq!(normalize(37.123456789), 37.12346);
        assert_eq!(normalize(127.987654321), 127.98765);
    }

    #[test]
    fn test_normalize_boundaries_are_fixed_points() {
        assert_eq!(normalize(90.0), 90.0);
        assert_eq!(normalize(-90.0), -90.0);
        assert_eq!(normalize(180.0), 180.0);
        assert_eq!(normalize(-180.0), -180.0);
        assert_eq!(normalize(0.0), 0.0);
    }

    #[test]
    fn test_normalize_collapses_gps_jitter() {
        assert_eq!(normalize(37.123450001), 37.12345);
        assert_eq!(normalize(37.123449999), 37.12345);
        assert_eq!(normalize(37.123450001), normalize(37.123449999));
    }

    #[test]
    fn test_normalize_negative_values() {
        assert_eq!(normalize(-33.868819999), -33.86882);
        assert_eq!(normalize(-151.209295555), -151.2093);
    }

    #[test]
    fn test_normalize_non_finite_passthrough() {
        assert!(normalize(f64::NAN).is_nan());
        assert_eq!(normalize(f64::INFINITY), f64::INFINITY);
    }

    #[test]
    fn test_normalize_pair_is_independent() {
        let (lat, lon) = normalize_pair(37.56650001, 126.97800001);
        assert_eq!(lat, 37.5665);
        assert_eq!(lon, 126.978);

        let (lat, lon) = normalize_pair(37.5665, 126.978004);
        assert_eq!(lat, 37.5665);
        assert_eq!(lon, 126.978);
    }

    #[test]
    fn test_coordinate_validation() {
        assert!(Coordinate::new(90.0, 180.0).is_ok());
        assert!(Coordinate::new(-90.0, -180.0).is_ok());
        assert_eq!(
            Coordinate::new(90.5, 0.0),
            Err(CoordinateError::InvalidLatitude(90.5))
        );
        assert_eq!(
            Coordinate::new(0.0, -181.0),
            Err(CoordinateError::InvalidLongitude(-181.0))
        );
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_coordinate_from_str() {
        let c: Coordinate = "37.5665, 126.9780".parse().unwrap();
        assert_eq!(c.latitude, 37.5665);
        assert_eq!(c.longitude, 126.978);

        assert!("37.5665".parse::<Coordinate>().is_err());
        assert!("north,east".parse::<Coordinate>().is_err());
        assert!(matches!(
            "100,0".parse::<Coordinate>(),
            Err(CoordinateError::InvalidLatitude(_))
        ));
    }

    #[test]
    fn test_coordinate_display() {
        let c = Coordinate::new(37.5665, 126.978).unwrap();
        assert_eq!(c.to_string(), "37.5665,126.978");
    }

    #[test]
    fn test_coordinate_normalized() {
        let c = Coordinate::new(37.123456789, 127.987654321).unwrap().normalized();
        assert_eq!(c.latitude, 37.12346);
        assert_eq!(c.longitude, 127.98765);
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(x in -180.0f64..=180.0) {
            let once = normalize(x);
            let twice = normalize(once);
            prop_assert!((once - twice).abs() <= 1e-9);
        }

        #[test]
        fn prop_normalize_error_is_bounded(x in -180.0f64..=180.0) {
            // Half a unit in the last kept place, plus float slack.
            prop_assert!((normalize(x) - x).abs() <= 0.5e-5 + 1e-9);
        }

        #[test]
        fn prop_normalize_is_odd(x in 0.0f64..=180.0) {
            prop_assert_eq!(normalize(-x), -normalize(x));
        }
    }
}
