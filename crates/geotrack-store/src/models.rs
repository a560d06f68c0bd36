//! Data models for stored data.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use geotrack_types::LocationRecord;

use crate::error::Error;

/// A location row as persisted (normalized coordinates).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StoredLocation {
    /// Database row ID.
    pub id: i64,
    /// Normalized latitude in degrees.
    pub latitude: f64,
    /// Normalized longitude in degrees.
    pub longitude: f64,
    /// Capture time in milliseconds since Unix epoch.
    pub timestamp: i64,
}

impl StoredLocation {
    /// Create a StoredLocation from a domain record.
    ///
    /// The record's coordinates are copied as-is; callers normalize first.
    pub fn from_record(record: &LocationRecord) -> Self {
        Self {
            id: record.id,
            latitude: record.latitude,
            longitude: record.longitude,
            timestamp: record.timestamp,
        }
    }

    /// Convert to a domain record.
    pub fn to_record(&self) -> LocationRecord {
        LocationRecord {
            id: self.id,
            latitude: self.latitude,
            longitude: self.longitude,
            timestamp: self.timestamp,
        }
    }
}

/// Lifecycle of a queued unit of work.
///
/// ```text
/// Enqueued -> Running -> Succeeded
///                     -> Retrying -> Running ...
///                     -> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkState {
    /// Waiting for its first run.
    Enqueued,
    /// Claimed by a worker.
    Running,
    /// Finished successfully. Terminal.
    Succeeded,
    /// Waiting for `next_run_at` before running again.
    Retrying,
    /// Gave up. Terminal.
    Failed,
}

impl WorkState {
    /// Database representation.
    pub fn as_str(self) -> &'static str {
        match self {
            WorkState::Enqueued => "enqueued",
            WorkState::Running => "running",
            WorkState::Succeeded => "succeeded",
            WorkState::Retrying => "retrying",
            WorkState::Failed => "failed",
        }
    }

    /// Whether no further transitions can happen.
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkState::Succeeded | WorkState::Failed)
    }
}

impl fmt::Display for WorkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enqueued" => Ok(WorkState::Enqueued),
            "running" => Ok(WorkState::Running),
            "succeeded" => Ok(WorkState::Succeeded),
            "retrying" => Ok(WorkState::Retrying),
            "failed" => Ok(WorkState::Failed),
            other => Err(Error::CorruptRow(format!("unknown work state '{}'", other))),
        }
    }
}

/// A unit of work stored in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredWork {
    /// Database row ID.
    pub id: i64,
    /// Current lifecycle state.
    pub state: WorkState,
    /// How many times the body has been started.
    pub attempts: u32,
    /// Retry budget captured at enqueue time.
    pub max_attempts: u32,
    /// When the unit was enqueued (ms since epoch).
    pub enqueued_at: i64,
    /// Last state change (ms since epoch).
    pub updated_at: i64,
    /// Earliest time the unit may run (ms since epoch).
    pub next_run_at: i64,
    /// Message from the last failed attempt.
    pub last_error: Option<String>,
    /// While `running`: when the claiming worker's lease runs out.
    pub lease_expires_at: Option<i64>,
    /// Once `succeeded`: the location row the unit saved.
    pub location_id: Option<i64>,
}

impl StoredWork {
    /// Whether another attempt fits in the retry budget.
    pub fn has_attempts_left(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_state_round_trip() {
        for state in [
            WorkState::Enqueued,
            WorkState::Running,
            WorkState::Succeeded,
            WorkState::Retrying,
            WorkState::Failed,
        ] {
            assert_eq!(state.as_str().parse::<WorkState>().unwrap(), state);
        }
    }

    #[test]
    fn test_work_state_unknown() {
        assert!("paused".parse::<WorkState>().is_err());
        assert!("Enqueued".parse::<WorkState>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(WorkState::Succeeded.is_terminal());
        assert!(WorkState::Failed.is_terminal());
        assert!(!WorkState::Retrying.is_terminal());
        assert!(!WorkState::Running.is_terminal());
        assert!(!WorkState::Enqueued.is_terminal());
    }

    #[test]
    fn test_stored_location_record_mapping() {
        let record = LocationRecord {
            id: 4,
            latitude: 37.5665,
            longitude: 126.978,
            timestamp: 10,
        };
        let stored = StoredLocation::from_record(&record);
        assert_eq!(stored.to_record(), record);
    }
}
