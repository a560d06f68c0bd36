//! Query builder for stored locations.
//!
//! The live query returned by [`Store::observe_all`](crate::Store::observe_all)
//! always covers the whole table. [`LocationQuery`] is for one-shot reads
//! such as listing, paging and export.
//!
//! # Example
//!
//! ```
//! use geotrack_store::{Store, LocationQuery};
//! use time::{OffsetDateTime, Duration};
//!
//! let store = Store::open_in_memory()?;
//! let yesterday = OffsetDateTime::now_utc() - Duration::hours(24);
//!
//! let query = LocationQuery::new()
//!     .since(yesterday)
//!     .limit(50);
//!
//! let locations = store.list_locations(&query)?;
//! # Ok::<(), geotrack_store::Error>(())
//! ```

use time::OffsetDateTime;

/// Fluent query builder for stored locations.
///
/// By default, queries return results ordered by `timestamp` descending
/// (newest first).
#[derive(Debug, Default, Clone)]
pub struct LocationQuery {
    /// Filter locations captured at or after this time.
    pub since: Option<OffsetDateTime>,
    /// Filter locations captured at or before this time.
    pub until: Option<OffsetDateTime>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
    /// Order by timestamp descending (newest first).
    pub newest_first: bool,
}

impl LocationQuery {
    /// Create a new query with default settings.
    ///
    /// Default behavior:
    /// - No time range filter
    /// - No limit (all matching records)
    /// - Ordered by newest first
    pub fn new() -> Self {
        Self {
            newest_first: true,
            ..Default::default()
        }
    }

    /// Filter to locations captured at or after this time.
    pub fn since(mut self, time: OffsetDateTime) -> Self {
        self.since = Some(time);
        self
    }

    /// Filter to locations captured at or before this time.
    pub fn until(mut self, time: OffsetDateTime) -> Self {
        self.until = Some(time);
        self
    }

    /// Limit the maximum number of results returned.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first N results.
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Order results by oldest first (ascending by `timestamp`).
    pub fn oldest_first(mut self) -> Self {
        self.newest_first = false;
        self
    }

    /// Build the SQL WHERE clause and parameters.
    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(since) = self.since {
            conditions.push("timestamp >= ?");
            params.push(Box::new(to_millis(since)));
        }

        if let Some(until) = self.until {
            conditions.push("timestamp <= ?");
            params.push(Box::new(to_millis(until)));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    /// Build the full SQL query.
    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = format!(
            "SELECT id, latitude, longitude, timestamp FROM locations {} \
             ORDER BY timestamp {}, id {}",
            where_clause, order, order
        );

        // SQLite only accepts OFFSET after a LIMIT
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => {
                sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset))
            }
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
            (None, None) => {}
        }

        sql
    }
}

fn to_millis(time: OffsetDateTime) -> i64 {
    (time.unix_timestamp_nanos() / 1_000_000) as i64
}
