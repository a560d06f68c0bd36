//! Main store implementation.

use std::cell::Cell;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use geotrack_types::{LocationRecord, UNASSIGNED_ID, millis_to_datetime, now_millis};

use crate::error::{Error, Result};
use crate::live::{LiveQuery, Snapshot};
use crate::models::{StoredLocation, StoredWork, WorkState};
use crate::queries::LocationQuery;
use crate::schema;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const WORK_COLUMNS: &str = "id, state, attempts, max_attempts, enqueued_at, updated_at, \
     next_run_at, last_error, lease_expires_at, location_id";

/// SQLite-based store for location points and queued work.
///
/// Every mutation of the `locations` table made through this handle
/// republishes the full ordered table to all [`LiveQuery`] subscribers
/// before returning. Commits from other connections to the same file are
/// picked up by [`Store::sync_external_changes`].
pub struct Store {
    conn: Connection,
    snapshot_tx: watch::Sender<Snapshot>,
    data_version: Cell<i64>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("subscribers", &self.snapshot_tx.receiver_count())
            .finish()
    }
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;
        // Other processes may hold the write lock briefly
        conn.busy_timeout(BUSY_TIMEOUT)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        Self::with_connection(conn)
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        schema::initialize(&conn)?;
        let data_version = read_data_version(&conn)?;
        let initial = query_all(&conn)?;
        let (snapshot_tx, _) = watch::channel(initial);
        Ok(Self {
            conn,
            snapshot_tx,
            data_version: Cell::new(data_version),
        })
    }

    /// Re-read the table and push it to subscribers.
    fn publish(&self) -> Result<()> {
        let snapshot = query_all(&self.conn)?;
        debug!(
            "Publishing snapshot of {} location(s) to {} subscriber(s)",
            snapshot.len(),
            self.snapshot_tx.receiver_count()
        );
        self.snapshot_tx.send_replace(snapshot);
        Ok(())
    }

    /// Republish the table if another connection committed since the last
    /// check.
    ///
    /// SQLite's `data_version` only moves for commits made by other
    /// connections, so writes through this handle never trigger a second
    /// publish. Subscribers are only woken when the location rows differ
    /// from the last snapshot. Returns whether a new snapshot was published.
    pub fn sync_external_changes(&self) -> Result<bool> {
        let version = read_data_version(&self.conn)?;
        if version == self.data_version.replace(version) {
            return Ok(false);
        }

        let snapshot = query_all(&self.conn)?;
        let changed = self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
        if changed {
            debug!("Picked up location changes from another connection");
        }
        Ok(changed)
    }
}

fn read_data_version(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("PRAGMA data_version", [], |row| row.get(0))?)
}

fn query_all(conn: &Connection) -> Result<Snapshot> {
    let mut stmt = conn.prepare(
        "SELECT id, latitude, longitude, timestamp FROM locations
         ORDER BY timestamp DESC, id DESC",
    )?;
    let rows = stmt
        .query_map([], location_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn location_from_row(row: &Row<'_>) -> rusqlite::Result<StoredLocation> {
    Ok(StoredLocation {
        id: row.get(0)?,
        latitude: row.get(1)?,
        longitude: row.get(2)?,
        timestamp: row.get(3)?,
    })
}

// Location operations
impl Store {
    /// Subscribe to the live, newest-first view of all locations.
    ///
    /// The returned query yields the current table immediately, then a new
    /// snapshot after every insert, update or clear.
    pub fn observe_all(&self) -> LiveQuery {
        LiveQuery::new(self.snapshot_tx.subscribe())
    }

    /// Insert a new row or update an existing one by identifier.
    ///
    /// A record with [`UNASSIGNED_ID`] is inserted and receives a fresh
    /// identifier. Any other identifier overwrites that row's coordinates
    /// and timestamp in place (inserting it if the row does not exist).
    /// Coordinates are stored exactly as given; deduplication by normalized
    /// coordinate is the caller's job (see [`Store::find_by_exact_coordinate`]).
    pub fn upsert(&self, record: &LocationRecord) -> Result<StoredLocation> {
        let id = if record.id == UNASSIGNED_ID {
            self.conn.execute(
                "INSERT INTO locations (latitude, longitude, timestamp) VALUES (?1, ?2, ?3)",
                rusqlite::params![record.latitude, record.longitude, record.timestamp],
            )?;
            let id = self.conn.last_insert_rowid();
            debug!("Inserted location {} at {},{}", id, record.latitude, record.longitude);
            id
        } else {
            self.conn.execute(
                "INSERT INTO locations (id, latitude, longitude, timestamp)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    latitude = excluded.latitude,
                    longitude = excluded.longitude,
                    timestamp = excluded.timestamp",
                rusqlite::params![
                    record.id,
                    record.latitude,
                    record.longitude,
                    record.timestamp
                ],
            )?;
            debug!("Updated location {} (timestamp {})", record.id, record.timestamp);
            record.id
        };

        self.publish()?;

        Ok(StoredLocation {
            id,
            ..StoredLocation::from_record(record)
        })
    }

    /// Find the row stored at exactly this coordinate pair.
    ///
    /// Matching is exact, so both values should already be normalized.
    pub fn find_by_exact_coordinate(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<StoredLocation>> {
        let location = self
            .conn
            .query_row(
                "SELECT id, latitude, longitude, timestamp FROM locations
                 WHERE latitude = ?1 AND longitude = ?2",
                rusqlite::params![latitude, longitude],
                location_from_row,
            )
            .optional()?;

        Ok(location)
    }

    /// Get a location by ID.
    pub fn get_location(&self, id: i64) -> Result<Option<StoredLocation>> {
        let location = self
            .conn
            .query_row(
                "SELECT id, latitude, longitude, timestamp FROM locations WHERE id = ?",
                [id],
                location_from_row,
            )
            .optional()?;

        Ok(location)
    }

    /// Query locations with filters.
    pub fn list_locations(&self, query: &LocationQuery) -> Result<Vec<StoredLocation>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let locations = stmt
            .query_map(params_ref.as_slice(), location_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(locations)
    }

    /// Count stored locations.
    pub fn count_locations(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM locations", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Remove every stored location. Returns the number of rows deleted.
    pub fn clear_all(&self) -> Result<usize> {
        let deleted = self.conn.execute("DELETE FROM locations", [])?;
        info!("Cleared {} location(s)", deleted);
        self.publish()?;
        Ok(deleted)
    }
}

/// One exported location row.
#[derive(Serialize)]
struct ExportRow {
    id: i64,
    latitude: f64,
    longitude: f64,
    timestamp: i64,
    captured_at: String,
}

impl From<&StoredLocation> for ExportRow {
    fn from(location: &StoredLocation) -> Self {
        let captured_at = millis_to_datetime(location.timestamp)
            .and_then(|dt| dt.format(&time::format_description::well_known::Rfc3339).ok())
            .unwrap_or_default();
        Self {
            id: location.id,
            latitude: location.latitude,
            longitude: location.longitude,
            timestamp: location.timestamp,
            captured_at,
        }
    }
}

// Export operations
impl Store {
    /// Write the locations matching `query` as CSV. Returns the row count.
    ///
    /// Columns: `id,latitude,longitude,timestamp,captured_at` (RFC3339).
    pub fn export_csv<W: Write>(
        &self,
        query: &LocationQuery,
        writer: W,
        with_header: bool,
    ) -> Result<usize> {
        let locations = self.list_locations(query)?;
        let mut csv_writer = csv::WriterBuilder::new()
            .has_headers(with_header)
            .from_writer(writer);
        for location in &locations {
            csv_writer.serialize(ExportRow::from(location))?;
        }
        csv_writer.flush()?;
        Ok(locations.len())
    }

    /// Write the locations matching `query` as a JSON array with the same
    /// fields as [`export_csv`](Self::export_csv). Returns the row count.
    pub fn export_json<W: Write>(
        &self,
        query: &LocationQuery,
        mut writer: W,
        pretty: bool,
    ) -> Result<usize> {
        let locations = self.list_locations(query)?;
        let rows: Vec<ExportRow> = locations.iter().map(ExportRow::from).collect();
        if pretty {
            serde_json::to_writer_pretty(&mut writer, &rows)?;
        } else {
            serde_json::to_writer(&mut writer, &rows)?;
        }
        writer.write_all(b"\n")?;
        Ok(rows.len())
    }
}

fn work_from_row(row: &Row<'_>) -> rusqlite::Result<(StoredWork, String)> {
    let state: String = row.get(1)?;
    Ok((
        StoredWork {
            id: row.get(0)?,
            // Placeholder until the state text is decoded by `decode_work`
            state: WorkState::Enqueued,
            attempts: row.get::<_, i64>(2)? as u32,
            max_attempts: row.get::<_, i64>(3)? as u32,
            enqueued_at: row.get(4)?,
            updated_at: row.get(5)?,
            next_run_at: row.get(6)?,
            last_error: row.get(7)?,
            lease_expires_at: row.get(8)?,
            location_id: row.get(9)?,
        },
        state,
    ))
}

fn decode_work((mut work, state): (StoredWork, String)) -> Result<StoredWork> {
    work.state = state.parse()?;
    Ok(work)
}

// Work queue operations
impl Store {
    /// Add a unit of work, runnable immediately.
    pub fn enqueue_work(&self, max_attempts: u32) -> Result<StoredWork> {
        let now = now_millis();
        self.conn.execute(
            "INSERT INTO work_queue (state, attempts, max_attempts, enqueued_at, updated_at, next_run_at)
             VALUES (?1, 0, ?2, ?3, ?3, ?3)",
            rusqlite::params![WorkState::Enqueued.as_str(), max_attempts, now],
        )?;
        let id = self.conn.last_insert_rowid();
        info!("Enqueued work unit {} (max attempts: {})", id, max_attempts);

        self.get_work(id)?.ok_or(Error::WorkNotFound(id))
    }

    /// Claim the oldest unit that is due at `now`, holding it for `lease`.
    ///
    /// Due units are enqueued or retrying units whose `next_run_at` has
    /// passed, and running units whose lease has expired. The claimed unit
    /// moves to `running` and its attempt counter is incremented in the same
    /// statement. The returned unit is the claim: pass it back to
    /// [`complete_work`](Self::complete_work), [`retry_work`](Self::retry_work)
    /// or [`fail_work`](Self::fail_work).
    pub fn claim_next_work(&self, now: i64, lease: Duration) -> Result<Option<StoredWork>> {
        let lease_expires_at = now.saturating_add(lease.as_millis() as i64);
        let sql = format!(
            "UPDATE work_queue
             SET state = ?1, attempts = attempts + 1, updated_at = ?2, lease_expires_at = ?3
             WHERE id = (
                 SELECT id FROM work_queue
                 WHERE (state IN (?4, ?5) AND next_run_at <= ?2)
                    OR (state = ?1 AND COALESCE(lease_expires_at, 0) <= ?2)
                 ORDER BY next_run_at ASC, id ASC
                 LIMIT 1
             )
             RETURNING {}",
            WORK_COLUMNS
        );

        let claimed = self
            .conn
            .query_row(
                &sql,
                rusqlite::params![
                    WorkState::Running.as_str(),
                    now,
                    lease_expires_at,
                    WorkState::Enqueued.as_str(),
                    WorkState::Retrying.as_str(),
                ],
                work_from_row,
            )
            .optional()?;

        match claimed {
            Some(raw) => {
                let work = decode_work(raw)?;
                debug!("Claimed work unit {} (attempt {})", work.id, work.attempts);
                Ok(Some(work))
            }
            None => Ok(None),
        }
    }

    /// Mark a claimed unit as succeeded, recording the location it saved.
    pub fn complete_work(&self, claim: &StoredWork, location_id: i64) -> Result<StoredWork> {
        self.transition(claim, WorkState::Succeeded, None, None, Some(location_id))
    }

    /// Schedule another attempt of a claimed unit at `next_run_at`.
    pub fn retry_work(
        &self,
        claim: &StoredWork,
        next_run_at: i64,
        error: &str,
    ) -> Result<StoredWork> {
        self.transition(claim, WorkState::Retrying, Some(next_run_at), Some(error), None)
    }

    /// Mark a claimed unit as failed.
    pub fn fail_work(&self, claim: &StoredWork, error: &str) -> Result<StoredWork> {
        self.transition(claim, WorkState::Failed, None, Some(error), None)
    }

    /// Apply the result of a claimed attempt.
    ///
    /// Only the holder of the latest claim may move a unit out of
    /// `running`: once the lease expired and the unit was claimed again,
    /// the attempt counter no longer matches and this fails with
    /// [`Error::LeaseLost`].
    fn transition(
        &self,
        claim: &StoredWork,
        state: WorkState,
        next_run_at: Option<i64>,
        error: Option<&str>,
        location_id: Option<i64>,
    ) -> Result<StoredWork> {
        let updated = self.conn.execute(
            "UPDATE work_queue SET
                state = ?4,
                updated_at = ?5,
                next_run_at = COALESCE(?6, next_run_at),
                last_error = COALESCE(?7, last_error),
                location_id = COALESCE(?8, location_id),
                lease_expires_at = NULL
             WHERE id = ?1 AND state = ?2 AND attempts = ?3",
            rusqlite::params![
                claim.id,
                WorkState::Running.as_str(),
                claim.attempts,
                state.as_str(),
                now_millis(),
                next_run_at,
                error,
                location_id,
            ],
        )?;

        if updated == 0 {
            return match self.get_work(claim.id)? {
                Some(_) => Err(Error::LeaseLost(claim.id)),
                None => Err(Error::WorkNotFound(claim.id)),
            };
        }

        debug!("Work unit {} -> {}", claim.id, state);
        self.get_work(claim.id)?.ok_or(Error::WorkNotFound(claim.id))
    }

    /// Get a unit of work by ID.
    pub fn get_work(&self, id: i64) -> Result<Option<StoredWork>> {
        let sql = format!("SELECT {} FROM work_queue WHERE id = ?", WORK_COLUMNS);
        let raw = self.conn.query_row(&sql, [id], work_from_row).optional()?;
        raw.map(decode_work).transpose()
    }

    /// List the most recently enqueued units, newest first.
    pub fn list_work(&self, limit: u32) -> Result<Vec<StoredWork>> {
        let sql = format!(
            "SELECT {} FROM work_queue ORDER BY enqueued_at DESC, id DESC LIMIT ?",
            WORK_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let raw = stmt
            .query_map([limit], work_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        raw.into_iter().map(decode_work).collect()
    }

    /// Number of units that still have to run (enqueued, retrying or running).
    pub fn pending_work_count(&self) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM work_queue WHERE state IN (?1, ?2, ?3)",
            rusqlite::params![
                WorkState::Enqueued.as_str(),
                WorkState::Retrying.as_str(),
                WorkState::Running.as_str(),
            ],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Earliest time a unit becomes claimable, if any.
    ///
    /// That is `next_run_at` for enqueued and retrying units and the lease
    /// expiry for running ones.
    pub fn next_due_at(&self) -> Result<Option<i64>> {
        let due: Option<i64> = self.conn.query_row(
            "SELECT MIN(CASE WHEN state = ?3 THEN COALESCE(lease_expires_at, 0)
                             ELSE next_run_at END)
             FROM work_queue WHERE state IN (?1, ?2, ?3)",
            rusqlite::params![
                WorkState::Enqueued.as_str(),
                WorkState::Retrying.as_str(),
                WorkState::Running.as_str(),
            ],
            |row| row.get(0),
        )?;
        Ok(due)
    }

    /// Requeue `running` units whose lease expired by `now`.
    ///
    /// Those belong to a worker that died mid-attempt. Units still inside
    /// their lease are left to the worker holding them. The interrupted
    /// attempt still counts against the unit's budget.
    pub fn recover_interrupted_work(&self, now: i64) -> Result<usize> {
        let recovered = self.conn.execute(
            "UPDATE work_queue
             SET state = ?1, updated_at = ?2, next_run_at = ?2, lease_expires_at = NULL
             WHERE state = ?3 AND COALESCE(lease_expires_at, 0) <= ?2",
            rusqlite::params![
                WorkState::Enqueued.as_str(),
                now,
                WorkState::Running.as_str(),
            ],
        )?;

        if recovered > 0 {
            warn!("Recovered {} interrupted work unit(s)", recovered);
        }
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEASE: Duration = Duration::from_secs(60);

    fn record(latitude: f64, longitude: f64, timestamp: i64) -> LocationRecord {
        LocationRecord::new(latitude, longitude, timestamp)
    }

    #[test]
    fn test_open_in_memory() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.count_locations().unwrap(), 0);
        assert!(store.observe_all().current().is_empty());
    }

    #[test]
    fn test_upsert_assigns_fresh_ids() {
        let store = Store::open_in_memory().unwrap();

        let a = store.upsert(&record(37.5665, 126.978, 1)).unwrap();
        let b = store.upsert(&record(35.1796, 129.0756, 2)).unwrap();

        assert!(a.id > 0);
        assert!(b.id > a.id);
        assert_eq!(store.count_locations().unwrap(), 2);
    }

    #[test]
    fn test_upsert_by_id_updates_in_place() {
        let store = Store::open_in_memory().unwrap();
        let first = store.upsert(&record(37.5665, 126.978, 1)).unwrap();

        let updated = store
            .upsert(&LocationRecord {
                timestamp: 50,
                ..first.to_record()
            })
            .unwrap();

        assert_eq!(updated.id, first.id);
        assert_eq!(store.count_locations().unwrap(), 1);
        assert_eq!(store.get_location(first.id).unwrap().unwrap().timestamp, 50);
    }

    #[test]
    fn test_find_by_exact_coordinate() {
        let store = Store::open_in_memory().unwrap();
        let saved = store.upsert(&record(37.5665, 126.978, 1)).unwrap();

        let found = store.find_by_exact_coordinate(37.5665, 126.978).unwrap();
        assert_eq!(found, Some(saved));

        assert!(store.find_by_exact_coordinate(37.5665, 126.97801).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_coordinate_insert_is_rejected() {
        let store = Store::open_in_memory().unwrap();
        store.upsert(&record(1.0, 2.0, 1)).unwrap();
        assert!(matches!(
            store.upsert(&record(1.0, 2.0, 2)),
            Err(Error::Database(_))
        ));
    }

    #[test]
    fn test_list_locations_newest_first() {
        let store = Store::open_in_memory().unwrap();
        store.upsert(&record(1.0, 1.0, 100)).unwrap();
        store.upsert(&record(2.0, 2.0, 300)).unwrap();
        store.upsert(&record(3.0, 3.0, 200)).unwrap();

        let all = store.list_locations(&LocationQuery::new()).unwrap();
        let timestamps: Vec<i64> = all.iter().map(|l| l.timestamp).collect();
        assert_eq!(timestamps, vec![300, 200, 100]);

        let oldest = store
            .list_locations(&LocationQuery::new().oldest_first().limit(1))
            .unwrap();
        assert_eq!(oldest[0].timestamp, 100);
    }

    #[test]
    fn test_clear_all() {
        let store = Store::open_in_memory().unwrap();
        store.upsert(&record(1.0, 1.0, 1)).unwrap();
        store.upsert(&record(2.0, 2.0, 2)).unwrap();

        assert_eq!(store.clear_all().unwrap(), 2);
        assert_eq!(store.count_locations().unwrap(), 0);
        assert!(store.observe_all().current().is_empty());
    }

    #[tokio::test]
    async fn test_observe_all_replays_and_follows_changes() {
        let store = Store::open_in_memory().unwrap();
        store.upsert(&record(1.0, 1.0, 10)).unwrap();

        let mut live = store.observe_all();
        assert_eq!(live.next().await.unwrap().len(), 1);

        store.upsert(&record(2.0, 2.0, 20)).unwrap();
        let snapshot = live.next().await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].timestamp, 20);

        store.clear_all().unwrap();
        assert!(live.next().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_observe_all_ends_when_store_dropped() {
        let store = Store::open_in_memory().unwrap();
        let mut live = store.observe_all();
        live.next().await.unwrap();

        drop(store);
        assert!(live.next().await.is_none());
    }

    #[tokio::test]
    async fn test_live_query_sees_commits_from_another_connection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.db");
        let watcher = Store::open(&path).unwrap();
        let writer = Store::open(&path).unwrap();

        let mut live = watcher.observe_all();
        assert!(live.next().await.unwrap().is_empty());

        // Nothing committed elsewhere yet
        assert!(!watcher.sync_external_changes().unwrap());

        writer.upsert(&record(37.5665, 126.978, 10)).unwrap();
        assert!(watcher.sync_external_changes().unwrap());

        let snapshot = tokio::time::timeout(Duration::from_secs(1), live.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].latitude, 37.5665);

        // Queue writes move data_version but leave the locations unchanged
        writer.enqueue_work(1).unwrap();
        assert!(!watcher.sync_external_changes().unwrap());
    }

    #[test]
    fn test_own_writes_are_not_republished_by_sync() {
        let store = Store::open_in_memory().unwrap();
        store.upsert(&record(1.0, 1.0, 1)).unwrap();
        assert!(!store.sync_external_changes().unwrap());
    }

    #[test]
    fn test_export_csv() {
        let store = Store::open_in_memory().unwrap();
        store.upsert(&record(37.5665, 126.978, 1_700_000_000_000)).unwrap();
        store.upsert(&record(35.1796, 129.0756, 1_700_000_100_000)).unwrap();

        let mut out = Vec::new();
        let count = store
            .export_csv(&LocationQuery::new().limit(1), &mut out, true)
            .unwrap();
        assert_eq!(count, 1);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "id,latitude,longitude,timestamp,captured_at");
        assert_eq!(
            lines[1],
            "2,35.1796,129.0756,1700000100000,2023-11-14T22:15:00Z"
        );
        assert_eq!(lines.len(), 2);

        let mut bare = Vec::new();
        store
            .export_csv(&LocationQuery::new(), &mut bare, false)
            .unwrap();
        assert!(String::from_utf8(bare).unwrap().starts_with("2,"));
    }

    #[test]
    fn test_export_json() {
        let store = Store::open_in_memory().unwrap();
        store.upsert(&record(37.5665, 126.978, 1_700_000_000_000)).unwrap();

        let mut out = Vec::new();
        assert_eq!(
            store
                .export_json(&LocationQuery::new(), &mut out, false)
                .unwrap(),
            1
        );
        let text = String::from_utf8(out).unwrap();
        assert!(text.ends_with("]\n"));

        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed[0]["latitude"], 37.5665);
        assert_eq!(parsed[0]["captured_at"], "2023-11-14T22:13:20Z");
    }

    // --- Work queue ---

    #[test]
    fn test_enqueue_and_claim() {
        let store = Store::open_in_memory().unwrap();
        let work = store.enqueue_work(3).unwrap();
        assert_eq!(work.state, WorkState::Enqueued);
        assert_eq!(work.attempts, 0);
        assert_eq!(work.lease_expires_at, None);

        let now = now_millis();
        let claimed = store.claim_next_work(now, LEASE).unwrap().unwrap();
        assert_eq!(claimed.id, work.id);
        assert_eq!(claimed.state, WorkState::Running);
        assert_eq!(claimed.attempts, 1);
        assert_eq!(claimed.lease_expires_at, Some(now + 60_000));

        // Nothing else is due
        assert!(store.claim_next_work(now, LEASE).unwrap().is_none());
    }

    #[test]
    fn test_claim_order_is_fifo() {
        let store = Store::open_in_memory().unwrap();
        let first = store.enqueue_work(1).unwrap();
        let second = store.enqueue_work(1).unwrap();

        let now = now_millis();
        assert_eq!(store.claim_next_work(now, LEASE).unwrap().unwrap().id, first.id);
        assert_eq!(store.claim_next_work(now, LEASE).unwrap().unwrap().id, second.id);
    }

    #[test]
    fn test_retry_is_not_due_until_next_run_at() {
        let store = Store::open_in_memory().unwrap();
        store.enqueue_work(3).unwrap();
        let now = now_millis();
        let claim = store.claim_next_work(now, LEASE).unwrap().unwrap();

        let retrying = store.retry_work(&claim, now + 60_000, "no fix").unwrap();
        assert_eq!(retrying.state, WorkState::Retrying);
        assert_eq!(retrying.last_error.as_deref(), Some("no fix"));
        assert_eq!(retrying.lease_expires_at, None);

        assert!(store.claim_next_work(now, LEASE).unwrap().is_none());
        assert_eq!(store.next_due_at().unwrap(), Some(now + 60_000));

        let again = store.claim_next_work(now + 60_000, LEASE).unwrap().unwrap();
        assert_eq!(again.attempts, 2);
    }

    #[test]
    fn test_complete_records_location_and_fail_records_error() {
        let store = Store::open_in_memory().unwrap();
        let saved = store.upsert(&record(1.0, 2.0, 1)).unwrap();
        store.enqueue_work(1).unwrap();
        store.enqueue_work(1).unwrap();
        let now = now_millis();
        let a = store.claim_next_work(now, LEASE).unwrap().unwrap();
        let b = store.claim_next_work(now, LEASE).unwrap().unwrap();

        let done = store.complete_work(&a, saved.id).unwrap();
        assert_eq!(done.state, WorkState::Succeeded);
        assert_eq!(done.location_id, Some(saved.id));

        let failed = store.fail_work(&b, "denied").unwrap();
        assert_eq!(failed.state, WorkState::Failed);
        assert_eq!(failed.last_error.as_deref(), Some("denied"));
        assert_eq!(failed.location_id, None);

        assert_eq!(store.pending_work_count().unwrap(), 0);
        assert!(store.claim_next_work(i64::MAX, LEASE).unwrap().is_none());
    }

    #[test]
    fn test_transition_requires_claim() {
        let store = Store::open_in_memory().unwrap();
        let unclaimed = store.enqueue_work(1).unwrap();
        assert!(matches!(
            store.complete_work(&unclaimed, 1),
            Err(Error::LeaseLost(id)) if id == unclaimed.id
        ));

        let ghost = StoredWork {
            id: 99,
            ..unclaimed
        };
        assert!(matches!(store.fail_work(&ghost, "x"), Err(Error::WorkNotFound(99))));
    }

    #[test]
    fn test_recover_leaves_live_claims_alone() {
        let store = Store::open_in_memory().unwrap();
        let work = store.enqueue_work(2).unwrap();
        let now = now_millis();
        store.claim_next_work(now, LEASE).unwrap().unwrap();

        // Another process starting up while the attempt is in flight
        assert_eq!(store.recover_interrupted_work(now).unwrap(), 0);
        assert!(store.claim_next_work(now, LEASE).unwrap().is_none());
        assert_eq!(store.get_work(work.id).unwrap().unwrap().state, WorkState::Running);
        assert_eq!(store.next_due_at().unwrap(), Some(now + 60_000));

        // Once the lease runs out the unit is requeued
        assert_eq!(store.recover_interrupted_work(now + 60_000).unwrap(), 1);
        let recovered = store.get_work(work.id).unwrap().unwrap();
        assert_eq!(recovered.state, WorkState::Enqueued);
        assert_eq!(recovered.attempts, 1);
        assert_eq!(recovered.lease_expires_at, None);
    }

    #[test]
    fn test_expired_claim_is_taken_over_and_stale_holder_loses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");
        let a = Store::open(&path).unwrap();
        let b = Store::open(&path).unwrap();

        a.enqueue_work(3).unwrap();
        let now = now_millis();
        let stale = a.claim_next_work(now, LEASE).unwrap().unwrap();

        // Still leased: the second handle cannot take it
        assert!(b.claim_next_work(now + 1_000, LEASE).unwrap().is_none());

        let fresh = b.claim_next_work(now + 60_000, LEASE).unwrap().unwrap();
        assert_eq!(fresh.id, stale.id);
        assert_eq!(fresh.attempts, 2);

        assert!(matches!(
            a.complete_work(&stale, 1),
            Err(Error::LeaseLost(id)) if id == stale.id
        ));
        let failed = b.fail_work(&fresh, "no fix").unwrap();
        assert_eq!(failed.state, WorkState::Failed);
    }

    #[test]
    fn test_list_work_newest_first() {
        let store = Store::open_in_memory().unwrap();
        let a = store.enqueue_work(1).unwrap();
        let b = store.enqueue_work(1).unwrap();

        let listed = store.list_work(10).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, b.id);
        assert_eq!(listed[1].id, a.id);
    }
}
