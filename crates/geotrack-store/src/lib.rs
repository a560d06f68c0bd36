//! Local persistence for geotrack location points.
//!
//! This crate provides SQLite-based storage for the location history and
//! for the durable background work queue that drives acquisition.
//!
//! # Features
//!
//! - One row per normalized coordinate pair, ordered newest first
//! - Live observation of the whole table via [`Store::observe_all`]
//! - Exact-coordinate lookup for deduplication
//! - A persistent, leased work queue that survives process restarts
//! - Pickup of commits made by other processes via [`Store::sync_external_changes`]
//! - CSV and JSON export
//!
//! # Example
//!
//! ```no_run
//! use geotrack_store::{Store, LocationQuery};
//!
//! let store = Store::open_default()?;
//!
//! // Ten most recent locations
//! let locations = store.list_locations(&LocationQuery::new().limit(10))?;
//! # Ok::<(), geotrack_store::Error>(())
//! ```

mod error;
mod live;
mod models;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use live::{LiveQuery, Snapshot};
pub use models::{StoredLocation, StoredWork, WorkState};
pub use queries::LocationQuery;
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/geotrack/locations.db`
/// - macOS: `~/Library/Application Support/geotrack/locations.db`
/// - Windows: `C:\Users\<user>\AppData\Local\geotrack\locations.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("geotrack")
        .join("locations.db")
}
