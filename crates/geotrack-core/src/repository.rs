//! Location repository: the single read/write façade over persistence and
//! background dispatch.
//!
//! The default implementation is split in two halves:
//!
//! - [`LocalDataSource`]: the shared [`Store`], used for reads and for
//!   saving acquired fixes.
//! - a [`WorkDispatcher`]: the write trigger that queues acquisitions.
//!
//! [`LocationRepository::save_location`] is the only place coordinates are
//! normalized and deduplicated.
//!
//! Observation follows writes made through the shared store immediately.
//! Commits made by another process on the same database file are picked up
//! on the next sync tick (see [`LocalDataSource::with_sync_interval`]).

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio::sync::Mutex;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::debug;

use geotrack_store::{LiveQuery, LocationQuery, Store, StoredLocation};
use geotrack_types::LocationRecord;

use crate::dispatcher::{WorkDispatcher, WorkId};
use crate::error::{Error, Result};

/// The store, shared between the repository, dispatcher and worker.
pub type SharedStore = Arc<Mutex<Store>>;

/// Live sequence of the full location list, newest first.
///
/// Every item replaces the previous one. An `Err` item ends the sequence.
pub type LocationStream = BoxStream<'static, Result<Vec<LocationRecord>>>;

/// Default interval between checks for commits from other processes.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(1);

/// Wrap a store for sharing.
pub fn share(store: Store) -> SharedStore {
    Arc::new(Mutex::new(store))
}

/// Domain-facing access to stored locations.
#[async_trait]
pub trait LocationRepository: Send + Sync {
    /// Queue one background location update. Does not wait for it to run.
    async fn request_location_update(&self) -> Result<WorkId>;

    /// Live list of stored locations, newest first.
    async fn observe_locations(&self) -> LocationStream;

    /// Persist a fix, deduplicating by normalized coordinate.
    ///
    /// Returns the stored form: normalized coordinates and the identifier
    /// of the row that now holds the point.
    async fn save_location(&self, record: LocationRecord) -> Result<LocationRecord>;
}

/// Local persistence half of the repository.
#[derive(Debug, Clone)]
pub struct LocalDataSource {
    store: SharedStore,
    sync_interval: Duration,
}

impl LocalDataSource {
    /// Wrap a shared store.
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            sync_interval: DEFAULT_SYNC_INTERVAL,
        }
    }

    /// Set how often observers check for commits from other processes.
    #[must_use]
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// The underlying shared store.
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Subscribe to the live location table.
    pub async fn observe_all(&self) -> LiveQuery {
        self.store.lock().await.observe_all()
    }

    /// Live location list that also follows other processes' commits.
    ///
    /// Yields the current table first. The stream ends once the store is
    /// dropped, and after an `Err` item if a sync check fails.
    pub async fn observe(&self) -> LocationStream {
        let query = self.observe_all().await;
        let mut ticker = tokio::time::interval(self.sync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let store = Arc::downgrade(&self.store);

        stream::unfold(Some((query, ticker, store)), |state| async move {
            let (mut query, mut ticker, store): (LiveQuery, Interval, Weak<Mutex<Store>>) = state?;
            loop {
                tokio::select! {
                    snapshot = query.next() => {
                        let records: Vec<LocationRecord> = snapshot?.iter().map(StoredLocation::to_record).collect();
                        return Some((Ok(records), Some((query, ticker, store))));
                    }
                    _ = ticker.tick() => {
                        let shared = store.upgrade()?;
                        let synced = shared.lock().await.sync_external_changes();
                        if let Err(e) = synced {
                            return Some((Err(Error::from(e)), None));
                        }
                    }
                }
            }
        })
        .boxed()
    }

    /// Normalize `record` and upsert it by coordinate.
    ///
    /// The lookup and the write run under one lock, so two saves of the same
    /// normalized coordinate can never both insert.
    pub async fn save(&self, record: &LocationRecord) -> Result<StoredLocation> {
        let normalized = record.normalized();
        let store = self.store.lock().await;

        let target = match store.find_by_exact_coordinate(normalized.latitude, normalized.longitude)? {
            Some(existing) => {
                debug!(
                    "Coordinate {},{} already stored as {}; refreshing timestamp",
                    existing.latitude, existing.longitude, existing.id
                );
                LocationRecord {
                    timestamp: normalized.timestamp,
                    ..existing.to_record()
                }
            }
            None => normalized,
        };

        Ok(store.upsert(&target)?)
    }

    /// One-shot query over stored locations.
    pub async fn list(&self, query: &LocationQuery) -> Result<Vec<StoredLocation>> {
        Ok(self.store.lock().await.list_locations(query)?)
    }

    /// Remove every stored location.
    pub async fn clear_all(&self) -> Result<usize> {
        Ok(self.store.lock().await.clear_all()?)
    }
}

/// Repository composed of a [`LocalDataSource`] and a [`WorkDispatcher`].
#[derive(Clone)]
pub struct DefaultLocationRepository {
    local: LocalDataSource,
    dispatcher: Arc<dyn WorkDispatcher>,
}

impl std::fmt::Debug for DefaultLocationRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultLocationRepository")
            .field("local", &self.local)
            .finish_non_exhaustive()
    }
}

impl DefaultLocationRepository {
    /// Compose a repository.
    pub fn new(local: LocalDataSource, dispatcher: Arc<dyn WorkDispatcher>) -> Self {
        Self { local, dispatcher }
    }

    /// The local half.
    pub fn local(&self) -> &LocalDataSource {
        &self.local
    }
}

#[async_trait]
impl LocationRepository for DefaultLocationRepository {
    async fn request_location_update(&self) -> Result<WorkId> {
        self.dispatcher.enqueue().await
    }

    async fn observe_locations(&self) -> LocationStream {
        self.local.observe().await
    }

    async fn save_location(&self, record: LocationRecord) -> Result<LocationRecord> {
        let stored = self.local.save(&record).await?;
        debug!("Saved location {} (timestamp {})", stored.id, stored.timestamp);
        Ok(stored.to_record())
    }
}
