//! Wiring of store, dispatcher, repository, worker and use cases.

use std::sync::Arc;

use geotrack_store::Store;

use crate::dispatcher::DurableDispatcher;
use crate::provider::LocationProvider;
use crate::repository::{
    DEFAULT_SYNC_INTERVAL, DefaultLocationRepository, LocalDataSource, LocationRepository,
    SharedStore, share,
};
use crate::usecase::{ObserveLocationsUseCase, RequestLocationUpdateUseCase};
use crate::viewmodel::LocationViewModel;
use crate::worker::{LocationWorker, WorkerConfig};

/// A fully wired location pipeline over one store.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use geotrack_core::{MockProvider, Tracker, WorkerConfig, RetryPolicy};
/// use geotrack_store::Store;
///
/// # async fn example() -> Result<(), geotrack_core::Error> {
/// let tracker = Tracker::new(
///     Store::open_in_memory()?,
///     Arc::new(MockProvider::new(37.5665, 126.978)),
///     WorkerConfig::default().with_retry(RetryPolicy::immediate(3)),
/// );
///
/// tracker.request_update().execute().await?;
/// tracker.worker().run_pending().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Tracker {
    store: SharedStore,
    dispatcher: DurableDispatcher,
    repository: Arc<DefaultLocationRepository>,
    worker: Arc<LocationWorker>,
}

impl Tracker {
    /// Wire a pipeline around `store`, acquiring fixes from `provider`.
    ///
    /// Observers check for other processes' commits at the worker's poll
    /// interval, at least once a second.
    pub fn new(store: Store, provider: Arc<dyn LocationProvider>, config: WorkerConfig) -> Self {
        let store = share(store);
        let dispatcher = DurableDispatcher::new(store.clone(), &config.retry);
        let local = LocalDataSource::new(store.clone())
            .with_sync_interval(config.poll_interval.min(DEFAULT_SYNC_INTERVAL));
        let repository = Arc::new(DefaultLocationRepository::new(
            local,
            Arc::new(dispatcher.clone()),
        ));
        let worker = Arc::new(LocationWorker::new(
            store.clone(),
            provider,
            repository.clone(),
            dispatcher.wake_handle(),
            config,
        ));

        Self {
            store,
            dispatcher,
            repository,
            worker,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn dispatcher(&self) -> &DurableDispatcher {
        &self.dispatcher
    }

    pub fn repository(&self) -> Arc<dyn LocationRepository> {
        self.repository.clone()
    }

    pub fn local(&self) -> &LocalDataSource {
        self.repository.local()
    }

    pub fn worker(&self) -> &Arc<LocationWorker> {
        &self.worker
    }

    pub fn observe_locations(&self) -> ObserveLocationsUseCase {
        ObserveLocationsUseCase::new(self.repository())
    }

    pub fn request_update(&self) -> RequestLocationUpdateUseCase {
        RequestLocationUpdateUseCase::new(self.repository())
    }

    /// A new, not yet started, view model over this pipeline.
    pub fn view_model(&self) -> LocationViewModel {
        LocationViewModel::new(self.observe_locations(), self.request_update())
    }
}
