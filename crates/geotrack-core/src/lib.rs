//! Location acquisition pipeline for geotrack.
//!
//! This crate turns "refresh my location" into a durable background job,
//! stores the resulting fix deduplicated by normalized coordinate, and
//! exposes the stored points as a live view-model state.
//!
//! # Pipeline
//!
//! ```text
//! intent -> LocationViewModel -> RequestLocationUpdateUseCase
//!        -> LocationRepository -> DurableDispatcher (work_queue row)
//!        -> LocationWorker -> LocationProvider -> save_location (normalize + upsert)
//!        -> Store live query -> ObserveLocationsUseCase -> LocationViewModel -> UI
//! ```
//!
//! # Features
//!
//! - **Tagged acquisition outcomes**: permission denial fails fast, missing
//!   fixes are retried with backoff
//! - **Durable queue**: queued updates survive restarts
//! - **Pluggable providers**: mock, last-known, fused chain, HTTP (feature `http`)
//! - **Live state**: `watch`-based UI snapshots
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use geotrack_core::{MockProvider, Tracker, WorkerConfig};
//! use geotrack_store::Store;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tracker = Tracker::new(
//!         Store::open_default()?,
//!         Arc::new(MockProvider::new(37.5665, 126.9780)),
//!         WorkerConfig::default(),
//!     );
//!     let worker = Arc::clone(tracker.worker()).start();
//!
//!     let mut vm = tracker.view_model();
//!     vm.start().await;
//!     vm.request_refresh().await;
//!
//!     let mut state = vm.subscribe();
//!     state.changed().await?;
//!     println!("{} stored locations", state.borrow().locations.len());
//!
//!     worker.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod dispatcher;
pub mod error;
#[cfg(feature = "http")]
pub mod http;
pub mod mock;
pub mod preview;
pub mod provider;
pub mod repository;
pub mod retry;
pub mod tracker;
pub mod usecase;
pub mod viewmodel;
pub mod worker;

pub use dispatcher::{DurableDispatcher, WorkDispatcher, WorkId};
pub use error::{Error, Result};
pub use mock::{MockProvider, MockProviderBuilder};
pub use preview::StreetViewPreview;
pub use provider::{
    AcquisitionOutcome, FusedProvider, LastKnownCache, LastKnownProvider, LocationProvider,
};
pub use repository::{
    DEFAULT_SYNC_INTERVAL, DefaultLocationRepository, LocalDataSource, LocationRepository,
    LocationStream, SharedStore, share,
};
pub use retry::RetryPolicy;
pub use tracker::Tracker;
pub use usecase::{ObserveLocationsUseCase, RequestLocationUpdateUseCase};
pub use viewmodel::{LocationUiModel, LocationViewModel, MapPosition, UiIntent, UiState};
pub use worker::{LocationWorker, WorkOutcome, WorkerConfig, WorkerEvent, WorkerHandle};

// Re-export from geotrack-types
pub use geotrack_types::{Coordinate, Location, LocationRecord, normalize, normalize_pair};
