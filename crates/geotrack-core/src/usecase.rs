//! Use cases exposed to the presentation layer.

use std::sync::Arc;

use crate::dispatcher::WorkId;
use crate::error::Result;
use crate::repository::{LocationRepository, LocationStream};

/// Observe the stored location list.
#[derive(Clone)]
pub struct ObserveLocationsUseCase {
    repository: Arc<dyn LocationRepository>,
}

impl ObserveLocationsUseCase {
    pub fn new(repository: Arc<dyn LocationRepository>) -> Self {
        Self { repository }
    }

    pub async fn execute(&self) -> LocationStream {
        self.repository.observe_locations().await
    }
}

/// Ask for a background location refresh.
#[derive(Clone)]
pub struct RequestLocationUpdateUseCase {
    repository: Arc<dyn LocationRepository>,
}

impl RequestLocationUpdateUseCase {
    pub fn new(repository: Arc<dyn LocationRepository>) -> Self {
        Self { repository }
    }

    /// Returns once the update is queued.
    pub async fn execute(&self) -> Result<WorkId> {
        self.repository.request_location_update().await
    }
}
