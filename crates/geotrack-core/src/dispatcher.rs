//! Enqueueing durable location updates.
//!
//! A [`WorkDispatcher`] turns a refresh request into a queued unit of work
//! and returns as soon as the unit is recorded. Running the unit is the
//! [`LocationWorker`](crate::LocationWorker)'s job.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::info;

use crate::error::{Error, Result};
use crate::repository::SharedStore;
use crate::retry::RetryPolicy;

/// Identifier of a queued unit of work.
pub type WorkId = i64;

/// Accepts requests to run one location update in the background.
#[async_trait]
pub trait WorkDispatcher: Send + Sync {
    /// Record a new unit of work and return its identifier.
    ///
    /// Returns once the unit is durable; does not wait for it to run.
    async fn enqueue(&self) -> Result<WorkId>;
}

/// Dispatcher backed by the store's `work_queue` table.
///
/// Each enqueue inserts an `enqueued` row carrying the retry budget, then
/// wakes the worker through a shared [`Notify`]. Rows survive restarts; a
/// worker started later picks them up.
#[derive(Debug, Clone)]
pub struct DurableDispatcher {
    store: SharedStore,
    max_attempts: u32,
    wake: Arc<Notify>,
}

impl DurableDispatcher {
    /// Create a dispatcher whose units get `policy`'s attempt budget.
    pub fn new(store: SharedStore, policy: &RetryPolicy) -> Self {
        Self {
            store,
            max_attempts: policy.budget(),
            wake: Arc::new(Notify::new()),
        }
    }

    /// The handle the worker waits on for new work.
    pub fn wake_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }

    /// Attempt budget stamped on new units.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

#[async_trait]
impl WorkDispatcher for DurableDispatcher {
    async fn enqueue(&self) -> Result<WorkId> {
        let work = {
            let store = self.store.lock().await;
            store
                .enqueue_work(self.max_attempts)
                .map_err(|e| Error::enqueue(e.to_string()))?
        };

        info!("Location update {} enqueued", work.id);
        self.wake.notify_one();
        Ok(work.id)
    }
}
