//! Background worker that runs queued location updates.
//!
//! Each unit of work moves through
//!
//! ```text
//! Enqueued -> Running -> Succeeded
//!                     -> Retrying -> Running ...
//!                     -> Failed
//! ```
//!
//! One attempt asks the [`LocationProvider`] for a fix and hands it to
//! [`LocationRepository::save_location`]. Only
//! [`AcquisitionOutcome::TransientUnavailable`] is retried, and only while
//! the unit has attempts left. Permission denial, provider errors and save
//! failures fail the unit at once.
//!
//! Claiming a unit takes a lease on it for [`WorkerConfig::lease`]. Workers
//! in other processes sharing the database leave a leased unit alone, and
//! only take it over once the lease has run out. A worker whose lease was
//! taken over does not record its outcome.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use geotrack_store::StoredWork;
use geotrack_types::{LocationRecord, now_millis};

use crate::dispatcher::WorkId;
use crate::error::{Error, Result};
use crate::provider::{AcquisitionOutcome, LocationProvider};
use crate::repository::{LocationRepository, SharedStore};
use crate::retry::RetryPolicy;

/// Default interval between queue polls when nothing wakes the worker.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default time a claimed unit stays reserved for the claiming worker.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(120);

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Configuration for the location worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Upper bound on how long the worker sleeps between queue checks.
    pub poll_interval: Duration,
    /// Backoff used to schedule retries.
    pub retry: RetryPolicy,
    /// How long a claimed unit is reserved. Should comfortably exceed one
    /// provider call.
    pub lease: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry: RetryPolicy::default(),
            lease: DEFAULT_LEASE,
        }
    }
}

impl WorkerConfig {
    /// Set the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the claim lease.
    #[must_use]
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }
}

/// Event emitted by the location worker.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// Worker loop started.
    WorkerStarted,
    /// An attempt began.
    WorkStarted { work_id: WorkId, attempt: u32 },
    /// A fix was saved.
    WorkSucceeded {
        work_id: WorkId,
        location: LocationRecord,
    },
    /// The attempt found no fix and will run again at `next_run_at`.
    WorkRetrying {
        work_id: WorkId,
        attempt: u32,
        next_run_at: i64,
        reason: String,
    },
    /// The unit gave up.
    WorkFailed { work_id: WorkId, error: String },
    /// Worker loop stopped.
    WorkerStopped,
}

/// What a single attempt did to its unit of work.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkOutcome {
    /// The fix was saved; the unit is done.
    Succeeded(LocationRecord),
    /// The unit will run again at `next_run_at`.
    Retrying { next_run_at: i64, reason: String },
    /// The unit is done without a fix.
    Failed(String),
}

/// Runs queued location updates.
pub struct LocationWorker {
    store: SharedStore,
    provider: Arc<dyn LocationProvider>,
    repository: Arc<dyn LocationRepository>,
    config: WorkerConfig,
    wake: Arc<Notify>,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl std::fmt::Debug for LocationWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationWorker")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LocationWorker {
    /// Create a worker.
    ///
    /// `wake` should be the dispatcher's
    /// [`wake_handle`](crate::DurableDispatcher::wake_handle) so new work is
    /// picked up without waiting for the next poll.
    pub fn new(
        store: SharedStore,
        provider: Arc<dyn LocationProvider>,
        repository: Arc<dyn LocationRepository>,
        wake: Arc<Notify>,
        config: WorkerConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            provider,
            repository,
            config,
            wake,
            event_tx,
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// The worker configuration.
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Requeue units whose claiming worker went away without finishing.
    ///
    /// Only units with an expired lease are touched, so attempts still in
    /// flight in another process are left alone.
    pub async fn recover(&self) -> Result<usize> {
        Ok(self
            .store
            .lock()
            .await
            .recover_interrupted_work(now_millis())?)
    }

    /// Run every unit that is due now, including retries that come due
    /// while draining. Returns the number of attempts made.
    pub async fn run_pending(&self) -> Result<usize> {
        self.run_pending_until(&CancellationToken::new()).await
    }

    /// Like [`run_pending`](Self::run_pending), stopping between attempts
    /// once `cancel` fires.
    pub async fn run_pending_until(&self, cancel: &CancellationToken) -> Result<usize> {
        let mut attempts = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let claimed = self
                .store
                .lock()
                .await
                .claim_next_work(now_millis(), self.config.lease)?;
            let Some(work) = claimed else {
                break;
            };

            self.process(work).await?;
            attempts += 1;
        }

        Ok(attempts)
    }

    /// Run one claimed unit and record its new state.
    #[instrument(skip(self, work), fields(work_id = work.id, attempt = work.attempts))]
    pub async fn process(&self, work: StoredWork) -> Result<WorkOutcome> {
        let start = Instant::now();
        let _ = self.event_tx.send(WorkerEvent::WorkStarted {
            work_id: work.id,
            attempt: work.attempts,
        });

        let outcome = self.provider.current_location().await;
        debug!("{} answered: {}", self.provider.name(), outcome);

        let result = match outcome {
            AcquisitionOutcome::Success(fix) => {
                match self.repository.save_location(fix.to_record(now_millis())).await {
                    Ok(saved) => WorkOutcome::Succeeded(saved),
                    Err(e) => WorkOutcome::Failed(format!("failed to save location: {}", e)),
                }
            }
            AcquisitionOutcome::TransientUnavailable(reason) if work.has_attempts_left() => {
                WorkOutcome::Retrying {
                    next_run_at: self.config.retry.next_run_at(now_millis(), work.attempts),
                    reason,
                }
            }
            AcquisitionOutcome::TransientUnavailable(reason) => WorkOutcome::Failed(format!(
                "no fix after {} attempts: {}",
                work.attempts, reason
            )),
            AcquisitionOutcome::PermissionDenied => {
                WorkOutcome::Failed("location permission denied".to_string())
            }
            AcquisitionOutcome::Error(message) => WorkOutcome::Failed(message),
        };

        if !self.record(&work, &result).await? {
            return Ok(result);
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        match &result {
            WorkOutcome::Succeeded(location) => {
                info!(
                    elapsed_ms,
                    "Location update {} saved {},{} as {}",
                    work.id,
                    location.latitude,
                    location.longitude,
                    location.id
                );
                let _ = self.event_tx.send(WorkerEvent::WorkSucceeded {
                    work_id: work.id,
                    location: *location,
                });
            }
            WorkOutcome::Retrying {
                next_run_at,
                reason,
            } => {
                warn!(
                    "Location update {} attempt {}/{} found no fix ({}), retrying",
                    work.id, work.attempts, work.max_attempts, reason
                );
                let _ = self.event_tx.send(WorkerEvent::WorkRetrying {
                    work_id: work.id,
                    attempt: work.attempts,
                    next_run_at: *next_run_at,
                    reason: reason.clone(),
                });
            }
            WorkOutcome::Failed(message) => {
                error!(elapsed_ms, "Location update {} failed: {}", work.id, message);
                let _ = self.event_tx.send(WorkerEvent::WorkFailed {
                    work_id: work.id,
                    error: message.clone(),
                });
            }
        }

        Ok(result)
    }

    /// Store the outcome. Returns `false` if the unit was taken over by
    /// another worker in the meantime.
    async fn record(&self, work: &StoredWork, result: &WorkOutcome) -> Result<bool> {
        let store = self.store.lock().await;
        let recorded = match result {
            WorkOutcome::Succeeded(location) => store.complete_work(work, location.id),
            WorkOutcome::Retrying {
                next_run_at,
                reason,
            } => store.retry_work(work, *next_run_at, reason),
            WorkOutcome::Failed(message) => store.fail_work(work, message),
        };

        match recorded {
            Ok(_) => Ok(true),
            Err(geotrack_store::Error::LeaseLost(id)) => {
                warn!("Lease on location update {} expired mid-attempt, dropping outcome", id);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Start the worker loop on a new task.
    pub fn start(self: Arc<Self>) -> WorkerHandle {
        let cancel = CancellationToken::new();
        let event_tx = self.event_tx.clone();
        let task = tokio::spawn(Arc::clone(&self).run(cancel.clone()));

        WorkerHandle {
            cancel,
            task,
            event_tx,
        }
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        match self.recover().await {
            Ok(0) => {}
            Ok(n) => info!("Requeued {} interrupted location update(s)", n),
            Err(e) => error!("Failed to recover interrupted work: {}", e),
        }

        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            provider = self.provider.name(),
            "Location worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        loop {
            let drained = tokio::select! {
                _ = cancel.cancelled() => break,
                drained = self.run_pending_until(&cancel) => drained,
            };

            match drained {
                Ok(0) => {}
                Ok(n) => debug!("Ran {} location update attempt(s)", n),
                Err(Error::Cancelled) => break,
                Err(e) => error!("Location worker error: {}", e),
            }

            let wait = self.next_wait().await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.wake.notified() => {}
                _ = sleep(wait) => {}
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Location worker stopped");
    }

    /// Sleep until the next retry is due, capped at the poll interval.
    async fn next_wait(&self) -> Duration {
        let due = match self.store.lock().await.next_due_at() {
            Ok(due) => due,
            Err(e) => {
                warn!("Failed to read queue: {}", e);
                None
            }
        };

        match due {
            Some(at) => {
                let ms = at.saturating_sub(now_millis()).max(0) as u64;
                Duration::from_millis(ms).min(self.config.poll_interval)
            }
            None => self.config.poll_interval,
        }
    }
}

/// Handle for controlling a running worker.
#[derive(Debug)]
pub struct WorkerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl WorkerHandle {
    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Whether the worker loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the worker and wait for the loop to exit.
    ///
    /// An attempt in progress is abandoned; its unit stays `running` until
    /// its lease runs out and another worker takes it over.
    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        self.task.await.map_err(|_| Error::Cancelled)
    }
}
