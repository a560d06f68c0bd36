//! Location acquisition strategies.
//!
//! A [`LocationProvider`] answers "where is the device right now?" with an
//! [`AcquisitionOutcome`]. The outcome keeps the cause of a missing fix, so
//! the worker can tell "may succeed on retry" from "will never succeed
//! without user action".
//!
//! Implementations in this crate:
//!
//! | Provider | Source |
//! |----------|--------|
//! | [`MockProvider`](crate::MockProvider) | Scripted outcomes for tests and demos |
//! | [`LastKnownProvider`] | The most recent fix seen by a [`FusedProvider`] |
//! | [`FusedProvider`] | An ordered chain of providers, each under a timeout |
//! | `HttpProvider` | A JSON geolocation endpoint (feature `http`) |

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use geotrack_types::{Location, now_millis};

/// Result of a single acquisition attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionOutcome {
    /// A position fix was obtained.
    Success(Location),
    /// The user has not granted location access. Retrying will not help.
    PermissionDenied,
    /// No fix right now (no signal, timeout, source busy). May succeed later.
    TransientUnavailable(String),
    /// The provider failed unexpectedly.
    Error(String),
}

impl AcquisitionOutcome {
    /// Shorthand for a transient outcome.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::TransientUnavailable(reason.into())
    }

    /// Shorthand for an error outcome.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    /// The fix, if the attempt succeeded.
    pub fn location(&self) -> Option<&Location> {
        match self {
            Self::Success(location) => Some(location),
            _ => None,
        }
    }

    /// Whether the attempt produced a fix.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Whether a later attempt might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientUnavailable(_))
    }
}

impl fmt::Display for AcquisitionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(location) => {
                write!(f, "fix at {},{}", location.latitude, location.longitude)
            }
            Self::PermissionDenied => write!(f, "location permission denied"),
            Self::TransientUnavailable(reason) => write!(f, "location unavailable: {}", reason),
            Self::Error(message) => write!(f, "location error: {}", message),
        }
    }
}

/// A source of current position fixes.
///
/// # Example
///
/// ```
/// use geotrack_core::{AcquisitionOutcome, LocationProvider, MockProvider};
///
/// # async fn example() {
/// let provider = MockProvider::new(37.5665, 126.9780);
/// if let AcquisitionOutcome::Success(fix) = provider.current_location().await {
///     println!("{} says {},{}", provider.name(), fix.latitude, fix.longitude);
/// }
/// # }
/// ```
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Try to obtain the current position.
    async fn current_location(&self) -> AcquisitionOutcome;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// Shared slot holding the most recent successful fix.
#[derive(Debug, Clone, Default)]
pub struct LastKnownCache {
    inner: Arc<RwLock<Option<Location>>>,
}

impl LastKnownCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache already holding `location`, e.g. the newest stored
    /// point from a previous run.
    pub fn seeded(location: Location) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(location))),
        }
    }

    /// Remember a fix.
    pub async fn record(&self, location: Location) {
        *self.inner.write().await = Some(location);
    }

    /// The most recent fix, if any.
    pub async fn get(&self) -> Option<Location> {
        *self.inner.read().await
    }

    /// Forget the cached fix.
    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }
}

/// Returns the last fix recorded in a [`LastKnownCache`].
#[derive(Debug, Clone)]
pub struct LastKnownProvider {
    cache: LastKnownCache,
    max_age: Option<Duration>,
}

impl LastKnownProvider {
    /// Serve whatever the cache holds, regardless of age.
    pub fn new(cache: LastKnownCache) -> Self {
        Self {
            cache,
            max_age: None,
        }
    }

    /// Treat fixes older than `max_age` as unavailable.
    #[must_use]
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }
}

#[async_trait]
impl LocationProvider for LastKnownProvider {
    async fn current_location(&self) -> AcquisitionOutcome {
        let Some(location) = self.cache.get().await else {
            return AcquisitionOutcome::unavailable("no last known fix");
        };

        if let Some(max_age) = self.max_age {
            let age_ms = now_millis().saturating_sub(location.captured_at);
            if age_ms > i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX) {
                return AcquisitionOutcome::unavailable(format!(
                    "last known fix is {}s old",
                    age_ms / 1000
                ));
            }
        }

        AcquisitionOutcome::Success(location)
    }

    fn name(&self) -> &str {
        "last-known"
    }
}

/// Tries an ordered chain of providers and returns the first fix.
///
/// Each provider is given `timeout` to answer; a timeout counts as a
/// transient failure. A successful fix is written to the shared
/// [`LastKnownCache`]. When every provider fails, the combined outcome is
/// `TransientUnavailable` if any failure was transient, otherwise `Error` if
/// any provider errored, otherwise `PermissionDenied`.
pub struct FusedProvider {
    chain: Vec<Arc<dyn LocationProvider>>,
    timeout: Duration,
    cache: LastKnownCache,
}

impl fmt::Debug for FusedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.chain.iter().map(|p| p.name()).collect();
        f.debug_struct("FusedProvider")
            .field("chain", &names)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl FusedProvider {
    /// Create an empty chain.
    pub fn new(cache: LastKnownCache, timeout: Duration) -> Self {
        Self {
            chain: Vec::new(),
            timeout,
            cache,
        }
    }

    /// Append a provider to the chain.
    #[must_use]
    pub fn with(mut self, provider: Arc<dyn LocationProvider>) -> Self {
        self.chain.push(provider);
        self
    }

    /// Number of providers in the chain.
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// The cache this provider records successful fixes into.
    pub fn cache(&self) -> &LastKnownCache {
        &self.cache
    }
}

#[async_trait]
impl LocationProvider for FusedProvider {
    async fn current_location(&self) -> AcquisitionOutcome {
        if self.chain.is_empty() {
            return AcquisitionOutcome::error("no location providers configured");
        }

        let mut transient: Option<String> = None;
        let mut error: Option<String> = None;

        for provider in &self.chain {
            let outcome = match tokio::time::timeout(self.timeout, provider.current_location()).await
            {
                Ok(outcome) => outcome,
                Err(_) => AcquisitionOutcome::unavailable(format!(
                    "{} timed out after {:?}",
                    provider.name(),
                    self.timeout
                )),
            };

            match outcome {
                AcquisitionOutcome::Success(location) => {
                    debug!("{} produced a fix", provider.name());
                    self.cache.record(location).await;
                    return AcquisitionOutcome::Success(location);
                }
                AcquisitionOutcome::TransientUnavailable(reason) => {
                    debug!("{} unavailable: {}", provider.name(), reason);
                    transient.get_or_insert(reason);
                }
                AcquisitionOutcome::Error(message) => {
                    warn!("{} failed: {}", provider.name(), message);
                    error.get_or_insert(message);
                }
                AcquisitionOutcome::PermissionDenied => {
                    debug!("{} reports permission denied", provider.name());
                }
            }
        }

        match (transient, error) {
            (Some(reason), _) => AcquisitionOutcome::TransientUnavailable(reason),
            (None, Some(message)) => AcquisitionOutcome::Error(message),
            (None, None) => AcquisitionOutcome::PermissionDenied,
        }
    }

    fn name(&self) -> &str {
        "fused"
    }
}
