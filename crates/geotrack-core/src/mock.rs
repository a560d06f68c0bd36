//! Mock location provider for testing.
//!
//! This module provides a scripted provider that can be used for unit
//! testing and demos without any positioning hardware or network.
//!
//! The [`MockProvider`] implements the [`LocationProvider`] trait, allowing it
//! to be used interchangeably with real providers in generic code.
//!
//! # Features
//!
//! - **Scripted outcomes**: Queue exact outcomes for the next calls
//! - **Fallback outcome**: Returned once the script is exhausted
//! - **Latency simulation**: Add artificial delays to simulate a slow fix
//! - **Call counting**: Assert how many acquisitions were attempted

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use geotrack_types::{Location, now_millis};

use crate::provider::{AcquisitionOutcome, LocationProvider};

/// What the mock answers once its script is empty.
#[derive(Debug, Clone, PartialEq)]
enum Fallback {
    /// A fresh fix at these coordinates, stamped at call time.
    Fixed {
        latitude: f64,
        longitude: f64,
        accuracy_m: Option<f64>,
    },
    /// A fixed outcome.
    Outcome(AcquisitionOutcome),
}

/// A mock location provider for testing.
///
/// # Example
///
/// ```
/// use geotrack_core::{AcquisitionOutcome, LocationProvider, MockProvider};
///
/// #[tokio::main]
/// async fn main() {
///     let provider = MockProvider::new(37.5665, 126.9780);
///     provider.push_outcome(AcquisitionOutcome::unavailable("warming up")).await;
///
///     assert!(provider.current_location().await.is_retryable());
///     assert!(provider.current_location().await.is_success());
///     assert_eq!(provider.call_count(), 2);
/// }
/// ```
pub struct MockProvider {
    name: String,
    script: Mutex<VecDeque<AcquisitionOutcome>>,
    fallback: Mutex<Fallback>,
    call_count: AtomicU32,
    /// Simulated acquisition latency in milliseconds (0 = no delay).
    latency_ms: AtomicU64,
}

impl std::fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockProvider")
            .field("name", &self.name)
            .field("call_count", &self.call_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl MockProvider {
    /// A provider that always returns a fix at the given coordinates.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self::with_fallback(Fallback::Fixed {
            latitude,
            longitude,
            accuracy_m: None,
        })
    }

    /// A provider that always reports missing permission.
    pub fn denied() -> Self {
        Self::with_fallback(Fallback::Outcome(AcquisitionOutcome::PermissionDenied))
    }

    /// A provider that never has a fix.
    pub fn unavailable(reason: &str) -> Self {
        Self::with_fallback(Fallback::Outcome(AcquisitionOutcome::unavailable(reason)))
    }

    /// A provider that always errors.
    pub fn failing(message: &str) -> Self {
        Self::with_fallback(Fallback::Outcome(AcquisitionOutcome::error(message)))
    }

    fn with_fallback(fallback: Fallback) -> Self {
        Self {
            name: "mock".to_string(),
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(fallback),
            call_count: AtomicU32::new(0),
            latency_ms: AtomicU64::new(0),
        }
    }

    // --- Test control methods ---

    /// Queue an outcome for the next unscripted call.
    pub async fn push_outcome(&self, outcome: AcquisitionOutcome) {
        self.script.lock().await.push_back(outcome);
    }

    /// Queue several outcomes, returned in order.
    pub async fn push_outcomes(&self, outcomes: impl IntoIterator<Item = AcquisitionOutcome>) {
        self.script.lock().await.extend(outcomes);
    }

    /// Number of scripted outcomes not yet returned.
    pub async fn remaining_scripted(&self) -> usize {
        self.script.lock().await.len()
    }

    /// Answer with a fresh fix at these coordinates once the script is empty.
    pub async fn set_location(&self, latitude: f64, longitude: f64) {
        *self.fallback.lock().await = Fallback::Fixed {
            latitude,
            longitude,
            accuracy_m: None,
        };
    }

    /// Answer with this outcome once the script is empty.
    pub async fn set_fallback(&self, outcome: AcquisitionOutcome) {
        *self.fallback.lock().await = Fallback::Outcome(outcome);
    }

    /// Get the number of acquisitions performed.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Reset call count.
    pub fn reset_call_count(&self) {
        self.call_count.store(0, Ordering::Relaxed);
    }

    /// Set simulated acquisition latency.
    ///
    /// Set to `Duration::ZERO` to disable latency simulation.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }
}

#[async_trait]
impl LocationProvider for MockProvider {
    async fn current_location(&self) -> AcquisitionOutcome {
        self.call_count.fetch_add(1, Ordering::Relaxed);

        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if let Some(outcome) = self.script.lock().await.pop_front() {
            return outcome;
        }

        match &*self.fallback.lock().await {
            Fallback::Fixed {
                latitude,
                longitude,
                accuracy_m,
            } => {
                let mut location = Location::new(*latitude, *longitude, now_millis());
                location.accuracy_m = *accuracy_m;
                AcquisitionOutcome::Success(location)
            }
            Fallback::Outcome(outcome) => outcome.clone(),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Builder for creating mock providers with custom settings.
#[derive(Debug)]
pub struct MockProviderBuilder {
    name: String,
    latitude: f64,
    longitude: f64,
    accuracy_m: Option<f64>,
    fallback: Option<AcquisitionOutcome>,
    script: Vec<AcquisitionOutcome>,
    latency: Duration,
}

impl Default for MockProviderBuilder {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            latitude: 37.5665,
            longitude: 126.978,
            accuracy_m: None,
            fallback: None,
            script: Vec::new(),
            latency: Duration::ZERO,
        }
    }
}

impl MockProviderBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the provider name.
    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Set the coordinates of the fallback fix.
    #[must_use]
    pub fn location(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = latitude;
        self.longitude = longitude;
        self
    }

    /// Set the accuracy reported with the fallback fix.
    #[must_use]
    pub fn accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = Some(accuracy_m);
        self
    }

    /// Replace the fallback fix with a fixed outcome.
    #[must_use]
    pub fn fallback(mut self, outcome: AcquisitionOutcome) -> Self {
        self.fallback = Some(outcome);
        self
    }

    /// Queue an outcome ahead of the fallback.
    #[must_use]
    pub fn then(mut self, outcome: AcquisitionOutcome) -> Self {
        self.script.push(outcome);
        self
    }

    /// Set simulated acquisition latency.
    #[must_use]
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Build the mock provider.
    #[must_use]
    pub fn build(self) -> MockProvider {
        let fallback = match self.fallback {
            Some(outcome) => Fallback::Outcome(outcome),
            None => Fallback::Fixed {
                latitude: self.latitude,
                longitude: self.longitude,
                accuracy_m: self.accuracy_m,
            },
        };

        let provider = MockProvider::with_fallback(fallback);
        provider.set_latency(self.latency);
        MockProvider {
            name: self.name,
            script: Mutex::new(self.script.into()),
            ..provider
        }
    }
}
