//! Location provider backed by an HTTP geolocation endpoint.
//!
//! The endpoint is queried with a plain `GET` and must answer with a JSON
//! object such as:
//!
//! ```json
//! { "latitude": 37.5665, "longitude": 126.978, "accuracy": 25.0 }
//! ```
//!
//! `lat` / `lon` (or `lng`) are accepted as aliases.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use geotrack_core::http::HttpProvider;
//! use geotrack_core::LocationProvider;
//!
//! # async fn example() -> Result<(), geotrack_core::Error> {
//! let provider = HttpProvider::new("https://geo.example.com/v1/locate", Duration::from_secs(10))?;
//! let outcome = provider.current_location().await;
//! println!("{}", outcome);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use geotrack_types::{Coordinate, Location, now_millis};

use crate::error::{Error, Result};
use crate::provider::{AcquisitionOutcome, LocationProvider};

/// JSON body returned by the geolocation endpoint.
#[derive(Debug, Clone, Deserialize)]
struct GeoFix {
    #[serde(alias = "lat")]
    latitude: f64,
    #[serde(alias = "lon", alias = "lng")]
    longitude: f64,
    #[serde(default)]
    accuracy: Option<f64>,
}

/// Fetches the current position from a JSON endpoint.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    client: Client,
    endpoint: String,
}

impl HttpProvider {
    /// Create a provider for `endpoint` with a per-request timeout.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Self::with_client(endpoint, client)
    }

    /// Create a provider with a custom reqwest Client.
    pub fn with_client(endpoint: &str, client: Client) -> Result<Self> {
        let endpoint = endpoint.trim().to_string();

        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(Error::invalid_config(format!(
                "endpoint must start with http:// or https://, got: {}",
                endpoint
            )));
        }

        Ok(Self { client, endpoint })
    }

    /// The configured endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LocationProvider for HttpProvider {
    async fn current_location(&self) -> AcquisitionOutcome {
        let response = match self.client.get(&self.endpoint).send().await {
            Ok(response) => response,
            Err(e) => return classify_transport_error(&e),
        };

        let status = response.status();
        if let Some(outcome) = classify_status(status) {
            debug!("Geolocation endpoint answered {}", status);
            return outcome;
        }

        match response.bytes().await {
            Ok(body) => parse_fix(&body, now_millis()),
            Err(e) => classify_transport_error(&e),
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

fn classify_transport_error(error: &reqwest::Error) -> AcquisitionOutcome {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        AcquisitionOutcome::unavailable(error.to_string())
    } else {
        AcquisitionOutcome::error(error.to_string())
    }
}

/// Map a non-success status to an outcome. `None` means "read the body".
fn classify_status(status: StatusCode) -> Option<AcquisitionOutcome> {
    if status.is_success() {
        return None;
    }

    let outcome = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AcquisitionOutcome::PermissionDenied,
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
            AcquisitionOutcome::unavailable(format!("endpoint returned {}", status))
        }
        s if s.is_server_error() => {
            AcquisitionOutcome::unavailable(format!("endpoint returned {}", status))
        }
        s => AcquisitionOutcome::error(format!("endpoint returned {}", s)),
    };
    Some(outcome)
}

/// Decode and validate a fix from a response body.
fn parse_fix(body: &[u8], captured_at: i64) -> AcquisitionOutcome {
    let fix: GeoFix = match serde_json::from_slice(body) {
        Ok(fix) => fix,
        Err(e) => return AcquisitionOutcome::error(format!("invalid geolocation payload: {}", e)),
    };

    let coordinate = match Coordinate::new(fix.latitude, fix.longitude) {
        Ok(coordinate) => coordinate,
        Err(e) => return AcquisitionOutcome::error(e.to_string()),
    };

    let mut location = Location::new(coordinate.latitude, coordinate.longitude, captured_at);
    location.accuracy_m = fix.accuracy;
    AcquisitionOutcome::Success(location)
}
