//! Configuration file management.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use geotrack_core::http::HttpProvider;
use geotrack_core::{
    FusedProvider, LastKnownCache, LastKnownProvider, LocationProvider, MockProvider, RetryPolicy,
    StreetViewPreview, WorkerConfig,
};
use geotrack_types::{Coordinate, Location};

/// Environment variable that overrides `maps.api_key`.
pub const MAPS_KEY_ENV: &str = "GEOTRACK_MAPS_API_KEY";

/// Coordinate served by the mock provider when `provider.fixed` is unset.
pub const DEFAULT_MOCK_LOCATION: FixedLocation = FixedLocation {
    latitude: 37.5665,
    longitude: 126.978,
};

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where locations and queued work are stored.
    pub storage: StorageConfig,
    /// How position fixes are acquired.
    pub provider: ProviderConfig,
    /// Background worker and retry settings.
    pub worker: WorkerSettings,
    /// Street View preview settings.
    pub maps: MapsConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: geotrack_store::default_db_path(),
        }
    }
}

/// Which acquisition strategy to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Always answers with `fixed`, or a built-in coordinate.
    #[default]
    Mock,
    /// Queries `endpoint`.
    Http,
    /// Tries `endpoint`, then the last known fix, then `fixed` if set.
    Fused,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Mock => write!(f, "mock"),
            ProviderKind::Http => write!(f, "http"),
            ProviderKind::Fused => write!(f, "fused"),
        }
    }
}

/// A fixed coordinate in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixedLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// Location provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Geolocation endpoint for `http` and `fused`.
    pub endpoint: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Coordinate served by `mock`, and by `fused` as a last resort.
    pub fixed: Option<FixedLocation>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Mock,
            endpoint: None,
            timeout_secs: 10,
            fixed: None,
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// How often the worker checks the queue without being woken.
    pub poll_interval_ms: u64,
    /// Attempts per queued update, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay_ms: u64,
    /// Upper bound on any retry delay.
    pub max_delay_ms: u64,
    /// Growth factor between retry delays.
    pub backoff_multiplier: f64,
    /// Randomize retry delays.
    pub jitter: bool,
    /// How long a claimed update stays reserved for one worker.
    pub lease_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            poll_interval_ms: 5_000,
            max_attempts: retry.max_attempts,
            initial_delay_ms: duration_ms(retry.initial_delay),
            max_delay_ms: duration_ms(retry.max_delay),
            backoff_multiplier: retry.backoff_multiplier,
            jitter: retry.jitter,
            lease_ms: duration_ms(geotrack_core::worker::DEFAULT_LEASE),
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Maps configuration.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapsConfig {
    /// Street View Static API key.
    pub api_key: Option<String>,
    pub preview_width: u32,
    pub preview_height: u32,
}

impl Default for MapsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            preview_width: geotrack_core::preview::DEFAULT_PREVIEW_WIDTH,
            preview_height: geotrack_core::preview::DEFAULT_PREVIEW_HEIGHT,
        }
    }
}

impl fmt::Debug for MapsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapsConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("preview_width", &self.preview_width)
            .field("preview_height", &self.preview_height)
            .finish()
    }
}

/// A single problem found by [`Config::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending key.
    pub field: String,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("geotrack")
            .join("config.toml")
    }

    /// Load config from `path`, or return the default if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Save config to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Apply environment overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_maps_key(std::env::var(MAPS_KEY_ENV).ok())
    }

    /// Replace the maps key when `key` is non-empty.
    pub fn with_maps_key(mut self, key: Option<String>) -> Self {
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            self.maps.api_key = Some(key);
        }
        self
    }

    /// Check every section and collect all problems.
    pub fn validation_errors(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        errors.extend(self.storage.validate());
        errors.extend(self.provider.validate());
        errors.extend(self.worker.validate());
        errors.extend(self.maps.validate());
        errors
    }

    /// Fail with every validation problem listed.
    pub fn validate(&self) -> Result<()> {
        let errors = self.validation_errors();
        if errors.is_empty() {
            return Ok(());
        }
        let lines: Vec<String> = errors.iter().map(|e| format!("  - {}", e)).collect();
        bail!("Invalid configuration:\n{}", lines.join("\n"))
    }

    /// Retry policy for newly queued updates.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.worker.max_attempts)
            .initial_delay(Duration::from_millis(self.worker.initial_delay_ms))
            .max_delay(Duration::from_millis(self.worker.max_delay_ms))
            .backoff_multiplier(self.worker.backoff_multiplier)
            .jitter(self.worker.jitter)
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig::default()
            .with_poll_interval(Duration::from_millis(self.worker.poll_interval_ms))
            .with_retry(self.retry_policy())
            .with_lease(Duration::from_millis(self.worker.lease_ms))
    }

    /// Build the configured location provider.
    ///
    /// `last_known` seeds the fused provider's last-known fallback, usually
    /// with the newest stored point.
    pub fn build_provider(&self, last_known: Option<Location>) -> Result<Arc<dyn LocationProvider>> {
        let timeout = Duration::from_secs(self.provider.timeout_secs);
        let provider: Arc<dyn LocationProvider> = match self.provider.kind {
            ProviderKind::Mock => {
                let fixed = self.provider.fixed.unwrap_or(DEFAULT_MOCK_LOCATION);
                Arc::new(MockProvider::new(fixed.latitude, fixed.longitude))
            }
            ProviderKind::Http => {
                let endpoint = self
                    .provider
                    .endpoint
                    .as_deref()
                    .context("provider.endpoint is required for the http provider")?;
                Arc::new(HttpProvider::new(endpoint, timeout)?)
            }
            ProviderKind::Fused => Arc::new(self.build_fused(last_known, timeout)?),
        };
        tracing::debug!("Using {} location provider", provider.name());
        Ok(provider)
    }

    /// Endpoint first, then the last known fix, then `fixed` if configured.
    fn build_fused(&self, last_known: Option<Location>, timeout: Duration) -> Result<FusedProvider> {
        let cache = last_known.map(LastKnownCache::seeded).unwrap_or_default();
        let mut fused = FusedProvider::new(cache.clone(), timeout);
        if let Some(endpoint) = self.provider.endpoint.as_deref() {
            fused = fused.with(Arc::new(HttpProvider::new(endpoint, timeout)?));
        }
        fused = fused.with(Arc::new(LastKnownProvider::new(cache)));
        if let Some(fixed) = self.provider.fixed {
            fused = fused.with(Arc::new(MockProvider::new(fixed.latitude, fixed.longitude)));
        }
        Ok(fused)
    }

    /// Street View URL builder, if a key is configured.
    pub fn street_view(&self) -> Result<StreetViewPreview> {
        let key = self.maps.api_key.as_deref().with_context(|| {
            format!(
                "No Maps API key configured. Set maps.api_key or {}",
                MAPS_KEY_ENV
            )
        })?;
        Ok(StreetViewPreview::new(key)?.size(self.maps.preview_width, self.maps.preview_height))
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.path",
                "database path cannot be empty",
            ));
        }
        errors
    }
}

impl ProviderConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "provider.timeout_secs",
                "timeout must be at least 1 second",
            ));
        }

        if let Some(endpoint) = &self.endpoint
            && !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
        {
            errors.push(ValidationError::new(
                "provider.endpoint",
                format!("'{}' is not an http(s) URL", endpoint),
            ));
        }

        if let Some(fixed) = self.fixed
            && let Err(e) = Coordinate::new(fixed.latitude, fixed.longitude)
        {
            errors.push(ValidationError::new("provider.fixed", e.to_string()));
        }

        match self.kind {
            ProviderKind::Http if self.endpoint.is_none() => errors.push(ValidationError::new(
                "provider.endpoint",
                "required when kind = \"http\"",
            )),
            ProviderKind::Fused if self.endpoint.is_none() && self.fixed.is_none() => {
                errors.push(ValidationError::new(
                    "provider",
                    "kind = \"fused\" needs an endpoint or a fixed location",
                ))
            }
            _ => {}
        }

        errors
    }
}

impl WorkerSettings {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.poll_interval_ms == 0 {
            errors.push(ValidationError::new(
                "worker.poll_interval_ms",
                "poll interval must be positive",
            ));
        }
        if self.max_attempts == 0 {
            errors.push(ValidationError::new(
                "worker.max_attempts",
                "at least one attempt is required",
            ));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            errors.push(ValidationError::new(
                "worker.max_delay_ms",
                format!(
                    "max delay ({}ms) is shorter than the initial delay ({}ms)",
                    self.max_delay_ms, self.initial_delay_ms
                ),
            ));
        }
        if self.lease_ms == 0 {
            errors.push(ValidationError::new(
                "worker.lease_ms",
                "lease must be positive",
            ));
        }
        if !(self.backoff_multiplier.is_finite() && self.backoff_multiplier >= 1.0) {
            errors.push(ValidationError::new(
                "worker.backoff_multiplier",
                "multiplier must be a finite number >= 1.0",
            ));
        }
        errors
    }
}

impl MapsConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.api_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
            errors.push(ValidationError::new(
                "maps.api_key",
                "key is empty; remove it or set a real key",
            ));
        }
        for (field, value) in [
            ("maps.preview_width", self.preview_width),
            ("maps.preview_height", self.preview_height),
        ] {
            if !(1..=640).contains(&value) {
                errors.push(ValidationError::new(
                    field,
                    format!("{} is outside 1..=640 pixels", value),
                ));
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validation_errors().is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [provider]
            kind = "http"
            endpoint = "https://geo.example.com/locate"

            [worker]
            max_attempts = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.provider.kind, ProviderKind::Http);
        assert_eq!(config.provider.timeout_secs, 10);
        assert_eq!(config.worker.max_attempts, 3);
        assert_eq!(config.worker.poll_interval_ms, 5_000);
        assert_eq!(config.maps.preview_width, 160);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_provider_kind_rejected() {
        let result: Result<Config, _> = toml::from_str("[provider]\nkind = \"gps\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_collects_every_problem() {
        let mut config = Config::default();
        config.provider.kind = ProviderKind::Http;
        config.provider.timeout_secs = 0;
        config.worker.max_attempts = 0;
        config.worker.backoff_multiplier = 0.5;
        config.maps.preview_height = 0;

        let fields: Vec<String> = config
            .validation_errors()
            .into_iter()
            .map(|e| e.field)
            .collect();
        assert!(fields.contains(&"provider.timeout_secs".to_string()));
        assert!(fields.contains(&"provider.endpoint".to_string()));
        assert!(fields.contains(&"worker.max_attempts".to_string()));
        assert!(fields.contains(&"worker.backoff_multiplier".to_string()));
        assert!(fields.contains(&"maps.preview_height".to_string()));

        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("worker.max_attempts"));
    }

    #[test]
    fn test_fixed_location_out_of_range() {
        let mut config = Config::default();
        config.provider.fixed = Some(FixedLocation {
            latitude: 91.0,
            longitude: 0.0,
        });
        let errors = config.validation_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "provider.fixed");
    }

    #[test]
    fn test_non_http_endpoint_rejected() {
        let mut config = Config::default();
        config.provider.endpoint = Some("ftp://geo.example.com".to_string());
        assert_eq!(config.validation_errors()[0].field, "provider.endpoint");
    }

    #[test]
    fn test_fused_needs_a_source() {
        let mut config = Config::default();
        config.provider.kind = ProviderKind::Fused;
        config.provider.fixed = None;
        assert_eq!(config.validation_errors()[0].field, "provider");
    }

    #[test]
    fn test_maps_key_override() {
        let config = Config::default().with_maps_key(Some("from-env".to_string()));
        assert_eq!(config.maps.api_key.as_deref(), Some("from-env"));

        let config = config.with_maps_key(Some("   ".to_string()));
        assert_eq!(config.maps.api_key.as_deref(), Some("from-env"));

        let config = config.with_maps_key(None);
        assert_eq!(config.maps.api_key.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_retry_policy_from_settings() {
        let mut config = Config::default();
        config.worker.max_attempts = 7;
        config.worker.initial_delay_ms = 250;
        config.worker.max_delay_ms = 1_000;
        config.worker.jitter = false;

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 7);
        assert_eq!(policy.initial_delay, Duration::from_millis(250));
        assert_eq!(policy.max_delay, Duration::from_millis(1_000));
        assert!(!policy.jitter);

        let worker = config.worker_config();
        assert_eq!(worker.poll_interval, Duration::from_millis(5_000));
        assert_eq!(worker.retry, policy);
        assert_eq!(worker.lease, Duration::from_secs(120));
    }

    #[test]
    fn test_build_provider_kinds() {
        let config = Config::default();
        assert_eq!(config.build_provider(None).unwrap().name(), "mock");

        let mut config = Config::default();
        config.provider.kind = ProviderKind::Fused;
        config.provider.endpoint = Some("https://geo.example.com/locate".to_string());
        assert_eq!(config.build_provider(None).unwrap().name(), "fused");

        let mut config = Config::default();
        config.provider.kind = ProviderKind::Http;
        assert!(config.build_provider(None).is_err());
    }

    #[tokio::test]
    async fn test_default_mock_serves_built_in_location() {
        let config = Config::default();
        assert_eq!(config.provider.fixed, None);

        let outcome = config.build_provider(None).unwrap().current_location().await;
        let fix = outcome.location().copied().unwrap();
        assert_eq!((fix.latitude, fix.longitude), (37.5665, 126.978));
    }

    #[tokio::test]
    async fn test_fused_file_without_fixed_has_no_fixed_fallback() {
        let config: Config = toml::from_str(
            r#"
            [provider]
            kind = "fused"
            endpoint = "http://127.0.0.1:9/locate"
            timeout_secs = 1
            "#,
        )
        .unwrap();
        assert_eq!(config.provider.fixed, None);
        assert!(config.validate().is_ok());

        let fused = config.build_fused(None, Duration::from_secs(1)).unwrap();
        assert_eq!(fused.len(), 2);

        // Endpoint down and nothing known: no made-up coordinate
        let outcome = fused.current_location().await;
        assert!(!outcome.is_success());
        assert!(outcome.is_retryable());
    }

    #[tokio::test]
    async fn test_fused_prefers_last_known_over_fixed() {
        let config: Config = toml::from_str(
            r#"
            [provider]
            kind = "fused"
            timeout_secs = 1

            [provider.fixed]
            latitude = 1.0
            longitude = 2.0
            "#,
        )
        .unwrap();

        let seeded = config
            .build_provider(Some(Location::new(35.1796, 129.0756, 1)))
            .unwrap();
        let fix = seeded.current_location().await.location().copied().unwrap();
        assert_eq!(fix.latitude, 35.1796);

        // Nothing known yet: the configured coordinate is the last resort
        let fresh = config.build_provider(None).unwrap();
        let fix = fresh.current_location().await.location().copied().unwrap();
        assert_eq!(fix.latitude, 1.0);
    }

    #[test]
    fn test_street_view_requires_key() {
        let config = Config::default();
        let err = config.street_view().unwrap_err().to_string();
        assert!(err.contains(MAPS_KEY_ENV));

        let mut config = Config::default().with_maps_key(Some("k".to_string()));
        config.maps.preview_width = 320;
        let preview = config.street_view().unwrap();
        assert_eq!(preview.width(), 320);
        assert_eq!(preview.height(), 80);
    }

    #[test]
    fn test_debug_hides_maps_key() {
        let config = Config::default().with_maps_key(Some("secret-key".to_string()));
        assert!(!format!("{:?}", config).contains("secret-key"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.provider.kind = ProviderKind::Fused;
        config.worker.jitter = false;
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file_gives_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_malformed_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[worker\nmax_attempts = ").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
