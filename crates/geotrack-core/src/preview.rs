//! Street View thumbnail URLs for stored locations.
//!
//! ```
//! use geotrack_core::preview::StreetViewPreview;
//!
//! let preview = StreetViewPreview::new("test-key")?;
//! assert_eq!(
//!     preview.url(37.5665, 126.978),
//!     "https://maps.googleapis.com/maps/api/streetview?size=160x80&location=37.5665,126.978&key=test-key"
//! );
//! # Ok::<(), geotrack_core::Error>(())
//! ```

use geotrack_types::LocationRecord;

use crate::error::{Error, Result};

/// Street View Static API endpoint.
pub const STREET_VIEW_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/streetview";

/// Default thumbnail width in pixels.
pub const DEFAULT_PREVIEW_WIDTH: u32 = 160;

/// Default thumbnail height in pixels.
pub const DEFAULT_PREVIEW_HEIGHT: u32 = 80;

/// Builds Street View thumbnail requests.
#[derive(Clone)]
pub struct StreetViewPreview {
    api_key: String,
    width: u32,
    height: u32,
}

impl std::fmt::Debug for StreetViewPreview {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreetViewPreview")
            .field("api_key", &"<redacted>")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

impl StreetViewPreview {
    /// Create a preview builder with the default 160x80 size.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::invalid_config("Maps API key is empty"));
        }

        Ok(Self {
            api_key,
            width: DEFAULT_PREVIEW_WIDTH,
            height: DEFAULT_PREVIEW_HEIGHT,
        })
    }

    /// Set the image size in pixels.
    #[must_use]
    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Image width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Request URL for a coordinate, printed without extra rounding.
    pub fn url(&self, latitude: f64, longitude: f64) -> String {
        format!(
            "{}?size={}x{}&location={},{}&key={}",
            STREET_VIEW_ENDPOINT, self.width, self.height, latitude, longitude, self.api_key
        )
    }

    /// Request URL for a stored record.
    pub fn url_for(&self, record: &LocationRecord) -> String {
        self.url(record.latitude, record.longitude)
    }

    /// Download the thumbnail image.
    #[cfg(feature = "http")]
    pub async fn fetch(
        &self,
        client: &reqwest::Client,
        latitude: f64,
        longitude: f64,
    ) -> Result<Vec<u8>> {
        let response = client
            .get(self.url(latitude, longitude))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}
