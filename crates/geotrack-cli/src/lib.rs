//! Command-line front end for geotrack.
//!
//! `geotrack` queues location updates, runs the background worker that
//! resolves them, and shows the deduplicated history the worker builds.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `refresh` | Queue a location update (`--wait` to run it now) |
//! | `list` | Stored locations, newest first |
//! | `watch` | Live view with stdin commands |
//! | `worker` | Run the background worker |
//! | `jobs` | Queued updates and their state |
//! | `clear` | Delete every stored location |
//! | `preview` | Street View thumbnail URL or image |
//! | `config` | Show, locate or initialize the config file |
//! | `completions` | Generate shell completions |
//!
//! # Output Formats
//!
//! `list` and `jobs` support three output formats:
//!
//! - **Text** (default): Human-readable tables
//! - **JSON**: Machine-readable JSON format
//! - **CSV**: Comma-separated values for spreadsheets and data analysis
//!
//! # Configuration
//!
//! The CLI reads `~/.config/geotrack/config.toml` (or platform equivalent):
//!
//! ```toml
//! [storage]
//! path = "/home/me/.local/share/geotrack/locations.db"
//!
//! [provider]
//! kind = "fused"          # mock | http | fused
//! endpoint = "https://geo.example.com/locate"
//! timeout_secs = 10
//! # Optional last resort after the endpoint and the last known fix
//! fixed = { latitude = 37.5665, longitude = 126.978 }
//!
//! [worker]
//! poll_interval_ms = 5000
//! max_attempts = 5
//! initial_delay_ms = 10000
//! max_delay_ms = 300000
//! backoff_multiplier = 2.0
//! jitter = true
//! lease_ms = 120000
//!
//! [maps]
//! api_key = "..."
//! preview_width = 160
//! preview_height = 80
//! ```
//!
//! # Environment Variables
//!
//! - `GEOTRACK_CONFIG`: Config file path (overridden by `--config`)
//! - `GEOTRACK_DB`: Database path (overridden by `--db`)
//! - `GEOTRACK_MAPS_API_KEY`: Street View API key (overrides `maps.api_key`)
//! - `NO_COLOR`: Disable colored output when set
//! - `RUST_LOG`: Log filter when neither `--verbose` nor `--quiet` is given
//!
//! # Examples
//!
//! Record the current position and wait for it:
//! ```bash
//! geotrack refresh --wait
//! ```
//!
//! Export the ten most recent locations as CSV:
//! ```bash
//! geotrack list --format csv --limit 10 --output recent.csv
//! ```
//!
//! Download a 640x320 preview of location 3:
//! ```bash
//! geotrack preview 3 --width 640 --height 320 --output street.jpg
//! ```

// Re-export core dependencies for convenience
pub use geotrack_core;
pub use geotrack_types;
