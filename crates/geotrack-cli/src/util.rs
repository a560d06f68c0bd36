//! Utility functions for CLI operations.

use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use dialoguer::Confirm;
use dialoguer::theme::ColorfulTheme;
use time::OffsetDateTime;
use time::macros::format_description;

use geotrack_core::Tracker;
use geotrack_store::{LocationQuery, Store};
use geotrack_types::Location;

use crate::config::Config;

/// Write output to file or stdout
pub fn write_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }
        None => {
            print!("{}", content);
            io::stdout().flush()?;
        }
    }
    Ok(())
}

/// Parse a date/time string in RFC3339 or YYYY-MM-DD format.
pub fn parse_datetime(s: &str) -> Result<OffsetDateTime> {
    if let Ok(dt) = OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339) {
        return Ok(dt);
    }

    // Date only: start of day in UTC
    let format = format_description!("[year]-[month]-[day]");
    if let Ok(date) = time::Date::parse(s, &format) {
        return Ok(date.midnight().assume_utc());
    }

    bail!(
        "Invalid date format '{}'. Use RFC3339 (e.g., 2024-01-15T10:30:00Z) or YYYY-MM-DD",
        s
    )
}

/// Open the location store at `path`.
pub fn open_store(path: &Path) -> Result<Store> {
    Store::open(path).with_context(|| format!("Failed to open database: {}", path.display()))
}

/// Open the store and wire a tracker around the configured provider.
///
/// The newest stored point becomes the provider's last known fix.
pub fn open_tracker(config: &Config, db_path: &Path) -> Result<Tracker> {
    let store = open_store(db_path)?;
    let last_known = store
        .list_locations(&LocationQuery::new().limit(1))
        .context("Failed to read the newest location")?
        .first()
        .map(|l| Location::new(l.latitude, l.longitude, l.timestamp));
    let provider = config.build_provider(last_known)?;
    Ok(Tracker::new(store, provider, config.worker_config()))
}

/// Ask for confirmation, refusing when stdin is not a terminal.
pub fn confirm(prompt: &str) -> Result<bool> {
    if !io::stdin().is_terminal() || !io::stderr().is_terminal() {
        bail!("Refusing to continue without confirmation. Pass --yes to skip the prompt.");
    }

    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact()
        .context("Failed to read confirmation")
}
