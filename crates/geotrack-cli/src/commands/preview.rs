//! Preview command implementation.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use geotrack_core::StreetViewPreview;
use geotrack_store::Store;

use crate::config::Config;
use crate::format::FormatOptions;
use crate::style;

/// Image download timeout.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Arguments for the preview command.
pub struct PreviewArgs<'a> {
    pub id: i64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub output: Option<&'a PathBuf>,
    pub quiet: bool,
    pub opts: &'a FormatOptions,
}

/// Apply size overrides on top of the configured preview.
fn sized(preview: StreetViewPreview, width: Option<u32>, height: Option<u32>) -> StreetViewPreview {
    let w = width.unwrap_or(preview.width());
    let h = height.unwrap_or(preview.height());
    preview.size(w, h)
}

pub async fn cmd_preview(store: &Store, config: &Config, args: PreviewArgs<'_>) -> Result<()> {
    let PreviewArgs {
        id,
        width,
        height,
        output,
        quiet,
        opts,
    } = args;

    let Some(location) = store.get_location(id).context("Failed to read locations")? else {
        bail!("No location with ID {}. Run 'geotrack list' to see stored IDs.", id);
    };

    let preview = sized(config.street_view()?, width, height);

    match output {
        None => {
            println!("{}", preview.url(location.latitude, location.longitude));
        }
        Some(path) => {
            let client = reqwest::Client::builder()
                .timeout(FETCH_TIMEOUT)
                .build()
                .context("Failed to create HTTP client")?;
            let bytes = preview
                .fetch(&client, location.latitude, location.longitude)
                .await
                .context("Failed to download Street View image")?;
            std::fs::write(path, &bytes)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
            if !quiet {
                eprintln!(
                    "{}",
                    style::format_success(
                        &format!(
                            "Saved {}x{} preview of #{} to {} ({} bytes)",
                            preview.width(),
                            preview.height(),
                            id,
                            path.display(),
                            bytes.len()
                        ),
                        opts.no_color
                    )
                );
            }
        }
    }
    Ok(())
}
