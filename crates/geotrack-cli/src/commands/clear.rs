//! Clear command implementation.

use anyhow::{Context, Result};

use geotrack_store::Store;

use crate::format::FormatOptions;
use crate::style;
use crate::util::confirm;

pub fn cmd_clear(store: &Store, yes: bool, quiet: bool, opts: &FormatOptions) -> Result<()> {
    let count = store.count_locations().context("Failed to read locations")?;
    if count == 0 {
        if !quiet {
            eprintln!("{}", style::format_info("No locations to delete.", opts.no_color));
        }
        return Ok(());
    }

    if !yes && !confirm(&format!("Delete all {} stored location(s)?", count))? {
        if !quiet {
            eprintln!("Aborted.");
        }
        return Ok(());
    }

    let deleted = store.clear_all().context("Failed to delete locations")?;
    tracing::info!("Deleted {} location(s)", deleted);
    if !quiet {
        eprintln!(
            "{}",
            style::format_success(&format!("Deleted {} location(s)", deleted), opts.no_color)
        );
    }
    Ok(())
}
