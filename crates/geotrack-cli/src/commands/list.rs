//! List command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};

use geotrack_store::{LocationQuery, Store};
use geotrack_types::LocationRecord;

use crate::cli::OutputFormat;
use crate::format::{FormatOptions, format_locations_text};
use crate::util::{parse_datetime, write_output};

/// Arguments for the list command.
pub struct ListArgs<'a> {
    pub format: OutputFormat,
    pub limit: Option<u32>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub output: Option<&'a PathBuf>,
    pub opts: &'a FormatOptions,
}

/// Build the store query for the given filters.
fn build_query(
    limit: Option<u32>,
    since: Option<&str>,
    until: Option<&str>,
) -> Result<LocationQuery> {
    let mut query = LocationQuery::new();
    if let Some(since) = since {
        query = query.since(parse_datetime(since)?);
    }
    if let Some(until) = until {
        query = query.until(parse_datetime(until)?);
    }
    if let Some(limit) = limit.filter(|&n| n > 0) {
        query = query.limit(limit);
    }
    Ok(query)
}

pub fn cmd_list(store: &Store, args: ListArgs<'_>) -> Result<()> {
    let ListArgs {
        format,
        limit,
        since,
        until,
        output,
        opts,
    } = args;

    let query = build_query(limit, since.as_deref(), until.as_deref())?;

    let content = match format {
        OutputFormat::Text => {
            let locations: Vec<LocationRecord> = store
                .list_locations(&query)
                .context("Failed to read locations")?
                .iter()
                .map(|l| l.to_record())
                .collect();
            format_locations_text(&locations, opts)
        }
        OutputFormat::Csv => {
            let mut buf = Vec::new();
            store
                .export_csv(&query, &mut buf, !opts.no_header)
                .context("Failed to export locations as CSV")?;
            String::from_utf8(buf).context("CSV export produced invalid UTF-8")?
        }
        OutputFormat::Json => {
            let mut buf = Vec::new();
            store
                .export_json(&query, &mut buf, !opts.compact)
                .context("Failed to export locations as JSON")?;
            String::from_utf8(buf).context("JSON export produced invalid UTF-8")?
        }
    };

    write_output(output, &content)
}
