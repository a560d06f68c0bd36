//! Jobs command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};

use geotrack_store::Store;

use crate::cli::OutputFormat;
use crate::format::{FormatOptions, format_jobs_csv, format_jobs_json, format_jobs_text};
use crate::util::write_output;

/// Arguments for the jobs command.
pub struct JobsArgs<'a> {
    pub limit: u32,
    pub format: OutputFormat,
    pub output: Option<&'a PathBuf>,
    pub opts: &'a FormatOptions,
}

pub fn cmd_jobs(store: &Store, args: JobsArgs<'_>) -> Result<()> {
    let JobsArgs {
        limit,
        format,
        output,
        opts,
    } = args;

    let jobs = store.list_work(limit).context("Failed to read queue")?;
    let pending = store.pending_work_count().context("Failed to read queue")?;

    let content = match format {
        OutputFormat::Json => format_jobs_json(&jobs, opts)?,
        OutputFormat::Text => format_jobs_text(&jobs, pending, opts),
        OutputFormat::Csv => format_jobs_csv(&jobs, opts),
    };

    write_output(output, &content)
}
