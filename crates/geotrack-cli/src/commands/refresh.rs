//! Refresh command implementation.
//!
//! Without `--wait` the update is only queued; a running `geotrack worker`
//! (or the next `--wait`) picks it up. With `--wait` the worker runs in this
//! process until the queued update succeeds, fails or the timeout expires.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use indicatif::ProgressBar;
use tokio::sync::broadcast;

use geotrack_core::{Tracker, WorkId, WorkerEvent};
use geotrack_store::WorkState;
use geotrack_types::LocationRecord;

use crate::format::{FormatOptions, format_short_time};
use crate::style;
use crate::util::write_output;

/// How long to sleep between queue checks while waiting.
const WAIT_POLL: Duration = Duration::from_millis(200);

/// Arguments for the refresh command.
pub struct RefreshArgs<'a> {
    pub wait: bool,
    pub timeout: Duration,
    pub output: Option<&'a PathBuf>,
    pub quiet: bool,
    pub opts: &'a FormatOptions,
}

/// How a waited-for update ended.
#[derive(Debug, Clone, PartialEq)]
enum WaitResult {
    Saved(Option<LocationRecord>),
    Failed(String),
}

pub async fn cmd_refresh(tracker: &Tracker, args: RefreshArgs<'_>) -> Result<()> {
    let RefreshArgs {
        wait,
        timeout,
        output,
        quiet,
        opts,
    } = args;

    let mut events = tracker.worker().events();
    let id = tracker
        .request_update()
        .execute()
        .await
        .context("Failed to queue location update")?;

    if !wait {
        let mut content = style::format_success(
            &format!("Queued location update #{}", id),
            opts.no_color,
        );
        content.push('\n');
        write_output(output, &content)?;
        if !quiet {
            eprintln!("Run 'geotrack worker' to process queued updates, or use --wait.");
        }
        return Ok(());
    }

    let spinner = (!quiet).then(|| style::operation_spinner("Acquiring location..."));

    let recovered = tracker.worker().recover().await?;
    if recovered > 0 {
        tracing::info!("Requeued {} interrupted location update(s)", recovered);
    }

    let result = tokio::time::timeout(
        timeout,
        wait_for(tracker, id, &mut events, spinner.as_ref()),
    )
    .await;

    if let Some(sp) = &spinner {
        sp.finish_and_clear();
    }

    match result {
        Err(_) => bail!(
            "Timed out after {}s waiting for update #{}; it stays queued",
            timeout.as_secs(),
            id
        ),
        Ok(outcome) => match outcome? {
            WaitResult::Saved(location) => {
                let message = match location {
                    Some(l) => format!(
                        "Saved location #{}: {}, {} at {}",
                        l.id,
                        l.latitude,
                        l.longitude,
                        format_short_time(l.timestamp)
                    ),
                    None => format!("Location update #{} succeeded", id),
                };
                let mut content = style::format_success(&message, opts.no_color);
                content.push('\n');
                write_output(output, &content)
            }
            WaitResult::Failed(error) => bail!("Location update #{} failed: {}", id, error),
        },
    }
}

async fn wait_for(
    tracker: &Tracker,
    id: WorkId,
    events: &mut broadcast::Receiver<WorkerEvent>,
    spinner: Option<&ProgressBar>,
) -> Result<WaitResult> {
    loop {
        tracker.worker().run_pending().await?;

        while let Ok(event) = events.try_recv() {
            match event {
                WorkerEvent::WorkSucceeded { work_id, location } if work_id == id => {
                    return Ok(WaitResult::Saved(Some(location)));
                }
                WorkerEvent::WorkFailed { work_id, error } if work_id == id => {
                    return Ok(WaitResult::Failed(error));
                }
                WorkerEvent::WorkRetrying {
                    work_id,
                    attempt,
                    reason,
                    ..
                } if work_id == id => {
                    if let Some(sp) = spinner {
                        sp.set_message(format!(
                            "No fix yet (attempt {}): {}. Retrying...",
                            attempt, reason
                        ));
                    }
                }
                _ => {}
            }
        }

        // Another process may have finished it
        let store = tracker.store().lock().await;
        let Some(work) = store.get_work(id)? else {
            bail!("Location update #{} disappeared from the queue", id);
        };
        match work.state {
            WorkState::Succeeded => {
                let saved = match work.location_id {
                    Some(location_id) => store.get_location(location_id)?.map(|l| l.to_record()),
                    None => None,
                };
                return Ok(WaitResult::Saved(saved));
            }
            WorkState::Failed => {
                return Ok(WaitResult::Failed(
                    work.last_error.unwrap_or_else(|| "unknown error".to_string()),
                ));
            }
            _ => {}
        }
        drop(store);

        tokio::time::sleep(WAIT_POLL).await;
    }
}
