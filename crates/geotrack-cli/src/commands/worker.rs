//! Worker command implementation.

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use tokio::sync::broadcast::error::RecvError;

use geotrack_core::{Tracker, WorkerEvent};

use crate::format::{FormatOptions, format_short_time};
use crate::style;

/// Arguments for the worker command.
pub struct WorkerArgs<'a> {
    pub once: bool,
    pub quiet: bool,
    pub opts: &'a FormatOptions,
}

/// One status line per worker event.
pub fn format_worker_event(event: &WorkerEvent, no_color: bool) -> String {
    match event {
        WorkerEvent::WorkerStarted => style::format_info("Worker started", no_color),
        WorkerEvent::WorkStarted { work_id, attempt } => {
            let text = format!("#{} attempt {}", work_id, attempt);
            if no_color {
                text
            } else {
                text.dimmed().to_string()
            }
        }
        WorkerEvent::WorkSucceeded { work_id, location } => style::format_success(
            &format!(
                "#{} saved location #{}: {}, {}",
                work_id, location.id, location.latitude, location.longitude
            ),
            no_color,
        ),
        WorkerEvent::WorkRetrying {
            work_id,
            attempt,
            next_run_at,
            reason,
        } => style::format_warning(
            &format!(
                "#{} attempt {} found no fix ({}); retrying at {}",
                work_id,
                attempt,
                reason,
                format_short_time(*next_run_at)
            ),
            no_color,
        ),
        WorkerEvent::WorkFailed { work_id, error } => {
            style::format_error(&format!("#{} failed: {}", work_id, error), no_color)
        }
        WorkerEvent::WorkerStopped => style::format_info("Worker stopped", no_color),
    }
}

pub async fn cmd_worker(tracker: &Tracker, args: WorkerArgs<'_>) -> Result<()> {
    let WorkerArgs { once, quiet, opts } = args;

    if once {
        let mut events = tracker.worker().events();
        let recovered = tracker.worker().recover().await?;
        let ran = tracker
            .worker()
            .run_pending()
            .await
            .context("Failed to run queued updates")?;
        if !quiet {
            while let Ok(event) = events.try_recv() {
                eprintln!("{}", format_worker_event(&event, opts.no_color));
            }
            eprintln!(
                "Ran {} attempt(s){}",
                ran,
                if recovered > 0 {
                    format!(", {} interrupted update(s) requeued", recovered)
                } else {
                    String::new()
                }
            );
        }
        return Ok(());
    }

    let handle = std::sync::Arc::clone(tracker.worker()).start();
    let mut events = handle.events();
    if !quiet {
        eprintln!("Processing location updates. Press Ctrl+C to stop.");
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nShutting down...");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if !quiet {
                        eprintln!("{}", format_worker_event(&event, opts.no_color));
                    }
                }
                Err(RecvError::Lagged(n)) => tracing::warn!("Missed {} worker event(s)", n),
                Err(RecvError::Closed) => break,
            }
        }
    }

    handle.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use geotrack_core::{MockProvider, RetryPolicy, WorkerConfig};
    use geotrack_store::{Store, WorkState};
    use geotrack_types::LocationRecord;

    #[test]
    fn test_event_lines() {
        let line = format_worker_event(
            &WorkerEvent::WorkSucceeded {
                work_id: 3,
                location: LocationRecord {
                    id: 9,
                    latitude: 1.5,
                    longitude: 2.5,
                    timestamp: 0,
                },
            },
            true,
        );
        assert_eq!(line, "[OK] #3 saved location #9: 1.5, 2.5");

        let line = format_worker_event(
            &WorkerEvent::WorkFailed {
                work_id: 4,
                error: "location permission denied".to_string(),
            },
            true,
        );
        assert_eq!(line, "[XX] #4 failed: location permission denied");
    }

    #[tokio::test]
    async fn test_worker_once_drains_queue() {
        let tracker = Tracker::new(
            Store::open_in_memory().unwrap(),
            Arc::new(MockProvider::new(1.0, 2.0)),
            WorkerConfig::default().with_retry(RetryPolicy::immediate(1)),
        );
        let a = tracker.request_update().execute().await.unwrap();
        let b = tracker.request_update().execute().await.unwrap();

        cmd_worker(
            &tracker,
            WorkerArgs {
                once: true,
                quiet: true,
                opts: &FormatOptions::default(),
            },
        )
        .await
        .unwrap();

        let store = tracker.store().lock().await;
        for id in [a, b] {
            assert_eq!(store.get_work(id).unwrap().unwrap().state, WorkState::Succeeded);
        }
    }
}
