//! Watch command implementation.
//!
//! Renders every view-model snapshot as it changes and reads single-letter
//! commands from stdin. By default the background worker runs in the same
//! process so refreshes complete without a separate `geotrack worker`.

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use geotrack_core::{Tracker, UiIntent};

use crate::format::{FormatOptions, format_ui_state};
use crate::style;

const HELP: &str = "Commands: r refresh | h history | s <id> select | x clear selection | c clear error | q quit";

/// Arguments for the watch command.
pub struct WatchArgs<'a> {
    pub run_worker: bool,
    pub quiet: bool,
    pub opts: &'a FormatOptions,
}

/// A line typed on stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchCommand {
    Intent(UiIntent),
    Help,
    Quit,
}

/// Parse one stdin line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<WatchCommand>, String> {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Ok(None);
    };

    let command = match head.to_lowercase().as_str() {
        "r" | "refresh" => WatchCommand::Intent(UiIntent::Refresh),
        "h" | "history" => WatchCommand::Intent(UiIntent::ToggleHistorySheet),
        "x" | "unselect" => WatchCommand::Intent(UiIntent::ClearSelection),
        "c" | "clear" => WatchCommand::Intent(UiIntent::ClearError),
        "s" | "select" => {
            let id = parts
                .next()
                .ok_or_else(|| "Usage: s <id>".to_string())?
                .parse::<i64>()
                .map_err(|_| "Location ID must be a number".to_string())?;
            WatchCommand::Intent(UiIntent::SelectLocation(id))
        }
        "?" | "help" => WatchCommand::Help,
        "q" | "quit" | "exit" => WatchCommand::Quit,
        other => return Err(format!("Unknown command '{}'. Type ? for help.", other)),
    };
    Ok(Some(command))
}

pub async fn cmd_watch(tracker: &Tracker, args: WatchArgs<'_>) -> Result<()> {
    let WatchArgs {
        run_worker,
        quiet,
        opts,
    } = args;

    let worker = run_worker.then(|| Arc::clone(tracker.worker()).start());

    let mut vm = tracker.view_model();
    let mut state = vm.subscribe();
    vm.start().await;

    if !quiet {
        eprintln!("{}", HELP);
        if !run_worker {
            eprintln!(
                "{}",
                style::format_info(
                    "Worker disabled; refreshes run when 'geotrack worker' is running.",
                    opts.no_color
                )
            );
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nShutting down...");
                break;
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = state.borrow_and_update().clone();
                println!("{}", "-".repeat(50));
                print!("{}", format_ui_state(&snapshot, opts));
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match parse_command(&line) {
                    Ok(Some(WatchCommand::Quit)) => break,
                    Ok(Some(WatchCommand::Help)) => eprintln!("{}", HELP),
                    Ok(Some(WatchCommand::Intent(intent))) => vm.dispatch(intent).await,
                    Ok(None) => {}
                    Err(message) => eprintln!("{}", style::format_warning(&message, opts.no_color)),
                },
                // EOF: keep rendering until Ctrl+C
                Ok(None) => stdin_open = false,
                Err(e) => {
                    tracing::warn!("Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },
        }
    }

    vm.close();
    if let Some(handle) = worker {
        handle.shutdown().await?;
    }
    Ok(())
}
