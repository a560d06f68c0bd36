//! Visual styling utilities for the CLI.
//!
//! Spinners for long-running operations, status message prefixes and table
//! styling.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

use geotrack_store::WorkState;

/// Standard spinner tick characters (Braille dots animation)
const SPINNER_TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Standard spinner tick interval
const SPINNER_TICK_MS: u64 = 80;

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars(SPINNER_TICK_CHARS)
}

/// Create a spinner for generic operations.
pub fn operation_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(spinner_style());
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
    pb
}

/// Format a success message.
pub fn format_success(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[OK] {}", message)
    } else {
        format!("{} {}", "[OK]".green(), message)
    }
}

/// Format an info message.
pub fn format_info(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[--] {}", message)
    } else {
        format!("{} {}", "[--]".cyan(), message)
    }
}

/// Format a warning message.
pub fn format_warning(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[!!] {}", message)
    } else {
        format!("{} {}", "[!!]".yellow(), message)
    }
}

/// Format an error message.
pub fn format_error(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[XX] {}", message)
    } else {
        format!("{} {}", "[XX]".red(), message)
    }
}

/// Color a work state by outcome.
pub fn format_work_state(state: WorkState, no_color: bool) -> String {
    let label = state.as_str();
    if no_color {
        return label.to_string();
    }
    match state {
        WorkState::Succeeded => label.green().to_string(),
        WorkState::Failed => label.red().to_string(),
        WorkState::Retrying => label.yellow().to_string(),
        WorkState::Running => label.cyan().to_string(),
        WorkState::Enqueued => label.dimmed().to_string(),
    }
}

/// Format a section title.
pub fn format_title(title: &str, no_color: bool) -> String {
    if no_color {
        format!("{}\n{}", title, "-".repeat(title.len()))
    } else {
        format!("{}\n{}", title.bold(), "━".repeat(title.len()).dimmed())
    }
}

/// Get terminal width, defaulting to 80 if detection fails.
pub fn terminal_width() -> usize {
    terminal_size::terminal_size()
        .map(|(w, _)| w.0 as usize)
        .unwrap_or(80)
}

/// Apply table style; plain output gets no borders.
pub fn apply_table_style(table: &mut tabled::Table, no_color: bool) {
    use tabled::settings::Style;
    if no_color {
        table.with(Style::blank());
    } else {
        table.with(Style::rounded());
    }
}
