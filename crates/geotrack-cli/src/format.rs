//! Output formatting utilities for text, JSON, and CSV output.

use anyhow::Result;
use owo_colors::OwoColorize;
use serde::Serialize;
use time::OffsetDateTime;
use time::macros::format_description;

use geotrack_core::UiState;
use geotrack_store::StoredWork;
use geotrack_types::{LocationRecord, millis_to_datetime};

use crate::style;

/// Formatting options for output.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    /// Disable colored output.
    pub no_color: bool,
    /// Omit header row in CSV output.
    pub no_header: bool,
    /// Use compact JSON output (no pretty-printing).
    pub compact: bool,
}

impl FormatOptions {
    pub fn new(no_color: bool, compact: bool) -> Self {
        Self {
            no_color,
            no_header: false,
            compact,
        }
    }

    #[must_use]
    pub fn with_no_header(mut self, no_header: bool) -> Self {
        self.no_header = no_header;
        self
    }

    /// Serialize to JSON honoring the compact flag, with a trailing newline.
    pub fn as_json<T: Serialize>(&self, value: &T) -> Result<String> {
        let mut json = if self.compact {
            serde_json::to_string(value)?
        } else {
            serde_json::to_string_pretty(value)?
        };
        json.push('\n');
        Ok(json)
    }
}

/// RFC3339 rendering of a millisecond timestamp, empty when out of range.
pub fn format_rfc3339(millis: i64) -> String {
    millis_to_datetime(millis)
        .and_then(|dt| {
            dt.format(&time::format_description::well_known::Rfc3339)
                .ok()
        })
        .unwrap_or_default()
}

/// Short `YYYY-MM-DD HH:MM:SS` rendering (UTC) for tables.
pub fn format_short_time(millis: i64) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    millis_to_datetime(millis)
        .and_then(|dt| dt.format(&format).ok())
        .unwrap_or_else(|| millis.to_string())
}

/// Human-friendly age of a timestamp relative to `now`.
pub fn format_age(millis: i64, now: OffsetDateTime) -> String {
    let Some(then) = millis_to_datetime(millis) else {
        return "-".to_string();
    };
    let seconds = (now - then).whole_seconds();
    if seconds < 0 {
        "in the future".to_string()
    } else if seconds < 60 {
        format!("{}s ago", seconds)
    } else if seconds < 3600 {
        format!("{}m ago", seconds / 60)
    } else if seconds < 86_400 {
        format!("{}h ago", seconds / 3600)
    } else {
        format!("{}d ago", seconds / 86_400)
    }
}

// ============================================================================
// Locations
// ============================================================================

pub fn format_locations_text(locations: &[LocationRecord], opts: &FormatOptions) -> String {
    use tabled::builder::Builder;

    if locations.is_empty() {
        return "No locations stored.\n".to_string();
    }

    // Narrow terminals drop the age column
    let show_age = style::terminal_width() >= 80;
    let now = OffsetDateTime::now_utc();

    let mut builder = Builder::default();
    let mut header = vec!["ID", "Latitude", "Longitude", "Captured (UTC)"];
    if show_age {
        header.push("Age");
    }
    builder.push_record(header);
    for record in locations {
        let mut row = vec![
            record.id.to_string(),
            record.latitude.to_string(),
            record.longitude.to_string(),
            format_short_time(record.timestamp),
        ];
        if show_age {
            row.push(format_age(record.timestamp, now));
        }
        builder.push_record(row);
    }

    let mut table = builder.build();
    style::apply_table_style(&mut table, opts.no_color);

    format!(
        "{}\n\n{}\n",
        style::format_title(&format!("Locations ({})", locations.len()), opts.no_color),
        table
    )
}

// ============================================================================
// Jobs
// ============================================================================

pub fn format_jobs_text(jobs: &[StoredWork], pending: u64, opts: &FormatOptions) -> String {
    use tabled::builder::Builder;

    if jobs.is_empty() {
        return "No location updates queued.\n".to_string();
    }

    let mut builder = Builder::default();
    builder.push_record(["ID", "State", "Attempts", "Enqueued (UTC)", "Next run", "Last error"]);
    for job in jobs {
        let next_run = if job.state.is_terminal() {
            "-".to_string()
        } else {
            format_short_time(job.next_run_at)
        };
        builder.push_record([
            job.id.to_string(),
            style::format_work_state(job.state, opts.no_color),
            format!("{}/{}", job.attempts, job.max_attempts),
            format_short_time(job.enqueued_at),
            next_run,
            job.last_error.clone().unwrap_or_default(),
        ]);
    }

    let mut table = builder.build();
    style::apply_table_style(&mut table, opts.no_color);

    format!(
        "{}\n\n{}\n{} pending\n",
        style::format_title(&format!("Jobs ({})", jobs.len()), opts.no_color),
        table,
        pending
    )
}

pub fn format_jobs_csv(jobs: &[StoredWork], opts: &FormatOptions) -> String {
    let mut output = String::new();
    if !opts.no_header {
        output.push_str("id,state,attempts,max_attempts,enqueued_at,next_run_at,last_error\n");
    }
    for job in jobs {
        output.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            job.id,
            job.state,
            job.attempts,
            job.max_attempts,
            format_rfc3339(job.enqueued_at),
            format_rfc3339(job.next_run_at),
            csv_escape(job.last_error.as_deref().unwrap_or_default())
        ));
    }
    output
}

pub fn format_jobs_json(jobs: &[StoredWork], opts: &FormatOptions) -> Result<String> {
    opts.as_json(&jobs)
}

/// Escape a value for CSV output.
pub fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

// ============================================================================
// Watch
// ============================================================================

/// Render a view-model snapshot for the watch screen.
pub fn format_ui_state(state: &UiState, opts: &FormatOptions) -> String {
    let now = OffsetDateTime::now_utc();
    let mut lines = Vec::new();

    let status = if state.is_loading {
        "refreshing..."
    } else {
        "idle"
    };
    lines.push(format!(
        "{} stored | {}",
        state.locations.len(),
        if opts.no_color {
            status.to_string()
        } else {
            status.dimmed().to_string()
        }
    ));

    match state.latest() {
        Some(latest) => lines.push(format!(
            "Latest: #{} {}, {} ({})",
            latest.id,
            latest.position.latitude,
            latest.position.longitude,
            format_age(latest.timestamp, now)
        )),
        None => lines.push("Latest: none yet (press r to refresh)".to_string()),
    }

    if let Some(selected) = state.selected_location() {
        lines.push(format!(
            "Selected: #{} {}, {} at {}",
            selected.id,
            selected.position.latitude,
            selected.position.longitude,
            format_short_time(selected.timestamp)
        ));
    }

    if let Some(error) = &state.error {
        lines.push(style::format_error(error, opts.no_color));
    }

    if state.is_history_sheet_visible {
        lines.push(String::new());
        if state.locations.is_empty() {
            lines.push("  (history is empty)".to_string());
        }
        for location in &state.locations {
            let marker = if state.selected_location_id == Some(location.id) {
                ">"
            } else {
                " "
            };
            lines.push(format!(
                "{} #{:<5} {:>10} {:>11}  {}",
                marker,
                location.id,
                location.position.latitude,
                location.position.longitude,
                format_short_time(location.timestamp)
            ));
        }
    }

    let mut output = lines.join("\n");
    output.push('\n');
    output
}
