//! Output Formatting and Display Management
//!
//! Human-readable terminal output with colors, and structured JSON for scripts.
//!
//! ## Key Types
//!
//! - [`DisplayManager`] - Main interface for all display operations
//!
//! ## Output
//!
//! The `watch` command prints one block per polling cycle: each tracked window
//! with its percentage and time to reset, followed by any alerts the cycle
//! raised. Percentages are colored by how close they are to the limit:
//! green below 75%, yellow from 75%, red from 90%.
//!
//! The `snapshot` command prints the same window lines once, plus the Claude
//! extra-usage allowance when it is enabled and the status page health. With `--json` both commands emit
//! the underlying structures serialized with serde.

use chrono::{DateTime, Utc};
use colored::{ColoredString, Colorize};

use crate::commands::snapshot::{ServiceSnapshot, Snapshot};
use crate::live::{CycleReport, ServiceOutcome};
use crate::models::{ClaudeSystemStatus, Service, SessionIdentity, StatusIndicator, UsageSample};

pub struct DisplayManager {
    json_output: bool,
}

impl Default for DisplayManager {
    fn default() -> Self {
        Self::new(false)
    }
}

impl DisplayManager {
    pub fn new(json_output: bool) -> Self {
        Self { json_output }
    }

    pub fn display_cycle(&self, report: &CycleReport) {
        if self.json_output {
            match serde_json::to_string(report) {
                Ok(line) => println!("{line}"),
                Err(e) => eprintln!("Failed to serialize cycle report: {e}"),
            }
            return;
        }
        print!("{}", render_cycle(report, Utc::now()));
    }

    pub fn display_snapshot(&self, snapshot: &Snapshot) {
        if self.json_output {
            match serde_json::to_string_pretty(snapshot) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("Failed to serialize snapshot: {e}"),
            }
            return;
        }
        print!("{}", render_snapshot(snapshot, Utc::now()));
    }
}

/// Percentage colored by proximity to the limit
pub fn format_percentage(percentage: f64) -> ColoredString {
    let text = format!("{percentage:>5.1}%");
    if percentage >= 90.0 {
        text.red().bold()
    } else if percentage >= 75.0 {
        text.yellow()
    } else {
        text.green()
    }
}

/// "resets in 2h 13m" style countdown
pub fn format_reset(reset_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(reset_at) = reset_at else {
        return "reset time unknown".to_string();
    };

    let remaining = reset_at - now;
    let minutes = remaining.num_minutes();
    if minutes <= 0 {
        return "resetting now".to_string();
    }

    let days = minutes / (24 * 60);
    let hours = (minutes % (24 * 60)) / 60;
    let mins = minutes % 60;
    if days > 0 {
        format!("resets in {days}d {hours}h")
    } else if hours > 0 {
        format!("resets in {hours}h {mins}m")
    } else {
        format!("resets in {mins}m")
    }
}

fn window_line(identity: SessionIdentity, sample: &UsageSample, now: DateTime<Utc>) -> String {
    format!(
        "  {:<16} {}  {}\n",
        identity.label(),
        format_percentage(sample.percentage),
        format_reset(sample.reset_at, now).dimmed()
    )
}

fn service_header(service: Service) -> String {
    format!("{}\n", service.display_name().bold().cyan())
}

pub fn render_cycle(report: &CycleReport, now: DateTime<Utc>) -> String {
    let mut out = format!(
        "{} {}\n",
        report.started_at.format("%H:%M:%S").to_string().dimmed(),
        format!("next refresh in {}s", report.next_interval_secs).dimmed()
    );

    for outcome in &report.outcomes {
        let service = outcome.service();
        match outcome {
            ServiceOutcome::Disabled { .. } => continue,
            ServiceOutcome::Fetched { report: usage, .. } => {
                out.push_str(&service_header(service));
                for identity in service.identities() {
                    if let Some(sample) = usage.sample(identity) {
                        out.push_str(&window_line(identity, sample, now));
                    }
                }
                for extra in &usage.extras {
                    out.push_str(&format!(
                        "  {:<16} {}\n",
                        extra.name,
                        format_percentage(extra.percentage)
                    ));
                }
            }
            ServiceOutcome::Failed {
                error,
                consecutive_failures,
                ..
            } => {
                out.push_str(&service_header(service));
                // Last good readings stay visible until the summary drops them
                for identity in service.identities() {
                    if let Some(reading) = report.summary.reading(identity) {
                        out.push_str(&window_line(identity, &reading.sample, now));
                    }
                }
                out.push_str(&format!(
                    "  {} {} ({}, {} in a row)\n",
                    "!".red().bold(),
                    error.to_string().red(),
                    error.user_hint(),
                    consecutive_failures
                ));
            }
        }
    }

    for record in &report.decisions {
        out.push_str(&format!(
            "{} {}: {}\n",
            "▶".yellow().bold(),
            record.title.bold(),
            record.body
        ));
    }

    out
}

/// Status page description, with the incident count when something is wrong
pub fn format_status(status: &ClaudeSystemStatus) -> ColoredString {
    if !status.has_issue() {
        return status.description.green();
    }

    let text = match status.active_incidents {
        0 => status.description.clone(),
        1 => format!("{} (1 active incident)", status.description),
        n => format!("{} ({n} active incidents)", status.description),
    };
    match status.indicator {
        StatusIndicator::Minor => text.yellow(),
        _ => text.red(),
    }
}

pub fn render_snapshot(snapshot: &Snapshot, now: DateTime<Utc>) -> String {
    let mut out = String::new();

    for entry in &snapshot.services {
        out.push_str(&render_service_snapshot(entry, now));
    }

    if snapshot.services.is_empty() {
        out.push_str(&format!("{}\n", "No services enabled".yellow()));
    }

    out
}

fn render_service_snapshot(entry: &ServiceSnapshot, now: DateTime<Utc>) -> String {
    let mut out = service_header(entry.service);

    if let Some(report) = &entry.report {
        for identity in entry.service.identities() {
            if let Some(sample) = report.sample(identity) {
                out.push_str(&window_line(identity, sample, now));
            }
        }
        for extra in &report.extras {
            out.push_str(&format!(
                "  {:<16} {}\n",
                extra.name,
                format_percentage(extra.percentage)
            ));
        }
        if let Some(plan) = &report.plan {
            out.push_str(&format!("  {:<16} {}\n", "plan", plan));
        }
        if let Some(credits) = &report.credits {
            out.push_str(&format!("  {:<16} {}\n", "credits", credits));
        }
    }

    if let Some(overage) = &entry.overage {
        if overage.is_enabled {
            out.push_str(&format!(
                "  {:<16} {} {:.2} of {:.2} {}\n",
                "extra usage",
                format_percentage(overage.usage_percentage()),
                overage.used_credits(),
                overage.monthly_credit_limit(),
                overage.currency
            ));
        }
    }

    if let Some(status) = &entry.status {
        out.push_str(&format!("  {:<16} {}\n", "status", format_status(status)));
    }

    if let Some(error) = &entry.error {
        out.push_str(&format!(
            "  {} {} ({})\n",
            "!".red().bold(),
            error.to_string().red(),
            error.user_hint()
        ));
    }

    out
}
