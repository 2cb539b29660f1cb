//! Colored CLI display for the `run` client.
//!
//! Prints worker output received from a host, one line per frame.

use std::io::{self, Write};

use chrono::Utc;
use owo_colors::OwoColorize;
use serde_json::Value;

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Maximum length for truncated display strings.
const DEFAULT_MAX_LEN: usize = 120;

/// Truncate a string to a maximum length, adding ellipsis if truncated.
#[must_use]
pub fn truncate(s: &str, max_len: usize, raw_mode: bool) -> String {
    if raw_mode || s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return "...".to_string();
    }
    let kept: String = s.chars().take(max_len - 3).collect();
    format!("{kept}...")
}

/// Render an event payload compactly; strings are shown bare.
#[must_use]
pub fn format_payload(payload: &Value, raw_mode: bool) -> String {
    match payload {
        Value::Null => String::new(),
        Value::String(s) => truncate(s, DEFAULT_MAX_LEN, raw_mode),
        other => truncate(&other.to_string(), DEFAULT_MAX_LEN, raw_mode),
    }
}

/// Print a session-level log line.
pub fn print_session(message: &str) {
    println!(
        "{} {} {}",
        timestamp().dimmed(),
        "[SESSION]".blue().bold(),
        message
    );
    let _ = io::stdout().flush();
}

/// Print that a worker was started.
pub fn print_worker_started(id: u32, script: &str) {
    println!(
        "{} {} {} id={}",
        timestamp().dimmed(),
        "[START]".green().bold(),
        script.cyan(),
        id
    );
    let _ = io::stdout().flush();
}

/// Print one stdout line of a worker.
pub fn print_worker_log(id: u32, message: &str) {
    println!(
        "{} {} {}",
        timestamp().dimmed(),
        format!("[{id}]").dimmed(),
        message
    );
    let _ = io::stdout().flush();
}

/// Print an event a worker emitted.
pub fn print_worker_event(id: u32, event: &str, payload: &Value, raw_mode: bool) {
    println!(
        "{} {} {} {}",
        timestamp().dimmed(),
        format!("[{id}]").dimmed(),
        event.magenta(),
        format_payload(payload, raw_mode)
    );
    let _ = io::stdout().flush();
}

/// Print the stderr text of a worker that failed.
pub fn print_worker_error(text: &str) {
    let ts = timestamp();
    for line in text.lines() {
        println!("{} {} {}", ts.dimmed(), "[ERROR]".red().bold(), line.red());
    }
    let _ = io::stdout().flush();
}

/// Print that a worker ended.
pub fn print_worker_ended(id: u32, failed: bool) {
    let label = if failed {
        "[END]".red().bold().to_string()
    } else {
        "[END]".blue().bold().to_string()
    };
    println!("{} {} id={}", timestamp().dimmed(), label, id);
    let _ = io::stdout().flush();
}

/// Print a reload notification.
pub fn print_reloaded(old: u32, new: u32) {
    println!(
        "{} {} {} -> {}",
        timestamp().dimmed(),
        "[RELOAD]".yellow().bold(),
        old,
        new
    );
    let _ = io::stdout().flush();
}
