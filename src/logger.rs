//! Structured logging for MintScout
//!
//! Tag + event oriented logging with:
//! - Standard levels (Error/Warning/Info/Debug/Verbose)
//! - Per-module debug gating via `--debug-<module>` flags
//! - Dual output: colored console + plain file under the logs directory
//!
//! ```ignore
//! logger::info(LogTag::Discovery, "Aggregator cycle complete");
//! logger::log(LogTag::Intake, "CLAIMED", "8 assets claimed for analysis");
//! ```

use chrono::Local;
use colored::*;
use once_cell::sync::Lazy;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Mutex;

use crate::arguments;
use crate::paths;

/// Log level ordering: Error < Warning < Info < Debug < Verbose
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warning = 1,
    Info = 2,
    Debug = 3,
    Verbose = 4,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warning => "WARNING",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Verbose => "VERBOSE",
        }
    }
}

/// Module tags used to label and filter log output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTag {
    System,
    Config,
    Database,
    Health,
    Http,
    Discovery,
    Firehose,
    Aggregator,
    Intake,
    Scoring,
    Reanalysis,
    Maintenance,
    Dispatch,
    Telegram,
    Diag,
}

impl LogTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogTag::System => "SYSTEM",
            LogTag::Config => "CONFIG",
            LogTag::Database => "DATABASE",
            LogTag::Health => "HEALTH",
            LogTag::Http => "HTTP",
            LogTag::Discovery => "DISCOVERY",
            LogTag::Firehose => "FIREHOSE",
            LogTag::Aggregator => "AGGREGATOR",
            LogTag::Intake => "INTAKE",
            LogTag::Scoring => "SCORING",
            LogTag::Reanalysis => "REANALYSIS",
            LogTag::Maintenance => "MAINTAIN",
            LogTag::Dispatch => "DISPATCH",
            LogTag::Telegram => "TELEGRAM",
            LogTag::Diag => "DIAG",
        }
    }

    /// Whether debug output is enabled for this tag via CLI flags
    fn debug_enabled(&self) -> bool {
        if arguments::is_verbose_enabled() {
            return true;
        }
        match self {
            LogTag::Discovery | LogTag::Aggregator => arguments::is_debug_discovery_enabled(),
            LogTag::Firehose => arguments::is_debug_firehose_enabled(),
            LogTag::Http | LogTag::Health => arguments::is_debug_api_enabled(),
            LogTag::Intake => arguments::is_debug_intake_enabled(),
            LogTag::Scoring => arguments::is_debug_scoring_enabled(),
            LogTag::Reanalysis => arguments::is_debug_reanalysis_enabled(),
            LogTag::Dispatch | LogTag::Telegram => arguments::is_debug_dispatch_enabled(),
            LogTag::Database => arguments::is_debug_database_enabled(),
            _ => false,
        }
    }
}

const TAG_WIDTH: usize = 10;
const EVENT_WIDTH: usize = 18;

/// File mirror handle, opened once at init
static LOG_FILE: Lazy<Mutex<Option<File>>> = Lazy::new(|| Mutex::new(None));

/// Initialize the logger system
///
/// Must be called once at startup after the logs directory exists.
pub fn init() {
    let path = paths::get_logs_directory().join(format!(
        "mintscout_{}.log",
        Local::now().format("%Y-%m-%d")
    ));
    match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => {
            if let Ok(mut guard) = LOG_FILE.lock() {
                *guard = Some(file);
            }
        }
        Err(e) => {
            eprintln!("Log file unavailable ({}): {}", path.display(), e);
        }
    }
}

fn write_to_file(line: &str) {
    if let Ok(mut guard) = LOG_FILE.lock() {
        if let Some(file) = guard.as_mut() {
            let _ = writeln!(file, "{}", line);
        }
    }
}

fn format_tag(tag: LogTag) -> ColoredString {
    let padded = format!("{:<width$}", tag.as_str(), width = TAG_WIDTH);
    match tag {
        LogTag::System | LogTag::Config => padded.bright_yellow().bold(),
        LogTag::Database | LogTag::Maintenance => padded.bright_blue().bold(),
        LogTag::Health | LogTag::Http => padded.bright_green().bold(),
        LogTag::Discovery | LogTag::Firehose | LogTag::Aggregator => padded.magenta().bold(),
        LogTag::Intake | LogTag::Scoring | LogTag::Reanalysis => padded.bright_cyan().bold(),
        LogTag::Dispatch | LogTag::Telegram => padded.cyan().bold(),
        LogTag::Diag => padded.white().bold(),
    }
}

fn format_event(event: &str) -> ColoredString {
    let padded = format!("{:<width$}", event, width = EVENT_WIDTH);
    match event {
        "ERROR" | "FAILED" | "DISCONNECTED" => padded.red().bold(),
        "WARNING" | "STALE" | "SKIPPED" | "BACKOFF" => padded.yellow(),
        "SUCCESS" | "CONNECTED" | "ANALYZED" => padded.green(),
        _ => padded.normal(),
    }
}

fn emit(tag: LogTag, event: &str, message: &str, colorize_message: Option<Color>) {
    let time = Local::now().format("%H:%M:%S").to_string();
    let body = match colorize_message {
        Some(color) => message.color(color).to_string(),
        None => message.to_string(),
    };
    println!(
        "{} [{}] [{}] {}",
        time.dimmed(),
        format_tag(tag),
        format_event(event),
        body
    );

    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    write_to_file(&format!(
        "{} [{}] [{}] {}",
        timestamp,
        tag.as_str(),
        event,
        message
    ));
}

/// Tag + event style logging, always shown
pub fn log(tag: LogTag, event: &str, message: &str) {
    emit(tag, event, message, None);
}

/// Log at ERROR level (always shown)
pub fn error(tag: LogTag, message: &str) {
    emit(tag, LogLevel::Error.as_str(), message, Some(Color::Red));
}

/// Log at WARNING level
pub fn warning(tag: LogTag, message: &str) {
    emit(tag, LogLevel::Warning.as_str(), message, Some(Color::Yellow));
}

/// Log at INFO level (standard operations)
pub fn info(tag: LogTag, message: &str) {
    emit(tag, LogLevel::Info.as_str(), message, None);
}

/// Log at DEBUG level - only shown when `--debug-<module>` is set for the tag
pub fn debug(tag: LogTag, message: &str) {
    if tag.debug_enabled() {
        emit(tag, LogLevel::Debug.as_str(), message, None);
    }
}

/// Log at VERBOSE level - only shown with `--verbose`
pub fn verbose(tag: LogTag, message: &str) {
    if arguments::is_verbose_enabled() {
        emit(tag, LogLevel::Verbose.as_str(), message, None);
    }
}
