//! Logging types and configuration.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::LoggingSettings;

/// Log level for filtering messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum LogLevel {
    /// Trace-level debugging (very verbose).
    Trace,
    /// Debug information.
    Debug,
    /// General information.
    #[default]
    Info,
    /// Warnings.
    Warn,
    /// Errors.
    Error,
}

impl LogLevel {
    /// Fixed-width tag used in formatted log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    /// Parse a level tag from a formatted log line.
    pub fn parse_tag(tag: &str) -> Option<LogLevel> {
        match tag {
            "TRACE" => Some(LogLevel::Trace),
            "DEBUG" => Some(LogLevel::Debug),
            "INFO" => Some(LogLevel::Info),
            "WARN" => Some(LogLevel::Warn),
            "ERROR" => Some(LogLevel::Error),
            _ => None,
        }
    }

    /// Convert to tracing level.
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Timestamp format used in persisted log lines.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One entry in a run log.
///
/// Entries are append-only: the logger never rewrites or reorders them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    /// Stage the entry belongs to ("run" for entries outside any stage).
    pub stage: String,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stage: stage.into(),
            level,
            message: message.into(),
        }
    }

    /// Format as a persisted log line.
    ///
    /// `[2024-03-01 10:11:12] [textures] INFO message`
    pub fn format_line(&self, with_timestamp: bool) -> String {
        if with_timestamp {
            format!(
                "[{}] [{}] {} {}",
                self.timestamp.format(TIMESTAMP_FORMAT),
                self.stage,
                self.level.as_str(),
                self.message
            )
        } else {
            format!("[{}] {} {}", self.stage, self.level.as_str(), self.message)
        }
    }

    /// Parse a persisted log line back into an entry.
    ///
    /// Returns None for lines that do not match the format (tolerant reload).
    pub fn parse_line(line: &str) -> Option<LogEntry> {
        let rest = line.strip_prefix('[')?;
        let (timestamp_str, rest) = rest.split_once(']')?;
        let timestamp = NaiveDateTime::parse_from_str(timestamp_str, TIMESTAMP_FORMAT)
            .ok()?
            .and_utc();

        let rest = rest.trim_start().strip_prefix('[')?;
        let (stage, rest) = rest.split_once(']')?;

        let rest = rest.trim_start();
        let (tag, message) = match rest.split_once(' ') {
            Some((tag, message)) => (tag, message),
            None => (rest, ""),
        };
        let level = LogLevel::parse_tag(tag)?;

        Some(LogEntry {
            timestamp,
            stage: stage.to_string(),
            level,
            message: message.to_string(),
        })
    }
}

/// Configuration for run logging behavior.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to record.
    pub level: LogLevel,
    /// Number of recent entries cached in memory for tail queries.
    pub tail_cache: usize,
    /// Number of subprocess output lines kept for failure detail.
    pub error_tail: usize,
    /// Show timestamps in lines sent to the callback.
    pub show_timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            tail_cache: 256,
            error_tail: 20,
            show_timestamps: true,
        }
    }
}

impl From<&LoggingSettings> for LogConfig {
    fn from(settings: &LoggingSettings) -> Self {
        Self {
            level: LogLevel::Info,
            tail_cache: settings.tail_cache,
            error_tail: settings.error_tail,
            show_timestamps: settings.show_timestamps,
        }
    }
}

/// Type alias for the live log line callback.
///
/// The callback receives each formatted log line as it is appended.
pub type LogCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Message prefix types for consistent formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagePrefix {
    /// Shell command: `$ command`
    Command,
    /// Phase marker: `=== Phase ===`
    Phase,
    /// Section marker: `--- Section ---`
    Section,
    /// Success: `[SUCCESS]`
    Success,
}

impl MessagePrefix {
    /// Format a message with this prefix.
    pub fn format(&self, message: &str) -> String {
        match self {
            MessagePrefix::Command => format!("$ {}", message),
            MessagePrefix::Phase => format!("=== {} ===", message),
            MessagePrefix::Section => format!("--- {} ---", message),
            MessagePrefix::Success => format!("[SUCCESS] {}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_order_for_filtering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Warn < LogLevel::Error);
    }

    #[test]
    fn entry_formats_and_parses_back() {
        let entry = LogEntry::new(LogLevel::Warn, "rigging", "bone count looks low");
        let line = entry.format_line(true);
        let parsed = LogEntry::parse_line(&line).unwrap();

        assert_eq!(parsed.stage, "rigging");
        assert_eq!(parsed.level, LogLevel::Warn);
        assert_eq!(parsed.message, "bone count looks low");
    }

    #[test]
    fn parse_rejects_malformed_lines() {
        assert!(LogEntry::parse_line("not a log line").is_none());
        assert!(LogEntry::parse_line("[bad ts] [stage] INFO x").is_none());
    }

    #[test]
    fn parse_keeps_bracketed_text_in_message() {
        let entry = LogEntry::new(LogLevel::Info, "animation", "[SUCCESS] clip done");
        let line = entry.format_line(true);
        let parsed = LogEntry::parse_line(&line).unwrap();
        assert_eq!(parsed.message, "[SUCCESS] clip done");
    }

    #[test]
    fn prefix_formatting() {
        assert_eq!(MessagePrefix::Command.format("blender -b"), "$ blender -b");
        assert_eq!(MessagePrefix::Phase.format("textures"), "=== textures ===");
    }
}
