//! Per-run logger with durable file and callback output.
//!
//! Each run gets its own logger that:
//! - Appends to a dedicated log file, flushed per entry (survives crashes)
//! - Keeps a bounded in-memory tail so recent-N queries never re-read the file
//! - Sends formatted lines to an optional callback for live streaming
//! - Maintains a separate subprocess output tail for failure detail

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use super::types::{LogCallback, LogConfig, LogEntry, LogLevel, MessagePrefix};

/// Per-run logger with dual output (file + callback).
pub struct RunLogger {
    /// Project this run belongs to.
    project_id: String,
    /// Run identifier (used in the log filename).
    run_id: String,
    /// Path to log file.
    log_path: PathBuf,
    /// File writer (buffered, flushed per entry).
    file_writer: Arc<Mutex<Option<BufWriter<File>>>>,
    /// Callback for live line streaming.
    callback: Arc<Mutex<Option<LogCallback>>>,
    /// Logging configuration.
    config: LogConfig,
    /// Recent entries for tail queries.
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
    /// Recent subprocess output lines (used for error diagnosis).
    output_tail: Arc<Mutex<VecDeque<String>>>,
}

impl RunLogger {
    /// Create a logger for a fresh run.
    ///
    /// # Arguments
    /// * `project_id` - Owning project
    /// * `run_id` - Run identifier (used in log filename)
    /// * `log_dir` - Directory to write the log file to
    /// * `config` - Logging configuration
    /// * `callback` - Optional callback for live output
    pub fn create(
        project_id: impl Into<String>,
        run_id: impl Into<String>,
        log_dir: impl AsRef<Path>,
        config: LogConfig,
        callback: Option<LogCallback>,
    ) -> std::io::Result<Self> {
        let project_id = project_id.into();
        let run_id = run_id.into();
        let log_dir = log_dir.as_ref();

        fs::create_dir_all(log_dir)?;

        let log_path = log_path_for(log_dir, &run_id);
        let file = File::create(&log_path)?;

        Ok(Self {
            project_id,
            run_id,
            log_path,
            file_writer: Arc::new(Mutex::new(Some(BufWriter::new(file)))),
            callback: Arc::new(Mutex::new(callback)),
            config,
            entries: Arc::new(Mutex::new(VecDeque::new())),
            output_tail: Arc::new(Mutex::new(VecDeque::new())),
        })
    }

    /// Reopen an existing run log in append mode.
    ///
    /// Preloads the tail cache from the file so recent-N queries work
    /// immediately after a process restart.
    pub fn open_existing(
        project_id: impl Into<String>,
        run_id: impl Into<String>,
        log_path: impl Into<PathBuf>,
        config: LogConfig,
    ) -> std::io::Result<Self> {
        let log_path = log_path.into();

        let mut entries = VecDeque::new();
        if let Ok(content) = fs::read_to_string(&log_path) {
            for line in content.lines() {
                if let Some(entry) = LogEntry::parse_line(line) {
                    if entries.len() >= config.tail_cache {
                        entries.pop_front();
                    }
                    entries.push_back(entry);
                }
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&log_path)?;

        Ok(Self {
            project_id: project_id.into(),
            run_id: run_id.into(),
            log_path,
            file_writer: Arc::new(Mutex::new(Some(BufWriter::new(file)))),
            callback: Arc::new(Mutex::new(None)),
            config,
            entries: Arc::new(Mutex::new(entries)),
            output_tail: Arc::new(Mutex::new(VecDeque::new())),
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the log file path.
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Append an entry at the specified level.
    pub fn append(&self, level: LogLevel, stage: &str, message: &str) {
        if level < self.config.level {
            return;
        }

        let entry = LogEntry::new(level, stage, message);

        // Persist first: file lines always carry timestamps so they parse
        // back after a restart.
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writeln!(writer, "{}", entry.format_line(true));
            let _ = writer.flush();
        }

        if let Some(ref callback) = *self.callback.lock() {
            callback(&entry.format_line(self.config.show_timestamps));
        }

        let mut entries = self.entries.lock();
        if entries.len() >= self.config.tail_cache {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Log an info message.
    pub fn info(&self, stage: &str, message: &str) {
        self.append(LogLevel::Info, stage, message);
    }

    /// Log a debug message.
    pub fn debug(&self, stage: &str, message: &str) {
        self.append(LogLevel::Debug, stage, message);
    }

    /// Log a warning message.
    pub fn warn(&self, stage: &str, message: &str) {
        self.append(LogLevel::Warn, stage, message);
    }

    /// Log an error message.
    pub fn error(&self, stage: &str, message: &str) {
        self.append(LogLevel::Error, stage, message);
    }

    /// Log a command being executed.
    pub fn command(&self, stage: &str, command: &str) {
        self.append(LogLevel::Info, stage, &MessagePrefix::Command.format(command));
    }

    /// Log a phase marker.
    pub fn phase(&self, stage: &str, title: &str) {
        self.append(LogLevel::Info, stage, &MessagePrefix::Phase.format(title));
    }

    /// Log a section marker.
    pub fn section(&self, stage: &str, title: &str) {
        self.append(LogLevel::Info, stage, &MessagePrefix::Section.format(title));
    }

    /// Log a success message.
    pub fn success(&self, stage: &str, message: &str) {
        self.append(LogLevel::Info, stage, &MessagePrefix::Success.format(message));
    }

    /// Log one line of subprocess output as it is produced.
    ///
    /// The line becomes a regular log entry and is also kept in the output
    /// tail for failure detail.
    pub fn output_line(&self, stage: &str, line: &str, is_stderr: bool) {
        {
            let mut tail = self.output_tail.lock();
            if tail.len() >= self.config.error_tail {
                tail.pop_front();
            }
            tail.push_back(line.to_string());
        }

        if is_stderr {
            self.append(LogLevel::Info, stage, &format!("[stderr] {}", line));
        } else {
            self.append(LogLevel::Info, stage, line);
        }
    }

    /// The most recent `n` entries, oldest first.
    ///
    /// Served from the in-memory tail; only falls back to reading the file
    /// when more entries are requested than the cache holds.
    pub fn recent(&self, n: usize) -> Vec<LogEntry> {
        {
            let entries = self.entries.lock();
            if n <= entries.len() {
                return entries.iter().skip(entries.len() - n).cloned().collect();
            }
        }

        let from_file = read_log_tail(&self.log_path, n);
        if from_file.is_empty() {
            self.entries.lock().iter().cloned().collect()
        } else {
            from_file
        }
    }

    /// Get the current subprocess output tail.
    pub fn tail_output(&self) -> Vec<String> {
        self.output_tail.lock().iter().cloned().collect()
    }

    /// Clear the subprocess output tail (called between invocations).
    pub fn clear_tail(&self) {
        self.output_tail.lock().clear();
    }

    /// Flush the log file.
    pub fn flush(&self) {
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writer.flush();
        }
    }

    /// Close the logger and release resources.
    pub fn close(&self) {
        self.flush();
        *self.file_writer.lock() = None;
    }
}

impl Drop for RunLogger {
    fn drop(&mut self) {
        self.close();
    }
}

/// The log file path a run's logger writes to.
pub fn log_path_for(log_dir: &Path, run_id: &str) -> PathBuf {
    log_dir.join(format!("{}.log", sanitize_filename(run_id)))
}

/// The most recent `n` parseable entries of a log file, oldest first.
///
/// Missing or unreadable files yield an empty result; log queries must
/// never fail a status call.
pub fn read_log_tail(path: &Path, n: usize) -> Vec<LogEntry> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let all: Vec<LogEntry> = content.lines().filter_map(LogEntry::parse_line).collect();
            let start = all.len().saturating_sub(n);
            all[start..].to_vec()
        }
        Err(_) => Vec::new(),
    }
}

/// Sanitize a string to be safe for use as a filename.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn make_logger(dir: &Path) -> RunLogger {
        RunLogger::create("hero", "run-1", dir, LogConfig::default(), None).unwrap()
    }

    #[test]
    fn creates_log_file_named_by_run() {
        let dir = tempdir().unwrap();
        let logger = make_logger(dir.path());

        assert!(logger.log_path().exists());
        assert!(logger.log_path().to_string_lossy().contains("run-1.log"));
    }

    #[test]
    fn entries_are_persisted_per_append() {
        let dir = tempdir().unwrap();
        let logger = make_logger(dir.path());

        logger.info("textures", "submitting job");
        // No explicit flush: append flushes for durability.
        let content = fs::read_to_string(logger.log_path()).unwrap();
        assert!(content.contains("submitting job"));
        assert!(content.contains("[textures]"));
    }

    #[test]
    fn calls_callback_per_entry() {
        let dir = tempdir().unwrap();
        let call_count = Arc::new(AtomicUsize::new(0));
        let count_clone = call_count.clone();

        let callback: LogCallback = Box::new(move |_line| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        let logger = RunLogger::create(
            "hero",
            "run-1",
            dir.path(),
            LogConfig::default(),
            Some(callback),
        )
        .unwrap();

        logger.info("run", "one");
        logger.warn("run", "two");

        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn recent_returns_last_entries_in_order() {
        let dir = tempdir().unwrap();
        let logger = make_logger(dir.path());

        for i in 0..10 {
            logger.info("run", &format!("entry {}", i));
        }

        let recent = logger.recent(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].message, "entry 7");
        assert_eq!(recent[2].message, "entry 9");
    }

    #[test]
    fn recent_falls_back_to_file_beyond_cache() {
        let dir = tempdir().unwrap();
        let config = LogConfig {
            tail_cache: 2,
            ..LogConfig::default()
        };
        let logger =
            RunLogger::create("hero", "run-1", dir.path(), config, None).unwrap();

        for i in 0..6 {
            logger.info("run", &format!("entry {}", i));
        }

        // Cache only holds 2, but the file has all 6.
        let recent = logger.recent(5);
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].message, "entry 1");
        assert_eq!(recent[4].message, "entry 5");
    }

    #[test]
    fn open_existing_preloads_tail_and_appends() {
        let dir = tempdir().unwrap();
        let path = {
            let logger = make_logger(dir.path());
            logger.info("run", "before restart");
            logger.log_path().to_path_buf()
        };

        let reopened =
            RunLogger::open_existing("hero", "run-1", &path, LogConfig::default()).unwrap();
        reopened.info("run", "after restart");

        let recent = reopened.recent(10);
        let messages: Vec<&str> = recent.iter().map(|e| e.message.as_str()).collect();
        assert!(messages.contains(&"before restart"));
        assert!(messages.contains(&"after restart"));

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("before restart"));
        assert!(content.contains("after restart"));
    }

    #[test]
    fn output_tail_maintains_limit() {
        let dir = tempdir().unwrap();
        let config = LogConfig {
            error_tail: 5,
            ..LogConfig::default()
        };
        let logger =
            RunLogger::create("hero", "run-1", dir.path(), config, None).unwrap();

        for i in 0..10 {
            logger.output_line("rigging", &format!("line {}", i), false);
        }

        let tail = logger.tail_output();
        assert_eq!(tail.len(), 5);
        assert_eq!(tail[0], "line 5");
        assert_eq!(tail[4], "line 9");
    }

    #[test]
    fn stderr_lines_are_marked() {
        let dir = tempdir().unwrap();
        let logger = make_logger(dir.path());

        logger.output_line("export", "something broke", true);

        let recent = logger.recent(1);
        assert!(recent[0].message.starts_with("[stderr]"));
    }

    #[test]
    fn sanitizes_filename() {
        assert_eq!(sanitize_filename("normal_name"), "normal_name");
        assert_eq!(sanitize_filename("has/slash"), "has_slash");
        assert_eq!(sanitize_filename("a<b>c"), "a_b_c");
    }

    #[test]
    fn read_log_tail_matches_logger_path() {
        let dir = tempdir().unwrap();
        let logger = make_logger(dir.path());
        for i in 0..4 {
            logger.info("run", &format!("entry {}", i));
        }
        logger.close();

        let path = log_path_for(dir.path(), "run-1");
        assert_eq!(path, logger.log_path());

        let tail = read_log_tail(&path, 2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[1].message, "entry 3");

        assert!(read_log_tail(&dir.path().join("absent.log"), 2).is_empty());
    }
}
