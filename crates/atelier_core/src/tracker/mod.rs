//! Status and log tracking for active and recent runs.
//!
//! The tracker is the only surface the caller-facing layer reads from.
//! Status queries return cloned snapshots, never live references, so a
//! reader can never observe a torn write. Every recorded transition is also
//! persisted to the project's `run.json` so state survives process restart.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::logging::{LogEntry, RunLogger};
use crate::models::PipelineRun;

struct TrackedRun {
    run: PipelineRun,
    logger: Arc<RunLogger>,
    record_path: PathBuf,
}

/// In-memory registry of the latest run per project, with durable records.
pub struct StatusTracker {
    runs: RwLock<HashMap<String, TrackedRun>>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
        }
    }

    /// Register a fresh run and persist its initial record.
    pub fn begin_run(&self, run: PipelineRun, logger: Arc<RunLogger>, record_path: PathBuf) {
        persist_record(&run, &record_path);
        let project_id = run.project_id.clone();
        self.runs.write().insert(
            project_id,
            TrackedRun {
                run,
                logger,
                record_path,
            },
        );
    }

    /// Apply a state transition and persist the updated record.
    pub fn update<F>(&self, project_id: &str, mutate: F)
    where
        F: FnOnce(&mut PipelineRun),
    {
        let mut runs = self.runs.write();
        if let Some(tracked) = runs.get_mut(project_id) {
            mutate(&mut tracked.run);
            persist_record(&tracked.run, &tracked.record_path);
        }
    }

    /// Read-consistent copy of the project's latest run.
    pub fn snapshot(&self, project_id: &str) -> Option<PipelineRun> {
        self.runs.read().get(project_id).map(|t| t.run.clone())
    }

    /// The run logger for the project's latest run, when still registered.
    pub fn logger(&self, project_id: &str) -> Option<Arc<RunLogger>> {
        self.runs.read().get(project_id).map(|t| t.logger.clone())
    }

    /// The most recent log entries for the project's latest run.
    pub fn recent_log(&self, project_id: &str, max_lines: usize) -> Option<Vec<LogEntry>> {
        self.logger(project_id).map(|logger| logger.recent(max_lines))
    }

    /// Load a persisted run record from a project's `run.json`.
    pub fn load_persisted(record_path: &Path) -> Option<PipelineRun> {
        let content = fs::read_to_string(record_path).ok()?;
        serde_json::from_str(&content).ok()
    }
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Persist a run record atomically. A persistence failure never interrupts
/// the run itself; it is logged and the in-memory record stays current.
fn persist_record(run: &PipelineRun, path: &Path) {
    let content = match serde_json::to_string_pretty(run) {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!(run_id = %run.run_id, error = %e, "failed to serialize run record");
            return;
        }
    };

    if let Err(e) = atomic_write(path, content.as_bytes()) {
        tracing::warn!(
            run_id = %run.run_id,
            path = %path.display(),
            error = %e,
            "failed to persist run record"
        );
    }
}

fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp_path = path.with_extension("json.tmp");

    {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
    }

    fs::rename(&temp_path, path)?;
    Ok(())
}
