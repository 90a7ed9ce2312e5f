//! External job invocation.
//!
//! Stages delegate all heavy work to external tools. Two invocation styles
//! exist: synchronous subprocesses (render engine, motion engine) and
//! asynchronous job submission to the diffusion backend's HTTP API. Both
//! share the same timeout and cancellation contract and report a
//! [`JobResult`].

pub mod backend;
pub mod process;
pub mod workflow;

pub use backend::{BackendClient, BackendError};
pub use workflow::WorkflowError;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Settings;
use crate::logging::RunLogger;

/// Cooperative cancellation flag shared between a run's owner and worker.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// A synchronous subprocess invocation.
#[derive(Debug, Clone)]
pub struct ProcessJob {
    /// Program to execute.
    pub program: String,
    /// Arguments, already fully rendered.
    pub args: Vec<String>,
    /// Working directory for the process.
    pub current_dir: Option<PathBuf>,
}

impl ProcessJob {
    /// The command line as it is logged.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// An asynchronous job for the diffusion backend: a workflow template plus
/// the slot values to substitute into it.
#[derive(Debug, Clone)]
pub struct ServiceJob {
    /// Template filename under the workflows directory.
    pub template: String,
    /// Slot name to value bindings.
    pub slots: BTreeMap<String, serde_json::Value>,
}

/// One unit of external work.
#[derive(Debug, Clone)]
pub enum StageJob {
    Process(ProcessJob),
    Service(ServiceJob),
}

/// Everything an invocation needs besides the job itself.
pub struct JobContext<'a> {
    /// Stage label for log entries.
    pub stage_label: &'a str,
    /// Wall-clock budget for this invocation.
    pub timeout: Duration,
    /// Cancellation signal to honor.
    pub cancel: &'a CancelHandle,
    /// Run logger receiving progress lines.
    pub logger: &'a RunLogger,
    /// Directory the invocation's artifacts land in.
    pub output_dir: &'a Path,
}

/// Result of one external invocation.
///
/// `TimedOut` and `Cancelled` are deliberately distinct from `Failed`:
/// the run record distinguishes the three.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Success { artifacts: Vec<PathBuf> },
    Failed { detail: String },
    TimedOut,
    Cancelled,
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success { .. })
    }
}

/// Executes stage jobs. The production implementation talks to real tools;
/// tests substitute scripted implementations.
pub trait JobInvoker: Send + Sync {
    fn invoke(&self, job: &StageJob, ctx: &JobContext<'_>) -> JobResult;
}

/// Production invoker: subprocesses plus the diffusion backend client.
pub struct ToolInvoker {
    backend: BackendClient,
    workflows_dir: PathBuf,
}

impl ToolInvoker {
    pub fn new(settings: &Settings) -> Self {
        let backend_root = PathBuf::from(&settings.paths.backend_root);
        Self {
            backend: BackendClient::new(&settings.backend, &backend_root),
            workflows_dir: PathBuf::from(&settings.paths.workflows_dir),
        }
    }

    pub fn backend(&self) -> &BackendClient {
        &self.backend
    }
}

impl JobInvoker for ToolInvoker {
    fn invoke(&self, job: &StageJob, ctx: &JobContext<'_>) -> JobResult {
        match job {
            StageJob::Process(process_job) => process::run_process(process_job, ctx),
            StageJob::Service(service_job) => {
                let template_path = self.workflows_dir.join(&service_job.template);
                let graph = match workflow::load_template(&template_path) {
                    Ok(graph) => graph,
                    Err(e) => return JobResult::Failed { detail: e.to_string() },
                };
                let rendered = match workflow::render(&graph, &service_job.slots) {
                    Ok(rendered) => rendered,
                    Err(e) => return JobResult::Failed { detail: e.to_string() },
                };
                self.backend.run(&rendered, ctx)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_handle_propagates_between_clones() {
        let handle = CancelHandle::new();
        let clone = handle.clone();

        assert!(!clone.is_cancelled());
        handle.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn process_job_display_joins_command_line() {
        let job = ProcessJob {
            program: "blender".to_string(),
            args: vec!["--background".to_string(), "--python".to_string()],
            current_dir: None,
        };
        assert_eq!(job.display(), "blender --background --python");
    }
}
