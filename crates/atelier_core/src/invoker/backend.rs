//! Client for the diffusion backend's HTTP job API.
//!
//! The backend is a long-lived service: jobs are submitted as rendered
//! workflow graphs to `POST /prompt`, then polled through `GET /history/{id}`
//! until the entry reports completion or an execution error. `POST
//! /interrupt` asks the backend to abandon the active job on cancellation or
//! timeout. Job submission is long-running (minutes), so `run()` polls with
//! progress logging and honors the shared cancel/timeout contract.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde_json::Value;
use thiserror::Error;

use super::{CancelHandle, JobContext, JobResult};
use crate::config::BackendSettings;

const RETRY_BASE_DELAY_MS: u64 = 500;
const CANCEL_TICK_MS: u64 = 100;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Request(String),

    #[error("unexpected backend response: {0}")]
    Protocol(String),
}

/// State of a submitted job as reported by the history endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRecord {
    /// Still executing; `events` holds every progress message reported so far.
    Running { events: Vec<String> },
    Completed { outputs: Vec<OutputRef> },
    Failed { detail: String },
}

/// One output file reference from a completed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRef {
    pub filename: String,
    pub subfolder: String,
}

/// HTTP client for one backend instance.
pub struct BackendClient {
    agent: ureq::Agent,
    base_url: String,
    poll_interval: Duration,
    ready_attempts: u32,
    ready_interval: Duration,
    max_retries: u32,
    /// Local directory the backend writes its outputs to.
    output_root: PathBuf,
}

impl BackendClient {
    pub fn new(settings: &BackendSettings, backend_root: &Path) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(settings.request_timeout_secs)))
            .build();

        Self {
            agent: config.into(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            poll_interval: Duration::from_secs(settings.poll_interval_secs),
            ready_attempts: settings.ready_attempts,
            ready_interval: Duration::from_secs(settings.ready_interval_secs),
            max_retries: settings.max_retries,
            output_root: backend_root.join(&settings.output_subdir),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether the backend answers its health endpoint.
    pub fn is_ready(&self) -> bool {
        let url = format!("{}/system_stats", self.base_url);
        self.agent.get(&url).call().is_ok()
    }

    /// Submit a rendered workflow graph; returns the backend job id.
    pub fn submit(&self, graph: &Value) -> Result<String, BackendError> {
        let url = format!("{}/prompt", self.base_url);
        let payload = serde_json::json!({ "prompt": graph });
        let body = self.post_json_with_retry(&url, &payload)?;
        parse_submit(&body)
    }

    /// Query the history endpoint for a job.
    ///
    /// `None` means the backend has no history entry yet (still queued).
    pub fn history(&self, job_id: &str) -> Result<Option<JobRecord>, BackendError> {
        let url = format!("{}/history/{}", self.base_url, job_id);
        let body = self.get_json_with_retry(&url)?;
        Ok(parse_history(&body, job_id))
    }

    /// Ask the backend to abandon the active job. Best-effort.
    pub fn interrupt(&self, ctx: &JobContext<'_>) {
        let url = format!("{}/interrupt", self.base_url);
        match self.agent.post(&url).send_json(serde_json::json!({})) {
            Ok(_) => ctx.logger.info(ctx.stage_label, "backend interrupt requested"),
            Err(e) => ctx
                .logger
                .warn(ctx.stage_label, &format!("backend interrupt failed: {}", e)),
        }
    }

    /// Execute one backend job end to end: wait for readiness, submit, poll
    /// until terminal, collect artifacts.
    pub fn run(&self, graph: &Value, ctx: &JobContext<'_>) -> JobResult {
        let deadline = Instant::now() + ctx.timeout;

        let mut ready = false;
        for attempt in 0..self.ready_attempts {
            if ctx.cancel.is_cancelled() {
                return JobResult::Cancelled;
            }
            if Instant::now() >= deadline {
                return JobResult::TimedOut;
            }
            if self.is_ready() {
                ready = true;
                break;
            }
            ctx.logger.debug(
                ctx.stage_label,
                &format!(
                    "backend not ready (attempt {}/{})",
                    attempt + 1,
                    self.ready_attempts
                ),
            );
            if !sleep_with_cancel(self.ready_interval, ctx.cancel) {
                return JobResult::Cancelled;
            }
        }
        if !ready {
            return JobResult::Failed {
                detail: format!(
                    "backend at {} not ready after {} attempts",
                    self.base_url, self.ready_attempts
                ),
            };
        }

        let job_id = match self.submit(graph) {
            Ok(id) => id,
            Err(e) => return JobResult::Failed { detail: e.to_string() },
        };
        ctx.logger
            .info(ctx.stage_label, &format!("submitted backend job {}", job_id));

        let mut seen_events = 0usize;
        loop {
            if ctx.cancel.is_cancelled() {
                self.interrupt(ctx);
                return JobResult::Cancelled;
            }
            let now = Instant::now();
            if now >= deadline {
                self.interrupt(ctx);
                return JobResult::TimedOut;
            }

            let wait = self.poll_interval.min(deadline - now);
            if !sleep_with_cancel(wait, ctx.cancel) {
                self.interrupt(ctx);
                return JobResult::Cancelled;
            }

            match self.history(&job_id) {
                Ok(Some(JobRecord::Completed { outputs })) => {
                    ctx.logger
                        .info(ctx.stage_label, &format!("backend job {} completed", job_id));
                    return self.collect_artifacts(outputs, ctx);
                }
                Ok(Some(JobRecord::Failed { detail })) => {
                    return JobResult::Failed { detail };
                }
                // The history entry accumulates progress messages; mirror
                // each one into the run log exactly once.
                Ok(Some(JobRecord::Running { events })) => {
                    for event in events.iter().skip(seen_events) {
                        ctx.logger
                            .info(ctx.stage_label, &format!("backend: {}", event));
                    }
                    seen_events = seen_events.max(events.len());
                }
                Ok(None) => {
                    ctx.logger
                        .debug(ctx.stage_label, &format!("backend job {} still queued", job_id));
                }
                // Poll errors are transient as far as the job is concerned;
                // the stage timeout bounds how long we keep trying.
                Err(e) => {
                    ctx.logger
                        .warn(ctx.stage_label, &format!("status poll failed: {}", e));
                }
            }
        }
    }

    /// Copy completed outputs into the stage directory and record them.
    fn collect_artifacts(&self, outputs: Vec<OutputRef>, ctx: &JobContext<'_>) -> JobResult {
        if outputs.is_empty() {
            ctx.logger
                .warn(ctx.stage_label, "backend job completed without outputs");
            return JobResult::Success {
                artifacts: Vec::new(),
            };
        }

        if let Err(e) = fs::create_dir_all(ctx.output_dir) {
            return JobResult::Failed {
                detail: format!("failed to create {}: {}", ctx.output_dir.display(), e),
            };
        }

        let mut artifacts = Vec::new();
        for output in outputs {
            let source = self.output_root.join(&output.subfolder).join(&output.filename);
            let dest = ctx.output_dir.join(&output.filename);

            if source.is_file() {
                match fs::copy(&source, &dest) {
                    Ok(_) => {
                        ctx.logger
                            .info(ctx.stage_label, &format!("artifact: {}", dest.display()));
                        artifacts.push(dest);
                    }
                    Err(e) => {
                        ctx.logger.warn(
                            ctx.stage_label,
                            &format!("failed to copy {}: {}", source.display(), e),
                        );
                        artifacts.push(source);
                    }
                }
            } else {
                // The backend may run on another host; record where it
                // reported the file.
                ctx.logger.warn(
                    ctx.stage_label,
                    &format!("backend output not found locally: {}", source.display()),
                );
                artifacts.push(source);
            }
        }

        JobResult::Success { artifacts }
    }

    fn post_json_with_retry(&self, url: &str, payload: &Value) -> Result<Value, BackendError> {
        for attempt in 0..self.max_retries {
            let response = self.agent.post(url).send_json(payload);

            match response {
                Ok(mut ok) => {
                    return ok.body_mut().read_json().map_err(|e| {
                        BackendError::Protocol(format!("failed to parse response: {}", e))
                    });
                }
                Err(e) => {
                    if attempt + 1 < self.max_retries && is_retryable_error(&e) {
                        sleep_backoff(attempt);
                        continue;
                    }
                    return Err(BackendError::Request(e.to_string()));
                }
            }
        }

        Err(BackendError::Request(format!(
            "request to {} failed after retries",
            url
        )))
    }

    fn get_json_with_retry(&self, url: &str) -> Result<Value, BackendError> {
        for attempt in 0..self.max_retries {
            let response = self.agent.get(url).call();

            match response {
                Ok(mut ok) => {
                    return ok.body_mut().read_json().map_err(|e| {
                        BackendError::Protocol(format!("failed to parse response: {}", e))
                    });
                }
                Err(e) => {
                    if attempt + 1 < self.max_retries && is_retryable_error(&e) {
                        sleep_backoff(attempt);
                        continue;
                    }
                    return Err(BackendError::Request(e.to_string()));
                }
            }
        }

        Err(BackendError::Request(format!(
            "request to {} failed after retries",
            url
        )))
    }
}

fn is_retryable_error(e: &ureq::Error) -> bool {
    match e {
        ureq::Error::Timeout(_)
        | ureq::Error::Io(_)
        | ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound => true,
        ureq::Error::StatusCode(code) => matches!(code, 429 | 500 | 502 | 503 | 504),
        _ => false,
    }
}

fn sleep_backoff(attempt: u32) {
    let delay_ms = RETRY_BASE_DELAY_MS.saturating_mul(1u64 << attempt);
    std::thread::sleep(Duration::from_millis(delay_ms));
}

/// Sleep in small ticks so cancellation is observed promptly.
/// Returns false if cancelled mid-sleep.
fn sleep_with_cancel(duration: Duration, cancel: &CancelHandle) -> bool {
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        if cancel.is_cancelled() {
            return false;
        }
        std::thread::sleep(Duration::from_millis(CANCEL_TICK_MS));
    }
    !cancel.is_cancelled()
}

/// Extract the job id from a submit response.
fn parse_submit(body: &Value) -> Result<String, BackendError> {
    body.get("prompt_id")
        .and_then(Value::as_str)
        .map(|s| s.to_string())
        .ok_or_else(|| {
            BackendError::Protocol(format!(
                "no prompt_id in submit response: {}",
                serde_json::to_string(body).unwrap_or_default()
            ))
        })
}

/// Interpret a history response for one job id.
fn parse_history(body: &Value, job_id: &str) -> Option<JobRecord> {
    let entry = body.get(job_id)?;
    let status = entry.get("status").cloned().unwrap_or(Value::Null);

    if status.get("status_str").and_then(Value::as_str) == Some("error") {
        return Some(JobRecord::Failed {
            detail: error_detail(&status),
        });
    }

    if status.get("completed").and_then(Value::as_bool) == Some(true) {
        return Some(JobRecord::Completed {
            outputs: parse_outputs(entry),
        });
    }

    Some(JobRecord::Running {
        events: progress_events(&status),
    })
}

/// Format the progress messages of an in-flight job for log mirroring.
fn progress_events(status: &Value) -> Vec<String> {
    status
        .get("messages")
        .and_then(Value::as_array)
        .map(|messages| {
            messages
                .iter()
                .filter_map(|message| {
                    let pair = message.as_array()?;
                    let label = pair.first()?.as_str()?;
                    let node = pair
                        .get(1)
                        .and_then(|data| data.get("node_type"))
                        .and_then(Value::as_str);
                    Some(match node {
                        Some(node) => format!("{} ({})", label, node),
                        None => label.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Pull the most specific error message out of a failed job's status.
fn error_detail(status: &Value) -> String {
    status
        .get("messages")
        .and_then(Value::as_array)
        .and_then(|messages| {
            messages.iter().find_map(|message| {
                let pair = message.as_array()?;
                if pair.first()?.as_str()? != "execution_error" {
                    return None;
                }
                let data = pair.get(1)?;
                let text = data.get("exception_message")?.as_str()?;
                Some(match data.get("node_type").and_then(Value::as_str) {
                    Some(node) => format!("{}: {}", node, text),
                    None => text.to_string(),
                })
            })
        })
        .unwrap_or_else(|| "backend reported an execution error".to_string())
}

/// Collect output file references from a completed history entry.
fn parse_outputs(entry: &Value) -> Vec<OutputRef> {
    let mut outputs = Vec::new();

    if let Some(nodes) = entry.get("outputs").and_then(Value::as_object) {
        for node_output in nodes.values() {
            if let Some(images) = node_output.get("images").and_then(Value::as_array) {
                for image in images {
                    if let Some(filename) = image.get("filename").and_then(Value::as_str) {
                        outputs.push(OutputRef {
                            filename: filename.to_string(),
                            subfolder: image
                                .get("subfolder")
                                .and_then(Value::as_str)
                                .unwrap_or("")
                                .to_string(),
                        });
                    }
                }
            }
        }
    }

    outputs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_submit_extracts_prompt_id() {
        let body: Value =
            serde_json::from_str(r#"{"prompt_id":"abc-123","number":4,"node_errors":{}}"#).unwrap();
        assert_eq!(parse_submit(&body).unwrap(), "abc-123");
    }

    #[test]
    fn parse_submit_rejects_missing_id() {
        let body: Value = serde_json::from_str(r#"{"error":"bad graph"}"#).unwrap();
        assert!(matches!(
            parse_submit(&body),
            Err(BackendError::Protocol(_))
        ));
    }

    #[test]
    fn parse_history_absent_entry_means_queued() {
        let body: Value = serde_json::from_str("{}").unwrap();
        assert_eq!(parse_history(&body, "abc-123"), None);
    }

    #[test]
    fn parse_history_incomplete_is_running() {
        let body: Value = serde_json::from_str(
            r#"{"abc-123":{"status":{"completed":false,"status_str":"running"}}}"#,
        )
        .unwrap();
        assert_eq!(
            parse_history(&body, "abc-123"),
            Some(JobRecord::Running { events: Vec::new() })
        );
    }

    #[test]
    fn running_entry_reports_progress_events_in_order() {
        let body: Value = serde_json::from_str(
            r#"{
                "abc-123": {
                    "status": {
                        "completed": false,
                        "status_str": "running",
                        "messages": [
                            ["execution_start", {"prompt_id": "abc-123"}],
                            ["execution_cached", {"nodes": ["3", "4"]}],
                            ["executing", {"node_type": "KSampler"}]
                        ]
                    }
                }
            }"#,
        )
        .unwrap();

        match parse_history(&body, "abc-123") {
            Some(JobRecord::Running { events }) => {
                assert_eq!(
                    events,
                    vec!["execution_start", "execution_cached", "executing (KSampler)"]
                );
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn parse_history_completed_collects_images() {
        let body: Value = serde_json::from_str(
            r#"{
                "abc-123": {
                    "status": {"completed": true, "status_str": "success"},
                    "outputs": {
                        "9": {"images": [
                            {"filename": "tex_00001_.png", "subfolder": "textures", "type": "output"},
                            {"filename": "tex_00002_.png", "subfolder": "textures", "type": "output"}
                        ]}
                    }
                }
            }"#,
        )
        .unwrap();

        match parse_history(&body, "abc-123") {
            Some(JobRecord::Completed { outputs }) => {
                assert_eq!(outputs.len(), 2);
                assert_eq!(outputs[0].filename, "tex_00001_.png");
                assert_eq!(outputs[0].subfolder, "textures");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn parse_history_error_extracts_node_message() {
        let body: Value = serde_json::from_str(
            r#"{
                "abc-123": {
                    "status": {
                        "completed": false,
                        "status_str": "error",
                        "messages": [
                            ["execution_start", {}],
                            ["execution_error", {
                                "node_type": "KSampler",
                                "exception_message": "CUDA out of memory"
                            }]
                        ]
                    }
                }
            }"#,
        )
        .unwrap();

        match parse_history(&body, "abc-123") {
            Some(JobRecord::Failed { detail }) => {
                assert_eq!(detail, "KSampler: CUDA out of memory");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn parse_history_error_without_messages_is_generic() {
        let body: Value =
            serde_json::from_str(r#"{"abc-123":{"status":{"status_str":"error"}}}"#).unwrap();

        match parse_history(&body, "abc-123") {
            Some(JobRecord::Failed { detail }) => {
                assert!(detail.contains("execution error"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn outputs_span_multiple_nodes() {
        let entry: Value = serde_json::from_str(
            r#"{
                "outputs": {
                    "9": {"images": [{"filename": "a.png", "subfolder": ""}]},
                    "12": {"images": [{"filename": "b.png", "subfolder": "sheets"}]}
                }
            }"#,
        )
        .unwrap();

        let outputs = parse_outputs(&entry);
        assert_eq!(outputs.len(), 2);
        assert!(outputs.iter().any(|o| o.filename == "b.png" && o.subfolder == "sheets"));
    }

    #[test]
    fn retryable_statuses_match_policy() {
        assert!(is_retryable_error(&ureq::Error::StatusCode(503)));
        assert!(is_retryable_error(&ureq::Error::StatusCode(429)));
        assert!(!is_retryable_error(&ureq::Error::StatusCode(404)));
        assert!(!is_retryable_error(&ureq::Error::StatusCode(400)));
    }

    #[test]
    fn sleep_with_cancel_observes_flag() {
        let cancel = CancelHandle::new();
        cancel.cancel();
        assert!(!sleep_with_cancel(Duration::from_secs(5), &cancel));
    }
}
