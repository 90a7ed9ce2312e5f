//! Run records: the durable state of one pipeline execution.
//!
//! A `PipelineRun` is owned by exactly one project and mutated only through
//! the tracker, which persists it after every transition. Status queries
//! receive clones, never references into live state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{FailureKind, MeshType, StageKind, Verdict};

/// Lifecycle state of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Model dependencies are being checked; nothing has executed.
    Validating,
    /// The stage at this index is executing (or about to).
    Running(usize),
    /// Every planned stage succeeded or was skipped by policy.
    Succeeded,
    /// All required stages succeeded but something optional failed,
    /// or batch items were lost along the way.
    PartiallySucceeded,
    /// A required stage failed, validation rejected the run, or it was
    /// cancelled.
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Succeeded | RunState::PartiallySucceeded | RunState::Failed
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            RunState::Validating => "validating",
            RunState::Running(_) => "running",
            RunState::Succeeded => "succeeded",
            RunState::PartiallySucceeded => "partially succeeded",
            RunState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Running(i) => write!(f, "running (stage {})", i + 1),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// Outcome of a single stage within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    /// Not reached yet.
    Pending,
    /// Currently executing.
    Running,
    /// Completed its work.
    Success,
    /// Did not run, by policy or degraded validation.
    Skipped { reason: String },
    /// Ran and failed.
    Failed { kind: FailureKind, detail: String },
}

impl StageOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        StageOutcome::Skipped {
            reason: reason.into(),
        }
    }

    pub fn failed(kind: FailureKind, detail: impl Into<String>) -> Self {
        StageOutcome::Failed {
            kind,
            detail: detail.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StageOutcome::Pending => "pending",
            StageOutcome::Running => "running",
            StageOutcome::Success => "success",
            StageOutcome::Skipped { .. } => "skipped",
            StageOutcome::Failed { .. } => "failed",
        }
    }

    /// True once the stage finished its work successfully.
    pub fn completed(&self) -> bool {
        matches!(self, StageOutcome::Success)
    }

    /// Human-readable reason for skips and failures.
    pub fn reason(&self) -> Option<String> {
        match self {
            StageOutcome::Skipped { reason } => Some(reason.clone()),
            StageOutcome::Failed { kind, detail } => Some(format!("{}: {}", kind, detail)),
            _ => None,
        }
    }
}

/// Terminal failure detail carried by the run record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    /// Stage that caused the failure.
    pub stage: String,
    pub kind: FailureKind,
    pub detail: String,
}

impl RunFailure {
    pub fn new(stage: impl Into<String>, kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            kind,
            detail: detail.into(),
        }
    }
}

/// Aggregate result of an animation batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub items: Vec<BatchItemReport>,
}

impl BatchReport {
    pub fn new() -> Self {
        Self {
            total: 0,
            succeeded: 0,
            failed: 0,
            items: Vec::new(),
        }
    }

    /// "N of M succeeded" summary line.
    pub fn summary(&self) -> String {
        format!("{} of {} animations succeeded", self.succeeded, self.total)
    }
}

impl Default for BatchReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one batch item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemReport {
    /// Item label, e.g. "locomotion/walk".
    pub label: String,
    /// Artifact file name when the item succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    pub ok: bool,
    /// Failure detail when the item failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Per-stage slice of a run record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageKind,
    pub verdict: Verdict,
    pub outcome: StageOutcome,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    /// Animation aggregate, present only on the animation stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchReport>,
}

impl StageRecord {
    fn planned(stage: StageKind, verdict: Verdict) -> Self {
        Self {
            stage,
            verdict,
            outcome: StageOutcome::Pending,
            started_at: None,
            ended_at: None,
            batch: None,
        }
    }
}

/// Durable record of one pipeline execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: String,
    pub project_id: String,
    pub mesh_type: MeshType,
    pub state: RunState,
    pub stages: Vec<StageRecord>,
    pub started_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
}

impl PipelineRun {
    /// Create a fresh run in the validating state from planned verdicts.
    pub fn new(
        run_id: impl Into<String>,
        project_id: impl Into<String>,
        mesh_type: MeshType,
        planned: impl IntoIterator<Item = (StageKind, Verdict)>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            project_id: project_id.into(),
            mesh_type,
            state: RunState::Validating,
            stages: planned
                .into_iter()
                .map(|(stage, verdict)| StageRecord::planned(stage, verdict))
                .collect(),
            started_at: Utc::now(),
            ended_at: None,
            failure: None,
        }
    }

    pub fn stage_index(&self, stage: StageKind) -> Option<usize> {
        self.stages.iter().position(|r| r.stage == stage)
    }

    /// Move to Running(index) and mark that stage as started.
    pub fn begin_stage(&mut self, index: usize) {
        self.state = RunState::Running(index);
        if let Some(record) = self.stages.get_mut(index) {
            record.outcome = StageOutcome::Running;
            record.started_at = Some(Utc::now());
        }
    }

    /// Record a stage's final outcome.
    pub fn finish_stage(&mut self, index: usize, outcome: StageOutcome) {
        if let Some(record) = self.stages.get_mut(index) {
            record.outcome = outcome;
            record.ended_at = Some(Utc::now());
        }
    }

    /// Degrade a stage verdict to Skip (failed optional validation).
    pub fn degrade_stage(&mut self, index: usize, reason: impl Into<String>) {
        if let Some(record) = self.stages.get_mut(index) {
            record.verdict = Verdict::skip(reason);
        }
    }

    /// Attach the animation aggregate to a stage record.
    pub fn set_batch(&mut self, index: usize, report: BatchReport) {
        if let Some(record) = self.stages.get_mut(index) {
            record.batch = Some(report);
        }
    }

    /// Move to a terminal state.
    pub fn finish(&mut self, state: RunState, failure: Option<RunFailure>) {
        self.state = state;
        self.failure = failure;
        self.ended_at = Some(Utc::now());
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Build the external status view of this run.
    pub fn status_report(&self) -> StatusReport {
        StatusReport {
            project_id: self.project_id.clone(),
            mesh_type: self.mesh_type,
            run_id: Some(self.run_id.clone()),
            state: Some(self.state.clone()),
            failure: self.failure.clone(),
            stages: self
                .stages
                .iter()
                .map(|r| StageStatus {
                    name: r.stage.name().to_string(),
                    required: r.verdict.is_required(),
                    completed: r.outcome.completed(),
                    outcome: r.outcome.name().to_string(),
                    reason: r.outcome.reason(),
                })
                .collect(),
        }
    }
}

/// Read-consistent status snapshot returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub project_id: String,
    pub mesh_type: MeshType,

    /// Absent when the project has never run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<RunState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,

    pub stages: Vec<StageStatus>,
}

/// Per-stage entry in a status report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageStatus {
    pub name: String,
    pub required: bool,
    pub completed: bool,
    pub outcome: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
