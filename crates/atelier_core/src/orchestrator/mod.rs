//! Pipeline orchestrator: run submission, execution, and queries.
//!
//! The orchestrator is the single entry point for running the asset
//! pipeline. It owns the per-project serialization rule (one active run
//! per project), performs model validation before anything external is
//! spawned, and executes stages on a dedicated worker thread per run.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator::submit
//!     ├── load project + plan stages (mesh-type policy)
//!     ├── assemble animation batch (size gate)
//!     ├── claim the project's run slot
//!     ├── create run record + log file
//!     ├── validate model requirements (fail fast / degrade optional)
//!     └── spawn worker ──► execute_run
//!                              ├── stage 1..5 through the JobInvoker
//!                              └── finish record (tracker persists each step)
//! ```
//!
//! Callers keep the returned [`RunHandle`] for cancellation and poll
//! [`Orchestrator::status`] / [`Orchestrator::log`] for progress; execution
//! errors land in the run record, never back on the submitting call.

mod errors;
mod pipeline;

pub use errors::{RunError, RunResult};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::batch::{self, BatchItem};
use crate::config::Settings;
use crate::invoker::{CancelHandle, JobInvoker, ToolInvoker};
use crate::logging::{log_path_for, read_log_tail, LogCallback, LogConfig, LogEntry, RunLogger};
use crate::models::{
    FailureKind, PipelineRun, RunFailure, RunState, StageKind, StageOutcome, StageStatus,
    StatusReport, Verdict,
};
use crate::modelstore::{ModelStore, ModelValidator, Validation};
use crate::project::{Project, ProjectStore};
use crate::stages::{PlannedStage, StageRegistry, SKIP_MODELS_UNMET};
use crate::tracker::StatusTracker;

use pipeline::{execute_run, RunContext};

/// Default number of entries returned by a log query.
pub const DEFAULT_LOG_LINES: usize = 50;

/// A run submission request.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Project to run the pipeline for.
    pub project_id: String,
    /// Confirms an animation batch at or above the large-batch threshold.
    pub confirm_large_batch: bool,
}

impl RunRequest {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            confirm_large_batch: false,
        }
    }

    /// Set the large-batch confirmation flag (builder pattern).
    pub fn confirmed(mut self) -> Self {
        self.confirm_large_batch = true;
        self
    }
}

/// Handle to a submitted run.
///
/// Dropping the handle does not stop the run; the worker keeps going and
/// the run stays queryable through the orchestrator.
#[derive(Debug)]
pub struct RunHandle {
    run_id: String,
    project_id: String,
    cancel: CancelHandle,
    join: thread::JoinHandle<()>,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Request cancellation; the worker honors it at the next check.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Block until the worker finishes and the run record is terminal.
    pub fn wait(self) {
        let _ = self.join.join();
    }
}

/// Coordinates pipeline runs across projects.
pub struct Orchestrator {
    settings: Settings,
    registry: StageRegistry,
    projects: ProjectStore,
    tracker: Arc<StatusTracker>,
    invoker: Arc<dyn JobInvoker>,
    /// Active run slot per project, holding the run's cancel handle.
    active: Arc<Mutex<HashMap<String, CancelHandle>>>,
}

impl Orchestrator {
    /// Create an orchestrator talking to the real external tools.
    pub fn new(settings: Settings) -> Self {
        let invoker = Arc::new(ToolInvoker::new(&settings));
        Self::with_invoker(settings, invoker)
    }

    /// Create an orchestrator with a custom invoker (used by tests).
    pub fn with_invoker(settings: Settings, invoker: Arc<dyn JobInvoker>) -> Self {
        let registry = StageRegistry::standard(&settings.timeouts);
        let projects = ProjectStore::new(&settings.paths.projects_root);

        Self {
            settings,
            registry,
            projects,
            tracker: Arc::new(StatusTracker::new()),
            invoker,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn projects(&self) -> &ProjectStore {
        &self.projects
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    /// Submit a pipeline run for a project.
    ///
    /// Rejections (`AlreadyRunning`, `ConfigurationInvalid`,
    /// `PreconditionFailed`, `ValidationFailed`) happen before any external
    /// process is spawned. On success the run executes on its own worker
    /// thread and the returned handle is immediately live.
    pub fn submit(
        &self,
        request: RunRequest,
        callback: Option<LogCallback>,
    ) -> RunResult<RunHandle> {
        let project = self.projects.load(&request.project_id)?;
        let project_id = project.id.clone();

        let mut plan = self.registry.plan(&project.config);
        let batch_items =
            self.plan_animation_batch(&project, &plan, request.confirm_large_batch)?;

        // Claim the project's run slot. Released by the worker on
        // completion, or below on any setup failure.
        let cancel = CancelHandle::new();
        {
            let mut active = self.active.lock();
            if active.contains_key(&project_id) {
                return Err(RunError::already_running(&project_id));
            }
            active.insert(project_id.clone(), cancel.clone());
        }

        let run_id = Uuid::new_v4().to_string();
        let logger = match RunLogger::create(
            &project_id,
            &run_id,
            project.logs_dir(),
            self.log_config(),
            callback,
        ) {
            Ok(logger) => Arc::new(logger),
            Err(e) => {
                self.release(&project_id);
                return Err(RunError::setup_failed(
                    &project_id,
                    format!("could not create run log: {}", e),
                ));
            }
        };

        let run = PipelineRun::new(
            &run_id,
            &project_id,
            project.config.mesh_type,
            plan.iter()
                .map(|p| (p.definition.kind, p.verdict.clone())),
        );
        self.tracker
            .begin_run(run, logger.clone(), project.run_record_path());

        logger.phase(
            "run",
            &format!("pipeline run {} for project '{}'", run_id, project_id),
        );
        logger.info("run", &format!("mesh type: {}", project.config.mesh_type));
        for planned in &plan {
            logger.info(
                "run",
                &format!("plan: {} -> {}", planned.definition.kind, planned.verdict),
            );
        }
        if !batch_items.is_empty() {
            logger.info(
                "run",
                &format!("animation batch: {} item(s)", batch_items.len()),
            );
        }

        let selected_models = match self.validate_models(&project_id, &mut plan, &logger) {
            Ok(selected) => selected,
            Err(err) => {
                logger.close();
                self.release(&project_id);
                return Err(err);
            }
        };

        let ctx = RunContext {
            project,
            plan,
            batch_items,
            selected_models,
            tools: self.settings.tools.clone(),
            cancel: cancel.clone(),
            logger: logger.clone(),
        };

        let tracker = self.tracker.clone();
        let invoker = self.invoker.clone();
        let active = self.active.clone();
        let worker_project_id = project_id.clone();

        let spawned = thread::Builder::new()
            .name(format!("run-{}", project_id))
            .spawn(move || {
                execute_run(ctx, invoker.as_ref(), &tracker);
                active.lock().remove(&worker_project_id);
            });

        let join = match spawned {
            Ok(join) => join,
            Err(e) => {
                let detail = format!("failed to start worker thread: {}", e);
                logger.error("run", &detail);
                logger.close();
                self.tracker.update(&project_id, |run| {
                    run.finish(
                        RunState::Failed,
                        Some(RunFailure::new("run", FailureKind::Execution, detail.clone())),
                    );
                });
                self.release(&project_id);
                return Err(RunError::setup_failed(&project_id, detail));
            }
        };

        Ok(RunHandle {
            run_id,
            project_id,
            cancel,
            join,
        })
    }

    /// Request cancellation of a project's active run.
    ///
    /// Returns true when an active run existed. The worker stops at its
    /// next cancellation check and the run record finishes as Failed with
    /// a cancelled stage.
    pub fn cancel(&self, project_id: &str) -> bool {
        match self.active.lock().get(project_id) {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Status of a project's active or most recent run.
    ///
    /// Falls back to the persisted run record after a restart, and to a
    /// plan-only view for projects that have never run.
    pub fn status(&self, project_id: &str) -> RunResult<StatusReport> {
        let project = self.projects.load(project_id)?;

        if let Some(run) = self.tracker.snapshot(project_id) {
            return Ok(run.status_report());
        }
        if let Some(run) = StatusTracker::load_persisted(&project.run_record_path()) {
            return Ok(run.status_report());
        }

        Ok(plan_only_report(&project, &self.registry.plan(&project.config)))
    }

    /// The most recent log entries of a project's active or last run.
    ///
    /// `max_lines` defaults to [`DEFAULT_LOG_LINES`].
    pub fn log(
        &self,
        project_id: &str,
        max_lines: Option<usize>,
    ) -> RunResult<Vec<LogEntry>> {
        let max = max_lines.unwrap_or(DEFAULT_LOG_LINES);
        let project = self.projects.load(project_id)?;

        if let Some(entries) = self.tracker.recent_log(project_id, max) {
            return Ok(entries);
        }

        // No run in this process; read the last persisted run's log file.
        match StatusTracker::load_persisted(&project.run_record_path()) {
            Some(run) => Ok(read_log_tail(
                &log_path_for(&project.logs_dir(), &run.run_id),
                max,
            )),
            None => Ok(Vec::new()),
        }
    }

    /// The stage plan a run of this project would execute, without
    /// starting anything.
    pub fn plan_preview(&self, project_id: &str) -> RunResult<Vec<PlannedStage>> {
        let project = self.projects.load(project_id)?;
        Ok(self.registry.plan(&project.config))
    }

    /// Resolve the animation batch and enforce the large-batch gate.
    fn plan_animation_batch(
        &self,
        project: &Project,
        plan: &[PlannedStage],
        confirmed: bool,
    ) -> RunResult<Vec<BatchItem>> {
        let animation_runs = plan
            .iter()
            .any(|p| p.definition.kind == StageKind::Animation && p.verdict.runs());
        if !animation_runs {
            return Ok(Vec::new());
        }

        let selections = project.config.animation.batch().map_err(|field| {
            RunError::configuration_invalid(field, "the animation stage has nothing to generate")
        })?;

        let items = batch::plan_batch(&selections);
        if batch::requires_confirmation(items.len()) && !confirmed {
            return Err(RunError::precondition_failed(format!(
                "batch of {} animations requires confirmation",
                items.len()
            )));
        }

        Ok(items)
    }

    /// Validate model requirements for every stage that will run.
    ///
    /// Required stages fail the whole submission; optional stages degrade
    /// to Skip. Returns the models selected per stage, keyed by workflow
    /// slot.
    fn validate_models(
        &self,
        project_id: &str,
        plan: &mut [PlannedStage],
        logger: &RunLogger,
    ) -> RunResult<BTreeMap<StageKind, BTreeMap<String, String>>> {
        let store = ModelStore::open(&self.settings.paths.backend_root, &self.settings.models);
        let validator = ModelValidator::new(&store, &self.settings.models.preferred);

        let mut selected_models = BTreeMap::new();

        for index in 0..plan.len() {
            let planned = &plan[index];
            if !planned.verdict.runs() || planned.definition.requirements.is_empty() {
                continue;
            }
            let stage = planned.definition.kind;
            let required = planned.verdict.is_required();

            match validator.validate(&planned.definition.requirements) {
                Validation::Satisfied { selected } => {
                    for (slot, file) in &selected {
                        logger.info(stage.name(), &format!("model {}: {}", slot, file));
                    }
                    selected_models.insert(stage, selected);
                }
                missing => {
                    let reasons = missing.missing_reasons();
                    let detail = reasons.join("; ");

                    if required {
                        logger.error(
                            stage.name(),
                            &format!("model validation failed: {}", detail),
                        );
                        self.tracker.update(project_id, |run| {
                            if let Some(i) = run.stage_index(stage) {
                                run.finish_stage(
                                    i,
                                    StageOutcome::failed(FailureKind::Validation, detail.clone()),
                                );
                            }
                            run.finish(
                                RunState::Failed,
                                Some(RunFailure::new(
                                    stage.name(),
                                    FailureKind::Validation,
                                    detail.clone(),
                                )),
                            );
                        });
                        return Err(RunError::validation_failed(stage.name(), reasons));
                    }

                    logger.warn(
                        stage.name(),
                        &format!("{}: {}", SKIP_MODELS_UNMET, detail),
                    );
                    self.tracker.update(project_id, |run| {
                        if let Some(i) = run.stage_index(stage) {
                            run.degrade_stage(i, SKIP_MODELS_UNMET);
                        }
                    });
                    plan[index].verdict = Verdict::skip(SKIP_MODELS_UNMET);
                }
            }
        }

        Ok(selected_models)
    }

    fn log_config(&self) -> LogConfig {
        LogConfig {
            tail_cache: self.settings.logging.tail_cache,
            error_tail: self.settings.logging.error_tail,
            show_timestamps: self.settings.logging.show_timestamps,
            ..LogConfig::default()
        }
    }

    fn release(&self, project_id: &str) {
        self.active.lock().remove(project_id);
    }
}

/// Status view for a project that has never run: the plan with every
/// stage pending or skipped.
fn plan_only_report(project: &Project, plan: &[PlannedStage]) -> StatusReport {
    StatusReport {
        project_id: project.id.clone(),
        mesh_type: project.config.mesh_type,
        run_id: None,
        state: None,
        failure: None,
        stages: plan
            .iter()
            .map(|p| StageStatus {
                name: p.definition.kind.name().to_string(),
                required: p.verdict.is_required(),
                completed: false,
                outcome: if p.verdict.runs() {
                    "pending".to_string()
                } else {
                    "skipped".to_string()
                },
                reason: p.verdict.skip_reason().map(str::to_string),
            })
            .collect(),
    }
}
