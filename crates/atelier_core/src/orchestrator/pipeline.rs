//! Run execution: drives the planned stages through the job invoker.
//!
//! This runs on the worker thread spawned at submission. Every state
//! transition goes through the tracker, which persists the run record
//! after each change, so a crash mid-run leaves an inspectable record.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::batch::{self, BatchItem, BatchOutcome};
use crate::config::ToolSettings;
use crate::invoker::{CancelHandle, JobContext, JobInvoker, JobResult, StageJob};
use crate::logging::RunLogger;
use crate::models::{FailureKind, RunFailure, RunState, StageKind, StageOutcome};
use crate::project::Project;
use crate::stages::{command, PlannedStage, SKIP_NO_ANIMATION};
use crate::tracker::StatusTracker;

/// Everything the worker thread needs to execute one run.
///
/// Built entirely during submission: verdicts already reflect any
/// validation degradation, and `selected_models` holds the concrete model
/// files resolved for each diffusion stage.
pub(super) struct RunContext {
    pub project: Project,
    pub plan: Vec<PlannedStage>,
    pub batch_items: Vec<BatchItem>,
    pub selected_models: BTreeMap<StageKind, BTreeMap<String, String>>,
    pub tools: ToolSettings,
    pub cancel: CancelHandle,
    pub logger: Arc<RunLogger>,
}

/// Execute every planned stage in order and finish the run record.
///
/// Stage policy:
/// - Skip verdicts are recorded without invoking anything.
/// - A required stage failure ends the run immediately.
/// - An optional stage failure is recorded and the run continues,
///   finishing as PartiallySucceeded.
/// - Cancellation ends the run regardless of the stage's verdict.
pub(super) fn execute_run(ctx: RunContext, invoker: &dyn JobInvoker, tracker: &StatusTracker) {
    let project_id = ctx.project.id.clone();
    let total = ctx.plan.len();

    let mut partial = false;
    let mut failure: Option<RunFailure> = None;

    for (index, planned) in ctx.plan.iter().enumerate() {
        let stage = planned.definition.kind;

        if ctx.cancel.is_cancelled() {
            ctx.logger
                .warn(stage.name(), "run cancelled before stage started");
            failure = Some(RunFailure::new(
                stage.name(),
                FailureKind::Cancelled,
                "run cancelled",
            ));
            break;
        }

        if let Some(reason) = planned.verdict.skip_reason() {
            ctx.logger
                .info(stage.name(), &format!("skipped: {}", reason));
            tracker.update(&project_id, |run| {
                run.finish_stage(index, StageOutcome::skipped(reason));
            });
            continue;
        }

        // Sprites consume animation artifacts; without them there is
        // nothing to render.
        if stage == StageKind::Sprites && !animation_completed(tracker, &project_id) {
            ctx.logger
                .info(stage.name(), &format!("skipped: {}", SKIP_NO_ANIMATION));
            tracker.update(&project_id, |run| {
                run.degrade_stage(index, SKIP_NO_ANIMATION);
                run.finish_stage(index, StageOutcome::skipped(SKIP_NO_ANIMATION));
            });
            continue;
        }

        ctx.logger.phase(
            stage.name(),
            &format!("stage {}/{}: {}", stage.ordinal(), total, stage.name()),
        );
        tracker.update(&project_id, |run| run.begin_stage(index));

        let outcome = if stage == StageKind::Animation {
            run_animation_stage(
                &ctx,
                invoker,
                tracker,
                index,
                planned.definition.timeout,
                &mut partial,
            )
        } else {
            let job = build_job(&ctx, stage);
            let output_dir = ctx.project.stage_dir(stage);
            let job_ctx = JobContext {
                stage_label: stage.name(),
                timeout: planned.definition.timeout,
                cancel: &ctx.cancel,
                logger: &ctx.logger,
                output_dir: &output_dir,
            };
            stage_outcome(invoker.invoke(&job, &job_ctx), planned.definition.timeout.as_secs())
        };

        match outcome {
            StageOutcome::Failed { kind, detail } => {
                tracker.update(&project_id, |run| {
                    run.finish_stage(index, StageOutcome::failed(kind, detail.clone()));
                });

                // Cancellation is fatal even on an optional stage.
                if kind == FailureKind::Cancelled || planned.verdict.is_required() {
                    ctx.logger.error(
                        stage.name(),
                        &format!("stage failed ({}): {}", kind, detail),
                    );
                    failure = Some(RunFailure::new(stage.name(), kind, detail));
                    break;
                }

                ctx.logger.warn(
                    stage.name(),
                    &format!("optional stage failed, continuing: {}", detail),
                );
                partial = true;
            }
            outcome => {
                tracker.update(&project_id, |run| run.finish_stage(index, outcome));
                ctx.logger
                    .success(stage.name(), &format!("{} completed", stage.name()));
            }
        }
    }

    if let Some(failure) = failure {
        ctx.logger.error(
            "run",
            &format!("run failed at {}: {}", failure.stage, failure.detail),
        );
        tracker.update(&project_id, move |run| {
            run.finish(RunState::Failed, Some(failure));
        });
    } else if partial {
        ctx.logger
            .success("run", "run finished with partial results");
        tracker.update(&project_id, |run| {
            run.finish(RunState::PartiallySucceeded, None);
        });
    } else {
        ctx.logger.success("run", "run completed");
        tracker.update(&project_id, |run| {
            run.finish(RunState::Succeeded, None);
        });
    }

    ctx.logger.close();
}

/// Run the animation batch and record its aggregate.
///
/// Batch items fail independently: partial loss degrades the run, but only
/// a batch with zero successes fails the stage.
fn run_animation_stage(
    ctx: &RunContext,
    invoker: &dyn JobInvoker,
    tracker: &StatusTracker,
    index: usize,
    item_timeout: std::time::Duration,
    partial: &mut bool,
) -> StageOutcome {
    let outcome = batch::run_batch(
        invoker,
        &ctx.project,
        &ctx.tools,
        &ctx.batch_items,
        item_timeout,
        &ctx.cancel,
        &ctx.logger,
    );

    match outcome {
        BatchOutcome::Completed(report) => {
            let summary = report.summary();
            let succeeded = report.succeeded;
            let failed = report.failed;
            tracker.update(&ctx.project.id, move |run| run.set_batch(index, report));

            if succeeded == 0 && failed > 0 {
                StageOutcome::failed(FailureKind::Execution, summary)
            } else {
                if failed > 0 {
                    *partial = true;
                }
                StageOutcome::Success
            }
        }
        BatchOutcome::Cancelled(report) => {
            tracker.update(&ctx.project.id, move |run| run.set_batch(index, report));
            StageOutcome::failed(FailureKind::Cancelled, "cancelled during animation batch")
        }
    }
}

fn animation_completed(tracker: &StatusTracker, project_id: &str) -> bool {
    tracker
        .snapshot(project_id)
        .and_then(|run| {
            run.stage_index(StageKind::Animation)
                .and_then(|i| run.stages.get(i).map(|r| r.outcome.completed()))
        })
        .unwrap_or(false)
}

/// Build the job for a non-batched stage.
fn build_job(ctx: &RunContext, stage: StageKind) -> StageJob {
    let empty = BTreeMap::new();
    let selected = ctx.selected_models.get(&stage).unwrap_or(&empty);

    match stage {
        StageKind::Textures => command::texture_job(&ctx.project, selected),
        StageKind::Rigging => command::rig_job(&ctx.project, &ctx.tools),
        StageKind::Export => command::export_job(&ctx.project, &ctx.tools),
        StageKind::Sprites => command::sprite_job(&ctx.project, selected),
        StageKind::Animation => unreachable!("animation dispatched to the batch scheduler"),
    }
}

/// Map an invocation result onto the stage record.
fn stage_outcome(result: JobResult, timeout_secs: u64) -> StageOutcome {
    match result {
        JobResult::Success { .. } => StageOutcome::Success,
        JobResult::Failed { detail } => StageOutcome::failed(FailureKind::Execution, detail),
        JobResult::TimedOut => StageOutcome::failed(
            FailureKind::TimedOut,
            format!("timed out after {}s", timeout_secs),
        ),
        JobResult::Cancelled => {
            StageOutcome::failed(FailureKind::Cancelled, "cancelled while running")
        }
    }
}
