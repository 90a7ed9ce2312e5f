//! Animation batch scheduling.
//!
//! A run's animation stage expands into one job per selection, executed
//! strictly sequentially (the motion engine holds exclusive accelerator
//! access). Item failures do not abort the batch; the stage surfaces an
//! aggregate N-of-M result. Large batches must be explicitly confirmed at
//! submission time.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::ToolSettings;
use crate::invoker::{CancelHandle, JobContext, JobInvoker, JobResult};
use crate::logging::RunLogger;
use crate::models::{AnimationSelection, BatchItemReport, BatchReport, StageKind};
use crate::project::Project;
use crate::stages::command::{self, ANIMATION_EXT};

/// Batches of this size or larger need the submission's confirmation flag.
pub const LARGE_BATCH_THRESHOLD: usize = 6;

/// Whether a batch of this size needs explicit confirmation.
pub fn requires_confirmation(batch_len: usize) -> bool {
    batch_len >= LARGE_BATCH_THRESHOLD
}

/// One scheduled batch item with its collision-safe artifact stem.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub selection: AnimationSelection,
    pub artifact_stem: String,
    /// True when a disambiguating suffix was appended.
    pub renamed: bool,
}

impl BatchItem {
    pub fn artifact_filename(&self) -> String {
        format!("{}.{}", self.artifact_stem, ANIMATION_EXT)
    }
}

/// How a batch ended.
#[derive(Debug, Clone)]
pub enum BatchOutcome {
    /// Every item was attempted (some may have failed).
    Completed(BatchReport),
    /// Cancellation stopped the batch early; the report covers attempted
    /// items only.
    Cancelled(BatchReport),
}

/// Assign deterministic, collision-safe artifact stems to every selection.
///
/// Two selections sharing a stem keep their order; the second and later get
/// a numeric suffix.
pub fn plan_batch(selections: &[AnimationSelection]) -> Vec<BatchItem> {
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();

    selections
        .iter()
        .map(|selection| {
            let stem = selection.artifact_stem();
            let count = seen.entry(stem.clone()).or_insert(0);
            *count += 1;

            if *count == 1 {
                BatchItem {
                    selection: selection.clone(),
                    artifact_stem: stem,
                    renamed: false,
                }
            } else {
                BatchItem {
                    selection: selection.clone(),
                    artifact_stem: format!("{}_{}", stem, *count),
                    renamed: true,
                }
            }
        })
        .collect()
}

/// Execute a planned batch sequentially.
pub fn run_batch(
    invoker: &dyn JobInvoker,
    project: &Project,
    tools: &ToolSettings,
    items: &[BatchItem],
    item_timeout: Duration,
    cancel: &CancelHandle,
    logger: &RunLogger,
) -> BatchOutcome {
    let stage_label = StageKind::Animation.name();
    let output_dir = project.stage_dir(StageKind::Animation);
    let total = items.len();

    let mut report = BatchReport {
        total,
        succeeded: 0,
        failed: 0,
        items: Vec::new(),
    };

    for (index, item) in items.iter().enumerate() {
        if cancel.is_cancelled() {
            logger.warn(
                stage_label,
                &format!("batch cancelled after {} of {} items", index, total),
            );
            return BatchOutcome::Cancelled(report);
        }

        logger.section(
            stage_label,
            &format!("animation {}/{}: {}", index + 1, total, item.artifact_stem),
        );
        if item.renamed {
            logger.warn(
                stage_label,
                &format!(
                    "artifact name collision for '{}_{}', renamed to {}",
                    item.selection.category, item.selection.name, item.artifact_stem
                ),
            );
        }

        let job = command::animation_job(project, tools, &item.selection, &item.artifact_stem);
        let ctx = JobContext {
            stage_label,
            timeout: item_timeout,
            cancel,
            logger,
            output_dir: &output_dir,
        };

        match invoker.invoke(&job, &ctx) {
            JobResult::Success { .. } => {
                let artifact = output_dir.join(item.artifact_filename());
                logger.success(
                    stage_label,
                    &format!("{} -> {}", item.artifact_stem, artifact.display()),
                );
                report.succeeded += 1;
                report.items.push(BatchItemReport {
                    label: item.artifact_stem.clone(),
                    artifact: Some(artifact.display().to_string()),
                    ok: true,
                    detail: None,
                });
            }
            JobResult::Failed { detail } => {
                logger.error(
                    stage_label,
                    &format!("{} failed: {}", item.artifact_stem, detail),
                );
                report.failed += 1;
                report.items.push(BatchItemReport {
                    label: item.artifact_stem.clone(),
                    artifact: None,
                    ok: false,
                    detail: Some(detail),
                });
            }
            JobResult::TimedOut => {
                let detail = format!("timed out after {}s", item_timeout.as_secs());
                logger.error(
                    stage_label,
                    &format!("{} {}", item.artifact_stem, detail),
                );
                report.failed += 1;
                report.items.push(BatchItemReport {
                    label: item.artifact_stem.clone(),
                    artifact: None,
                    ok: false,
                    detail: Some(detail),
                });
            }
            JobResult::Cancelled => {
                logger.warn(
                    stage_label,
                    &format!("batch cancelled during {}", item.artifact_stem),
                );
                return BatchOutcome::Cancelled(report);
            }
        }
    }

    logger.info(stage_label, &report.summary());
    BatchOutcome::Completed(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::StageJob;
    use crate::logging::LogConfig;
    use crate::models::MeshType;
    use crate::project::ProjectConfig;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use tempfile::TempDir;

    struct ScriptedInvoker {
        results: Mutex<VecDeque<JobResult>>,
        invocations: Mutex<Vec<String>>,
    }

    impl ScriptedInvoker {
        fn new(results: Vec<JobResult>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                invocations: Mutex::new(Vec::new()),
            }
        }
    }

    impl JobInvoker for ScriptedInvoker {
        fn invoke(&self, job: &StageJob, _ctx: &JobContext<'_>) -> JobResult {
            if let StageJob::Process(process) = job {
                self.invocations.lock().push(process.display());
            }
            self.results.lock().pop_front().unwrap_or(JobResult::Success {
                artifacts: Vec::new(),
            })
        }
    }

    struct Fixture {
        _dir: TempDir,
        project: Project,
        logger: RunLogger,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let project = Project {
                id: "hero".to_string(),
                root: dir.path().join("hero"),
                config: ProjectConfig {
                    mesh_type: MeshType::Skeletal,
                    ..ProjectConfig::default()
                },
            };
            let logger = RunLogger::create(
                "hero",
                "run-1",
                dir.path().join("logs"),
                LogConfig::default(),
                None,
            )
            .unwrap();
            Self {
                _dir: dir,
                project,
                logger,
            }
        }
    }

    fn selections(names: &[&str]) -> Vec<AnimationSelection> {
        names
            .iter()
            .map(|name| AnimationSelection::new("combat", *name, "some motion"))
            .collect()
    }

    #[test]
    fn confirmation_threshold_is_six() {
        assert!(!requires_confirmation(5));
        assert!(requires_confirmation(6));
        assert!(requires_confirmation(10));
    }

    #[test]
    fn plan_batch_keeps_unique_stems() {
        let items = plan_batch(&selections(&["slash", "stab"]));
        assert_eq!(items[0].artifact_stem, "combat_slash");
        assert_eq!(items[1].artifact_stem, "combat_stab");
        assert!(!items[0].renamed);
    }

    #[test]
    fn plan_batch_suffixes_collisions_in_order() {
        let items = plan_batch(&selections(&["slash", "slash", "slash"]));
        assert_eq!(items[0].artifact_stem, "combat_slash");
        assert_eq!(items[1].artifact_stem, "combat_slash_2");
        assert_eq!(items[2].artifact_stem, "combat_slash_3");
        assert!(items[1].renamed);
        assert!(items[2].renamed);
    }

    #[test]
    fn batch_continues_past_item_failure() {
        let fx = Fixture::new();
        let invoker = ScriptedInvoker::new(vec![
            JobResult::Success { artifacts: Vec::new() },
            JobResult::Failed {
                detail: "bad prompt".to_string(),
            },
            JobResult::Success { artifacts: Vec::new() },
            JobResult::Success { artifacts: Vec::new() },
            JobResult::Success { artifacts: Vec::new() },
        ]);

        let items = plan_batch(&selections(&["walk", "run", "jump", "idle", "crouch"]));
        let cancel = CancelHandle::new();
        let outcome = run_batch(
            &invoker,
            &fx.project,
            &ToolSettings::default(),
            &items,
            Duration::from_secs(60),
            &cancel,
            &fx.logger,
        );

        match outcome {
            BatchOutcome::Completed(report) => {
                assert_eq!(report.total, 5);
                assert_eq!(report.succeeded, 4);
                assert_eq!(report.failed, 1);
                assert_eq!(report.summary(), "4 of 5 animations succeeded");
                assert_eq!(report.items[1].detail.as_deref(), Some("bad prompt"));
                assert!(report.items.iter().filter(|i| i.ok).count() == 4);
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(invoker.invocations.lock().len(), 5);
    }

    #[test]
    fn item_timeout_counts_as_item_failure() {
        let fx = Fixture::new();
        let invoker = ScriptedInvoker::new(vec![
            JobResult::TimedOut,
            JobResult::Success { artifacts: Vec::new() },
        ]);

        let items = plan_batch(&selections(&["walk", "run"]));
        let cancel = CancelHandle::new();
        let outcome = run_batch(
            &invoker,
            &fx.project,
            &ToolSettings::default(),
            &items,
            Duration::from_secs(60),
            &cancel,
            &fx.logger,
        );

        match outcome {
            BatchOutcome::Completed(report) => {
                assert_eq!(report.succeeded, 1);
                assert_eq!(report.failed, 1);
                assert!(report.items[0]
                    .detail
                    .as_deref()
                    .unwrap()
                    .contains("timed out"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn cancellation_stops_remaining_items() {
        let fx = Fixture::new();
        let invoker = ScriptedInvoker::new(vec![
            JobResult::Success { artifacts: Vec::new() },
            JobResult::Cancelled,
        ]);

        let items = plan_batch(&selections(&["walk", "run", "jump"]));
        let cancel = CancelHandle::new();
        let outcome = run_batch(
            &invoker,
            &fx.project,
            &ToolSettings::default(),
            &items,
            Duration::from_secs(60),
            &cancel,
            &fx.logger,
        );

        match outcome {
            BatchOutcome::Cancelled(report) => {
                assert_eq!(report.total, 3);
                assert_eq!(report.succeeded, 1);
                // The third item was never attempted.
                assert_eq!(report.items.len(), 1);
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(invoker.invocations.lock().len(), 2);
    }
}
