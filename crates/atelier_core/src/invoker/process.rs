//! Synchronous subprocess invocation with live output streaming.

use std::collections::BTreeSet;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::{JobContext, JobResult, ProcessJob};

const POLL_TICK_MS: u64 = 100;

enum ProcessEnd {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
    Error(String),
}

/// Run one subprocess to completion, streaming its output into the run log
/// line-by-line as it is produced.
///
/// The child is killed when the stage timeout elapses or cancellation is
/// signalled; the two cases report distinct results. Artifacts are the files
/// that appeared under the output directory during the invocation.
pub fn run_process(job: &ProcessJob, ctx: &JobContext<'_>) -> JobResult {
    ctx.logger.command(ctx.stage_label, &job.display());
    ctx.logger.clear_tail();

    if let Err(e) = fs::create_dir_all(ctx.output_dir) {
        return JobResult::Failed {
            detail: format!("failed to create {}: {}", ctx.output_dir.display(), e),
        };
    }
    let before = snapshot_files(ctx.output_dir);

    let mut command = Command::new(&job.program);
    command
        .args(&job.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = &job.current_dir {
        command.current_dir(dir);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            return JobResult::Failed {
                detail: format!("failed to start {}: {}", job.program, e),
            }
        }
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let start = Instant::now();

    let end = thread::scope(|scope| {
        if let Some(stdout) = stdout {
            scope.spawn(move || {
                let reader = BufReader::new(stdout);
                for line in reader.lines().map_while(Result::ok) {
                    ctx.logger.output_line(ctx.stage_label, &line, false);
                }
            });
        }
        if let Some(stderr) = stderr {
            scope.spawn(move || {
                let reader = BufReader::new(stderr);
                for line in reader.lines().map_while(Result::ok) {
                    ctx.logger.output_line(ctx.stage_label, &line, true);
                }
            });
        }

        loop {
            match child.try_wait() {
                Ok(Some(status)) => break ProcessEnd::Exited(status),
                Ok(None) => {}
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    break ProcessEnd::Error(format!("failed to wait on {}: {}", job.program, e));
                }
            }

            if ctx.cancel.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                break ProcessEnd::Cancelled;
            }
            if start.elapsed() > ctx.timeout {
                let _ = child.kill();
                let _ = child.wait();
                break ProcessEnd::TimedOut;
            }

            thread::sleep(Duration::from_millis(POLL_TICK_MS));
        }
    });

    match end {
        ProcessEnd::Cancelled => {
            ctx.logger.warn(ctx.stage_label, "invocation cancelled, process killed");
            JobResult::Cancelled
        }
        ProcessEnd::TimedOut => {
            ctx.logger.error(
                ctx.stage_label,
                &format!("timed out after {}s, process killed", ctx.timeout.as_secs()),
            );
            JobResult::TimedOut
        }
        ProcessEnd::Error(detail) => JobResult::Failed { detail },
        ProcessEnd::Exited(status) if status.success() => {
            let artifacts = new_files(ctx.output_dir, &before);
            for artifact in &artifacts {
                ctx.logger
                    .info(ctx.stage_label, &format!("artifact: {}", artifact.display()));
            }
            JobResult::Success { artifacts }
        }
        ProcessEnd::Exited(status) => {
            let code = status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "killed by signal".to_string());
            let tail = ctx.logger.tail_output();
            let detail = if tail.is_empty() {
                format!("{} exited with status {}", job.program, code)
            } else {
                format!(
                    "{} exited with status {}: {}",
                    job.program,
                    code,
                    tail.join(" | ")
                )
            };
            JobResult::Failed { detail }
        }
    }
}

/// All files under a directory, recursively.
fn snapshot_files(dir: &Path) -> BTreeSet<PathBuf> {
    let mut files = BTreeSet::new();
    collect_files(dir, &mut files);
    files
}

fn collect_files(dir: &Path, files: &mut BTreeSet<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, files);
        } else {
            files.insert(path);
        }
    }
}

/// Files present now that were not in the earlier snapshot, sorted.
fn new_files(dir: &Path, before: &BTreeSet<PathBuf>) -> Vec<PathBuf> {
    snapshot_files(dir)
        .into_iter()
        .filter(|path| !before.contains(path))
        .collect()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::invoker::CancelHandle;
    use crate::logging::{LogConfig, RunLogger};
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        logger: RunLogger,
        output_dir: PathBuf,
        script_dir: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let output_dir = dir.path().join("out");
            let script_dir = dir.path().join("bin");
            fs::create_dir_all(&output_dir).unwrap();
            fs::create_dir_all(&script_dir).unwrap();
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
                logger,
                output_dir,
                script_dir,
            }
        }

        fn script(&self, name: &str, body: &str) -> String {
            let path = self.script_dir.join(name);
            fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path.to_string_lossy().to_string()
        }

        fn ctx<'a>(&'a self, cancel: &'a CancelHandle, timeout: Duration) -> JobContext<'a> {
            JobContext {
                stage_label: "rigging",
                timeout,
                cancel,
                logger: &self.logger,
                output_dir: &self.output_dir,
            }
        }
    }

    fn job(program: String) -> ProcessJob {
        ProcessJob {
            program,
            args: Vec::new(),
            current_dir: None,
        }
    }

    #[test]
    fn successful_process_reports_new_artifacts() {
        let fx = Fixture::new();
        let program = fx.script(
            "ok.sh",
            &format!(
                "echo working\ntouch {}/rigged.fbx\nexit 0",
                fx.output_dir.display()
            ),
        );

        let cancel = CancelHandle::new();
        let result = run_process(&job(program), &fx.ctx(&cancel, Duration::from_secs(10)));

        match result {
            JobResult::Success { artifacts } => {
                assert_eq!(artifacts.len(), 1);
                assert!(artifacts[0].ends_with("rigged.fbx"));
            }
            other => panic!("unexpected: {:?}", other),
        }

        let recent = fx.logger.recent(20);
        assert!(recent.iter().any(|e| e.message == "working"));
    }

    #[test]
    fn nonzero_exit_carries_output_tail() {
        let fx = Fixture::new();
        let program = fx.script("fail.sh", "echo before >&2\necho boom >&2\nexit 3");

        let cancel = CancelHandle::new();
        let result = run_process(&job(program), &fx.ctx(&cancel, Duration::from_secs(10)));

        match result {
            JobResult::Failed { detail } => {
                assert!(detail.contains("status 3"), "detail: {}", detail);
                assert!(detail.contains("boom"), "detail: {}", detail);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn slow_process_times_out_and_is_killed() {
        let fx = Fixture::new();
        let program = fx.script("slow.sh", "sleep 30");

        let cancel = CancelHandle::new();
        let started = Instant::now();
        let result = run_process(&job(program), &fx.ctx(&cancel, Duration::from_millis(300)));

        assert_eq!(result, JobResult::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn cancellation_kills_and_reports_cancelled() {
        let fx = Fixture::new();
        let program = fx.script("slow.sh", "sleep 30");

        let cancel = CancelHandle::new();
        cancel.cancel();
        let started = Instant::now();
        let result = run_process(&job(program), &fx.ctx(&cancel, Duration::from_secs(60)));

        assert_eq!(result, JobResult::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn missing_program_fails_to_start() {
        let fx = Fixture::new();
        let cancel = CancelHandle::new();
        let result = run_process(
            &job("/nonexistent/tool".to_string()),
            &fx.ctx(&cancel, Duration::from_secs(1)),
        );

        match result {
            JobResult::Failed { detail } => assert!(detail.contains("failed to start")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn stdout_and_stderr_are_streamed_with_markers() {
        let fx = Fixture::new();
        let program = fx.script("mix.sh", "echo out-line\necho err-line >&2");

        let cancel = CancelHandle::new();
        run_process(&job(program), &fx.ctx(&cancel, Duration::from_secs(10)));

        let messages: Vec<String> = fx
            .logger
            .recent(20)
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert!(messages.iter().any(|m| m == "out-line"));
        assert!(messages.iter().any(|m| m == "[stderr] err-line"));
    }

    #[test]
    fn nested_artifacts_are_detected() {
        let fx = Fixture::new();
        let program = fx.script(
            "nested.sh",
            &format!(
                "mkdir -p {out}/sheets\ntouch {out}/sheets/a.png",
                out = fx.output_dir.display()
            ),
        );

        let cancel = CancelHandle::new();
        let result = run_process(&job(program), &fx.ctx(&cancel, Duration::from_secs(10)));

        match result {
            JobResult::Success { artifacts } => {
                assert_eq!(artifacts.len(), 1);
                assert!(artifacts[0].ends_with("sheets/a.png"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
