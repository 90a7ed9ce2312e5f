//! Pipeline run command

use anyhow::{bail, Result};

use atelier_core::config::Settings;
use atelier_core::models::RunState;
use atelier_core::orchestrator::{Orchestrator, RunRequest};

pub fn run(
    settings: Settings,
    id: &str,
    confirm_large_batch: bool,
    sprites_override: Option<bool>,
) -> Result<()> {
    let orchestrator = Orchestrator::new(settings);

    if let Some(enabled) = sprites_override {
        let mut project = orchestrator.projects().load(id)?;
        if project.config.sprites.enabled != enabled {
            project.config.sprites.enabled = enabled;
            orchestrator.projects().save(&project)?;
        }
    }

    let mut request = RunRequest::new(id);
    if confirm_large_batch {
        request = request.confirmed();
    }

    // Stream the run log to stdout as it is written.
    let callback = Box::new(|line: &str| println!("{}", line));
    let handle = orchestrator.submit(request, Some(callback))?;
    handle.wait();

    let report = orchestrator.status(id)?;
    match (report.state, report.failure) {
        (Some(RunState::Failed), Some(failure)) => {
            bail!("run failed at {}: {}", failure.stage, failure.detail)
        }
        (Some(RunState::Failed), None) => bail!("run failed"),
        (Some(RunState::PartiallySucceeded), _) => {
            println!();
            println!("Run finished with partial results; `atelier status {}` has details.", id);
            Ok(())
        }
        _ => Ok(()),
    }
}
