//! Run status command

use anyhow::{bail, Result};

use atelier_core::config::Settings;
use atelier_core::models::StatusReport;
use atelier_core::orchestrator::Orchestrator;

pub fn run(settings: &Settings, id: &str, format: &str) -> Result<()> {
    let orchestrator = Orchestrator::new(settings.clone());
    let report = orchestrator.status(id)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        "text" => print_report(&report),
        other => bail!("unknown format '{}'; valid values: text, json", other),
    }

    Ok(())
}

fn print_report(report: &StatusReport) {
    println!("Project: {} ({})", report.project_id, report.mesh_type);

    match (&report.run_id, &report.state) {
        (Some(run_id), Some(state)) => {
            println!("Run:     {}", run_id);
            println!("State:   {}", state);
        }
        _ => println!("State:   no runs yet"),
    }

    if let Some(failure) = &report.failure {
        println!(
            "Failure: {} at {}: {}",
            failure.kind, failure.stage, failure.detail
        );
    }

    println!();
    for stage in &report.stages {
        // Required stages are starred.
        let marker = if stage.required { "*" } else { " " };
        match &stage.reason {
            Some(reason) => println!("  {} {:<10} {} ({})", marker, stage.name, stage.outcome, reason),
            None => println!("  {} {:<10} {}", marker, stage.name, stage.outcome),
        }
    }
}
