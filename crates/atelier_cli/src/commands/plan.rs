//! Stage plan preview command

use anyhow::Result;

use atelier_core::config::Settings;
use atelier_core::modelstore::{ModelStore, ModelValidator, Validation};
use atelier_core::orchestrator::Orchestrator;
use atelier_core::stages::PlannedStage;

pub fn run(settings: &Settings, id: &str) -> Result<()> {
    let orchestrator = Orchestrator::new(settings.clone());
    let plan = orchestrator.plan_preview(id)?;

    println!("Stage plan for '{}':", id);
    for planned in &plan {
        println!(
            "  {}. {:<10} {}",
            planned.definition.kind.ordinal(),
            planned.definition.kind.name(),
            planned.verdict
        );
    }

    print_validation(settings, &plan);

    Ok(())
}

/// Dry-run model validation for every stage that would execute.
fn print_validation(settings: &Settings, plan: &[PlannedStage]) {
    let store = ModelStore::open(&settings.paths.backend_root, &settings.models);
    let validator = ModelValidator::new(&store, &settings.models.preferred);

    let mut printed_header = false;
    let mut unmet_required = 0usize;

    for planned in plan {
        if !planned.verdict.runs() || planned.definition.requirements.is_empty() {
            continue;
        }
        if !printed_header {
            println!();
            println!("Model validation ({}):", store.root().display());
            printed_header = true;
        }

        let stage = planned.definition.kind.name();
        match validator.validate(&planned.definition.requirements) {
            Validation::Satisfied { selected } => {
                for (slot, file) in &selected {
                    println!("  {:<10} {} -> {}", stage, slot, file);
                }
            }
            missing => {
                if planned.verdict.is_required() {
                    unmet_required += 1;
                }
                for reason in missing.missing_reasons() {
                    println!("  {:<10} MISSING: {}", stage, reason);
                }
            }
        }
    }

    if unmet_required > 0 {
        println!();
        println!(
            "{} required stage(s) cannot run until the models above are installed.",
            unmet_required
        );
    }
}
