//! Run log tail command

use anyhow::Result;

use atelier_core::config::Settings;
use atelier_core::orchestrator::Orchestrator;

pub fn run(settings: &Settings, id: &str, lines: usize) -> Result<()> {
    let orchestrator = Orchestrator::new(settings.clone());
    let entries = orchestrator.log(id, Some(lines))?;

    if entries.is_empty() {
        println!("no log entries for '{}'", id);
        return Ok(());
    }

    for entry in &entries {
        println!("{}", entry.format_line(settings.logging.show_timestamps));
    }

    Ok(())
}
