//! Project listing command

use anyhow::Result;

use atelier_core::config::Settings;
use atelier_core::project::ProjectStore;

pub fn run(settings: &Settings) -> Result<()> {
    let store = ProjectStore::new(&settings.paths.projects_root);
    let ids = store.list()?;

    if ids.is_empty() {
        println!("no projects under {}", store.root().display());
        return Ok(());
    }

    for id in &ids {
        match store.load(id) {
            Ok(project) => println!("{:<24} {}", project.id, project.config.mesh_type),
            Err(e) => println!("{:<24} (unreadable: {})", id, e),
        }
    }

    Ok(())
}
