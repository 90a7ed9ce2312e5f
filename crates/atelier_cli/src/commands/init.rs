//! Project creation command

use anyhow::{Context, Result};

use atelier_core::config::Settings;
use atelier_core::models::MeshType;
use atelier_core::project::ProjectStore;

pub fn run(settings: &Settings, id: &str, mesh_type: MeshType) -> Result<()> {
    let store = ProjectStore::new(&settings.paths.projects_root);
    let project = store
        .init(id, mesh_type)
        .with_context(|| format!("could not create project '{}'", id))?;

    println!("Created project: {} ({})", project.id, mesh_type);
    println!();
    println!("  {}/", project.root.display());
    println!("  ├── project.toml");
    println!("  └── logs/");
    println!();
    println!("Stage output directories are created as the pipeline runs.");
    println!();
    println!("Next steps:");
    println!("  edit {}", project.config_path().display());
    println!("  atelier plan {}", project.id);
    println!("  atelier run {}", project.id);

    Ok(())
}
