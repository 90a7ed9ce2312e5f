//! Model store listing command

use std::time::SystemTime;

use anyhow::Result;
use chrono::{DateTime, Local};

use atelier_core::config::Settings;
use atelier_core::models::ModelCategory;
use atelier_core::modelstore::ModelStore;

pub fn run(settings: &Settings, category: Option<ModelCategory>) -> Result<()> {
    let store = ModelStore::open(&settings.paths.backend_root, &settings.models);

    let listing = match category {
        Some(category) => vec![(category, store.list(category))],
        None => store.list_all(),
    };

    let mut total = 0usize;
    for (category, entries) in &listing {
        println!("{} ({}/)", category.name(), category.subdir());
        if entries.is_empty() {
            println!("  (none)");
        }
        for entry in entries {
            total += 1;
            let modified = format_modified(entry.modified);
            match &entry.arch {
                Some(arch) => println!(
                    "  {:<44} {:>10}  {}  [{}]",
                    entry.name,
                    format_size(entry.size),
                    modified,
                    arch
                ),
                None => println!(
                    "  {:<44} {:>10}  {}",
                    entry.name,
                    format_size(entry.size),
                    modified
                ),
            }
        }
        println!();
    }

    println!("{} model file(s) under {}", total, store.root().display());
    Ok(())
}

fn format_modified(time: Option<SystemTime>) -> String {
    match time {
        Some(time) => DateTime::<Local>::from(time).format("%Y-%m-%d %H:%M").to_string(),
        None => "-".to_string(),
    }
}

fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;

    if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{} B", bytes)
    }
}
