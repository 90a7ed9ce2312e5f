//! Read-only view of the backend's on-disk model store.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Deserialize;

use crate::config::ModelSettings;
use crate::models::ModelCategory;

/// Optional store manifest recording architecture tags per model file.
#[derive(Debug, Default, Deserialize)]
struct StoreManifest {
    #[serde(default)]
    architectures: BTreeMap<String, String>,
}

/// One model file discovered in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelEntry {
    /// Filename (including extension).
    pub name: String,
    /// Absolute path.
    pub path: PathBuf,
    /// File size in bytes.
    pub size: u64,
    /// Last modification time, when the filesystem reports one.
    pub modified: Option<SystemTime>,
    /// Category the file was found under.
    pub category: ModelCategory,
    /// Architecture tag from the manifest, when recorded.
    pub arch: Option<String>,
}

/// The backend's model directory tree, read-only during a run.
#[derive(Debug, Clone)]
pub struct ModelStore {
    root: PathBuf,
    min_size: u64,
    arch_tags: BTreeMap<String, String>,
}

impl ModelStore {
    /// Open the model store under a backend installation root.
    ///
    /// Reads `models/manifest.toml` when present; a missing or unparseable
    /// manifest simply leaves all files untagged.
    pub fn open(backend_root: impl AsRef<Path>, settings: &ModelSettings) -> Self {
        let root = backend_root.as_ref().join("models");

        let arch_tags = fs::read_to_string(root.join("manifest.toml"))
            .ok()
            .and_then(|content| toml::from_str::<StoreManifest>(&content).ok())
            .map(|manifest| manifest.architectures)
            .unwrap_or_default();

        Self {
            root,
            min_size: settings.min_model_bytes,
            arch_tags,
        }
    }

    /// The store root (the backend's `models/` directory).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding models of one category.
    pub fn category_dir(&self, category: ModelCategory) -> PathBuf {
        self.root.join(category.subdir())
    }

    /// List models of a category, sorted by name (case-insensitive).
    ///
    /// Only files with an extension valid for the category are returned.
    /// A missing category directory yields an empty list, not an error.
    pub fn list(&self, category: ModelCategory) -> Vec<ModelEntry> {
        let dir = self.category_dir(category);
        let mut entries = Vec::new();

        let read_dir = match fs::read_dir(&dir) {
            Ok(rd) => rd,
            Err(_) => return entries,
        };

        for entry in read_dir.flatten() {
            let path = entry.path();
            if !path.is_file() || !has_valid_extension(&path, category) {
                continue;
            }

            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n.to_string(),
                None => continue,
            };
            let metadata = entry.metadata().ok();
            let size = metadata.as_ref().map(|m| m.len()).unwrap_or(0);
            let modified = metadata.and_then(|m| m.modified().ok());

            entries.push(ModelEntry {
                arch: self.arch_tags.get(&name).cloned(),
                name,
                path,
                size,
                modified,
                category,
            });
        }

        entries.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        entries
    }

    /// List every category, in category declaration order.
    pub fn list_all(&self) -> Vec<(ModelCategory, Vec<ModelEntry>)> {
        ModelCategory::all()
            .iter()
            .map(|&category| (category, self.list(category)))
            .collect()
    }

    /// Lightweight integrity check: the file opens and is at least the
    /// configured minimum size (rules out empty placeholders and truncated
    /// downloads).
    pub fn check_integrity(&self, entry: &ModelEntry) -> bool {
        entry.size >= self.min_size && File::open(&entry.path).is_ok()
    }
}

fn has_valid_extension(path: &Path, category: ModelCategory) -> bool {
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(e) => format!(".{}", e.to_lowercase()),
        None => return false,
    };
    category.extensions().contains(&ext.as_str())
}
