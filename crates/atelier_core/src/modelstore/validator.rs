//! Stage model-dependency validation.
//!
//! Runs strictly before a stage is invoked: a required stage with missing
//! models aborts the run before any external process is spawned.

use std::collections::BTreeMap;

use super::store::ModelStore;
use super::ModelRequirement;
use crate::models::ModelCategory;

/// One unsatisfied requirement with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingRequirement {
    pub category: ModelCategory,
    pub reason: String,
}

/// Outcome of validating one stage's requirements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// Every requirement resolved to a concrete model file, keyed by
    /// workflow slot name.
    Satisfied { selected: BTreeMap<String, String> },
    /// At least one requirement could not be satisfied.
    Missing(Vec<MissingRequirement>),
}

impl Validation {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Validation::Satisfied { .. })
    }

    /// Reasons for failure, empty when satisfied.
    pub fn missing_reasons(&self) -> Vec<String> {
        match self {
            Validation::Satisfied { .. } => Vec::new(),
            Validation::Missing(missing) => {
                missing.iter().map(|m| m.reason.clone()).collect()
            }
        }
    }
}

/// Resolves stage model requirements against the store.
pub struct ModelValidator<'a> {
    store: &'a ModelStore,
    /// Preferred model filename per category name, from settings.
    preferred: &'a BTreeMap<String, String>,
}

impl<'a> ModelValidator<'a> {
    pub fn new(store: &'a ModelStore, preferred: &'a BTreeMap<String, String>) -> Self {
        Self { store, preferred }
    }

    /// Validate a stage's requirements.
    ///
    /// Each requirement independently needs at least one model whose name
    /// contains the keyword, that passes the integrity check, and whose
    /// architecture tag (when the store records one) matches. Selection
    /// prefers the configured model for the category, falling back to the
    /// first valid candidate in name order.
    pub fn validate(&self, requirements: &[ModelRequirement]) -> Validation {
        let mut selected = BTreeMap::new();
        let mut missing = Vec::new();

        for req in requirements {
            let entries = self.store.list(req.category);
            let keyword = req.keyword.to_lowercase();

            let keyword_matches: Vec<_> = entries
                .iter()
                .filter(|e| e.name.to_lowercase().contains(&keyword))
                .collect();

            let candidates: Vec<_> = keyword_matches
                .iter()
                .filter(|e| self.store.check_integrity(e) && arch_compatible(e.arch.as_deref(), req))
                .collect();

            if candidates.is_empty() {
                let reason = if keyword_matches.is_empty() {
                    format!(
                        "no {} model containing '{}'",
                        req.category.name(),
                        req.keyword
                    )
                } else {
                    format!(
                        "{} model matching '{}' failed integrity or architecture check",
                        req.category.name(),
                        req.keyword
                    )
                };
                missing.push(MissingRequirement {
                    category: req.category,
                    reason,
                });
                continue;
            }

            let choice = self
                .preferred
                .get(req.category.name())
                .and_then(|name| candidates.iter().find(|e| &e.name == name))
                .unwrap_or(&candidates[0]);

            selected.insert(req.slot.clone(), choice.name.clone());
        }

        if missing.is_empty() {
            Validation::Satisfied { selected }
        } else {
            Validation::Missing(missing)
        }
    }
}

fn arch_compatible(tag: Option<&str>, req: &ModelRequirement) -> bool {
    match (tag, req.arch.as_deref()) {
        // Untagged files are assumed compatible; only a recorded tag can
        // contradict the requirement.
        (Some(tag), Some(expected)) => tag.eq_ignore_ascii_case(expected),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelSettings;
    use std::fs::{self, File};
    use std::io::Write;
    use std::path::Path;
    use tempfile::tempdir;

    fn small_settings() -> ModelSettings {
        ModelSettings {
            min_model_bytes: 16,
            ..ModelSettings::default()
        }
    }

    fn write_model(root: &Path, category: ModelCategory, name: &str, bytes: usize) {
        let dir = root.join("models").join(category.subdir());
        fs::create_dir_all(&dir).unwrap();
        let mut file = File::create(dir.join(name)).unwrap();
        file.write_all(&vec![0u8; bytes]).unwrap();
    }

    fn texture_requirements() -> Vec<ModelRequirement> {
        vec![
            ModelRequirement::new("checkpoint", ModelCategory::Checkpoint, "sdxl")
                .with_arch("sdxl"),
            ModelRequirement::new("style_adapter", ModelCategory::StyleAdapter, "ip-adapter"),
        ]
    }

    #[test]
    fn satisfied_selects_first_valid_candidate() {
        let dir = tempdir().unwrap();
        write_model(dir.path(), ModelCategory::Checkpoint, "base_sdxl.safetensors", 32);
        write_model(dir.path(), ModelCategory::StyleAdapter, "ip-adapter_plus.bin", 32);

        let store = ModelStore::open(dir.path(), &small_settings());
        let preferred = BTreeMap::new();
        let validation = ModelValidator::new(&store, &preferred).validate(&texture_requirements());

        match validation {
            Validation::Satisfied { selected } => {
                assert_eq!(selected["checkpoint"], "base_sdxl.safetensors");
                assert_eq!(selected["style_adapter"], "ip-adapter_plus.bin");
            }
            Validation::Missing(missing) => panic!("unexpected missing: {:?}", missing),
        }
    }

    #[test]
    fn preferred_model_wins_over_name_order() {
        let dir = tempdir().unwrap();
        write_model(dir.path(), ModelCategory::Checkpoint, "a_sdxl.safetensors", 32);
        write_model(dir.path(), ModelCategory::Checkpoint, "b_sdxl.safetensors", 32);

        let store = ModelStore::open(dir.path(), &small_settings());
        let mut preferred = BTreeMap::new();
        preferred.insert("checkpoint".to_string(), "b_sdxl.safetensors".to_string());

        let reqs = vec![ModelRequirement::new(
            "checkpoint",
            ModelCategory::Checkpoint,
            "sdxl",
        )];
        match ModelValidator::new(&store, &preferred).validate(&reqs) {
            Validation::Satisfied { selected } => {
                assert_eq!(selected["checkpoint"], "b_sdxl.safetensors");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn invalid_preferred_falls_back_to_first_valid() {
        let dir = tempdir().unwrap();
        write_model(dir.path(), ModelCategory::Checkpoint, "a_sdxl.safetensors", 32);

        let store = ModelStore::open(dir.path(), &small_settings());
        let mut preferred = BTreeMap::new();
        preferred.insert("checkpoint".to_string(), "gone_sdxl.safetensors".to_string());

        let reqs = vec![ModelRequirement::new(
            "checkpoint",
            ModelCategory::Checkpoint,
            "sdxl",
        )];
        match ModelValidator::new(&store, &preferred).validate(&reqs) {
            Validation::Satisfied { selected } => {
                assert_eq!(selected["checkpoint"], "a_sdxl.safetensors");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn missing_category_reports_keyword() {
        let dir = tempdir().unwrap();
        write_model(dir.path(), ModelCategory::Checkpoint, "base_sdxl.safetensors", 32);
        // No style adapter installed.

        let store = ModelStore::open(dir.path(), &small_settings());
        let preferred = BTreeMap::new();
        match ModelValidator::new(&store, &preferred).validate(&texture_requirements()) {
            Validation::Missing(missing) => {
                assert_eq!(missing.len(), 1);
                assert_eq!(missing[0].category, ModelCategory::StyleAdapter);
                assert!(missing[0].reason.contains("ip-adapter"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn undersized_model_fails_integrity() {
        let dir = tempdir().unwrap();
        write_model(dir.path(), ModelCategory::Checkpoint, "base_sdxl.safetensors", 4);

        let store = ModelStore::open(dir.path(), &small_settings());
        let preferred = BTreeMap::new();
        let reqs = vec![ModelRequirement::new(
            "checkpoint",
            ModelCategory::Checkpoint,
            "sdxl",
        )];
        match ModelValidator::new(&store, &preferred).validate(&reqs) {
            Validation::Missing(missing) => {
                assert!(missing[0].reason.contains("integrity"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn recorded_arch_tag_must_match() {
        let dir = tempdir().unwrap();
        write_model(dir.path(), ModelCategory::Checkpoint, "old_sdxl.safetensors", 32);
        fs::write(
            dir.path().join("models/manifest.toml"),
            "[architectures]\n\"old_sdxl.safetensors\" = \"sd15\"\n",
        )
        .unwrap();

        let store = ModelStore::open(dir.path(), &small_settings());
        let preferred = BTreeMap::new();
        let reqs = vec![ModelRequirement::new("checkpoint", ModelCategory::Checkpoint, "sdxl")
            .with_arch("sdxl")];
        let validation = ModelValidator::new(&store, &preferred).validate(&reqs);
        assert!(!validation.is_satisfied());
    }

    #[test]
    fn untagged_model_passes_arch_requirement() {
        let dir = tempdir().unwrap();
        write_model(dir.path(), ModelCategory::Checkpoint, "base_sdxl.safetensors", 32);

        let store = ModelStore::open(dir.path(), &small_settings());
        let preferred = BTreeMap::new();
        let reqs = vec![ModelRequirement::new("checkpoint", ModelCategory::Checkpoint, "sdxl")
            .with_arch("sdxl")];
        assert!(ModelValidator::new(&store, &preferred).validate(&reqs).is_satisfied());
    }

    #[test]
    fn each_keyword_needs_its_own_match() {
        let dir = tempdir().unwrap();
        write_model(dir.path(), ModelCategory::ControlNet, "control_openpose.safetensors", 32);
        // No depth controlnet.

        let store = ModelStore::open(dir.path(), &small_settings());
        let preferred = BTreeMap::new();
        let reqs = vec![
            ModelRequirement::new("controlnet_openpose", ModelCategory::ControlNet, "openpose"),
            ModelRequirement::new("controlnet_depth", ModelCategory::ControlNet, "depth"),
        ];
        match ModelValidator::new(&store, &preferred).validate(&reqs) {
            Validation::Missing(missing) => {
                assert_eq!(missing.len(), 1);
                assert!(missing[0].reason.contains("depth"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
