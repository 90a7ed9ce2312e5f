//! Animation selection types.
//!
//! A selection describes one motion clip the motion engine should produce:
//! a library entry (category + name) plus the free-text prompts that steer
//! generation, and an optional output spec.

use serde::{Deserialize, Serialize};

/// One animation to generate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationSelection {
    /// Library category, e.g. "locomotion" or "combat".
    pub category: String,

    /// Clip name within the category, e.g. "walk".
    pub name: String,

    /// Motion description passed to the engine.
    pub motion: String,

    /// Style hints appended to the motion prompt.
    #[serde(default)]
    pub style: String,

    /// Constraint text (contact points, loop requirements).
    #[serde(default)]
    pub constraints: String,

    /// Optional camera hint for preview rendering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<String>,

    /// Requested clip length in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,

    /// Requested frame rate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<u32>,
}

impl AnimationSelection {
    /// Create a selection with just the identifying fields.
    pub fn new(
        category: impl Into<String>,
        name: impl Into<String>,
        motion: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
            motion: motion.into(),
            style: String::new(),
            constraints: String::new(),
            camera: None,
            duration_secs: None,
            fps: None,
        }
    }

    /// Base artifact name (without extension or collision suffix).
    ///
    /// Derived deterministically from category and name so reruns produce
    /// the same artifact names.
    pub fn artifact_stem(&self) -> String {
        sanitize_component(&format!("{}_{}", self.category, self.name))
    }

    /// Full prompt sent to the motion engine (motion + style + constraints).
    pub fn full_prompt(&self) -> String {
        let mut prompt = self.motion.trim().to_string();
        if !self.style.trim().is_empty() {
            prompt.push_str(", ");
            prompt.push_str(self.style.trim());
        }
        if !self.constraints.trim().is_empty() {
            prompt.push_str(". ");
            prompt.push_str(self.constraints.trim());
        }
        prompt
    }
}

/// Sanitize a name component for use in file names.
fn sanitize_component(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_stem_joins_category_and_name() {
        let sel = AnimationSelection::new("locomotion", "walk", "walking forward");
        assert_eq!(sel.artifact_stem(), "locomotion_walk");
    }

    #[test]
    fn artifact_stem_sanitizes_special_characters() {
        let sel = AnimationSelection::new("combat/melee", "sword slash!", "a slash");
        assert_eq!(sel.artifact_stem(), "combat_melee_sword_slash_");
    }

    #[test]
    fn full_prompt_includes_style_and_constraints() {
        let mut sel = AnimationSelection::new("idle", "breathe", "standing idle");
        sel.style = "heroic".to_string();
        sel.constraints = "feet stay planted".to_string();

        let prompt = sel.full_prompt();
        assert!(prompt.contains("standing idle"));
        assert!(prompt.contains("heroic"));
        assert!(prompt.contains("feet stay planted"));
    }

    #[test]
    fn optional_fields_default_when_missing() {
        let toml = r#"
            category = "locomotion"
            name = "run"
            motion = "running fast"
        "#;
        let sel: AnimationSelection = toml::from_str(toml).unwrap();
        assert_eq!(sel.style, "");
        assert!(sel.camera.is_none());
        assert!(sel.fps.is_none());
    }
}
