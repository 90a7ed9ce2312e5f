//! Stage registry: the ordered stage list with tools, timeouts and model
//! requirements.

use std::time::Duration;

use crate::config::TimeoutSettings;
use crate::models::{StageKind, ToolKind, Verdict};
use crate::modelstore::ModelRequirement;
use crate::project::ProjectConfig;

use super::policy::stage_verdict;

/// Static description of one pipeline stage.
#[derive(Debug, Clone)]
pub struct StageDefinition {
    /// Which stage this is.
    pub kind: StageKind,
    /// External tool the stage delegates to.
    pub tool: ToolKind,
    /// Wall-clock budget for one invocation (per item for batched stages).
    pub timeout: Duration,
    /// Models that must resolve before the stage may run.
    pub requirements: Vec<ModelRequirement>,
}

/// A stage paired with its execution verdict for a concrete run.
#[derive(Debug, Clone)]
pub struct PlannedStage {
    pub definition: StageDefinition,
    pub verdict: Verdict,
}

/// Ordered collection of stage definitions.
#[derive(Debug, Clone)]
pub struct StageRegistry {
    stages: Vec<StageDefinition>,
}

impl StageRegistry {
    /// The standard five-stage pipeline with configured timeouts.
    pub fn standard(timeouts: &TimeoutSettings) -> Self {
        let stages = vec![
            StageDefinition {
                kind: StageKind::Textures,
                tool: ToolKind::DiffusionBackend,
                timeout: Duration::from_secs(timeouts.texture_secs),
                requirements: diffusion_requirements(),
            },
            StageDefinition {
                kind: StageKind::Rigging,
                tool: ToolKind::RenderEngine,
                timeout: Duration::from_secs(timeouts.rig_secs),
                requirements: Vec::new(),
            },
            StageDefinition {
                kind: StageKind::Animation,
                tool: ToolKind::MotionEngine,
                timeout: Duration::from_secs(timeouts.animation_secs),
                requirements: Vec::new(),
            },
            StageDefinition {
                kind: StageKind::Export,
                tool: ToolKind::RenderEngine,
                timeout: Duration::from_secs(timeouts.export_secs),
                requirements: Vec::new(),
            },
            StageDefinition {
                kind: StageKind::Sprites,
                tool: ToolKind::DiffusionBackend,
                timeout: Duration::from_secs(timeouts.sprite_secs),
                requirements: sprite_requirements(),
            },
        ];

        Self { stages }
    }

    /// All stages in ordinal order.
    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    pub fn get(&self, kind: StageKind) -> Option<&StageDefinition> {
        self.stages.iter().find(|s| s.kind == kind)
    }

    /// Pair every stage with its verdict under the given configuration.
    pub fn plan(&self, config: &ProjectConfig) -> Vec<PlannedStage> {
        self.stages
            .iter()
            .map(|definition| PlannedStage {
                definition: definition.clone(),
                verdict: stage_verdict(definition.kind, config),
            })
            .collect()
    }
}

fn diffusion_requirements() -> Vec<ModelRequirement> {
    use crate::models::ModelCategory;

    vec![
        ModelRequirement::new("checkpoint", ModelCategory::Checkpoint, "sdxl").with_arch("sdxl"),
        ModelRequirement::new("style_adapter", ModelCategory::StyleAdapter, "ip-adapter"),
    ]
}

fn sprite_requirements() -> Vec<ModelRequirement> {
    use crate::models::ModelCategory;

    let mut requirements = diffusion_requirements();
    requirements.push(ModelRequirement::new(
        "controlnet_openpose",
        ModelCategory::ControlNet,
        "openpose",
    ));
    requirements.push(ModelRequirement::new(
        "controlnet_depth",
        ModelCategory::ControlNet,
        "depth",
    ));
    requirements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MeshType;

    #[test]
    fn standard_registry_is_in_ordinal_order() {
        let registry = StageRegistry::standard(&TimeoutSettings::default());
        let ordinals: Vec<usize> = registry.stages().iter().map(|s| s.kind.ordinal()).collect();
        assert_eq!(ordinals, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn timeouts_come_from_settings() {
        let timeouts = TimeoutSettings {
            rig_secs: 7,
            ..TimeoutSettings::default()
        };
        let registry = StageRegistry::standard(&timeouts);
        assert_eq!(
            registry.get(StageKind::Rigging).unwrap().timeout,
            Duration::from_secs(7)
        );
    }

    #[test]
    fn diffusion_stages_declare_model_requirements() {
        let registry = StageRegistry::standard(&TimeoutSettings::default());

        let texture = registry.get(StageKind::Textures).unwrap();
        assert_eq!(texture.requirements.len(), 2);

        let sprites = registry.get(StageKind::Sprites).unwrap();
        let slots: Vec<&str> = sprites.requirements.iter().map(|r| r.slot.as_str()).collect();
        assert!(slots.contains(&"controlnet_openpose"));
        assert!(slots.contains(&"controlnet_depth"));

        assert!(registry.get(StageKind::Rigging).unwrap().requirements.is_empty());
    }

    #[test]
    fn plan_pairs_each_stage_with_verdict() {
        let registry = StageRegistry::standard(&TimeoutSettings::default());
        let config = ProjectConfig {
            mesh_type: MeshType::Static,
            ..ProjectConfig::default()
        };

        let plan = registry.plan(&config);
        assert_eq!(plan.len(), 5);
        assert!(plan[0].verdict.is_required());
        assert!(!plan[1].verdict.runs());
        assert!(!plan[2].verdict.runs());
        assert!(plan[3].verdict.is_required());
        assert!(!plan[4].verdict.runs());
    }
}
