//! Core enums used throughout the application.

use serde::{Deserialize, Serialize};

/// Kind of mesh a project produces assets for.
///
/// Drives the stage policy: static meshes never go through rigging or
/// animation, and sprite rendering only applies to meshes that animate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshType {
    /// Standard humanoid or creature mesh with a skeleton.
    #[default]
    Skeletal,
    /// Props and scenery; no skeleton, no motion.
    Static,
    /// Non-standard rig (extra limbs, mechanical joints) that still animates.
    Custom,
}

impl MeshType {
    pub fn name(&self) -> &'static str {
        match self {
            MeshType::Skeletal => "skeletal",
            MeshType::Static => "static",
            MeshType::Custom => "custom",
        }
    }

    /// All mesh types in declaration order.
    pub fn all() -> [MeshType; 3] {
        [MeshType::Skeletal, MeshType::Static, MeshType::Custom]
    }
}

impl std::fmt::Display for MeshType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for MeshType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skeletal" => Ok(MeshType::Skeletal),
            "static" => Ok(MeshType::Static),
            "custom" => Ok(MeshType::Custom),
            other => Err(format!(
                "unknown mesh type '{}'; valid values: skeletal, static, custom",
                other
            )),
        }
    }
}

/// Pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    /// Texture synthesis via the diffusion backend.
    Textures,
    /// Skeleton binding via the render engine.
    Rigging,
    /// Motion clip generation, one job per selection.
    Animation,
    /// Game-ready export via the render engine.
    Export,
    /// Sprite sheet rendering via the diffusion backend.
    Sprites,
}

impl StageKind {
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Textures => "textures",
            StageKind::Rigging => "rigging",
            StageKind::Animation => "animation",
            StageKind::Export => "export",
            StageKind::Sprites => "sprites",
        }
    }

    /// 1-based position in the pipeline.
    pub fn ordinal(&self) -> usize {
        match self {
            StageKind::Textures => 1,
            StageKind::Rigging => 2,
            StageKind::Animation => 3,
            StageKind::Export => 4,
            StageKind::Sprites => 5,
        }
    }

    /// Stage output directory name under the project root.
    pub fn dir_name(&self) -> &'static str {
        match self {
            StageKind::Textures => "1_textures",
            StageKind::Rigging => "2_rig",
            StageKind::Animation => "3_animation",
            StageKind::Export => "4_export",
            StageKind::Sprites => "5_sprites",
        }
    }

    /// The external tool this stage delegates to.
    pub fn tool(&self) -> ToolKind {
        match self {
            StageKind::Textures | StageKind::Sprites => ToolKind::DiffusionBackend,
            StageKind::Rigging | StageKind::Export => ToolKind::RenderEngine,
            StageKind::Animation => ToolKind::MotionEngine,
        }
    }

    /// All stages in execution order.
    pub fn all() -> [StageKind; 5] {
        [
            StageKind::Textures,
            StageKind::Rigging,
            StageKind::Animation,
            StageKind::Export,
            StageKind::Sprites,
        ]
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// External tool a stage delegates its work to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Long-lived HTTP service with a submit/poll job API.
    DiffusionBackend,
    /// Headless 3D engine invoked as a subprocess.
    RenderEngine,
    /// Text-to-motion engine invoked as a subprocess.
    MotionEngine,
}

impl ToolKind {
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::DiffusionBackend => "diffusion backend",
            ToolKind::RenderEngine => "render engine",
            ToolKind::MotionEngine => "motion engine",
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Category of model file in the diffusion backend's store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelCategory {
    #[serde(rename = "checkpoint")]
    Checkpoint,
    #[serde(rename = "lora")]
    Lora,
    #[serde(rename = "controlnet")]
    ControlNet,
    #[serde(rename = "vae")]
    Vae,
    #[serde(rename = "style-adapter")]
    StyleAdapter,
}

impl ModelCategory {
    pub fn name(&self) -> &'static str {
        match self {
            ModelCategory::Checkpoint => "checkpoint",
            ModelCategory::Lora => "lora",
            ModelCategory::ControlNet => "controlnet",
            ModelCategory::Vae => "vae",
            ModelCategory::StyleAdapter => "style-adapter",
        }
    }

    /// Subdirectory of the store root holding this category.
    pub fn subdir(&self) -> &'static str {
        match self {
            ModelCategory::Checkpoint => "checkpoints",
            ModelCategory::Lora => "loras",
            ModelCategory::ControlNet => "controlnet",
            ModelCategory::Vae => "vae",
            ModelCategory::StyleAdapter => "ipadapter",
        }
    }

    /// File extensions accepted for this category.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            ModelCategory::Checkpoint | ModelCategory::Lora => &["safetensors", "ckpt", "pt"],
            ModelCategory::ControlNet => &["safetensors", "pth", "bin"],
            ModelCategory::Vae => &["safetensors", "pt", "ckpt"],
            ModelCategory::StyleAdapter => &["safetensors", "bin"],
        }
    }

    /// All categories in declaration order.
    pub fn all() -> [ModelCategory; 5] {
        [
            ModelCategory::Checkpoint,
            ModelCategory::Lora,
            ModelCategory::ControlNet,
            ModelCategory::Vae,
            ModelCategory::StyleAdapter,
        ]
    }
}

impl std::fmt::Display for ModelCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ModelCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "checkpoint" => Ok(ModelCategory::Checkpoint),
            "lora" => Ok(ModelCategory::Lora),
            "controlnet" => Ok(ModelCategory::ControlNet),
            "vae" => Ok(ModelCategory::Vae),
            "style-adapter" | "ipadapter" => Ok(ModelCategory::StyleAdapter),
            other => Err(format!(
                "unknown model category '{}'; valid values: checkpoint, lora, controlnet, vae, style-adapter",
                other
            )),
        }
    }
}

/// How the animation batch is assembled from project config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimationMode {
    /// Ordered sequence of selections from the animation library.
    #[default]
    Library,
    /// Exactly one ad-hoc selection described inline.
    Custom,
}

impl std::fmt::Display for AnimationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnimationMode::Library => write!(f, "library"),
            AnimationMode::Custom => write!(f, "custom"),
        }
    }
}

/// What the policy decided for a stage before the run started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Stage must run; failure fails the run.
    Required,
    /// Stage runs because the user enabled it; failure degrades the run.
    OptionalEnabled,
    /// Stage does not run.
    Skip { reason: String },
}

impl Verdict {
    /// Create a skip verdict with a reason.
    pub fn skip(reason: impl Into<String>) -> Self {
        Verdict::Skip {
            reason: reason.into(),
        }
    }

    pub fn is_required(&self) -> bool {
        matches!(self, Verdict::Required)
    }

    /// True if the stage will be invoked (required or optional).
    pub fn runs(&self) -> bool {
        !matches!(self, Verdict::Skip { .. })
    }

    pub fn skip_reason(&self) -> Option<&str> {
        match self {
            Verdict::Skip { reason } => Some(reason),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Verdict::Required => "required",
            Verdict::OptionalEnabled => "optional",
            Verdict::Skip { .. } => "skip",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Skip { reason } => write!(f, "skip ({})", reason),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// Why a stage (or the whole run) failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Model validation rejected the run before execution.
    Validation,
    /// The external tool reported failure.
    Execution,
    /// The invocation exceeded its timeout.
    TimedOut,
    /// An external cancellation signal stopped the stage.
    Cancelled,
}

impl FailureKind {
    pub fn name(&self) -> &'static str {
        match self {
            FailureKind::Validation => "validation",
            FailureKind::Execution => "execution",
            FailureKind::TimedOut => "timed out",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mesh_type_serializes_lowercase() {
        let json = serde_json::to_string(&MeshType::Skeletal).unwrap();
        assert_eq!(json, "\"skeletal\"");

        let parsed: MeshType = serde_json::from_str("\"static\"").unwrap();
        assert_eq!(parsed, MeshType::Static);
    }

    #[test]
    fn mesh_type_parses_from_str() {
        assert_eq!("custom".parse::<MeshType>().unwrap(), MeshType::Custom);
        assert!("cube".parse::<MeshType>().is_err());
    }

    #[test]
    fn stages_are_in_pipeline_order() {
        let ordinals: Vec<usize> = StageKind::all().iter().map(|s| s.ordinal()).collect();
        assert_eq!(ordinals, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn stage_dirs_carry_ordinal_prefix() {
        for stage in StageKind::all() {
            assert!(stage
                .dir_name()
                .starts_with(&stage.ordinal().to_string()));
        }
    }

    #[test]
    fn stage_tools_match_delegation() {
        assert_eq!(StageKind::Textures.tool(), ToolKind::DiffusionBackend);
        assert_eq!(StageKind::Rigging.tool(), ToolKind::RenderEngine);
        assert_eq!(StageKind::Animation.tool(), ToolKind::MotionEngine);
        assert_eq!(StageKind::Sprites.tool(), ToolKind::DiffusionBackend);
    }

    #[test]
    fn model_category_round_trips() {
        for category in ModelCategory::all() {
            let json = serde_json::to_string(&category).unwrap();
            let back: ModelCategory = serde_json::from_str(&json).unwrap();
            assert_eq!(back, category);
            assert_eq!(category.name().parse::<ModelCategory>().unwrap(), category);
        }
    }

    #[test]
    fn style_adapter_accepts_store_dir_alias() {
        assert_eq!(
            "ipadapter".parse::<ModelCategory>().unwrap(),
            ModelCategory::StyleAdapter
        );
    }

    #[test]
    fn verdict_skip_carries_reason() {
        let verdict = Verdict::skip("disabled by configuration");
        assert!(!verdict.runs());
        assert_eq!(verdict.skip_reason(), Some("disabled by configuration"));
        assert!(verdict.to_string().contains("disabled by configuration"));
    }
}
