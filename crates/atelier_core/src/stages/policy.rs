//! Mesh-type stage policy.
//!
//! Pure: the verdict depends only on the saved configuration, never on
//! external tool state, so the full table is testable offline.

use crate::models::{MeshType, StageKind, Verdict};
use crate::project::ProjectConfig;

/// Skip reason for stages a static mesh can never use.
pub const SKIP_STATIC_MESH: &str = "not applicable to static mesh";
/// Skip reason for optional stages the user left disabled.
pub const SKIP_DISABLED: &str = "disabled by configuration";
/// Skip reason when an optional stage's model validation fails.
pub const SKIP_MODELS_UNMET: &str = "model requirements unmet";
/// Skip reason when sprites cannot render because animation produced nothing.
pub const SKIP_NO_ANIMATION: &str = "animation stage did not complete";

/// Execution verdict for one stage under the project configuration.
///
/// Policy precedence: mesh-type restrictions always win over user-enabled
/// flags, so sprites on a static mesh are skipped even when enabled.
pub fn stage_verdict(stage: StageKind, config: &ProjectConfig) -> Verdict {
    match stage {
        StageKind::Textures | StageKind::Export => Verdict::Required,

        StageKind::Rigging | StageKind::Animation => match config.mesh_type {
            MeshType::Static => Verdict::skip(SKIP_STATIC_MESH),
            MeshType::Skeletal | MeshType::Custom => Verdict::Required,
        },

        StageKind::Sprites => match config.mesh_type {
            MeshType::Static => Verdict::skip(SKIP_STATIC_MESH),
            MeshType::Skeletal | MeshType::Custom => {
                if config.sprites.enabled {
                    Verdict::OptionalEnabled
                } else {
                    Verdict::skip(SKIP_DISABLED)
                }
            }
        },
    }
}
