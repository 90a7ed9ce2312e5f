//! Stage definitions, mesh-type policy and job construction.

pub mod command;
pub mod policy;
pub mod registry;

pub use policy::{
    stage_verdict, SKIP_DISABLED, SKIP_MODELS_UNMET, SKIP_NO_ANIMATION, SKIP_STATIC_MESH,
};
pub use registry::{PlannedStage, StageDefinition, StageRegistry};
