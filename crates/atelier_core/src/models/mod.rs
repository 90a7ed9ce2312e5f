//! Data models for the Atelier pipeline.
//!
//! This module contains:
//! - Core enums (mesh types, stages, model categories, verdicts)
//! - Animation selection types
//! - Run records and status views

mod animation;
mod enums;
mod run;

pub use animation::AnimationSelection;
pub use enums::{
    AnimationMode, FailureKind, MeshType, ModelCategory, StageKind, ToolKind, Verdict,
};
pub use run::{
    BatchItemReport, BatchReport, PipelineRun, RunFailure, RunState, StageOutcome, StageRecord,
    StageStatus, StatusReport,
};
