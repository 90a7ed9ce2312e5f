//! Model store inspection and stage model-dependency validation.
//!
//! The diffusion backend loads models from category subdirectories under its
//! installation root (`models/checkpoints`, `models/loras`, ...). Stages
//! declare which models they need as keyword requirements; the validator
//! resolves each requirement to a concrete model file before anything is
//! submitted to the backend.

pub mod store;
pub mod validator;

pub use store::{ModelEntry, ModelStore};
pub use validator::{MissingRequirement, ModelValidator, Validation};

use crate::models::ModelCategory;

/// One model dependency a stage declares.
///
/// A requirement is satisfied when at least one file in the category's
/// directory contains `keyword` in its name (case-insensitive), passes the
/// integrity check, and carries a compatible architecture tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRequirement {
    /// Workflow template slot the selected model file binds to.
    pub slot: String,
    /// Model category to search.
    pub category: ModelCategory,
    /// Substring the model filename must contain.
    pub keyword: String,
    /// Expected architecture tag, checked against the store manifest.
    pub arch: Option<String>,
}

impl ModelRequirement {
    pub fn new(
        slot: impl Into<String>,
        category: ModelCategory,
        keyword: impl Into<String>,
    ) -> Self {
        Self {
            slot: slot.into(),
            category,
            keyword: keyword.into(),
            arch: None,
        }
    }

    pub fn with_arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = Some(arch.into());
        self
    }
}
