//! Error types for run submission and queries.
//!
//! Only pre-execution problems surface here: once a caller holds a run
//! handle, execution-time failures (timeouts, nonzero exits, cancellation)
//! go into the run record instead of being thrown back.

use thiserror::Error;

use crate::project::ProjectError;

/// Errors returned synchronously by the orchestrator.
#[derive(Debug, Error)]
pub enum RunError {
    /// The project already has an active run.
    #[error("project '{project_id}' already has an active run")]
    AlreadyRunning { project_id: String },

    /// A required stage's model validation failed before execution.
    #[error("stage '{stage}' failed model validation: {}", .missing.join("; "))]
    ValidationFailed { stage: String, missing: Vec<String> },

    /// A caller-facing precondition was not met (e.g. an unconfirmed
    /// large animation batch).
    #[error("precondition failed: {reason}")]
    PreconditionFailed { reason: String },

    /// The project configuration cannot produce a runnable plan.
    #[error("invalid configuration field '{field}': {detail}")]
    ConfigurationInvalid { field: String, detail: String },

    /// Project loading or persistence failed.
    #[error(transparent)]
    Project(#[from] ProjectError),

    /// Run infrastructure could not be prepared (log file, worker thread).
    #[error("failed to set up run for project '{project_id}': {message}")]
    SetupFailed { project_id: String, message: String },
}

impl RunError {
    /// Create an AlreadyRunning error.
    pub fn already_running(project_id: impl Into<String>) -> Self {
        Self::AlreadyRunning {
            project_id: project_id.into(),
        }
    }

    /// Create a ValidationFailed error.
    pub fn validation_failed(stage: impl Into<String>, missing: Vec<String>) -> Self {
        Self::ValidationFailed {
            stage: stage.into(),
            missing,
        }
    }

    /// Create a PreconditionFailed error.
    pub fn precondition_failed(reason: impl Into<String>) -> Self {
        Self::PreconditionFailed {
            reason: reason.into(),
        }
    }

    /// Create a ConfigurationInvalid error.
    pub fn configuration_invalid(field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ConfigurationInvalid {
            field: field.into(),
            detail: detail.into(),
        }
    }

    /// Create a SetupFailed error.
    pub fn setup_failed(project_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SetupFailed {
            project_id: project_id.into(),
            message: message.into(),
        }
    }
}

/// Result type for run submission and queries.
pub type RunResult<T> = Result<T, RunError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_running_names_the_project() {
        let err = RunError::already_running("hero");
        assert_eq!(err.to_string(), "project 'hero' already has an active run");
    }

    #[test]
    fn validation_failed_joins_missing_requirements() {
        let err = RunError::validation_failed(
            "textures",
            vec![
                "no checkpoint model containing 'sdxl'".to_string(),
                "no style-adapter model containing 'ip-adapter'".to_string(),
            ],
        );
        let msg = err.to_string();
        assert!(msg.starts_with("stage 'textures' failed model validation"));
        assert!(msg.contains("'sdxl'; no style-adapter"));
    }

    #[test]
    fn precondition_failed_carries_reason() {
        let err = RunError::precondition_failed("batch of 11 animations requires confirmation");
        assert!(err.to_string().contains("11 animations"));
    }

    #[test]
    fn configuration_invalid_names_the_field() {
        let err = RunError::configuration_invalid("animation.selections", "no selections configured");
        assert_eq!(
            err.to_string(),
            "invalid configuration field 'animation.selections': no selections configured"
        );
    }

    #[test]
    fn project_errors_pass_through() {
        let err = RunError::from(ProjectError::InvalidId("bad id!".to_string()));
        assert!(matches!(err, RunError::Project(_)));
    }
}
