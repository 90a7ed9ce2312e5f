//! Atelier Core - Backend logic for the Atelier asset pipeline
//!
//! This crate contains all orchestration logic with zero UI dependencies.
//! It can be used by the CLI application or embedded in another front end.
//!
//! The pipeline turns a project (a character or prop definition plus its
//! configuration) into production assets by driving external tools:
//! a diffusion backend for texture and sprite synthesis, a render engine
//! for rigging and export, and a motion engine for animation.

pub mod batch;
pub mod config;
pub mod invoker;
pub mod logging;
pub mod models;
pub mod modelstore;
pub mod orchestrator;
pub mod project;
pub mod stages;
pub mod tracker;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_returns_value() {
        assert!(!version().is_empty());
    }
}
