//! CLI command implementations

pub mod init;
pub mod log;
pub mod models;
pub mod plan;
pub mod projects;
pub mod run;
pub mod status;
