//! Configuration management for Atelier.
//!
//! This module provides:
//! - TOML-based configuration with logical sections
//! - Atomic file writes (write to temp, then rename)
//! - Section-level updates (only changed section is modified)
//!
//! # Example
//!
//! ```no_run
//! use atelier_core::config::{ConfigManager, ConfigSection};
//!
//! // Create manager and load (or create default) config
//! let mut config = ConfigManager::new(".config/settings.toml");
//! config.load_or_create().unwrap();
//!
//! // Read settings
//! println!("Backend: {}", config.settings().backend.base_url);
//!
//! // Modify a setting
//! config.settings_mut().backend.poll_interval_secs = 5;
//!
//! // Save just the backend section atomically
//! config.update_section(ConfigSection::Backend).unwrap();
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    BackendSettings, ConfigSection, LoggingSettings, ModelSettings, PathSettings, Settings,
    TimeoutSettings, ToolSettings,
};
