//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Each section can be updated independently for atomic section-level updates.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path-related settings.
    #[serde(default)]
    pub paths: PathSettings,

    /// Diffusion backend connection settings.
    #[serde(default)]
    pub backend: BackendSettings,

    /// External tool locations.
    #[serde(default)]
    pub tools: ToolSettings,

    /// Per-stage timeouts.
    #[serde(default)]
    pub timeouts: TimeoutSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Model store settings.
    #[serde(default)]
    pub models: ModelSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            paths: PathSettings::default(),
            backend: BackendSettings::default(),
            tools: ToolSettings::default(),
            timeouts: TimeoutSettings::default(),
            logging: LoggingSettings::default(),
            models: ModelSettings::default(),
        }
    }
}

/// Path configuration for projects, the backend install, and templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// Root folder containing project directories.
    #[serde(default = "default_projects_root")]
    pub projects_root: String,

    /// Diffusion backend install root (model store and output live under it).
    #[serde(default = "default_backend_root")]
    pub backend_root: String,

    /// Folder containing workflow graph templates.
    #[serde(default = "default_workflows_dir")]
    pub workflows_dir: String,
}

fn default_projects_root() -> String {
    "projects".to_string()
}

fn default_backend_root() -> String {
    "comfyui".to_string()
}

fn default_workflows_dir() -> String {
    "workflows".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            projects_root: default_projects_root(),
            backend_root: default_backend_root(),
            workflows_dir: default_workflows_dir(),
        }
    }
}

/// Diffusion backend connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Base URL of the backend job API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Seconds between job status polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Readiness probe attempts before giving up.
    #[serde(default = "default_ready_attempts")]
    pub ready_attempts: u32,

    /// Seconds between readiness probes.
    #[serde(default = "default_ready_interval")]
    pub ready_interval_secs: u64,

    /// Retries for transient transport errors.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Output directory name under the backend root.
    #[serde(default = "default_output_subdir")]
    pub output_subdir: String,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8188".to_string()
}

fn default_poll_interval() -> u64 {
    2
}

fn default_request_timeout() -> u64 {
    30
}

fn default_ready_attempts() -> u32 {
    30
}

fn default_ready_interval() -> u64 {
    2
}

fn default_max_retries() -> u32 {
    3
}

fn default_output_subdir() -> String {
    "output".to_string()
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            poll_interval_secs: default_poll_interval(),
            request_timeout_secs: default_request_timeout(),
            ready_attempts: default_ready_attempts(),
            ready_interval_secs: default_ready_interval(),
            max_retries: default_max_retries(),
            output_subdir: default_output_subdir(),
        }
    }
}

/// Locations of the subprocess tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSettings {
    /// Render engine binary (rigging and export).
    #[serde(default = "default_render_engine")]
    pub render_engine: String,

    /// Rigging script passed to the render engine.
    #[serde(default = "default_rig_script")]
    pub rig_script: String,

    /// Export script passed to the render engine.
    #[serde(default = "default_export_script")]
    pub export_script: String,

    /// Interpreter for the motion engine.
    #[serde(default = "default_motion_engine")]
    pub motion_engine: String,

    /// Motion generation script.
    #[serde(default = "default_motion_script")]
    pub motion_script: String,
}

fn default_render_engine() -> String {
    "blender".to_string()
}

fn default_rig_script() -> String {
    "scripts/rig_character.py".to_string()
}

fn default_export_script() -> String {
    "scripts/export_game_ready.py".to_string()
}

fn default_motion_engine() -> String {
    "python3".to_string()
}

fn default_motion_script() -> String {
    "scripts/generate_motion.py".to_string()
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            render_engine: default_render_engine(),
            rig_script: default_rig_script(),
            export_script: default_export_script(),
            motion_engine: default_motion_engine(),
            motion_script: default_motion_script(),
        }
    }
}

/// Per-stage timeouts in seconds.
///
/// The animation timeout applies to each batch item, not the whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutSettings {
    #[serde(default = "default_texture_timeout")]
    pub texture_secs: u64,

    #[serde(default = "default_rig_timeout")]
    pub rig_secs: u64,

    #[serde(default = "default_animation_timeout")]
    pub animation_secs: u64,

    #[serde(default = "default_export_timeout")]
    pub export_secs: u64,

    #[serde(default = "default_sprite_timeout")]
    pub sprite_secs: u64,
}

fn default_texture_timeout() -> u64 {
    600
}

fn default_rig_timeout() -> u64 {
    300
}

fn default_animation_timeout() -> u64 {
    600
}

fn default_export_timeout() -> u64 {
    300
}

fn default_sprite_timeout() -> u64 {
    900
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            texture_secs: default_texture_timeout(),
            rig_secs: default_rig_timeout(),
            animation_secs: default_animation_timeout(),
            export_secs: default_export_timeout(),
            sprite_secs: default_sprite_timeout(),
        }
    }
}

impl TimeoutSettings {
    /// Timeout for one animation batch item.
    pub fn animation_item(&self) -> Duration {
        Duration::from_secs(self.animation_secs)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Number of recent log entries kept in memory per run.
    #[serde(default = "default_tail_cache")]
    pub tail_cache: usize,

    /// Number of subprocess output lines kept for failure detail.
    #[serde(default = "default_error_tail")]
    pub error_tail: usize,

    /// Show timestamps in formatted log lines.
    #[serde(default = "default_true")]
    pub show_timestamps: bool,
}

fn default_tail_cache() -> usize {
    256
}

fn default_error_tail() -> usize {
    20
}

fn default_true() -> bool {
    true
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            tail_cache: default_tail_cache(),
            error_tail: default_error_tail(),
            show_timestamps: true,
        }
    }
}

/// Model store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Minimum size in bytes for a model file to pass integrity checks.
    /// Catches empty and truncated placeholder files.
    #[serde(default = "default_min_model_bytes")]
    pub min_model_bytes: u64,

    /// Preferred model per category (category name -> file name).
    /// Validation falls back to the first valid candidate when unset.
    #[serde(default)]
    pub preferred: BTreeMap<String, String>,
}

fn default_min_model_bytes() -> u64 {
    65536
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            min_model_bytes: default_min_model_bytes(),
            preferred: BTreeMap::new(),
        }
    }
}

/// Names of config sections for targeted updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigSection {
    Paths,
    Backend,
    Tools,
    Timeouts,
    Logging,
    Models,
}

impl ConfigSection {
    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "paths",
            ConfigSection::Backend => "backend",
            ConfigSection::Tools => "tools",
            ConfigSection::Timeouts => "timeouts",
            ConfigSection::Logging => "logging",
            ConfigSection::Models => "models",
        }
    }

    /// All sections in file order.
    pub fn all() -> [ConfigSection; 6] {
        [
            ConfigSection::Paths,
            ConfigSection::Backend,
            ConfigSection::Tools,
            ConfigSection::Timeouts,
            ConfigSection::Logging,
            ConfigSection::Models,
        ]
    }
}
