//! Project storage and persisted per-project configuration.
//!
//! A project is a directory under the projects root holding a `project.toml`
//! configuration, numbered stage output directories, a `logs/` directory for
//! run logs, and a `run.json` record of the latest run.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{AnimationMode, AnimationSelection, MeshType, StageKind};

/// Errors from project storage operations.
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("project '{id}' not found under {root}")]
    NotFound { id: String, root: PathBuf },

    #[error("project '{0}' already exists")]
    AlreadyExists(String),

    #[error("invalid project id '{0}': only letters, digits, '-' and '_' are allowed")]
    InvalidId(String),

    #[error("project io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize project config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, ProjectError>;

/// Texture-synthesis parameters passed to the diffusion backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TextureSettings {
    /// Positive prompt for texture synthesis.
    pub prompt: String,
    /// Negative prompt.
    pub negative_prompt: String,
    /// Sampler seed fed to the backend workflow.
    pub seed: u64,
    /// Reference image path, relative to project root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_image: Option<String>,
}

impl Default for TextureSettings {
    fn default() -> Self {
        Self {
            prompt: "3D game character texture, high quality".to_string(),
            negative_prompt: "blurry, low quality, distorted".to_string(),
            seed: 42,
            reference_image: None,
        }
    }
}

/// Animation stage configuration: which motions to generate and how.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnimationConfig {
    /// Source of animation selections.
    pub mode: AnimationMode,
    /// Library selections (used in `library` mode).
    pub selections: Vec<AnimationSelection>,
    /// One-off selection (used in `custom` mode).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom: Option<AnimationSelection>,
}

impl AnimationConfig {
    /// Resolve the ordered batch of animation items for a run.
    ///
    /// Returns the offending configuration field name when the mode has no
    /// usable selections.
    pub fn batch(&self) -> std::result::Result<Vec<AnimationSelection>, &'static str> {
        match self.mode {
            AnimationMode::Library => {
                if self.selections.is_empty() {
                    Err("animation.selections")
                } else {
                    Ok(self.selections.clone())
                }
            }
            AnimationMode::Custom => match &self.custom {
                Some(selection) => Ok(vec![selection.clone()]),
                None => Err("animation.custom"),
            },
        }
    }
}

/// Sprite-rendering options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpriteSettings {
    /// Whether the user opted in to sprite generation.
    pub enabled: bool,
    /// Render every Nth animation frame.
    pub frame_interval: u32,
    /// Camera angles to render each frame from.
    pub camera_angles: Vec<String>,
    /// Positive prompt for sprite stylization.
    pub prompt: String,
    /// Negative prompt.
    pub negative_prompt: String,
    /// Square output resolution in pixels.
    pub resolution: u32,
    /// Assemble per-angle frames into a spritesheet.
    pub spritesheet: bool,
}

impl Default for SpriteSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            frame_interval: 5,
            camera_angles: vec!["front".to_string(), "side".to_string(), "back".to_string()],
            prompt: "game sprite, clean pixel-perfect render".to_string(),
            negative_prompt: "blurry, low quality".to_string(),
            resolution: 512,
            spritesheet: true,
        }
    }
}

/// Per-project persisted configuration (`project.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProjectConfig {
    /// Mesh category driving the stage policy.
    pub mesh_type: MeshType,
    /// Texture stage parameters.
    pub texture: TextureSettings,
    /// Animation stage parameters.
    pub animation: AnimationConfig,
    /// Sprite stage parameters.
    pub sprites: SpriteSettings,
}

/// A loaded project: identifier, on-disk root and configuration.
#[derive(Debug, Clone)]
pub struct Project {
    /// Project identifier (directory name under the projects root).
    pub id: String,
    /// Absolute path of the project directory.
    pub root: PathBuf,
    /// Persisted configuration.
    pub config: ProjectConfig,
}

impl Project {
    /// Output directory for a stage, e.g. `<root>/3_animation`.
    pub fn stage_dir(&self, stage: StageKind) -> PathBuf {
        self.root.join(stage.dir_name())
    }

    /// Directory holding per-run log files.
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Path of the persisted latest-run record.
    pub fn run_record_path(&self) -> PathBuf {
        self.root.join("run.json")
    }

    /// Path of the project configuration file.
    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }
}

const CONFIG_FILE: &str = "project.toml";

/// Filesystem store of projects under a single root directory.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    root: PathBuf,
}

impl ProjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The projects root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory a project with this id lives in.
    pub fn project_root(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Whether a project with this id exists.
    pub fn exists(&self, id: &str) -> bool {
        self.project_root(id).join(CONFIG_FILE).is_file()
    }

    /// Create a new project directory with a default configuration.
    pub fn init(&self, id: &str, mesh_type: MeshType) -> Result<Project> {
        if !is_valid_id(id) {
            return Err(ProjectError::InvalidId(id.to_string()));
        }
        if self.exists(id) {
            return Err(ProjectError::AlreadyExists(id.to_string()));
        }

        let root = self.project_root(id);
        fs::create_dir_all(root.join("logs"))?;

        let project = Project {
            id: id.to_string(),
            root,
            config: ProjectConfig {
                mesh_type,
                ..ProjectConfig::default()
            },
        };
        self.save(&project)?;
        Ok(project)
    }

    /// Load an existing project by id.
    pub fn load(&self, id: &str) -> Result<Project> {
        let root = self.project_root(id);
        let config_path = root.join(CONFIG_FILE);

        if !config_path.is_file() {
            return Err(ProjectError::NotFound {
                id: id.to_string(),
                root: self.root.clone(),
            });
        }

        let content = fs::read_to_string(&config_path)?;
        let config: ProjectConfig =
            toml::from_str(&content).map_err(|source| ProjectError::Parse {
                path: config_path,
                source,
            })?;

        Ok(Project {
            id: id.to_string(),
            root,
            config,
        })
    }

    /// Persist a project's configuration atomically.
    pub fn save(&self, project: &Project) -> Result<()> {
        let content = toml::to_string_pretty(&project.config)?;
        atomic_write(&project.config_path(), content.as_bytes())?;
        Ok(())
    }

    /// List project ids, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();

        if !self.root.is_dir() {
            return Ok(ids);
        }

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.path().join(CONFIG_FILE).is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                ids.push(name.to_string());
            }
        }

        ids.sort();
        Ok(ids)
    }
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Write atomically: temp file in the same directory, then rename.
fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let temp_path = path.with_extension("toml.tmp");

    {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
    }

    fs::rename(&temp_path, path)?;
    Ok(())
}
