//! Atelier CLI - command-line front end for the asset pipeline

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use atelier_core::config::ConfigManager;
use atelier_core::logging::{self, LogLevel};
use atelier_core::models::{MeshType, ModelCategory};
use atelier_core::orchestrator::DEFAULT_LOG_LINES;

use commands::{init, log, models, plan, projects, run, status};

#[derive(Parser)]
#[command(name = "atelier")]
#[command(about = "Pipeline orchestrator for multi-stage asset production", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the settings file (created with defaults when missing)
    #[arg(long, global = true, default_value = "atelier.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new project with a default configuration
    Init {
        /// Project id (directory-safe name)
        project: String,

        /// Mesh type: skeletal, static or custom
        #[arg(long, default_value = "skeletal")]
        mesh_type: MeshType,
    },

    /// List known projects
    Projects,

    /// Show the stage plan and model validation for a project, without running
    Plan {
        /// Project id
        project: String,
    },

    /// Run the pipeline for a project and stream its log
    Run {
        /// Project id
        project: String,

        /// Proceed with an animation batch at or above the confirmation threshold
        #[arg(long)]
        confirm_large_batch: bool,

        /// Enable sprite rendering for this project before running
        #[arg(long, conflicts_with = "no_sprites")]
        sprites: bool,

        /// Disable sprite rendering for this project before running
        #[arg(long)]
        no_sprites: bool,
    },

    /// Show the status of a project's active or most recent run
    Status {
        /// Project id
        project: String,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Print the tail of a project's run log
    Log {
        /// Project id
        project: String,

        /// Number of entries to print
        #[arg(short = 'n', long, default_value_t = DEFAULT_LOG_LINES)]
        lines: usize,
    },

    /// List model files available to the diffusion backend
    Models {
        /// Only this category: checkpoint, lora, controlnet, vae, style-adapter
        #[arg(long)]
        category: Option<ModelCategory>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init_tracing(LogLevel::Warn);

    let mut manager = ConfigManager::new(&cli.config);
    manager
        .load_or_create()
        .with_context(|| format!("failed to load settings from {}", cli.config))?;
    manager.ensure_dirs_exist()?;
    let settings = manager.settings().clone();

    match cli.command {
        Commands::Init { project, mesh_type } => init::run(&settings, &project, mesh_type),
        Commands::Projects => projects::run(&settings),
        Commands::Plan { project } => plan::run(&settings, &project),
        Commands::Run {
            project,
            confirm_large_batch,
            sprites,
            no_sprites,
        } => {
            let sprites_override = if sprites {
                Some(true)
            } else if no_sprites {
                Some(false)
            } else {
                None
            };
            run::run(settings, &project, confirm_large_batch, sprites_override)
        }
        Commands::Status { project, format } => status::run(&settings, &project, &format),
        Commands::Log { project, lines } => log::run(&settings, &project, lines),
        Commands::Models { category } => models::run(&settings, category),
    }
}
