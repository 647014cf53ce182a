// ABOUTME: CLI argument parsing and command routing for dev-tutorial
//
// Provides command-line interface for:
// - Serving tutorial sessions over WebSocket (serve)
// - Managing tutorial containers (run, destroy, status, write)
// - Checking tutorial validator descriptors (check)

pub mod check;
pub mod container;
pub mod serve;

use crate::config::AppConfig;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Containerized interactive coding tutorials
#[derive(Parser)]
#[command(name = "dev-tutorial")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Extra configuration file, applied over the default locations
    #[arg(long, global = true, env = "DEV_TUTORIAL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Docker daemon address (unix://... or tcp://...)
    #[arg(long, global = true)]
    pub docker_host: Option<String>,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Serve tutorial sessions over WebSocket
    Serve(ServeArgs),

    /// Build and start a fresh container for a tutorial
    Run(TutorialArgs),

    /// Stop and remove the container of a tutorial
    Destroy(TutorialArgs),

    /// Show the container state of a tutorial
    Status(TutorialArgs),

    /// Write a file into a running tutorial container
    Write(WriteArgs),

    /// Parse tutorial validator descriptors and report configuration errors
    Check(CheckArgs),
}

#[derive(clap::Args)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long)]
    pub bind: Option<String>,
}

#[derive(clap::Args)]
pub struct TutorialArgs {
    /// Tutorial slug
    pub slug: String,
}

#[derive(clap::Args)]
pub struct WriteArgs {
    /// Tutorial slug
    pub slug: String,

    /// Destination path in the container
    pub path: String,

    /// Read content from this file instead of stdin
    #[arg(long, short)]
    pub file: Option<PathBuf>,
}

#[derive(clap::Args)]
pub struct CheckArgs {
    /// Only check this tutorial
    pub slug: Option<String>,
}

impl Cli {
    /// Configuration with the command line overrides applied.
    pub fn load_config(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load_with(path)
                .with_context(|| format!("Failed to load configuration {}", path.display()))?,
            None => AppConfig::load()?,
        };

        if let Some(host) = &self.docker_host {
            config.docker.host = Some(host.clone());
        }
        if let Commands::Serve(ServeArgs { bind: Some(bind) }) = &self.command {
            config.server.bind = bind.clone();
        }
        Ok(config)
    }

    pub async fn execute(self, config: AppConfig) -> Result<()> {
        let format = self.format;
        match self.command {
            Commands::Serve(_) => serve::execute(config).await,
            Commands::Run(args) => container::run(args, &config).await,
            Commands::Destroy(args) => container::destroy(args, &config).await,
            Commands::Status(args) => container::status(args, &config, format).await,
            Commands::Write(args) => container::write(args, &config).await,
            Commands::Check(args) => check::execute(args, &config, format).await,
        }
    }
}
