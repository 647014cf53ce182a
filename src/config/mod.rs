// ABOUTME: Configuration management for dev-tutorial
// Layered TOML files (system, user, project) plus environment overrides

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding `docker.host`
pub const ENV_DOCKER_HOST: &str = "DEV_TUTORIAL_DOCKER_HOST";
/// Environment variable overriding `server.bind`
pub const ENV_BIND: &str = "DEV_TUTORIAL_BIND";
/// Environment variable overriding `tutorials.directories` (`:` separated)
pub const ENV_TUTORIALS: &str = "DEV_TUTORIAL_TUTORIALS";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub docker: DockerConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub tutorials: TutorialsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Docker host connection string
    /// Examples:
    /// - unix:///var/run/docker.sock
    /// - tcp://host.docker.internal:2375
    pub host: Option<String>,

    /// Ping timeout in seconds
    #[serde(default = "default_docker_timeout")]
    pub timeout: u64,

    /// Interactive shell started on attach
    #[serde(default = "default_shell")]
    pub shell: String,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            host: None,
            timeout: default_docker_timeout(),
            shell: default_shell(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Request header carrying the identity authenticated upstream
    #[serde(default = "default_identity_header")]
    pub identity_header: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            identity_header: default_identity_header(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TutorialsConfig {
    /// Directories holding one `<slug>/tutorial.json` + Dockerfile per tutorial
    #[serde(default = "default_tutorial_directories")]
    pub directories: Vec<PathBuf>,
}

impl Default for TutorialsConfig {
    fn default() -> Self {
        Self {
            directories: default_tutorial_directories(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Where JSONL log files go (default: ~/.dev-tutorial/logs)
    pub directory: Option<PathBuf>,

    /// Default `EnvFilter` directive when RUST_LOG is unset
    pub filter: Option<String>,
}

/// One config file as written: only the keys it sets are `Some`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigLayer {
    docker: DockerLayer,
    server: ServerLayer,
    tutorials: TutorialsLayer,
    logging: LoggingConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DockerLayer {
    host: Option<String>,
    timeout: Option<u64>,
    shell: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServerLayer {
    bind: Option<String>,
    identity_header: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TutorialsLayer {
    directories: Option<Vec<PathBuf>>,
}

fn default_docker_timeout() -> u64 {
    60
}

fn default_shell() -> String {
    "/bin/bash".to_string()
}

fn default_bind() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_identity_header() -> String {
    "x-user-id".to_string()
}

fn default_tutorial_directories() -> Vec<PathBuf> {
    vec![PathBuf::from("tutorials")]
}

impl AppConfig {
    /// Load configuration from default locations, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::get_config_paths())?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Like [`AppConfig::load`] with `path` applied last. The file must exist.
    pub fn load_with(path: &Path) -> Result<Self> {
        if !path.is_file() {
            anyhow::bail!("Config file {} not found", path.display());
        }
        let mut paths = Self::get_config_paths();
        paths.push(path.to_path_buf());

        let mut config = Self::load_from(&paths)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load and merge the given files, later files overriding earlier ones. Missing files are skipped.
    pub fn load_from(paths: &[PathBuf]) -> Result<Self> {
        let mut config = Self::default();

        for path in paths {
            if path.exists() {
                config.merge(Self::read_file(path)?);
            }
        }

        Ok(config)
    }

    fn read_file(path: &Path) -> Result<ConfigLayer> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Configuration file paths, lowest precedence first
    fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/dev-tutorial/config.toml")];

        if let Some(config_dir) = Self::get_user_config_dir() {
            paths.push(config_dir.join("config.toml"));
        }

        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd.join(".dev-tutorial").join("config.toml"));
        }

        paths
    }

    /// `~/.dev-tutorial`
    pub fn get_user_config_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".dev-tutorial"))
    }

    /// Log directory, falling back to `~/.dev-tutorial/logs` then `./logs`
    pub fn log_directory(&self) -> PathBuf {
        self.logging
            .directory
            .clone()
            .or_else(|| Self::get_user_config_dir().map(|dir| dir.join("logs")))
            .unwrap_or_else(|| PathBuf::from("logs"))
    }

    /// Apply the keys a config file sets, including ones set back to their default.
    fn merge(&mut self, layer: ConfigLayer) {
        let ConfigLayer {
            docker,
            server,
            tutorials,
            logging,
        } = layer;

        if docker.host.is_some() {
            self.docker.host = docker.host;
        }
        if let Some(timeout) = docker.timeout {
            self.docker.timeout = timeout;
        }
        if let Some(shell) = docker.shell {
            self.docker.shell = shell;
        }

        if let Some(bind) = server.bind {
            self.server.bind = bind;
        }
        if let Some(header) = server.identity_header {
            self.server.identity_header = header;
        }

        if let Some(directories) = tutorials.directories {
            self.tutorials.directories = directories;
        }

        if logging.directory.is_some() {
            self.logging.directory = logging.directory;
        }
        if logging.filter.is_some() {
            self.logging.filter = logging.filter;
        }
    }

    /// Apply `DEV_TUTORIAL_*` overrides read through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup(ENV_DOCKER_HOST).filter(|v| !v.is_empty()) {
            self.docker.host = Some(host);
        }
        if let Some(bind) = lookup(ENV_BIND).filter(|v| !v.is_empty()) {
            self.server.bind = bind;
        }
        if let Some(dirs) = lookup(ENV_TUTORIALS).filter(|v| !v.is_empty()) {
            self.tutorials.directories = std::env::split_paths(&dirs).collect();
        }
    }
}
