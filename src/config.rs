// ABOUTME: Configuration for the schema exporter and test database resetter
// ABOUTME: Loads optional pg-dev-tools.toml and resolves paths against its directory

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// File looked up in the current directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "pg-dev-tools.toml";

/// What the resetter does when a migration command fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Log the failure and keep going
    #[default]
    Continue,
    /// Skip the remaining migrations of the failing slot
    AbortSlot,
    /// Stop resetting and exit with an error
    AbortAll,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DockerConfig {
    /// Docker executable, looked up on PATH when not absolute
    pub binary: PathBuf,
    /// Name of the running PostgreSQL container
    pub container: String,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("docker"),
            container: "writing_postgres".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DumpConfig {
    pub user: String,
    pub database: String,
    /// Schema qualifier stripped from table references in the output
    pub schema: String,
    pub output_path: PathBuf,
    /// Substring of pg_dump output that marks a failed dump
    pub error_marker: String,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            user: "app".to_string(),
            database: "app".to_string(),
            schema: "public".to_string(),
            output_path: PathBuf::from("schema.sql"),
            error_marker: "pg_dump: error:".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResetConfig {
    /// Role used to drop databases and roles
    pub admin_user: String,
    /// Base database name; slot `n` uses `<database><slot_suffix><n>`
    pub database: String,
    pub slot_suffix: String,
    pub slot_count: u32,
    pub migrations_dir: PathBuf,
    /// Filename suffix identifying forward migrations
    pub up_suffix: String,
    /// Number of slots reset concurrently
    pub parallelism: usize,
    pub on_failure: FailurePolicy,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            admin_user: "postgres".to_string(),
            database: "app".to_string(),
            slot_suffix: "_test".to_string(),
            // One database per test thread
            slot_count: 8,
            migrations_dir: PathBuf::from("migrations"),
            up_suffix: "up.sh".to_string(),
            parallelism: 1,
            on_failure: FailurePolicy::Continue,
        }
    }
}

impl ResetConfig {
    /// Database and role name of a slot, e.g. `app_test3`
    pub fn slot_database(&self, slot: u32) -> String {
        format!("{}{}{}", self.database, self.slot_suffix, slot)
    }

    /// Argument handed to every migration script of a slot, e.g. `_test3`
    pub fn slot_argument(&self, slot: u32) -> String {
        format!("{}{}", self.slot_suffix, slot)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub docker: DockerConfig,
    pub dump: DumpConfig,
    pub reset: ResetConfig,
    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            docker: DockerConfig::default(),
            dump: DumpConfig::default(),
            reset: ResetConfig::default(),
            base_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Load configuration from an explicit path, or from `pg-dev-tools.toml`
    /// in the current directory when present, or fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        let current_dir = std::env::current_dir().context("Failed to read current directory")?;
        let candidate = current_dir.join(DEFAULT_CONFIG_FILE);
        if candidate.is_file() {
            return Self::from_file(&candidate);
        }

        tracing::debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
        Ok(Self {
            base_dir: current_dir,
            ..Self::default()
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_toml(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        config.base_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.docker.container.trim().is_empty() {
            bail!("docker.container cannot be empty");
        }
        if self.dump.error_marker.is_empty() {
            bail!("dump.error_marker cannot be empty");
        }
        if self.reset.parallelism == 0 {
            bail!("reset.parallelism must be at least 1");
        }
        if self.reset.up_suffix.is_empty() {
            bail!("reset.up_suffix cannot be empty");
        }
        Ok(())
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn output_path(&self) -> PathBuf {
        self.resolve(&self.dump.output_path)
    }

    pub fn migrations_dir(&self) -> PathBuf {
        self.resolve(&self.reset.migrations_dir)
    }
}
