//! Configuration handling for uvl2bdd
//!
//! Configuration is layered, later layers overriding earlier ones key by key:
//! 1. Global: `~/.config/uvl2bdd/config.toml` (platform config dir)
//! 2. Project: nearest `uvl2bdd.toml` walking up from the current directory,
//!    or the file given with `--config`
//! 3. Command-line flags, applied by the caller

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Project configuration file name
pub const PROJECT_FILE: &str = "uvl2bdd.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// External executables of the BDD toolchain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolsConfig {
    /// Variable ordering tool
    pub orderer: String,

    /// Flags passed to the ordering tool before its file arguments
    pub order_flags: Vec<String>,

    /// BDD compiler
    pub compiler: String,

    /// Configuration counter
    pub counter: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            orderer: "fastOrder".to_string(),
            order_flags: vec!["-nosubexp".to_string(), "-sifting".to_string()],
            compiler: "Logic2BDD".to_string(),
            counter: "counter".to_string(),
        }
    }
}

/// Pipeline limits and locations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Wall-clock limit per external stage
    pub timeout_secs: u64,

    /// `-min-nodes` passed to the compiler
    pub min_nodes: u64,

    /// `-constraint-reorder` strategy passed to the compiler
    pub constraint_reorder: String,

    /// Model file extension used for discovery
    pub extension: String,

    /// Directory for logic files (default: next to each model)
    pub logic_dir: Option<PathBuf>,

    /// Directory for BDD artifacts (default: next to each model)
    pub bdd_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 7200,
            min_nodes: 200_000,
            constraint_reorder: "minspan".to_string(),
            extension: "uvl".to_string(),
            logic_dir: None,
            bdd_dir: None,
        }
    }
}

impl PipelineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Results ledger settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LedgerConfig {
    pub path: PathBuf,

    /// Decimal places for stage times
    pub precision: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("results.csv"),
            precision: 4,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log file; logs go to stderr when unset
    pub file: Option<PathBuf>,

    /// Default filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: None,
            level: "info".to_string(),
        }
    }
}

/// Combined configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub tools: ToolsConfig,
    pub pipeline: PipelineConfig,
    pub ledger: LedgerConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Loads the global layer and the project layer
    ///
    /// With `explicit`, that file replaces the project lookup and must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let global = match Self::global_config_path() {
            Some(path) if path.exists() => Some(read_layer(&path)?),
            _ => None,
        };

        let project = match explicit {
            Some(path) => Some(read_layer(path)?),
            None => match Self::find_project_file() {
                Some(path) => Some(read_layer(&path)?),
                None => None,
            },
        };

        let layers: Vec<&str> = global.iter().chain(project.iter()).map(String::as_str).collect();
        Self::from_layers(&layers).context("Failed to load configuration")
    }

    /// Builds a configuration from TOML sources, lowest priority first
    pub fn from_layers(layers: &[&str]) -> Result<Self, ConfigError> {
        let mut merged = toml::Value::Table(toml::map::Map::new());
        for layer in layers {
            let value: toml::Value =
                toml::from_str(layer).map_err(|e| ConfigError::Parse(e.to_string()))?;
            merge(&mut merged, value);
        }

        let config: Config = merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values that would make the pipeline unusable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.timeout_secs must be positive".to_string(),
            ));
        }
        if self.pipeline.extension.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "pipeline.extension must not be empty".to_string(),
            ));
        }
        for (key, value) in [
            ("tools.orderer", &self.tools.orderer),
            ("tools.compiler", &self.tools.compiler),
            ("tools.counter", &self.tools.counter),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} must not be empty", key)));
            }
        }
        Ok(())
    }

    /// Returns the global config file path
    pub fn global_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "uvl2bdd").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Finds the nearest project file from the current directory
    pub fn find_project_file() -> Option<PathBuf> {
        let cwd = std::env::current_dir().ok()?;
        Self::find_project_file_from(&cwd)
    }

    /// Finds the nearest project file walking up from `start`
    pub fn find_project_file_from(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();

        loop {
            let candidate = current.join(PROJECT_FILE);
            if candidate.is_file() {
                return Some(candidate);
            }

            if !current.pop() {
                return None;
            }
        }
    }

    /// Writes the commented default project file into `dir`
    pub fn write_default(dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

        let path = dir.join(PROJECT_FILE);
        if path.exists() {
            anyhow::bail!("Configuration already exists: {}", path.display());
        }

        fs::write(&path, DEFAULT_TEMPLATE)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(path)
    }
}

fn read_layer(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read config: {}", path.display()))
}

/// Deep-merges `overlay` into `base`; tables merge, everything else replaces
fn merge(base: &mut toml::Value, overlay: toml::Value) {
    let overlay = match overlay {
        toml::Value::Table(table) => table,
        other => {
            *base = other;
            return;
        }
    };

    if let toml::Value::Table(table) = base {
        for (key, value) in overlay {
            match table.get_mut(&key) {
                Some(existing) => merge(existing, value),
                None => {
                    table.insert(key, value);
                }
            }
        }
        return;
    }

    *base = toml::Value::Table(overlay);
}

const DEFAULT_TEMPLATE: &str = r#"# uvl2bdd configuration
#
# Settings here override ~/.config/uvl2bdd/config.toml.
# Command-line flags override both.

[tools]
# Variable ordering tool and its flags
orderer = "fastOrder"
order_flags = ["-nosubexp", "-sifting"]
# BDD compiler
compiler = "Logic2BDD"
# Configuration counter
counter = "counter"

[pipeline]
# Wall-clock limit per external stage, in seconds
timeout_secs = 7200
min_nodes = 200000
constraint_reorder = "minspan"
# Model files to discover
extension = "uvl"
# Output directories (default: next to each model)
# logic_dir = "logic"
# bdd_dir = "bdds"

[ledger]
path = "results.csv"
# Decimal places for stage times
precision = 4

[logging]
# Log to a file instead of stderr
# file = "uvl2bdd.log"
# Overridden by RUST_LOG and --verbose
level = "info"
"#;
