//! Run configuration for the Inphest CLI.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use inphest::prelude::{AreaId, ReplicateConfig, RunnerConfig};

pub const CONFIG_FILE_NAME: &str = "inphest.toml";

/// Inphest run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub histories: HistoryConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_nreps")]
    pub nreps: usize,
    #[serde(default)]
    pub random_seed: u64,
    #[serde(default)]
    pub debug_mode: bool,
    /// Areas whose lineage count is checked at the end of each replicate.
    #[serde(default)]
    pub focal_areas: Vec<usize>,
    #[serde(default)]
    pub ignore_nonextant_host_check_fail: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_true")]
    pub validate: bool,
    #[serde(default)]
    pub ignore_validation_errors: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_true")]
    pub write_model: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

// Default value functions
fn default_nreps() -> usize { 1 }
fn default_true() -> bool { true }
fn default_prefix() -> String { "inphest".to_string() }
fn default_level() -> String { "info".to_string() }

impl Default for Config {
    fn default() -> Self {
        Self {
            run: RunConfig::default(),
            histories: HistoryConfig::default(),
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            nreps: default_nreps(),
            random_seed: 0,
            debug_mode: false,
            focal_areas: Vec::new(),
            ignore_nonextant_host_check_fail: false,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            validate: default_true(),
            ignore_validation_errors: false,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            write_model: default_true(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_level() }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub nreps: Option<usize>,
    pub seed: Option<u64>,
    pub output_prefix: Option<String>,
    pub focal_areas: Option<Vec<usize>>,
    pub debug_mode: bool,
    pub ignore_nonextant_host_check_fail: bool,
    pub ignore_validation_errors: bool,
}

impl Config {
    /// Load config from inphest.toml in the current or parent directories.
    pub fn load() -> Result<Self> {
        match find_config_file() {
            Some(path) => Self::load_from(&path),
            None => Ok(Config::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Save config to the specified path.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Flags only ever switch boolean settings on.
    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(nreps) = overrides.nreps {
            self.run.nreps = nreps;
        }
        if let Some(seed) = overrides.seed {
            self.run.random_seed = seed;
        }
        if let Some(prefix) = overrides.output_prefix {
            self.output.prefix = prefix;
        }
        if let Some(areas) = overrides.focal_areas {
            self.run.focal_areas = areas;
        }
        self.run.debug_mode |= overrides.debug_mode;
        self.run.ignore_nonextant_host_check_fail |= overrides.ignore_nonextant_host_check_fail;
        self.histories.ignore_validation_errors |= overrides.ignore_validation_errors;
    }

    pub fn runner_config(&self) -> RunnerConfig {
        let focal_areas = if self.run.focal_areas.is_empty() {
            None
        } else {
            Some(self.run.focal_areas.iter().map(|a| AreaId(*a)).collect())
        };
        RunnerConfig {
            num_replicates: self.run.nreps,
            seed: self.run.random_seed,
            replicate: ReplicateConfig {
                debug_mode: self.run.debug_mode,
                ignore_nonextant_host_check_fail: self.run.ignore_nonextant_host_check_fail,
                focal_areas,
            },
        }
    }

    /// Output file path for the given suffix, e.g. `inphest.trees.nwk`.
    pub fn output_path(&self, suffix: &str) -> PathBuf {
        PathBuf::from(format!("{}.{}", self.output.prefix, suffix))
    }
}

/// Find inphest.toml in current or parent directories.
fn find_config_file() -> Option<PathBuf> {
    let mut dir = std::env::current_dir().ok()?;
    loop {
        let config_path = dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Some(config_path);
        }
        if !dir.pop() {
            break;
        }
    }
    None
}
