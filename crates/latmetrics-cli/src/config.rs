//! Configuration loading from TOML files

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use latmetrics_metrics::config::{
    DEFAULT_COUNTRY_BATCHES, DEFAULT_EXTRA_PERIOD, DEFAULT_JOURNAL_BATCHES, DEFAULT_MAX_WORKERS,
    DEFAULT_WORKER_FRACTION, default_workers,
};

/// Global configuration for latmetrics
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub cache: CacheConfig,
    pub workers: WorkersConfig,
    pub compute: ComputeConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub articles: PathBuf,
    pub journals: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            articles: PathBuf::from("./data/latin_american_works.parquet"),
            journals: PathBuf::from("./data/latin_american_journals.parquet"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: PathBuf,
    pub compression_level: i32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data/cache"),
            compression_level: 3,
        }
    }
}

/// Worker count: `count` when set, else `fraction` of the cores capped at `max`
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub count: Option<usize>,
    pub fraction: f64,
    pub max: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            count: None,
            fraction: DEFAULT_WORKER_FRACTION,
            max: DEFAULT_MAX_WORKERS,
        }
    }
}

impl WorkersConfig {
    pub fn resolve(&self) -> usize {
        self.count
            .unwrap_or_else(|| default_workers(self.fraction, self.max))
            .max(1)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ComputeConfig {
    pub country_batches: usize,
    pub journal_batches: usize,
    /// Extra `YYYY-YYYY` windows besides the full range
    pub periods: Vec<String>,
    pub key_timeout_secs: Option<f64>,
    pub max_retries: u32,
    pub verify: bool,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            country_batches: DEFAULT_COUNTRY_BATCHES,
            journal_batches: DEFAULT_JOURNAL_BATCHES,
            periods: vec![DEFAULT_EXTRA_PERIOD.to_string()],
            key_timeout_secs: None,
            max_retries: 1,
            verify: false,
        }
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./latmetrics.toml (current directory)
    /// 2. ~/.config/latmetrics/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("latmetrics.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "latmetrics") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }
}
