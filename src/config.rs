//! Application configuration.
//!
//! Settings are layered with figment, later layers winning:
//!
//! 1. Compiled defaults
//! 2. `config.toml` in the platform config directory, or an explicit file
//! 3. `DEDUPE_*` environment variables (for example `DEDUPE_HASH_WORKERS=4`)
//! 4. Command-line flags
//!
//! [`Config::validate`] rejects values that would make a scan or a grouping
//! meaningless before any work starts.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::classify::{ExtensionOverrides, FileFilter, MinSizes};
use crate::scanner::perceptual::UnknownAlgorithm;
use crate::scanner::pool::MAX_WORKERS;
use crate::scanner::{PerceptualAlgorithm, ScannerConfig};

/// File name of the configuration file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// File name of the default catalog inside the data directory.
pub const CATALOG_FILE_NAME: &str = "catalog.db";

/// Prefix of environment variables read as configuration.
pub const ENV_PREFIX: &str = "DEDUPE_";

/// Errors raised while loading or validating configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// A layer could not be read or did not match the expected shape.
    #[error("Invalid configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// The perceptual algorithm name is not known.
    #[error(transparent)]
    UnknownAlgorithm(#[from] UnknownAlgorithm),

    /// The perceptual threshold exceeds the fingerprint length.
    #[error("perceptual_threshold {threshold} is out of range for {algorithm} (0..={max})")]
    InvalidThreshold {
        /// Configured threshold
        threshold: u32,
        /// Configured algorithm
        algorithm: PerceptualAlgorithm,
        /// Largest allowed value
        max: u32,
    },

    /// The hash worker count is above the supported maximum.
    #[error("hash_workers must be between 0 and {max}, got {value}")]
    InvalidWorkers {
        /// Configured value
        value: usize,
        /// Largest allowed value
        max: usize,
    },

    /// A count that must be positive was zero.
    #[error("{0} must be at least 1")]
    Zero(&'static str),

    /// No home directory could be determined for the default paths.
    #[error("Cannot determine platform directories; pass --database explicitly")]
    NoProjectDirs,
}

/// All settings, after layering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Catalog location; the platform data directory when unset
    pub database_path: Option<PathBuf>,
    /// Hash worker threads; 0 uses the CPU count (capped at 16)
    pub hash_workers: usize,
    /// Processed files between checkpoints
    pub checkpoint_interval: u64,
    /// Queued hash jobs that trigger a flush
    pub hash_batch_size: usize,
    /// Perceptual algorithm name (`phash`, `dhash`, `ahash`, `whash`)
    pub perceptual_algorithm: String,
    /// Hamming distance threshold; the algorithm default when unset
    pub perceptual_threshold: Option<u32>,
    /// Seconds allowed for one `ffprobe` call
    pub probe_timeout_secs: u64,
    /// Extra extensions to index
    pub include_extensions: Vec<String>,
    /// Known extensions to ignore
    pub exclude_extensions: Vec<String>,
    /// Extra directory names to skip (`*suffix` matches by suffix)
    pub excluded_directories: Vec<String>,
    /// Skip dot-directories
    pub skip_hidden: bool,
    /// Per-type minimum sizes
    pub min_sizes: MinSizes,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            hash_workers: 0,
            checkpoint_interval: crate::scanner::volume::DEFAULT_CHECKPOINT_INTERVAL,
            hash_batch_size: crate::scanner::volume::DEFAULT_HASH_BATCH_SIZE,
            perceptual_algorithm: PerceptualAlgorithm::Phash.name().to_string(),
            perceptual_threshold: None,
            probe_timeout_secs: crate::scanner::metadata::DEFAULT_PROBE_TIMEOUT.as_secs(),
            include_extensions: Vec::new(),
            exclude_extensions: Vec::new(),
            excluded_directories: Vec::new(),
            skip_hidden: true,
            min_sizes: MinSizes::default(),
        }
    }
}

/// Values given on the command line; unset fields leave lower layers alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    /// `--database`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
    /// `--workers`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_workers: Option<usize>,
    /// `--algorithm`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub perceptual_algorithm: Option<String>,
    /// `--threshold`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub perceptual_threshold: Option<u32>,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "dedupe", "dedupe")
}

impl Config {
    /// Default location of the configuration file.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Build the layered figment.
    ///
    /// A missing file is not an error; the layer is simply empty.
    #[must_use]
    pub fn figment(file: Option<&Path>, overrides: &ConfigOverrides) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        match file.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => {
                log::debug!("Reading configuration from {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
            None => log::debug!("No configuration directory available"),
        }
        figment
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Serialized::globals(overrides))
    }

    /// Load and validate the configuration.
    ///
    /// # Arguments
    ///
    /// * `file` - Explicit configuration file; the default path when `None`
    /// * `overrides` - Command-line values
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a layer is malformed or a value is invalid.
    pub fn load(file: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        let config: Config = Self::figment(file, overrides)
            .extract()
            .map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hash_workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkers {
                value: self.hash_workers,
                max: MAX_WORKERS,
            });
        }
        if self.checkpoint_interval == 0 {
            return Err(ConfigError::Zero("checkpoint_interval"));
        }
        if self.hash_batch_size == 0 {
            return Err(ConfigError::Zero("hash_batch_size"));
        }
        let algorithm = self.algorithm()?;
        if let Some(threshold) = self.perceptual_threshold {
            if threshold > algorithm.bit_len() {
                return Err(ConfigError::InvalidThreshold {
                    threshold,
                    algorithm,
                    max: algorithm.bit_len(),
                });
            }
        }
        Ok(())
    }

    /// The configured perceptual algorithm.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownAlgorithm`] for an unknown name.
    pub fn algorithm(&self) -> Result<PerceptualAlgorithm, ConfigError> {
        Ok(self.perceptual_algorithm.parse()?)
    }

    /// The configured threshold, or the algorithm's default.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownAlgorithm`] for an unknown name.
    pub fn threshold(&self) -> Result<u32, ConfigError> {
        let algorithm = self.algorithm()?;
        Ok(self
            .perceptual_threshold
            .unwrap_or_else(|| algorithm.default_threshold()))
    }

    /// Where the catalog lives.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoProjectDirs`] when no path is configured and
    /// the platform data directory is unknown.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.database_path {
            return Ok(path.clone());
        }
        project_dirs()
            .map(|dirs| dirs.data_local_dir().join(CATALOG_FILE_NAME))
            .ok_or(ConfigError::NoProjectDirs)
    }

    /// Extension overrides from this configuration.
    #[must_use]
    pub fn extension_overrides(&self) -> ExtensionOverrides {
        ExtensionOverrides::default()
            .with_include(&self.include_extensions)
            .with_exclude(&self.exclude_extensions)
    }

    /// Directory and file rules from this configuration.
    #[must_use]
    pub fn file_filter(&self) -> FileFilter {
        FileFilter::new()
            .with_excluded_dirs(&self.excluded_directories)
            .with_skip_hidden(self.skip_hidden)
            .with_min_sizes(self.min_sizes)
    }

    /// Scanner tunables from this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownAlgorithm`] for an unknown perceptual
    /// algorithm name.
    pub fn scanner_config(&self) -> Result<ScannerConfig, ConfigError> {
        Ok(ScannerConfig::default()
            .with_hash_workers(self.hash_workers)
            .with_checkpoint_interval(self.checkpoint_interval)
            .with_hash_batch_size(self.hash_batch_size)
            .with_probe_timeout(Duration::from_secs(self.probe_timeout_secs))
            .with_perceptual_algorithm(self.algorithm()?)
            .with_filter(self.file_filter()))
    }
}
