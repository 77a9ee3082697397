//! Command-line interface definitions for dedupe.
//!
//! This module defines all CLI arguments, subcommands, and options using the clap derive API.
//! Global options (verbosity, configuration, catalog location, error format) apply to every
//! subcommand.
//!
//! # Example
//!
//! ```bash
//! # Index a directory as a volume of its own
//! dedupe scan ~/Pictures
//!
//! # Continue a scan paused with Ctrl+C
//! dedupe resume 12
//!
//! # Exact duplicates across two volumes, as JSON
//! dedupe duplicates --volume 1 --volume 2 --cross-volume --output json
//!
//! # Visually similar images with a tighter threshold
//! dedupe similar --algorithm dhash --threshold 1
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::catalog::{SessionId, VolumeId};
use crate::classify::HashKind;
use crate::config::ConfigOverrides;
use crate::scanner::PerceptualAlgorithm;

/// Multi-volume duplicate finder backed by a persistent catalog.
///
/// dedupe indexes volumes into a SQLite catalog with exact, pixel and
/// perceptual fingerprints, then answers duplicate and set queries across
/// every volume it has seen, mounted or not.
#[derive(Debug, Parser)]
#[command(name = "dedupe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file (default: platform config directory)
    #[arg(long, global = true, value_name = "PATH", env = "DEDUPE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Catalog database (default: platform data directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub database: Option<PathBuf>,

    /// Print errors as JSON objects on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Simplified progress output for screen readers
    #[arg(long, global = true)]
    pub accessible: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Command-line values that override configuration layers.
    #[must_use]
    pub fn config_overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides {
            database_path: self.database.clone(),
            ..ConfigOverrides::default()
        };
        match &self.command {
            Commands::Scan(args) => overrides.hash_workers = args.workers,
            Commands::Resume(args) => overrides.hash_workers = args.workers,
            Commands::Similar(args) => {
                overrides.perceptual_algorithm = args.algorithm.map(|a| a.name().to_string());
                overrides.perceptual_threshold = args.threshold;
            }
            _ => {}
        }
        overrides
    }
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan a directory into the catalog as a volume
    Scan(ScanArgs),
    /// Resume a paused or interrupted scan session
    Resume(ResumeArgs),
    /// List scan sessions that can be resumed
    Sessions(ListArgs),
    /// List catalogued volumes
    Volumes(ListArgs),
    /// Report exact or pixel-identical duplicates
    Duplicates(DuplicatesArgs),
    /// Report visually similar images
    Similar(SimilarArgs),
    /// Files in volume B whose content is not on volume A
    Diff(SetArgs),
    /// Files present on both volumes
    Intersect(SetArgs),
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Directory to scan
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Volume uuid; defaults to a stable id derived from the path
    #[arg(long, value_name = "UUID")]
    pub uuid: Option<String>,

    /// Volume display name; defaults to the directory name
    #[arg(long, value_name = "NAME")]
    pub name: Option<String>,

    /// Mount point of the volume when PATH is a subtree of it
    #[arg(long, value_name = "PATH", requires = "uuid")]
    pub mount_point: Option<PathBuf>,

    /// Number of hash worker threads (0 = CPU count)
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Minimum file size for every type (e.g., 10KB, 1MiB)
    ///
    /// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub min_size: Option<u64>,

    /// Output format for the final report
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for the resume subcommand.
#[derive(Debug, Args)]
pub struct ResumeArgs {
    /// Session to resume (see `dedupe sessions`)
    #[arg(value_name = "SESSION_ID")]
    pub session_id: SessionId,

    /// Number of hash worker threads (0 = CPU count)
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Output format for the final report
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments shared by the listing subcommands.
#[derive(Debug, Args)]
pub struct ListArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for the duplicates subcommand.
#[derive(Debug, Args)]
pub struct DuplicatesArgs {
    /// Hash kind to match on (exact_md5 or pixel_md5)
    #[arg(long, value_name = "KIND", default_value = "exact_md5")]
    pub hash_type: HashKind,

    /// Restrict to these volumes (repeatable)
    #[arg(long = "volume", value_name = "ID")]
    pub volumes: Vec<VolumeId>,

    /// Only report groups spanning two or more volumes
    #[arg(long)]
    pub cross_volume: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for the similar subcommand.
#[derive(Debug, Args)]
pub struct SimilarArgs {
    /// Restrict to these volumes (repeatable)
    #[arg(long = "volume", value_name = "ID")]
    pub volumes: Vec<VolumeId>,

    /// Perceptual algorithm (phash, dhash, ahash, whash)
    #[arg(long, value_name = "ALGORITHM")]
    pub algorithm: Option<PerceptualAlgorithm>,

    /// Maximum Hamming distance (default depends on the algorithm)
    #[arg(long, value_name = "N")]
    pub threshold: Option<u32>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for the diff and intersect subcommands.
#[derive(Debug, Args)]
pub struct SetArgs {
    /// First volume id
    #[arg(value_name = "FIRST")]
    pub first: VolumeId,

    /// Second volume id
    #[arg(value_name = "SECOND")]
    pub second: VolumeId,

    /// Hash kind to compare on
    #[arg(long, value_name = "KIND", default_value = "exact_md5")]
    pub hash_type: HashKind,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON for scripting
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Parse a human-readable size string into bytes.
///
/// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
/// Case-insensitive. Numbers without suffix are treated as bytes.
///
/// # Examples
///
/// ```
/// use dedupe::cli::parse_size;
///
/// assert_eq!(parse_size("1024").unwrap(), 1024);
/// assert_eq!(parse_size("1KB").unwrap(), 1000);
/// assert_eq!(parse_size("1KiB").unwrap(), 1024);
/// ```
///
/// # Errors
///
/// Returns an error if the string is empty, contains an invalid number,
/// a negative number, or an unknown size suffix.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }
    if s.starts_with('-') {
        return Err("Size cannot be negative".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_uppercase()),
        None => (s, String::new()),
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;

    let multiplier: u64 = match suffix.as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1_024,
        "MB" | "M" => 1_000_000,
        "MIB" => 1_048_576,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1_073_741_824,
        "TB" | "T" => 1_000_000_000_000,
        "TIB" => 1_099_511_627_776,
        _ => return Err(format!("Unknown size suffix: '{suffix}'")),
    };

    Ok((num * multiplier as f64) as u64)
}
