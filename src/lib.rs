//! dedupe - multi-volume duplicate finder
//!
//! Indexes whole volumes (internal disks, external drives, plain
//! directories) into a persistent SQLite catalog with exact, pixel and
//! perceptual fingerprints, then groups duplicates and answers set queries
//! across every catalogued volume, mounted or not.

pub mod app;
pub mod catalog;
pub mod classify;
pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod signal;

pub use app::run_app;
