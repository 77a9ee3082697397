//! Scanner module for volume traversal, metadata extraction and hashing.
//!
//! This module provides functionality for:
//! - Depth-first directory walking with per-directory batches
//! - Streaming MD5 hashes of bytes and decoded pixels
//! - Perceptual fingerprints (pHash, dHash, aHash, wHash)
//! - Image and video metadata extraction
//! - Resumable, checkpointed scans of whole volumes into the catalog
//!
//! # Architecture
//!
//! The scanner is divided into submodules:
//! - [`walker`]: Directory traversal and file discovery
//! - [`hasher`]: Exact and pixel MD5 hashing
//! - [`perceptual`]: Perceptual fingerprints and Hamming distance
//! - [`metadata`]: Dimensions and durations
//! - [`pool`]: Parallel hash workers
//! - [`volume`]: The scan state machine tying everything to the catalog
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use dedupe::catalog::Catalog;
//! use dedupe::scanner::{ScannerConfig, VolumeScanner};
//! use dedupe::signal::ScanControl;
//! use std::path::Path;
//!
//! let catalog = Arc::new(Catalog::open_in_memory()?);
//! let scanner = VolumeScanner::new(catalog, ScannerConfig::default(), ScanControl::new());
//! let report = scanner.scan_directory(Path::new("/home/user/Pictures"), None)?;
//! println!("{}", report.stats);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod hasher;
pub mod metadata;
pub mod perceptual;
pub mod pool;
pub mod volume;
pub mod walker;

use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};

use crate::catalog::{CatalogError, ScanStats, SessionId};

// Re-export main types
pub use hasher::{exact_md5, pixel_md5, ContentHasher, CHUNK_SIZE};
pub use metadata::{MediaMetadata, MetadataLoader};
pub use perceptual::{Fingerprint, PerceptualAlgorithm, PerceptualHasher};
pub use pool::{HashJob, HashOutcome, HashPool};
pub use volume::{
    directory_volume, ScanOutcome, ScanPhase, ScanReport, ScannerConfig, VolumeScanner,
};
pub use walker::{DirectoryBatch, DirectoryWalker};

/// Errors that can occur during volume scanning.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The specified path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The scan root does not lie under the volume's mount point.
    #[error("{path} is not inside volume mounted at {mount_point}")]
    OutsideVolume {
        /// Requested scan root
        path: PathBuf,
        /// Mount point of the volume
        mount_point: PathBuf,
    },

    /// The requested session cannot be resumed.
    #[error("Cannot resume session {session_id}: {reason}")]
    InvalidResume {
        /// Session that was asked for
        session_id: SessionId,
        /// Why it was refused
        reason: String,
    },

    /// A catalog operation failed.
    ///
    /// When a session was running it has been marked `failed`; `stats` are
    /// the counters reached before the failure.
    #[error("{}", catalog_failure_message(.session_id, .source))]
    Catalog {
        /// Session that was running, if one had been started
        session_id: Option<SessionId>,
        /// Counters reached before the failure
        stats: ScanStats,
        /// The underlying catalog error
        #[source]
        source: CatalogError,
    },
}

fn catalog_failure_message(session_id: &Option<SessionId>, source: &CatalogError) -> String {
    match session_id {
        Some(id) => format!("Scan session {id} failed: {source}"),
        None => format!("Catalog error: {source}"),
    }
}

impl From<CatalogError> for ScanError {
    fn from(source: CatalogError) -> Self {
        Self::Catalog {
            session_id: None,
            stats: ScanStats::default(),
            source,
        }
    }
}

impl ScanError {
    /// Map an I/O error on `path` to the most specific variant.
    pub(crate) fn from_io(path: &Path, e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: e,
            },
        }
    }
}

/// Errors that can occur during file hashing.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The file could not be decoded as an image.
    #[error("Cannot decode {path}: {message}")]
    Decode {
        /// Path of the undecodable file
        path: PathBuf,
        /// Decoder message
        message: String,
    },
}

impl HashError {
    pub(crate) fn from_io(path: &Path, e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: e,
            },
        }
    }

    pub(crate) fn decode(path: &Path, e: impl Display) -> Self {
        Self::Decode {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
    }
}
