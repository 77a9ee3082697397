//! Row types stored in and returned by the catalog.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::classify::{FileType, HashKind};

/// Primary key of a volume row.
pub type VolumeId = i64;
/// Primary key of a file row.
pub type FileId = i64;
/// Primary key of a scan session row.
pub type SessionId = i64;

/// A stored enum value that does not match any known variant.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Unknown {kind}: {value}")]
pub struct UnknownValue {
    /// Column or concept being parsed
    pub kind: &'static str,
    /// The offending text
    pub value: String,
}

/// Stores a type as its canonical text form.
macro_rules! sql_text {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

sql_text!(FileType);
sql_text!(HashKind);
sql_text!(ScanStatus);
sql_text!(SessionStatus);

/// How much of a volume the catalog has seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    /// No scan has run.
    Never,
    /// A scan was paused, cancelled or failed.
    Partial,
    /// The last scan finished.
    Complete,
}

impl ScanStatus {
    /// Catalog text form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Never => "never",
            Self::Partial => "partial",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanStatus {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never" => Ok(Self::Never),
            "partial" => Ok(Self::Partial),
            "complete" => Ok(Self::Complete),
            other => Err(UnknownValue {
                kind: "scan status",
                value: other.to_string(),
            }),
        }
    }
}

/// Lifecycle state of a scan session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// In progress, or interrupted without a clean shutdown.
    Running,
    /// Stopped with a checkpoint to resume from.
    Paused,
    /// Finished normally.
    Completed,
    /// Stopped on request; not resumable.
    Cancelled,
    /// Stopped by an error.
    Failed,
}

impl SessionStatus {
    /// Catalog text form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    /// Whether a session in this state may be resumed.
    #[must_use]
    pub fn is_resumable(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "failed" => Ok(Self::Failed),
            other => Err(UnknownValue {
                kind: "session status",
                value: other.to_string(),
            }),
        }
    }
}

/// Caller-supplied identity and properties of a volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInfo {
    /// Stable identifier; the natural key of the volume
    pub uuid: String,
    /// Display name
    pub name: String,
    /// Where the volume is currently mounted
    pub mount_point: PathBuf,
    /// Whether the volume is built into the machine
    pub is_internal: bool,
    /// Capacity in bytes, if known
    pub total_size_bytes: Option<u64>,
    /// Filesystem name, if known
    pub filesystem: Option<String>,
}

impl VolumeInfo {
    /// Create volume info with the required fields.
    ///
    /// # Arguments
    ///
    /// * `uuid` - Stable identifier
    /// * `name` - Display name
    /// * `mount_point` - Current mount point; relative paths are stored against it
    #[must_use]
    pub fn new(uuid: impl Into<String>, name: impl Into<String>, mount_point: impl Into<PathBuf>) -> Self {
        Self {
            uuid: uuid.into(),
            name: name.into(),
            mount_point: mount_point.into(),
            is_internal: false,
            total_size_bytes: None,
            filesystem: None,
        }
    }

    /// Mark the volume as internal.
    #[must_use]
    pub fn with_internal(mut self, internal: bool) -> Self {
        self.is_internal = internal;
        self
    }

    /// Set the capacity in bytes.
    #[must_use]
    pub fn with_total_size(mut self, bytes: u64) -> Self {
        self.total_size_bytes = Some(bytes);
        self
    }

    /// Set the filesystem name.
    #[must_use]
    pub fn with_filesystem(mut self, filesystem: impl Into<String>) -> Self {
        self.filesystem = Some(filesystem.into());
        self
    }
}

/// A volume row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Volume {
    pub id: VolumeId,
    pub uuid: String,
    pub name: String,
    pub mount_point: Option<PathBuf>,
    pub is_internal: bool,
    pub total_size_bytes: Option<u64>,
    pub filesystem: Option<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub scan_status: ScanStatus,
    /// Non-deleted files at the end of the last completed scan
    pub file_count: u64,
}

/// Properties of a file to insert or update.
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    /// Path relative to the volume mount point, `/`-separated, NFC
    pub relative_path: String,
    pub filename: String,
    /// Lowercase extension without the dot
    pub extension: Option<String>,
    pub size_bytes: u64,
    pub file_type: FileType,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_seconds: Option<f64>,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl FileInfo {
    /// Minimal file info; dimensions and timestamps unset.
    #[must_use]
    pub fn new(relative_path: impl Into<String>, size_bytes: u64, file_type: FileType) -> Self {
        let relative_path = relative_path.into();
        let filename = relative_path
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        let extension = Path::new(&filename)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase());
        Self {
            relative_path,
            filename,
            extension,
            size_bytes,
            file_type,
            width: None,
            height: None,
            duration_seconds: None,
            created_at: None,
            modified_at: None,
        }
    }

    /// Set the modification time.
    #[must_use]
    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified_at = Some(modified);
        self
    }

    /// Set pixel dimensions.
    #[must_use]
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }
}

/// A file row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRecord {
    pub id: FileId,
    pub volume_id: VolumeId,
    pub relative_path: String,
    pub filename: String,
    pub extension: Option<String>,
    pub size_bytes: u64,
    pub file_type: FileType,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_seconds: Option<f64>,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    pub indexed_at: DateTime<Utc>,
    pub is_deleted: bool,
}

impl FileRecord {
    /// Pixel count, or 0 when dimensions are unknown.
    #[must_use]
    pub fn resolution(&self) -> u64 {
        match (self.width, self.height) {
            (Some(w), Some(h)) => u64::from(w) * u64::from(h),
            _ => 0,
        }
    }

    /// Directory part of the relative path (`""` at the volume root).
    #[must_use]
    pub fn directory(&self) -> &str {
        self.relative_path
            .rsplit_once('/')
            .map_or("", |(dir, _)| dir)
    }

    /// Absolute path under a mount point.
    #[must_use]
    pub fn absolute_path(&self, mount_point: &Path) -> PathBuf {
        mount_point.join(&self.relative_path)
    }
}

/// A hash row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HashRecord {
    pub file_id: FileId,
    pub kind: HashKind,
    pub value: String,
    pub computed_at: DateTime<Utc>,
}

/// A file with the hashes loaded for it and the mount point of its volume.
#[derive(Debug, Clone, PartialEq)]
pub struct FileWithHashes {
    pub file: FileRecord,
    pub mount_point: Option<PathBuf>,
    pub hashes: BTreeMap<HashKind, String>,
}

impl FileWithHashes {
    /// Absolute path when the mount point is known, else the relative path.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        match &self.mount_point {
            Some(mount) => self.file.absolute_path(mount),
            None => PathBuf::from(&self.file.relative_path),
        }
    }
}

/// Per-session counters.
///
/// `files_scanned` counts new or changed files; unchanged files are counted
/// separately. Their sum is the number of files processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub files_scanned: u64,
    pub files_added: u64,
    pub files_updated: u64,
    pub files_removed: u64,
    pub files_unchanged: u64,
    pub files_skipped: u64,
    pub files_failed: u64,
    /// Files found by the counting pass; 0 if unknown
    pub files_total: u64,
}

impl ScanStats {
    /// Files that reached the catalog comparison.
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.files_scanned + self.files_unchanged
    }
}

impl fmt::Display for ScanStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed ({} added, {} updated, {} unchanged), {} removed, {} skipped, {} failed",
            self.processed(),
            self.files_added,
            self.files_updated,
            self.files_unchanged,
            self.files_removed,
            self.files_skipped,
            self.files_failed
        )
    }
}

/// A scan session row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanSession {
    pub id: SessionId,
    pub volume_id: Option<VolumeId>,
    pub scan_path: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub stats: ScanStats,
    pub last_processed_path: Option<String>,
    pub status: SessionStatus,
    pub error_message: Option<String>,
}

/// Resumable progress of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCheckpoint {
    pub session_id: SessionId,
    pub checkpoint_at: DateTime<Utc>,
    pub current_directory: Option<PathBuf>,
    pub files_processed: u64,
    pub files_total: u64,
    /// Directories whose files were all processed and hashed
    pub directories_completed: BTreeSet<PathBuf>,
}

/// An extension the classifier did not recognise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnknownExtension {
    pub extension: String,
    pub occurrence_count: u64,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    /// Directories (relative to their volume) where it was seen
    pub sample_paths: Vec<SamplePath>,
}

/// One directory where an unknown extension was seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SamplePath {
    pub volume_id: VolumeId,
    pub relative_path: String,
    pub file_count: u64,
}
