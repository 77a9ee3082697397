//! Persistent SQLite catalog of volumes, files, hashes and scan sessions.
//!
//! # Overview
//!
//! The catalog is the only shared mutable state in the crate. A [`Catalog`]
//! owns one connection behind a mutex and is shared between threads as
//! `Arc<Catalog>`. The database runs in WAL mode so other processes can read
//! while a scan writes. Every mutating operation runs in its own
//! transaction.
//!
//! Operations are grouped by table family:
//! - volumes: [`Catalog::upsert_volume`], [`Catalog::delete_volume`], ...
//! - files: [`Catalog::upsert_file`], [`Catalog::mark_file_deleted`], ...
//! - hashes and set queries: [`Catalog::set_hash`], [`Catalog::set_difference`], ...
//! - sessions and checkpoints: [`Catalog::start_session`], [`Catalog::save_checkpoint`], ...
//! - user preferences: custom extensions, unknown extensions, excluded paths
//!
//! # Example
//!
//! ```
//! use dedupe::catalog::{Catalog, FileInfo, VolumeInfo};
//! use dedupe::classify::{FileType, HashKind};
//!
//! let catalog = Catalog::open_in_memory()?;
//! let volume = catalog.upsert_volume(&VolumeInfo::new("uuid-1", "Backup", "/mnt/backup"))?;
//! let file_id = catalog.upsert_file(volume, &FileInfo::new("a/b.txt", 120, FileType::Document))?;
//! catalog.set_hash(file_id, HashKind::ExactMd5, "d41d8cd98f00b204e9800998ecf8427e")?;
//! assert_eq!(
//!     catalog.hash(file_id, HashKind::ExactMd5)?.as_deref(),
//!     Some("d41d8cd98f00b204e9800998ecf8427e")
//! );
//! # Ok::<(), dedupe::catalog::CatalogError>(())
//! ```

mod extensions;
mod files;
mod hashes;
pub mod models;
mod sessions;
mod volumes;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{Connection, OptionalExtension};

pub use models::{
    FileId, FileInfo, FileRecord, FileWithHashes, HashRecord, SamplePath, ScanCheckpoint,
    ScanSession, ScanStats, ScanStatus, SessionId, SessionStatus, UnknownExtension, UnknownValue,
    Volume, VolumeId, VolumeInfo,
};

/// Schema version written to `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 2;

/// Session counters added after the first schema version.
const SESSION_COUNTER_COLUMNS: &[&str] = &["files_unchanged", "files_skipped", "files_failed"];

/// Errors that can occur during catalog operations.
#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    /// An SQLite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The directory holding the database file could not be created.
    #[error("Failed to create catalog directory {path}: {source}")]
    CreateDir {
        /// Directory that could not be created
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Stored checkpoint data could not be encoded or decoded.
    #[error("Invalid checkpoint data: {0}")]
    Checkpoint(#[from] serde_json::Error),

    /// The database was written by a newer version.
    #[error("Catalog schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema {
        /// Version found in the file
        found: i64,
        /// Highest version this build understands
        supported: i64,
    },

    /// No volume with this id.
    #[error("Volume not found: {0}")]
    VolumeNotFound(VolumeId),

    /// No session with this id.
    #[error("Scan session not found: {0}")]
    SessionNotFound(SessionId),
}

/// Handle to an open catalog database.
#[derive(Debug)]
pub struct Catalog {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Catalog {
    /// Open or create a catalog file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the directory cannot be created, the file
    /// cannot be opened, or its schema is newer than this build.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| CatalogError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        let catalog = Self::from_connection(conn, Some(path.to_path_buf()))?;
        log::debug!("Opened catalog at {}", path.display());
        Ok(catalog)
    }

    /// Open a private in-memory catalog.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if SQLite fails to initialise.
    pub fn open_in_memory() -> Result<Self, CatalogError> {
        Self::from_connection(Connection::open_in_memory()?, None)
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self, CatalogError> {
        configure_pragmas(&conn)?;
        migrate_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Location of the database file; `None` for in-memory catalogs.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run read-only work on the connection.
    pub(crate) fn read<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, CatalogError>,
    ) -> Result<T, CatalogError> {
        let conn = self.lock();
        f(&conn)
    }

    /// Run work in a transaction, committing only if it succeeds.
    pub(crate) fn write<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, CatalogError>,
    ) -> Result<T, CatalogError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

fn configure_pragmas(conn: &Connection) -> Result<(), CatalogError> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    log::trace!("SQLite pragmas configured (WAL mode, foreign keys on)");
    Ok(())
}

/// Create missing tables and bring older catalogs up to [`SCHEMA_VERSION`].
fn migrate_schema(conn: &Connection) -> Result<(), CatalogError> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version > SCHEMA_VERSION {
        return Err(CatalogError::UnsupportedSchema {
            found: version,
            supported: SCHEMA_VERSION,
        });
    }

    conn.execute_batch(include_str!("schema.sql"))?;

    if version < SCHEMA_VERSION {
        for column in SESSION_COUNTER_COLUMNS {
            if !has_column(conn, "scan_sessions", column)? {
                log::debug!("Adding scan_sessions.{column}");
                conn.execute_batch(&format!(
                    "ALTER TABLE scan_sessions ADD COLUMN {column} INTEGER DEFAULT 0"
                ))?;
            }
        }
        conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
            [SCHEMA_VERSION],
        )?;
        log::debug!("Catalog schema migrated from version {version} to {SCHEMA_VERSION}");
    }
    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool, CatalogError> {
    let found = conn
        .query_row(
            "SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2",
            [table, column],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Text form of a path as stored in the catalog.
pub(crate) fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
