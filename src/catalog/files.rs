//! File rows.

use std::collections::HashSet;

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use super::models::{FileId, FileInfo, FileRecord, VolumeId};
use super::{Catalog, CatalogError};

const FILE_FIELDS: [&str; FILE_COLUMN_COUNT] = [
    "id",
    "volume_id",
    "relative_path",
    "filename",
    "extension",
    "file_size_bytes",
    "file_type",
    "width",
    "height",
    "duration_seconds",
    "file_created_at",
    "file_modified_at",
    "indexed_at",
    "is_deleted",
];

/// Column list for a `files` table aliased as `alias`, in [`file_from_row`] order.
pub(super) fn file_columns(alias: &str) -> String {
    FILE_FIELDS
        .iter()
        .map(|field| format!("{alias}.{field}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Number of columns produced by [`file_columns`].
pub(super) const FILE_COLUMN_COUNT: usize = 14;

/// Read a file record from `row`, starting at column `base`.
pub(super) fn file_from_row(row: &Row<'_>, base: usize) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(base)?,
        volume_id: row.get(base + 1)?,
        relative_path: row.get(base + 2)?,
        filename: row.get(base + 3)?,
        extension: row.get(base + 4)?,
        size_bytes: row.get(base + 5)?,
        file_type: row.get(base + 6)?,
        width: row.get(base + 7)?,
        height: row.get(base + 8)?,
        duration_seconds: row.get(base + 9)?,
        created_at: row.get(base + 10)?,
        modified_at: row.get(base + 11)?,
        indexed_at: row.get(base + 12)?,
        is_deleted: row.get(base + 13)?,
    })
}

impl Catalog {
    /// Insert a file or update the row with the same volume and relative
    /// path. The row is marked not deleted and re-stamped with `indexed_at`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure, including a missing volume.
    pub fn upsert_file(&self, volume_id: VolumeId, info: &FileInfo) -> Result<FileId, CatalogError> {
        self.write(|conn| {
            let id = conn.query_row(
                "INSERT INTO files (volume_id, relative_path, filename, extension, \
                     file_size_bytes, file_type, width, height, duration_seconds, \
                     file_created_at, file_modified_at, indexed_at, is_deleted) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 0) \
                 ON CONFLICT(volume_id, relative_path) DO UPDATE SET \
                     filename = excluded.filename, \
                     extension = excluded.extension, \
                     file_size_bytes = excluded.file_size_bytes, \
                     file_type = excluded.file_type, \
                     width = excluded.width, \
                     height = excluded.height, \
                     duration_seconds = excluded.duration_seconds, \
                     file_created_at = excluded.file_created_at, \
                     file_modified_at = excluded.file_modified_at, \
                     indexed_at = excluded.indexed_at, \
                     is_deleted = 0 \
                 RETURNING id",
                params![
                    volume_id,
                    info.relative_path,
                    info.filename,
                    info.extension,
                    info.size_bytes,
                    info.file_type,
                    info.width,
                    info.height,
                    info.duration_seconds,
                    info.created_at,
                    info.modified_at,
                    Utc::now(),
                ],
                |row| row.get(0),
            )?;
            Ok(id)
        })
    }

    /// Look a file up by id, deleted or not.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure.
    pub fn file(&self, id: FileId) -> Result<Option<FileRecord>, CatalogError> {
        self.read(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {} FROM files f WHERE f.id = ?1", file_columns("f")),
                    [id],
                    |row| file_from_row(row, 0),
                )
                .optional()?)
        })
    }

    /// Look up a non-deleted file by volume and relative path.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure.
    pub fn file_by_path(
        &self,
        volume_id: VolumeId,
        relative_path: &str,
    ) -> Result<Option<FileRecord>, CatalogError> {
        self.read(|conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT {} FROM files f \
                         WHERE f.volume_id = ?1 AND f.relative_path = ?2 AND f.is_deleted = 0",
                        file_columns("f")
                    ),
                    params![volume_id, relative_path],
                    |row| file_from_row(row, 0),
                )
                .optional()?)
        })
    }

    /// Non-deleted files of a volume, ordered by relative path.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure.
    pub fn files_for_volume(&self, volume_id: VolumeId) -> Result<Vec<FileRecord>, CatalogError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM files f \
                 WHERE f.volume_id = ?1 AND f.is_deleted = 0 \
                 ORDER BY f.relative_path",
                file_columns("f")
            ))?;
            let files = stmt
                .query_map([volume_id], |row| file_from_row(row, 0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(files)
        })
    }

    /// Soft-delete one file. Its hashes are kept.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure.
    pub fn mark_file_deleted(&self, id: FileId) -> Result<bool, CatalogError> {
        self.write(|conn| {
            Ok(conn.execute(
                "UPDATE files SET is_deleted = 1 WHERE id = ?1 AND is_deleted = 0",
                [id],
            )? > 0)
        })
    }

    /// Soft-delete every file of a volume; returns how many rows changed.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure.
    pub fn mark_volume_files_deleted(&self, volume_id: VolumeId) -> Result<u64, CatalogError> {
        self.write(|conn| {
            let changed = conn.execute(
                "UPDATE files SET is_deleted = 1 WHERE volume_id = ?1 AND is_deleted = 0",
                [volume_id],
            )?;
            Ok(changed as u64)
        })
    }

    /// Soft-delete non-deleted files under `prefix` whose relative path is
    /// not in `seen`; returns how many rows changed.
    ///
    /// An empty prefix covers the whole volume.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure.
    pub fn mark_unseen_files_deleted(
        &self,
        volume_id: VolumeId,
        prefix: &str,
        seen: &HashSet<String>,
    ) -> Result<u64, CatalogError> {
        self.write(|conn| {
            let candidates: Vec<(FileId, String)> = {
                let mut stmt = conn.prepare(
                    "SELECT id, relative_path FROM files WHERE volume_id = ?1 AND is_deleted = 0",
                )?;
                let rows = stmt
                    .query_map([volume_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            };

            let mut update = conn.prepare("UPDATE files SET is_deleted = 1 WHERE id = ?1")?;
            let mut removed = 0u64;
            for (id, path) in candidates {
                if is_under(&path, prefix) && !seen.contains(&path) {
                    update.execute([id])?;
                    removed += 1;
                }
            }
            Ok(removed)
        })
    }

    /// Number of non-deleted files in a volume.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure.
    pub fn file_count_for_volume(&self, volume_id: VolumeId) -> Result<u64, CatalogError> {
        self.read(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM files WHERE volume_id = ?1 AND is_deleted = 0",
                [volume_id],
                |row| row.get(0),
            )?)
        })
    }
}

fn is_under(relative_path: &str, prefix: &str) -> bool {
    prefix.is_empty()
        || relative_path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}
