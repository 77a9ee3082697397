//! Hash rows and the queries built on them: duplicate values, set
//! difference and set intersection between volumes.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension};

use super::files::{file_columns, file_from_row, FILE_COLUMN_COUNT};
use super::models::{FileId, FileRecord, FileWithHashes, HashRecord, VolumeId};
use super::{Catalog, CatalogError};
use crate::classify::HashKind;

/// Append `AND <column> IN (...)` for an optional volume filter.
fn volume_filter(column: &str, volume_ids: Option<&[VolumeId]>, params: &mut Vec<Value>) -> String {
    match volume_ids {
        None => String::new(),
        Some(ids) => {
            params.extend(ids.iter().map(|id| Value::Integer(*id)));
            let placeholders = vec!["?"; ids.len()].join(", ");
            format!(" AND {column} IN ({placeholders})")
        }
    }
}

fn kind_param(kind: HashKind) -> Value {
    Value::Text(kind.as_str().to_string())
}

impl Catalog {
    /// Store a hash, replacing any previous value of the same kind.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure, including a missing file.
    pub fn set_hash(&self, file_id: FileId, kind: HashKind, value: &str) -> Result<(), CatalogError> {
        self.set_hashes(&[(file_id, kind, value.to_string())])
    }

    /// Store several hashes in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure; no hash is stored then.
    pub fn set_hashes(&self, values: &[(FileId, HashKind, String)]) -> Result<(), CatalogError> {
        if values.is_empty() {
            return Ok(());
        }
        let now = Utc::now();
        self.write(|conn| {
            let mut stmt = conn.prepare(
                "INSERT INTO hashes (file_id, hash_type, hash_value, computed_at) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(file_id, hash_type) DO UPDATE SET \
                     hash_value = excluded.hash_value, \
                     computed_at = excluded.computed_at",
            )?;
            for (file_id, kind, value) in values {
                stmt.execute(params![file_id, kind, value, now])?;
            }
            Ok(())
        })
    }

    /// Number of live files carrying a hash of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure.
    pub fn hash_count(&self, kind: HashKind) -> Result<u64, CatalogError> {
        self.read(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM hashes h JOIN files f ON f.id = h.file_id \
                 WHERE h.hash_type = ?1 AND f.is_deleted = 0",
                params![kind],
                |row| row.get(0),
            )?)
        })
    }

    /// Drop every stored hash of a file, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure.
    pub fn clear_hashes(&self, file_id: FileId) -> Result<usize, CatalogError> {
        self.write(|conn| Ok(conn.execute("DELETE FROM hashes WHERE file_id = ?1", [file_id])?))
    }

    /// The stored value of one hash kind for a file.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure.
    pub fn hash(&self, file_id: FileId, kind: HashKind) -> Result<Option<String>, CatalogError> {
        self.read(|conn| {
            Ok(conn
                .query_row(
                    "SELECT hash_value FROM hashes WHERE file_id = ?1 AND hash_type = ?2",
                    params![file_id, kind],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    /// Every stored hash of a file.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure.
    pub fn hashes_for_file(&self, file_id: FileId) -> Result<Vec<HashRecord>, CatalogError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT file_id, hash_type, hash_value, computed_at FROM hashes \
                 WHERE file_id = ?1 ORDER BY hash_type",
            )?;
            let hashes = stmt
                .query_map([file_id], |row| {
                    Ok(HashRecord {
                        file_id: row.get(0)?,
                        kind: row.get(1)?,
                        value: row.get(2)?,
                        computed_at: row.get(3)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(hashes)
        })
    }

    /// Hash values of `kind` shared by two or more non-deleted files, with
    /// their file counts, optionally limited to some volumes.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure.
    pub fn find_duplicate_hash_values(
        &self,
        kind: HashKind,
        volume_ids: Option<&[VolumeId]>,
    ) -> Result<Vec<(String, u64)>, CatalogError> {
        let mut params = vec![kind_param(kind)];
        let filter = volume_filter("f.volume_id", volume_ids, &mut params);
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT h.hash_value, COUNT(*) FROM hashes h \
                 JOIN files f ON f.id = h.file_id \
                 WHERE h.hash_type = ? AND f.is_deleted = 0{filter} \
                 GROUP BY h.hash_value HAVING COUNT(*) > 1 \
                 ORDER BY h.hash_value"
            ))?;
            let values = stmt
                .query_map(params_from_iter(params), |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(values)
        })
    }

    /// Non-deleted files holding a specific hash value.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure.
    pub fn files_with_hash(&self, kind: HashKind, value: &str) -> Result<Vec<FileRecord>, CatalogError> {
        let columns = file_columns("f");
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {columns} FROM hashes h JOIN files f ON f.id = h.file_id \
                 WHERE h.hash_type = ?1 AND h.hash_value = ?2 AND f.is_deleted = 0 \
                 ORDER BY f.volume_id, f.relative_path"
            ))?;
            let files = stmt
                .query_map(params![kind, value], |row| file_from_row(row, 0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(files)
        })
    }

    /// Files of volume `b` with no content match in volume `a`: B − A.
    ///
    /// A file of B that lacks a `kind` hash cannot match anything and is
    /// returned. Files of A that lack it never match. Deleted rows on either
    /// side are ignored. Ordered by relative path.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure.
    pub fn set_difference(
        &self,
        b: VolumeId,
        a: VolumeId,
        kind: HashKind,
    ) -> Result<Vec<FileRecord>, CatalogError> {
        let columns = file_columns("f");
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {columns} FROM files f \
                 LEFT JOIN hashes hb ON hb.file_id = f.id AND hb.hash_type = ?3 \
                 WHERE f.volume_id = ?1 AND f.is_deleted = 0 \
                 AND NOT EXISTS ( \
                     SELECT 1 FROM hashes ha JOIN files fa ON fa.id = ha.file_id \
                     WHERE fa.volume_id = ?2 AND fa.is_deleted = 0 \
                     AND ha.hash_type = ?3 AND ha.hash_value = hb.hash_value) \
                 ORDER BY f.relative_path"
            ))?;
            let files = stmt
                .query_map(params![b, a, kind], |row| file_from_row(row, 0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(files)
        })
    }

    /// Pairs `(file in a, file in b)` sharing a `kind` hash value: A ∩ B.
    ///
    /// Ordered by the A path, then the B path.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure.
    pub fn set_intersection(
        &self,
        a: VolumeId,
        b: VolumeId,
        kind: HashKind,
    ) -> Result<Vec<(FileRecord, FileRecord)>, CatalogError> {
        let columns = format!("{}, {}", file_columns("fa"), file_columns("fb"));
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {columns} FROM hashes ha \
                 JOIN files fa ON fa.id = ha.file_id \
                 JOIN hashes hb ON hb.hash_type = ha.hash_type AND hb.hash_value = ha.hash_value \
                 JOIN files fb ON fb.id = hb.file_id \
                 WHERE ha.hash_type = ?3 AND fa.volume_id = ?1 AND fb.volume_id = ?2 \
                 AND fa.is_deleted = 0 AND fb.is_deleted = 0 \
                 ORDER BY fa.relative_path, fb.relative_path"
            ))?;
            let pairs = stmt
                .query_map(params![a, b, kind], |row| {
                    Ok((file_from_row(row, 0)?, file_from_row(row, FILE_COLUMN_COUNT)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(pairs)
        })
    }

    /// Non-deleted files holding a `kind` hash, each with all of its hashes
    /// and its volume's mount point. Ordered by volume, then path.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure.
    pub fn files_with_hashes(
        &self,
        kind: HashKind,
        volume_ids: Option<&[VolumeId]>,
    ) -> Result<Vec<FileWithHashes>, CatalogError> {
        let columns = file_columns("f");
        let mut params = vec![kind_param(kind)];
        let filter = volume_filter("f.volume_id", volume_ids, &mut params);
        let selection = format!(
            "FROM files f \
             JOIN hashes k ON k.file_id = f.id AND k.hash_type = ? \
             JOIN volumes v ON v.id = f.volume_id \
             WHERE f.is_deleted = 0{filter}"
        );

        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {columns}, v.mount_point {selection} ORDER BY f.volume_id, f.relative_path"
            ))?;
            let mut files = stmt
                .query_map(params_from_iter(params.iter()), |row| {
                    Ok(FileWithHashes {
                        file: file_from_row(row, 0)?,
                        mount_point: row
                            .get::<_, Option<String>>(FILE_COLUMN_COUNT)?
                            .map(Into::into),
                        hashes: BTreeMap::new(),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut stmt = conn.prepare(&format!(
                "SELECT h.file_id, h.hash_type, h.hash_value \
                 FROM hashes h WHERE h.file_id IN (SELECT f.id {selection})"
            ))?;
            let mut by_file: HashMap<FileId, BTreeMap<HashKind, String>> = HashMap::new();
            let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
                Ok((
                    row.get::<_, FileId>(0)?,
                    row.get::<_, HashKind>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;
            for row in rows {
                let (file_id, hash_kind, value) = row?;
                by_file.entry(file_id).or_default().insert(hash_kind, value);
            }

            for file in &mut files {
                if let Some(hashes) = by_file.remove(&file.file.id) {
                    file.hashes = hashes;
                }
            }
            Ok(files)
        })
    }
}
