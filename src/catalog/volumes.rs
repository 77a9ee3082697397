//! Volume rows.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::models::{ScanStatus, Volume, VolumeId, VolumeInfo};
use super::{path_text, Catalog, CatalogError};

const VOLUME_COLUMNS: &str = "id, uuid, name, mount_point, is_internal, total_size_bytes, \
     filesystem, first_seen_at, last_seen_at, last_scan_at, scan_status, file_count";

fn volume_from_row(row: &Row<'_>) -> rusqlite::Result<Volume> {
    Ok(Volume {
        id: row.get(0)?,
        uuid: row.get(1)?,
        name: row.get(2)?,
        mount_point: row.get::<_, Option<String>>(3)?.map(Into::into),
        is_internal: row.get(4)?,
        total_size_bytes: row.get(5)?,
        filesystem: row.get(6)?,
        first_seen_at: row.get(7)?,
        last_seen_at: row.get(8)?,
        last_scan_at: row.get(9)?,
        scan_status: row.get(10)?,
        file_count: row.get(11)?,
    })
}

impl Catalog {
    /// Insert a volume, or refresh name, mount point and properties of the
    /// existing row with the same uuid. `first_seen_at` is kept.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure.
    pub fn upsert_volume(&self, info: &VolumeInfo) -> Result<VolumeId, CatalogError> {
        let now = Utc::now();
        self.write(|conn| {
            let id = conn.query_row(
                "INSERT INTO volumes (uuid, name, mount_point, is_internal, total_size_bytes, \
                     filesystem, first_seen_at, last_seen_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7) \
                 ON CONFLICT(uuid) DO UPDATE SET \
                     name = excluded.name, \
                     mount_point = excluded.mount_point, \
                     is_internal = excluded.is_internal, \
                     total_size_bytes = COALESCE(excluded.total_size_bytes, total_size_bytes), \
                     filesystem = COALESCE(excluded.filesystem, filesystem), \
                     last_seen_at = excluded.last_seen_at \
                 RETURNING id",
                params![
                    info.uuid,
                    info.name,
                    path_text(&info.mount_point),
                    info.is_internal,
                    info.total_size_bytes,
                    info.filesystem,
                    now,
                ],
                |row| row.get(0),
            )?;
            log::debug!("Upserted volume {} ({}) as id {}", info.name, info.uuid, id);
            Ok(id)
        })
    }

    /// Look a volume up by its uuid.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure.
    pub fn volume_by_uuid(&self, uuid: &str) -> Result<Option<Volume>, CatalogError> {
        self.read(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {VOLUME_COLUMNS} FROM volumes WHERE uuid = ?1"),
                    [uuid],
                    volume_from_row,
                )
                .optional()?)
        })
    }

    /// Look a volume up by id.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure.
    pub fn volume(&self, id: VolumeId) -> Result<Option<Volume>, CatalogError> {
        self.read(|conn| volume_by_id(conn, id))
    }

    /// All volumes, by name.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure.
    pub fn volumes(&self) -> Result<Vec<Volume>, CatalogError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {VOLUME_COLUMNS} FROM volumes ORDER BY name, id"
            ))?;
            let volumes = stmt
                .query_map([], volume_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(volumes)
        })
    }

    /// Record the outcome of a scan. `last_scan_at` is set to now; the file
    /// count is only replaced when one is given.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::VolumeNotFound`] if the volume does not exist.
    pub fn update_volume_scan_status(
        &self,
        id: VolumeId,
        status: ScanStatus,
        file_count: Option<u64>,
    ) -> Result<(), CatalogError> {
        self.write(|conn| {
            let changed = conn.execute(
                "UPDATE volumes SET scan_status = ?1, last_scan_at = ?2, \
                     file_count = COALESCE(?3, file_count) \
                 WHERE id = ?4",
                params![status, Utc::now(), file_count, id],
            )?;
            if changed == 0 {
                return Err(CatalogError::VolumeNotFound(id));
            }
            Ok(())
        })
    }

    /// Delete a volume with its files, hashes, sessions, checkpoints,
    /// excluded paths and extension samples, all in one transaction.
    ///
    /// Returns whether a volume was deleted.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure; nothing is deleted then.
    pub fn delete_volume(&self, id: VolumeId) -> Result<bool, CatalogError> {
        self.write(|conn| {
            conn.execute(
                "DELETE FROM hashes WHERE file_id IN (SELECT id FROM files WHERE volume_id = ?1)",
                [id],
            )?;
            let files = conn.execute("DELETE FROM files WHERE volume_id = ?1", [id])?;
            conn.execute(
                "DELETE FROM scan_checkpoints WHERE session_id IN \
                     (SELECT id FROM scan_sessions WHERE volume_id = ?1)",
                [id],
            )?;
            conn.execute("DELETE FROM scan_sessions WHERE volume_id = ?1", [id])?;
            conn.execute("DELETE FROM excluded_paths WHERE volume_id = ?1", [id])?;
            conn.execute("DELETE FROM extension_sample_paths WHERE volume_id = ?1", [id])?;
            let deleted = conn.execute("DELETE FROM volumes WHERE id = ?1", [id])? > 0;
            if deleted {
                log::info!("Deleted volume {id} and {files} file rows");
            }
            Ok(deleted)
        })
    }
}

pub(super) fn volume_by_id(conn: &Connection, id: VolumeId) -> Result<Option<Volume>, CatalogError> {
    Ok(conn
        .query_row(
            &format!("SELECT {VOLUME_COLUMNS} FROM volumes WHERE id = ?1"),
            [id],
            volume_from_row,
        )
        .optional()?)
}
