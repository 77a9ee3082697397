//! Scan sessions and their checkpoints.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::models::{ScanCheckpoint, ScanSession, ScanStats, SessionId, SessionStatus, VolumeId};
use super::{path_text, Catalog, CatalogError};

const SESSION_COLUMNS: &str = "id, volume_id, scan_path, started_at, completed_at, \
     files_scanned, files_added, files_updated, files_removed, files_unchanged, \
     files_skipped, files_failed, files_total, last_processed_path, status, error_message";

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<ScanSession> {
    Ok(ScanSession {
        id: row.get(0)?,
        volume_id: row.get(1)?,
        scan_path: row.get::<_, Option<String>>(2)?.map(PathBuf::from),
        started_at: row.get(3)?,
        completed_at: row.get(4)?,
        stats: ScanStats {
            files_scanned: row.get::<_, Option<u64>>(5)?.unwrap_or(0),
            files_added: row.get::<_, Option<u64>>(6)?.unwrap_or(0),
            files_updated: row.get::<_, Option<u64>>(7)?.unwrap_or(0),
            files_removed: row.get::<_, Option<u64>>(8)?.unwrap_or(0),
            files_unchanged: row.get::<_, Option<u64>>(9)?.unwrap_or(0),
            files_skipped: row.get::<_, Option<u64>>(10)?.unwrap_or(0),
            files_failed: row.get::<_, Option<u64>>(11)?.unwrap_or(0),
            files_total: row.get::<_, Option<u64>>(12)?.unwrap_or(0),
        },
        last_processed_path: row.get(13)?,
        status: row.get(14)?,
        error_message: row.get(15)?,
    })
}

fn write_counters(
    conn: &rusqlite::Connection,
    id: SessionId,
    stats: &ScanStats,
    last_processed_path: Option<&str>,
) -> Result<(), CatalogError> {
    let changed = conn.execute(
        "UPDATE scan_sessions SET files_scanned = ?1, files_added = ?2, files_updated = ?3, \
             files_removed = ?4, files_unchanged = ?5, files_skipped = ?6, files_failed = ?7, \
             files_total = ?8, last_processed_path = COALESCE(?9, last_processed_path) \
         WHERE id = ?10",
        params![
            stats.files_scanned,
            stats.files_added,
            stats.files_updated,
            stats.files_removed,
            stats.files_unchanged,
            stats.files_skipped,
            stats.files_failed,
            stats.files_total,
            last_processed_path,
            id,
        ],
    )?;
    if changed == 0 {
        return Err(CatalogError::SessionNotFound(id));
    }
    Ok(())
}

fn set_status(
    conn: &rusqlite::Connection,
    id: SessionId,
    status: SessionStatus,
    error: Option<&str>,
) -> Result<(), CatalogError> {
    let completed_at = match status {
        SessionStatus::Running | SessionStatus::Paused => None,
        SessionStatus::Completed | SessionStatus::Cancelled | SessionStatus::Failed => Some(Utc::now()),
    };
    let changed = conn.execute(
        "UPDATE scan_sessions SET status = ?1, completed_at = ?2, error_message = ?3 WHERE id = ?4",
        params![status, completed_at, error, id],
    )?;
    if changed == 0 {
        return Err(CatalogError::SessionNotFound(id));
    }
    Ok(())
}

impl Catalog {
    /// Create a `running` session for a volume.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure.
    pub fn start_session(
        &self,
        volume_id: VolumeId,
        scan_path: Option<&Path>,
    ) -> Result<SessionId, CatalogError> {
        self.write(|conn| {
            conn.execute(
                "INSERT INTO scan_sessions (volume_id, scan_path, started_at, status) \
                 VALUES (?1, ?2, ?3, 'running')",
                params![volume_id, scan_path.map(path_text), Utc::now()],
            )?;
            let id = conn.last_insert_rowid();
            log::debug!("Started scan session {id} for volume {volume_id}");
            Ok(id)
        })
    }

    /// Persist the running counters of a session.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::SessionNotFound`] for an unknown session.
    pub fn update_session_counters(
        &self,
        id: SessionId,
        stats: &ScanStats,
        last_processed_path: Option<&str>,
    ) -> Result<(), CatalogError> {
        self.write(|conn| write_counters(conn, id, stats, last_processed_path))
    }

    /// Mark a session `paused`. Its checkpoint is kept.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::SessionNotFound`] for an unknown session.
    pub fn pause_session(&self, id: SessionId) -> Result<(), CatalogError> {
        self.write(|conn| set_status(conn, id, SessionStatus::Paused, None))
    }

    /// Put a paused or interrupted session back to `running`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::SessionNotFound`] for an unknown session.
    pub fn reopen_session(&self, id: SessionId) -> Result<(), CatalogError> {
        self.write(|conn| set_status(conn, id, SessionStatus::Running, None))
    }

    /// Finish a session with a terminal or paused status.
    ///
    /// `completed_at` is stamped for `completed`, `cancelled` and `failed`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::SessionNotFound`] for an unknown session.
    pub fn complete_session(
        &self,
        id: SessionId,
        status: SessionStatus,
        error: Option<&str>,
    ) -> Result<(), CatalogError> {
        self.write(|conn| set_status(conn, id, status, error))
    }

    /// Look a session up by id.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure.
    pub fn session(&self, id: SessionId) -> Result<Option<ScanSession>, CatalogError> {
        self.read(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {SESSION_COLUMNS} FROM scan_sessions WHERE id = ?1"),
                    [id],
                    session_from_row,
                )
                .optional()?)
        })
    }

    /// Replace the checkpoint of a session and write its counters, in one
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if a directory path cannot be encoded or on
    /// database failure; the previous checkpoint is kept then.
    pub fn save_checkpoint(
        &self,
        checkpoint: &ScanCheckpoint,
        stats: &ScanStats,
        last_processed_path: Option<&str>,
    ) -> Result<(), CatalogError> {
        let directories = serde_json::to_string(&checkpoint.directories_completed)?;
        self.write(|conn| {
            conn.execute(
                "DELETE FROM scan_checkpoints WHERE session_id = ?1",
                [checkpoint.session_id],
            )?;
            conn.execute(
                "INSERT INTO scan_checkpoints (session_id, checkpoint_at, current_directory, \
                     files_processed, files_total, directories_completed) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    checkpoint.session_id,
                    checkpoint.checkpoint_at,
                    checkpoint.current_directory.as_deref().map(path_text),
                    checkpoint.files_processed,
                    checkpoint.files_total,
                    directories,
                ],
            )?;
            write_counters(conn, checkpoint.session_id, stats, last_processed_path)?;
            log::debug!(
                "Checkpoint for session {}: {} files, {} directories",
                checkpoint.session_id,
                checkpoint.files_processed,
                checkpoint.directories_completed.len()
            );
            Ok(())
        })
    }

    /// The latest checkpoint of a session.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure or undecodable data.
    pub fn load_checkpoint(&self, session_id: SessionId) -> Result<Option<ScanCheckpoint>, CatalogError> {
        let row = self.read(|conn| {
            Ok(conn
                .query_row(
                    "SELECT checkpoint_at, current_directory, files_processed, files_total, \
                         directories_completed \
                     FROM scan_checkpoints WHERE session_id = ?1 \
                     ORDER BY id DESC LIMIT 1",
                    [session_id],
                    |row| {
                        Ok((
                            row.get::<_, DateTime<Utc>>(0)?,
                            row.get::<_, Option<String>>(1)?,
                            row.get::<_, Option<u64>>(2)?,
                            row.get::<_, Option<u64>>(3)?,
                            row.get::<_, Option<String>>(4)?,
                        ))
                    },
                )
                .optional()?)
        })?;

        let Some((checkpoint_at, current_directory, processed, total, directories)) = row else {
            return Ok(None);
        };
        let directories_completed: BTreeSet<PathBuf> = match directories.as_deref() {
            Some(json) if !json.is_empty() => serde_json::from_str(json)?,
            _ => BTreeSet::new(),
        };
        Ok(Some(ScanCheckpoint {
            session_id,
            checkpoint_at,
            current_directory: current_directory.map(PathBuf::from),
            files_processed: processed.unwrap_or(0),
            files_total: total.unwrap_or(0),
            directories_completed,
        }))
    }

    /// Drop the checkpoint of a session.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure.
    pub fn delete_checkpoint(&self, session_id: SessionId) -> Result<(), CatalogError> {
        self.write(|conn| {
            conn.execute(
                "DELETE FROM scan_checkpoints WHERE session_id = ?1",
                [session_id],
            )?;
            Ok(())
        })
    }

    /// Paused sessions, newest first, optionally for one volume.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure.
    pub fn paused_sessions(&self, volume_id: Option<VolumeId>) -> Result<Vec<ScanSession>, CatalogError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM scan_sessions \
                 WHERE status = 'paused' AND (?1 IS NULL OR volume_id = ?1) \
                 ORDER BY started_at DESC, id DESC"
            ))?;
            let sessions = stmt
                .query_map([volume_id], session_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(sessions)
        })
    }

    /// Sessions left `running` (interrupted by a crash) or `paused`, newest
    /// first.
    ///
    /// A `running` row cannot tell whether its process is still alive, so
    /// callers pass the ids of the sessions they are running themselves in
    /// `live`; those are left out.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure.
    pub fn interrupted_sessions(&self, live: &[SessionId]) -> Result<Vec<ScanSession>, CatalogError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM scan_sessions \
                 WHERE status IN ('running', 'paused') \
                 ORDER BY started_at DESC, id DESC"
            ))?;
            let sessions = stmt
                .query_map([], session_from_row)?
                .filter(|row| row.as_ref().map_or(true, |s| !live.contains(&s.id)))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(sessions)
        })
    }
}
