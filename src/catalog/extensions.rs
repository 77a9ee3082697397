//! User preferences kept in the catalog: extension overrides, unknown
//! extensions seen while scanning, and per-volume excluded paths.

use std::collections::BTreeSet;

use chrono::Utc;
use rusqlite::params;

use super::models::{SamplePath, UnknownExtension, VolumeId};
use super::{Catalog, CatalogError};
use crate::classify::{normalize_extension, ExtensionOverrides};

const INCLUDE: &str = "include";
const EXCLUDE: &str = "exclude";

impl Catalog {
    /// The stored include/exclude overrides for the classifier.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure.
    pub fn custom_extension_overrides(&self) -> Result<ExtensionOverrides, CatalogError> {
        self.read(|conn| {
            let mut stmt = conn.prepare("SELECT extension, action FROM custom_extensions")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            let mut overrides = ExtensionOverrides::default();
            for row in rows {
                let (extension, action) = row?;
                match action.as_str() {
                    INCLUDE => {
                        overrides.include.insert(extension);
                    }
                    EXCLUDE => {
                        overrides.exclude.insert(extension);
                    }
                    other => log::warn!("Ignoring custom extension {extension} with action {other}"),
                }
            }
            Ok(overrides)
        })
    }

    /// Replace the set of extra extensions to index.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure.
    pub fn set_custom_included_extensions<S: AsRef<str>>(&self, extensions: &[S]) -> Result<(), CatalogError> {
        self.replace_custom_extensions(INCLUDE, extensions)
    }

    /// Replace the set of known extensions to ignore.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure.
    pub fn set_custom_excluded_extensions<S: AsRef<str>>(&self, extensions: &[S]) -> Result<(), CatalogError> {
        self.replace_custom_extensions(EXCLUDE, extensions)
    }

    fn replace_custom_extensions<S: AsRef<str>>(
        &self,
        action: &str,
        extensions: &[S],
    ) -> Result<(), CatalogError> {
        let normalized: BTreeSet<String> = extensions
            .iter()
            .map(|e| normalize_extension(e.as_ref()))
            .filter(|e| !e.is_empty())
            .collect();
        let now = Utc::now();
        self.write(|conn| {
            conn.execute("DELETE FROM custom_extensions WHERE action = ?1", [action])?;
            // An extension has one action; the latest call wins.
            let mut stmt = conn.prepare(
                "INSERT INTO custom_extensions (extension, action, added_at) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(extension) DO UPDATE SET action = excluded.action, added_at = excluded.added_at",
            )?;
            for extension in &normalized {
                stmt.execute(params![extension, action, now])?;
            }
            Ok(())
        })
    }

    /// Count an occurrence of an unrecognised extension and remember the
    /// directory it was seen in.
    ///
    /// # Arguments
    ///
    /// * `extension` - The extension, in any case
    /// * `volume_id` - Volume being scanned
    /// * `relative_dir` - Directory of the file relative to the mount point
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure.
    pub fn record_unknown_extension(
        &self,
        extension: &str,
        volume_id: VolumeId,
        relative_dir: &str,
    ) -> Result<(), CatalogError> {
        let extension = normalize_extension(extension);
        if extension.is_empty() {
            return Ok(());
        }
        let now = Utc::now();
        self.write(|conn| {
            conn.execute(
                "INSERT INTO unknown_extensions (extension, occurrence_count, first_seen_at, last_seen_at) \
                 VALUES (?1, 1, ?2, ?2) \
                 ON CONFLICT(extension) DO UPDATE SET \
                     occurrence_count = occurrence_count + 1, \
                     last_seen_at = excluded.last_seen_at",
                params![extension, now],
            )?;
            conn.execute(
                "INSERT INTO extension_sample_paths (extension, volume_id, relative_path, file_count) \
                 VALUES (?1, ?2, ?3, 1) \
                 ON CONFLICT(extension, volume_id, relative_path) DO UPDATE SET \
                     file_count = file_count + 1",
                params![extension, volume_id, relative_dir],
            )?;
            Ok(())
        })
    }

    /// Unknown extensions, most frequent first, with their sample paths.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure.
    pub fn unknown_extensions(&self) -> Result<Vec<UnknownExtension>, CatalogError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT extension, occurrence_count, first_seen_at, last_seen_at \
                 FROM unknown_extensions ORDER BY occurrence_count DESC, extension",
            )?;
            let mut extensions = stmt
                .query_map([], |row| {
                    Ok(UnknownExtension {
                        extension: row.get(0)?,
                        occurrence_count: row.get::<_, Option<u64>>(1)?.unwrap_or(1),
                        first_seen_at: row.get(2)?,
                        last_seen_at: row.get(3)?,
                        sample_paths: Vec::new(),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut samples = conn.prepare(
                "SELECT volume_id, relative_path, file_count FROM extension_sample_paths \
                 WHERE extension = ?1 ORDER BY file_count DESC, relative_path",
            )?;
            for ext in &mut extensions {
                ext.sample_paths = samples
                    .query_map([&ext.extension], |row| {
                        Ok(SamplePath {
                            volume_id: row.get(0)?,
                            relative_path: row.get(1)?,
                            file_count: row.get::<_, Option<u64>>(2)?.unwrap_or(1),
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
            }
            Ok(extensions)
        })
    }

    /// Exclude a directory (relative to the mount point) from future scans
    /// of a volume. Returns whether it was newly added.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure.
    pub fn add_excluded_path(&self, volume_id: VolumeId, relative_path: &str) -> Result<bool, CatalogError> {
        let relative_path = relative_path.trim_matches('/');
        self.write(|conn| {
            let added = conn.execute(
                "INSERT OR IGNORE INTO excluded_paths (volume_id, relative_path, added_at) \
                 VALUES (?1, ?2, ?3)",
                params![volume_id, relative_path, Utc::now()],
            )?;
            Ok(added > 0)
        })
    }

    /// Stop excluding a directory. Returns whether it was excluded.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure.
    pub fn remove_excluded_path(&self, volume_id: VolumeId, relative_path: &str) -> Result<bool, CatalogError> {
        let relative_path = relative_path.trim_matches('/');
        self.write(|conn| {
            let removed = conn.execute(
                "DELETE FROM excluded_paths WHERE volume_id = ?1 AND relative_path = ?2",
                params![volume_id, relative_path],
            )?;
            Ok(removed > 0)
        })
    }

    /// Excluded directories of a volume, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on database failure.
    pub fn excluded_paths(&self, volume_id: VolumeId) -> Result<Vec<String>, CatalogError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT relative_path FROM excluded_paths WHERE volume_id = ?1 ORDER BY relative_path",
            )?;
            let paths = stmt
                .query_map([volume_id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(paths)
        })
    }
}
