//! JSON output for query results.
//!
//! # Output Schema (duplicate groups)
//!
//! ```json
//! {
//!   "groups": [
//!     {
//!       "group_id": 0,
//!       "hash_kind": "exact_md5",
//!       "keep": "/photos/a.jpg",
//!       "members": [
//!         { "path": "/photos/a.jpg", "volume_id": 1, "size": 2048, "keep": true }
//!       ],
//!       "average_similarity": 1.0,
//!       "potential_savings": 2048,
//!       "intra_directory": true,
//!       "cross_volume": false
//!     }
//!   ],
//!   "summary": { "total_groups": 1, "potential_savings": 2048 }
//! }
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::catalog::{FileRecord, VolumeId};
use crate::classify::{FileType, HashKind};
use crate::duplicates::{DuplicateGroup, GroupSummary};

use super::OutputError;

/// One member of a group.
#[derive(Debug, Clone, Serialize)]
pub struct JsonMember {
    /// Absolute path, or relative to the volume if it is not mounted
    pub path: PathBuf,
    /// Volume holding the file, for catalog-backed groups
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_id: Option<VolumeId>,
    /// File size in bytes
    pub size: u64,
    /// Pixel width, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Pixel height, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Whether this is the suggested keeper
    pub keep: bool,
}

/// A duplicate group in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonGroup {
    /// Group number within the report
    pub group_id: usize,
    /// Hash the members matched on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_kind: Option<HashKind>,
    /// Suggested keeper path
    pub keep: PathBuf,
    /// All members, keeper included
    pub members: Vec<JsonMember>,
    /// Mean pairwise similarity (1.0 for exact groups)
    pub average_similarity: f64,
    /// Sum of member sizes
    pub total_size: u64,
    /// Bytes freed by removing every member except the keeper
    pub potential_savings: u64,
    /// All members share one directory
    pub intra_directory: bool,
    /// Members span two or more volumes
    pub cross_volume: bool,
}

impl JsonGroup {
    /// Convert a group.
    #[must_use]
    pub fn from_group(group: &DuplicateGroup) -> Self {
        let keep_index = group.suggested_keep_index();
        Self {
            group_id: group.group_id(),
            hash_kind: group.hash_kind(),
            keep: group.suggested_keep().path.clone(),
            members: group
                .members()
                .iter()
                .enumerate()
                .map(|(i, m)| JsonMember {
                    path: m.path.clone(),
                    volume_id: m.volume_id,
                    size: m.size,
                    width: m.width,
                    height: m.height,
                    keep: i == keep_index,
                })
                .collect(),
            average_similarity: group.average_similarity(),
            total_size: group.total_size(),
            potential_savings: group.potential_savings(),
            intra_directory: group.is_intra_directory(),
            cross_volume: group.is_cross_volume(),
        }
    }
}

/// Duplicate groups plus their summary.
#[derive(Debug, Clone, Serialize)]
pub struct JsonGroupsReport {
    /// Groups in report order
    pub groups: Vec<JsonGroup>,
    /// Totals over all groups
    pub summary: GroupSummary,
}

impl JsonGroupsReport {
    /// Build the report for a set of groups.
    #[must_use]
    pub fn new(groups: &[DuplicateGroup]) -> Self {
        Self {
            groups: groups.iter().map(JsonGroup::from_group).collect(),
            summary: GroupSummary::from_groups(groups),
        }
    }
}

/// A catalogued file in set-operation results.
#[derive(Debug, Clone, Serialize)]
pub struct JsonFile {
    /// Catalog id
    pub file_id: i64,
    /// Volume holding the file
    pub volume_id: VolumeId,
    /// Absolute path, or relative to the volume if it is not mounted
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Classified type
    pub file_type: FileType,
}

impl JsonFile {
    /// Convert a catalog record, resolving it against a mount point.
    #[must_use]
    pub fn from_record(record: &FileRecord, mount_point: Option<&Path>) -> Self {
        let path = match mount_point {
            Some(mount) => record.absolute_path(mount),
            None => PathBuf::from(&record.relative_path),
        };
        Self {
            file_id: record.id,
            volume_id: record.volume_id,
            path,
            size: record.size_bytes,
            file_type: record.file_type,
        }
    }
}

/// Serialize any report as pretty JSON followed by a newline.
///
/// # Errors
///
/// Returns [`OutputError`] if serialization or writing fails.
pub fn write_json<T: Serialize, W: Write>(value: &T, writer: &mut W) -> Result<(), OutputError> {
    serde_json::to_writer_pretty(&mut *writer, value)?;
    writer.write_all(b"\n")?;
    Ok(())
}
