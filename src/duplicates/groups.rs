//! Duplicate group values.
//!
//! Groups are derived output: they are built once by the grouping engine,
//! never mutated afterwards, and never persisted.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use bytesize::ByteSize;
use serde::Serialize;

use super::keeper::KeeperPolicy;
use crate::catalog::{FileId, VolumeId};
use crate::classify::{extension_of, HashKind};

/// One file (or folder) in a [`DuplicateGroup`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMember {
    /// Catalog id, when the member came from the catalog
    pub file_id: Option<FileId>,
    /// Volume holding the member
    pub volume_id: Option<VolumeId>,
    /// Full path
    pub path: PathBuf,
    /// Parent directory
    pub directory: PathBuf,
    /// Final path component
    pub filename: String,
    /// Normalized extension, empty if none
    pub extension: String,
    /// Size in bytes
    pub size: u64,
    /// Width in pixels
    pub width: Option<u32>,
    /// Height in pixels
    pub height: Option<u32>,
}

impl GroupMember {
    /// Create a member from a path and size; the other fields are derived
    /// from the path or left empty.
    #[must_use]
    pub fn new(path: PathBuf, size: u64) -> Self {
        let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = extension_of(&path);
        Self {
            file_id: None,
            volume_id: None,
            path,
            directory,
            filename,
            extension,
            size,
            width: None,
            height: None,
        }
    }

    /// Pixel count, or 0 when the dimensions are unknown.
    #[must_use]
    pub fn resolution(&self) -> u64 {
        match (self.width, self.height) {
            (Some(w), Some(h)) => u64::from(w) * u64::from(h),
            _ => 0,
        }
    }
}

/// Similarity of two members, by index into [`DuplicateGroup::members`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PairSimilarity {
    /// Lower member index
    pub a: usize,
    /// Higher member index
    pub b: usize,
    /// Score in `[0, 1]`; 1.0 means identical
    pub score: f64,
}

/// A set of two or more files considered duplicates of each other.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateGroup {
    group_id: usize,
    members: Vec<GroupMember>,
    similarity: Vec<PairSimilarity>,
    suggested_keep: usize,
    is_intra_directory: bool,
    is_cross_volume: bool,
    hash_kind: Option<HashKind>,
}

impl DuplicateGroup {
    /// Build a group and choose its keeper.
    ///
    /// Returns `None` for fewer than two members.
    ///
    /// # Arguments
    ///
    /// * `group_id` - Identifier unique within one grouping result
    /// * `members` - Group members, in display order
    /// * `scores` - `(i, j, score)` for compared pairs, indices into `members`
    /// * `hash_kind` - Fingerprint the group was formed on, if any
    /// * `policy` - Keeper selection policy
    #[must_use]
    pub fn new(
        group_id: usize,
        members: Vec<GroupMember>,
        scores: impl IntoIterator<Item = (usize, usize, f64)>,
        hash_kind: Option<HashKind>,
        policy: &dyn KeeperPolicy,
    ) -> Option<Self> {
        if members.len() < 2 {
            return None;
        }
        let suggested_keep = policy.select(&members)?;

        let mut similarity: Vec<PairSimilarity> = scores
            .into_iter()
            .filter(|(i, j, _)| i != j && *i < members.len() && *j < members.len())
            .map(|(i, j, score)| PairSimilarity {
                a: i.min(j),
                b: i.max(j),
                score: score.clamp(0.0, 1.0),
            })
            .collect();
        similarity.sort_by(|x, y| (x.a, x.b).cmp(&(y.a, y.b)));
        similarity.dedup_by(|x, y| x.a == y.a && x.b == y.b);

        let directories: HashSet<&Path> = members.iter().map(|m| m.directory.as_path()).collect();
        let volumes: HashSet<VolumeId> = members.iter().filter_map(|m| m.volume_id).collect();

        Some(Self {
            group_id,
            is_intra_directory: directories.len() == 1,
            is_cross_volume: volumes.len() >= 2,
            members,
            similarity,
            suggested_keep,
            hash_kind,
        })
    }

    pub(crate) fn with_group_id(mut self, group_id: usize) -> Self {
        self.group_id = group_id;
        self
    }

    /// Identifier within the grouping result.
    #[must_use]
    pub fn group_id(&self) -> usize {
        self.group_id
    }

    /// All members.
    #[must_use]
    pub fn members(&self) -> &[GroupMember] {
        &self.members
    }

    /// Number of members (always at least 2).
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always false; kept for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The member suggested to keep.
    #[must_use]
    pub fn suggested_keep(&self) -> &GroupMember {
        &self.members[self.suggested_keep]
    }

    /// Index of the suggested keeper in [`Self::members`].
    #[must_use]
    pub fn suggested_keep_index(&self) -> usize {
        self.suggested_keep
    }

    /// Every member except the keeper.
    #[must_use]
    pub fn suggested_delete(&self) -> Vec<&GroupMember> {
        self.members
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != self.suggested_keep)
            .map(|(_, m)| m)
            .collect()
    }

    /// Whether all members share one directory.
    #[must_use]
    pub fn is_intra_directory(&self) -> bool {
        self.is_intra_directory
    }

    /// Whether members live on at least two volumes.
    #[must_use]
    pub fn is_cross_volume(&self) -> bool {
        self.is_cross_volume
    }

    /// The common directory of an intra-directory group.
    #[must_use]
    pub fn directory(&self) -> Option<&Path> {
        if self.is_intra_directory {
            self.members.first().map(|m| m.directory.as_path())
        } else {
            None
        }
    }

    /// Fingerprint kind the group was formed on.
    #[must_use]
    pub fn hash_kind(&self) -> Option<HashKind> {
        self.hash_kind
    }

    /// Recorded pairwise scores.
    #[must_use]
    pub fn pair_similarities(&self) -> &[PairSimilarity] {
        &self.similarity
    }

    /// Score of two members by index, if that pair was compared.
    #[must_use]
    pub fn similarity(&self, i: usize, j: usize) -> Option<f64> {
        let (a, b) = (i.min(j), i.max(j));
        self.similarity
            .iter()
            .find(|p| p.a == a && p.b == b)
            .map(|p| p.score)
    }

    /// Mean of the recorded scores; 1.0 when none were recorded.
    #[must_use]
    pub fn average_similarity(&self) -> f64 {
        if self.similarity.is_empty() {
            return 1.0;
        }
        self.similarity.iter().map(|p| p.score).sum::<f64>() / self.similarity.len() as f64
    }

    /// Total size of all members.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.members.iter().map(|m| m.size).sum()
    }

    /// Bytes freed by deleting every member except the keeper.
    #[must_use]
    pub fn potential_savings(&self) -> u64 {
        self.suggested_delete().iter().map(|m| m.size).sum()
    }
}

/// Totals over a grouping result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GroupSummary {
    /// Number of groups
    pub total_groups: usize,
    /// Members across all groups
    pub total_files: usize,
    /// Members suggested for deletion
    pub total_duplicate_files: usize,
    /// Size of all members
    pub total_size: u64,
    /// Bytes freed by deleting all suggested members
    pub potential_savings: u64,
    /// Groups contained in one directory
    pub intra_directory_groups: usize,
    /// Groups spanning directories
    pub cross_directory_groups: usize,
    /// Groups spanning volumes
    pub cross_volume_groups: usize,
}

impl GroupSummary {
    /// Summarize a list of groups.
    #[must_use]
    pub fn from_groups(groups: &[DuplicateGroup]) -> Self {
        let mut summary = Self {
            total_groups: groups.len(),
            ..Self::default()
        };
        for group in groups {
            summary.total_files += group.len();
            summary.total_duplicate_files += group.len() - 1;
            summary.total_size += group.total_size();
            summary.potential_savings += group.potential_savings();
            if group.is_intra_directory() {
                summary.intra_directory_groups += 1;
            } else {
                summary.cross_directory_groups += 1;
            }
            if group.is_cross_volume() {
                summary.cross_volume_groups += 1;
            }
        }
        summary
    }
}

impl fmt::Display for GroupSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} groups, {} files ({} duplicates), {} reclaimable",
            self.total_groups,
            self.total_files,
            self.total_duplicate_files,
            ByteSize(self.potential_savings)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duplicates::keeper::LargestFirst;

    fn member(path: &str, size: u64, volume: VolumeId) -> GroupMember {
        let mut m = GroupMember::new(PathBuf::from(path), size);
        m.volume_id = Some(volume);
        m
    }

    #[test]
    fn test_member_derives_fields() {
        let m = GroupMember::new(PathBuf::from("/photos/2024/IMG_1.JPG"), 10);
        assert_eq!(m.directory, PathBuf::from("/photos/2024"));
        assert_eq!(m.filename, "IMG_1.JPG");
        assert_eq!(m.extension, "jpg");
        assert_eq!(m.resolution(), 0);
    }

    #[test]
    fn test_too_small_group_is_rejected() {
        let members = vec![member("/a/x", 1, 1)];
        assert!(DuplicateGroup::new(0, members, [], None, &LargestFirst).is_none());
    }

    #[test]
    fn test_keeper_and_savings() {
        let members = vec![
            member("/a/1.jpg", 500, 1),
            member("/a/2.jpg", 5_000, 1),
            member("/a/3.jpg", 2_000, 1),
        ];
        let group = DuplicateGroup::new(7, members, [(0, 1, 1.0), (1, 2, 1.0)], None, &LargestFirst)
            .unwrap();

        assert_eq!(group.group_id(), 7);
        assert_eq!(group.suggested_keep().path, PathBuf::from("/a/2.jpg"));
        let deleted: Vec<_> = group.suggested_delete().iter().map(|m| m.size).collect();
        assert_eq!(deleted, vec![500, 2_000]);
        assert_eq!(group.total_size(), 7_500);
        assert_eq!(group.potential_savings(), 2_500);
        assert!(group.is_intra_directory());
        assert!(!group.is_cross_volume());
        assert_eq!(group.directory(), Some(Path::new("/a")));
    }

    #[test]
    fn test_similarity_lookup_is_symmetric() {
        let members = vec![member("/a/1", 1, 1), member("/b/2", 1, 2)];
        let group = DuplicateGroup::new(0, members, [(1, 0, 0.75)], None, &LargestFirst).unwrap();
        assert_eq!(group.similarity(0, 1), Some(0.75));
        assert_eq!(group.similarity(1, 0), Some(0.75));
        assert!((group.average_similarity() - 0.75).abs() < f64::EPSILON);
        assert!(group.is_cross_volume());
        assert!(!group.is_intra_directory());
        assert_eq!(group.directory(), None);
    }

    #[test]
    fn test_summary() {
        let a = DuplicateGroup::new(
            0,
            vec![member("/a/1", 10, 1), member("/a/2", 10, 1)],
            [],
            None,
            &LargestFirst,
        )
        .unwrap();
        let b = DuplicateGroup::new(
            1,
            vec![member("/a/3", 4, 1), member("/b/3", 4, 2), member("/c/3", 4, 2)],
            [],
            None,
            &LargestFirst,
        )
        .unwrap();

        let summary = GroupSummary::from_groups(&[a, b]);
        assert_eq!(summary.total_groups, 2);
        assert_eq!(summary.total_files, 5);
        assert_eq!(summary.total_duplicate_files, 3);
        assert_eq!(summary.total_size, 32);
        assert_eq!(summary.potential_savings, 18);
        assert_eq!(summary.intra_directory_groups, 1);
        assert_eq!(summary.cross_directory_groups, 1);
        assert_eq!(summary.cross_volume_groups, 1);
        assert_eq!(GroupSummary::from_groups(&[]), GroupSummary::default());
    }
}
