//! Partitioning fingerprints into duplicate groups.
//!
//! # Candidate sets
//!
//! Files are only compared within a candidate set. By default a set is one
//! directory and one extension family (`jpg` and `jpeg` together, RAW
//! formats together), which keeps the pairwise perceptual comparison small.
//! Exact matching can also run over one global set, which is how catalog
//! and cross-volume queries work.
//!
//! # Cancellation
//!
//! The engine checks its [`ScanControl`] between candidate sets. A cancelled
//! run returns the groups finished so far; a set is never half-grouped.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::groups::{DuplicateGroup, GroupMember};
use super::keeper::{KeeperPolicy, LargestFirst, ShortestName};
use super::union_find::UnionFind;
use crate::catalog::{Catalog, CatalogError, FileId, FileWithHashes, VolumeId};
use crate::classify::{extension_family, extension_of, HashKind};
use crate::scanner::{Fingerprint, PerceptualAlgorithm};
use crate::signal::ScanControl;

/// Errors raised by grouping operations.
#[derive(thiserror::Error, Debug)]
pub enum GroupingError {
    /// The distance threshold exceeds the fingerprint length.
    #[error("Threshold {threshold} is out of range for {algorithm} (0..={max})")]
    InvalidThreshold {
        /// Requested threshold
        threshold: u32,
        /// Algorithm it was requested for
        algorithm: PerceptualAlgorithm,
        /// Largest meaningful threshold
        max: u32,
    },

    /// A non-perceptual hash kind was asked for in perceptual mode.
    #[error("{0} is not a perceptual hash type")]
    NotPerceptual(HashKind),

    /// Reading fingerprints from the catalog failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// How candidates are partitioned before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// One set per directory and extension family
    #[default]
    DirectoryAndFamily,
    /// All candidates in one set
    Global,
}

/// A file with its fingerprints, ready for grouping.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Catalog id, when loaded from the catalog
    pub file_id: Option<FileId>,
    /// Volume holding the file
    pub volume_id: Option<VolumeId>,
    /// Full path
    pub path: PathBuf,
    /// Parent directory
    pub directory: PathBuf,
    /// Final path component
    pub filename: String,
    /// Normalized extension
    pub extension: String,
    /// Size in bytes
    pub size: u64,
    /// Width in pixels
    pub width: Option<u32>,
    /// Height in pixels
    pub height: Option<u32>,
    /// Fingerprints by kind
    pub hashes: BTreeMap<HashKind, String>,
}

impl Candidate {
    /// Create a candidate with no fingerprints.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        let member = GroupMember::new(path.into(), size);
        Self {
            file_id: None,
            volume_id: None,
            path: member.path,
            directory: member.directory,
            filename: member.filename,
            extension: member.extension,
            size,
            width: None,
            height: None,
            hashes: BTreeMap::new(),
        }
    }

    /// Add a fingerprint.
    #[must_use]
    pub fn with_hash(mut self, kind: HashKind, value: impl Into<String>) -> Self {
        self.hashes.insert(kind, value.into());
        self
    }

    /// Set the pixel dimensions.
    #[must_use]
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Set the volume.
    #[must_use]
    pub fn with_volume(mut self, volume_id: VolumeId) -> Self {
        self.volume_id = Some(volume_id);
        self
    }

    fn family(&self) -> String {
        extension_family(&self.extension)
    }

    fn member(&self) -> GroupMember {
        GroupMember {
            file_id: self.file_id,
            volume_id: self.volume_id,
            path: self.path.clone(),
            directory: self.directory.clone(),
            filename: self.filename.clone(),
            extension: self.extension.clone(),
            size: self.size,
            width: self.width,
            height: self.height,
        }
    }
}

impl From<FileWithHashes> for Candidate {
    fn from(row: FileWithHashes) -> Self {
        let path = row.path();
        let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let extension = row
            .file
            .extension
            .clone()
            .unwrap_or_else(|| extension_of(&path));
        Self {
            file_id: Some(row.file.id),
            volume_id: Some(row.file.volume_id),
            directory,
            filename: row.file.filename,
            extension,
            size: row.file.size_bytes,
            width: row.file.width,
            height: row.file.height,
            hashes: row.hashes,
            path,
        }
    }
}

static DATE_PREFIX: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^(0[1-9]|1[0-2])-(0[1-9]|[12][0-9]|3[01])(?:$|[^0-9])")
        .map_err(|e| log::error!("Invalid date prefix pattern: {e}"))
        .ok()
});

/// `MM-DD` prefix of a folder name, if it has one.
fn date_prefix(name: &str) -> Option<&str> {
    let re = DATE_PREFIX.as_ref()?;
    re.is_match(name).then(|| &name[..5])
}

/// Groups candidates into [`DuplicateGroup`] values.
#[derive(Clone)]
pub struct GroupingEngine {
    keeper: Arc<dyn KeeperPolicy>,
    control: ScanControl,
}

impl Default for GroupingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupingEngine {
    /// Create an engine keeping the largest file of each group.
    #[must_use]
    pub fn new() -> Self {
        Self {
            keeper: Arc::new(LargestFirst),
            control: ScanControl::new(),
        }
    }

    /// Use a different keeper policy.
    #[must_use]
    pub fn with_keeper(mut self, keeper: Arc<dyn KeeperPolicy>) -> Self {
        self.keeper = keeper;
        self
    }

    /// Observe a cancel flag between candidate sets.
    #[must_use]
    pub fn with_control(mut self, control: ScanControl) -> Self {
        self.control = control;
        self
    }

    /// Partition candidates into sets of at least two, each sorted by path.
    fn candidate_sets<'a>(&self, candidates: &'a [Candidate], kind: HashKind, scope: Scope) -> Vec<Vec<&'a Candidate>> {
        let mut sets: BTreeMap<(PathBuf, String), Vec<&Candidate>> = BTreeMap::new();
        for candidate in candidates.iter().filter(|c| c.hashes.contains_key(&kind)) {
            let key = match scope {
                Scope::DirectoryAndFamily => (candidate.directory.clone(), candidate.family()),
                Scope::Global => (PathBuf::new(), String::new()),
            };
            sets.entry(key).or_default().push(candidate);
        }
        sets.into_values()
            .filter(|set| set.len() >= 2)
            .map(|mut set| {
                set.sort_by(|a, b| a.path.cmp(&b.path));
                set
            })
            .collect()
    }

    /// Group candidates whose `kind` fingerprint is equal.
    ///
    /// Candidates without that fingerprint are ignored. Every pair in a
    /// group scores 1.0.
    ///
    /// # Arguments
    ///
    /// * `candidates` - Files to group
    /// * `kind` - Fingerprint compared for equality
    /// * `scope` - Candidate set partitioning
    #[must_use]
    pub fn exact_groups(&self, candidates: &[Candidate], kind: HashKind, scope: Scope) -> Vec<DuplicateGroup> {
        let mut groups = Vec::new();
        for set in self.candidate_sets(candidates, kind, scope) {
            if self.control.is_cancelled() {
                log::info!("Grouping cancelled after {} groups", groups.len());
                break;
            }

            let mut by_value: BTreeMap<&str, Vec<&Candidate>> = BTreeMap::new();
            for candidate in set {
                if let Some(value) = candidate.hashes.get(&kind) {
                    by_value.entry(value.as_str()).or_default().push(candidate);
                }
            }

            for matching in by_value.into_values().filter(|m| m.len() >= 2) {
                let n = matching.len();
                let scores = (0..n).flat_map(|i| (i + 1..n).map(move |j| (i, j, 1.0)));
                let members = matching.iter().map(|c| c.member()).collect();
                if let Some(group) =
                    DuplicateGroup::new(groups.len(), members, scores, Some(kind), self.keeper.as_ref())
                {
                    groups.push(group);
                }
            }
        }
        log::debug!("Found {} exact groups on {}", groups.len(), kind);
        groups
    }

    /// Cluster candidates whose perceptual fingerprints are within
    /// `threshold` bits of each other.
    ///
    /// Every pair in a candidate set is compared; pairs within the threshold
    /// are merged with union-find and score `1 - distance / bits`.
    ///
    /// # Arguments
    ///
    /// * `candidates` - Files to group
    /// * `algorithm` - Which perceptual fingerprint to compare
    /// * `threshold` - Largest Hamming distance still counted as similar
    ///
    /// # Errors
    ///
    /// Returns [`GroupingError::InvalidThreshold`] if `threshold` exceeds
    /// the fingerprint length.
    pub fn perceptual_groups(
        &self,
        candidates: &[Candidate],
        algorithm: PerceptualAlgorithm,
        threshold: u32,
    ) -> Result<Vec<DuplicateGroup>, GroupingError> {
        let max = algorithm.bit_len();
        if threshold > max {
            return Err(GroupingError::InvalidThreshold {
                threshold,
                algorithm,
                max,
            });
        }
        let kind = algorithm.hash_kind();

        let mut groups = Vec::new();
        for set in self.candidate_sets(candidates, kind, Scope::DirectoryAndFamily) {
            if self.control.is_cancelled() {
                log::info!("Grouping cancelled after {} groups", groups.len());
                break;
            }
            self.cluster_set(&set, kind, threshold, &mut groups);
        }
        log::debug!(
            "Found {} {} groups at threshold {}",
            groups.len(),
            algorithm,
            threshold
        );
        Ok(groups)
    }

    fn cluster_set(&self, set: &[&Candidate], kind: HashKind, threshold: u32, groups: &mut Vec<DuplicateGroup>) {
        let parsed: Vec<(&Candidate, Fingerprint)> = set
            .iter()
            .filter_map(|c| {
                let value = c.hashes.get(&kind)?;
                match Fingerprint::from_hex(value) {
                    Ok(fp) if fp.bit_len() > 0 => Some((*c, fp)),
                    Ok(_) => None,
                    Err(e) => {
                        log::debug!("Ignoring malformed {} for {}: {}", kind, c.path.display(), e);
                        None
                    }
                }
            })
            .collect();
        if parsed.len() < 2 {
            return;
        }

        let mut uf = UnionFind::new(parsed.len());
        let mut scores: Vec<(usize, usize, f64)> = Vec::new();
        for i in 0..parsed.len() {
            for j in i + 1..parsed.len() {
                let Some(distance) = parsed[i].1.distance(&parsed[j].1) else {
                    continue;
                };
                if distance <= threshold {
                    uf.union(i, j);
                    let bits = f64::from(parsed[i].1.bit_len());
                    scores.push((i, j, 1.0 - f64::from(distance) / bits));
                }
            }
        }

        for set_indices in uf.sets().into_iter().filter(|s| s.len() >= 2) {
            let position: BTreeMap<usize, usize> = set_indices
                .iter()
                .enumerate()
                .map(|(pos, &idx)| (idx, pos))
                .collect();
            let members = set_indices.iter().map(|&i| parsed[i].0.member()).collect();
            let group_scores = scores.iter().filter_map(|&(i, j, s)| {
                Some((*position.get(&i)?, *position.get(&j)?, s))
            });
            if let Some(group) =
                DuplicateGroup::new(groups.len(), members, group_scores, Some(kind), self.keeper.as_ref())
            {
                groups.push(group);
            }
        }
    }

    /// Exact groups over catalog files, in one global set.
    ///
    /// # Arguments
    ///
    /// * `catalog` - Catalog to read
    /// * `kind` - Fingerprint compared for equality
    /// * `volume_ids` - Restrict to these volumes; `None` reads all
    ///
    /// # Errors
    ///
    /// Returns [`GroupingError::Catalog`] if the catalog cannot be read.
    pub fn catalog_groups(
        &self,
        catalog: &Catalog,
        kind: HashKind,
        volume_ids: Option<&[VolumeId]>,
    ) -> Result<Vec<DuplicateGroup>, GroupingError> {
        let candidates = load_candidates(catalog, kind, volume_ids)?;
        log::info!("Grouping {} catalog files on {}", candidates.len(), kind);
        Ok(self.exact_groups(&candidates, kind, Scope::Global))
    }

    /// Exact groups that span at least two volumes.
    ///
    /// A value duplicated only within one volume is left out even when it
    /// occurs many times there.
    ///
    /// # Errors
    ///
    /// Returns [`GroupingError::Catalog`] if the catalog cannot be read.
    pub fn cross_volume_groups(
        &self,
        catalog: &Catalog,
        kind: HashKind,
        volume_ids: Option<&[VolumeId]>,
    ) -> Result<Vec<DuplicateGroup>, GroupingError> {
        let candidates = load_candidates(catalog, kind, volume_ids)?;
        let groups = self
            .exact_groups(&candidates, kind, Scope::Global)
            .into_iter()
            .filter(DuplicateGroup::is_cross_volume)
            .enumerate()
            .map(|(id, group)| group.with_group_id(id))
            .collect();
        Ok(groups)
    }

    /// Perceptual groups over catalog files of the given kind.
    ///
    /// # Errors
    ///
    /// - [`GroupingError::NotPerceptual`] if `kind` is not a perceptual kind
    /// - [`GroupingError::InvalidThreshold`] if `threshold` is out of range
    /// - [`GroupingError::Catalog`] if the catalog cannot be read
    pub fn catalog_perceptual_groups(
        &self,
        catalog: &Catalog,
        kind: HashKind,
        threshold: u32,
        volume_ids: Option<&[VolumeId]>,
    ) -> Result<Vec<DuplicateGroup>, GroupingError> {
        let algorithm =
            PerceptualAlgorithm::from_hash_kind(kind).ok_or(GroupingError::NotPerceptual(kind))?;
        let candidates = load_candidates(catalog, kind, volume_ids)?;
        self.perceptual_groups(&candidates, algorithm, threshold)
    }

    /// Group sibling folders named after the same `MM-DD` date, such as
    /// `01-18` and `01-18 Grace`. The shortest name is kept regardless of
    /// the engine's keeper policy.
    #[must_use]
    pub fn date_folder_groups(&self, dirs: &[PathBuf]) -> Vec<DuplicateGroup> {
        let mut buckets: BTreeMap<(PathBuf, String), BTreeSet<PathBuf>> = BTreeMap::new();
        for dir in dirs {
            let Some(name) = dir.file_name().map(|n| n.to_string_lossy()) else {
                continue;
            };
            if let Some(prefix) = date_prefix(&name) {
                let parent = dir.parent().map(Path::to_path_buf).unwrap_or_default();
                buckets
                    .entry((parent, prefix.to_string()))
                    .or_default()
                    .insert(dir.clone());
            }
        }

        let mut groups = Vec::new();
        for folders in buckets.into_values() {
            if self.control.is_cancelled() {
                break;
            }
            let members = folders
                .into_iter()
                .map(|path| GroupMember::new(path, 0))
                .collect();
            if let Some(group) = DuplicateGroup::new(groups.len(), members, [], None, &ShortestName) {
                groups.push(group);
            }
        }
        groups
    }
}

fn load_candidates(
    catalog: &Catalog,
    kind: HashKind,
    volume_ids: Option<&[VolumeId]>,
) -> Result<Vec<Candidate>, CatalogError> {
    Ok(catalog
        .files_with_hashes(kind, volume_ids)?
        .into_iter()
        .map(Candidate::from)
        .collect())
}
