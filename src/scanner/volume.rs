//! Resumable volume scans.
//!
//! # Overview
//!
//! [`VolumeScanner`] drives one scan through the phases
//! `Idle → Counting → Scanning → {Completed | Paused | Cancelled | Failed}`:
//!
//! 1. The volume is registered (or refreshed) in the catalog and a session
//!    is started, or a paused session is reopened.
//! 2. Unless a resumed session already knows its total, the tree is walked
//!    once to count files for progress reporting.
//! 3. The tree is walked again directory by directory. New and modified
//!    files are upserted and queued for hashing; unchanged files are only
//!    counted.
//! 4. Hash jobs run on the [`HashPool`] in batches. Pending jobs are always
//!    flushed before a checkpoint, a directory completion or the end of the
//!    scan, so a checkpoint never claims work that is not in the catalog.
//!    A file whose primary hash cannot be computed is counted as failed,
//!    not as added or updated.
//!
//! Only files with a recognised extension are in scope: they make up
//! `files_total`, and `files_skipped` counts the in-scope files the filter
//! rejects. Unrecognised extensions are recorded in the catalog and
//! otherwise ignored.
//!
//! # Checkpoints
//!
//! A checkpoint records the directories whose direct files are fully
//! processed, the directory being worked on, and the counters and last path
//! reached at the last flush. Every file up to that path is persisted with
//! its hashes. A resumed scan skips completed directories and the already
//! processed files of the interrupted one, so the final counters equal
//! those of an uninterrupted scan.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use unicode_normalization::UnicodeNormalization;

use super::metadata::{MetadataLoader, DEFAULT_PROBE_TIMEOUT};
use super::perceptual::PerceptualAlgorithm;
use super::pool::{HashJob, HashPool};
use super::walker::DirectoryWalker;
use super::ScanError;
use crate::catalog::{
    path_text, Catalog, CatalogError, FileId, FileInfo, ScanCheckpoint, ScanStats, ScanStatus,
    SessionId, SessionStatus, VolumeId, VolumeInfo,
};
use crate::classify::{extension_of, Classifier, FileFilter, FileType, HashKind, HashStrategy};
use crate::progress::ProgressSink;
use crate::signal::ScanControl;

/// Default number of processed files between checkpoints.
pub const DEFAULT_CHECKPOINT_INTERVAL: u64 = 100;

/// Default number of queued hash jobs that triggers a flush.
pub const DEFAULT_HASH_BATCH_SIZE: usize = 50;

/// Default minimum time between two progress callbacks.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Tunables of a [`VolumeScanner`].
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Hash worker threads; 0 uses the CPU count (capped at 16)
    pub hash_workers: usize,
    /// Processed files between checkpoints
    pub checkpoint_interval: u64,
    /// Queued hash jobs that trigger a flush
    pub hash_batch_size: usize,
    /// Limit for one `ffprobe` call
    pub probe_timeout: Duration,
    /// Minimum time between progress callbacks
    pub progress_interval: Duration,
    /// Fingerprint stored for lossy images
    pub perceptual_algorithm: PerceptualAlgorithm,
    /// Directory and file rules
    pub filter: FileFilter,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            hash_workers: 0,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            hash_batch_size: DEFAULT_HASH_BATCH_SIZE,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            perceptual_algorithm: PerceptualAlgorithm::default(),
            filter: FileFilter::new(),
        }
    }
}

impl ScannerConfig {
    /// Set the number of hash workers.
    #[must_use]
    pub fn with_hash_workers(mut self, workers: usize) -> Self {
        self.hash_workers = workers;
        self
    }

    /// Set the checkpoint interval (at least 1).
    #[must_use]
    pub fn with_checkpoint_interval(mut self, interval: u64) -> Self {
        self.checkpoint_interval = interval.max(1);
        self
    }

    /// Set the hash batch size (at least 1).
    #[must_use]
    pub fn with_hash_batch_size(mut self, size: usize) -> Self {
        self.hash_batch_size = size.max(1);
        self
    }

    /// Set the `ffprobe` timeout.
    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Set the minimum time between progress callbacks.
    #[must_use]
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Choose the perceptual fingerprint computed for lossy images.
    #[must_use]
    pub fn with_perceptual_algorithm(mut self, algorithm: PerceptualAlgorithm) -> Self {
        self.perceptual_algorithm = algorithm;
        self
    }

    /// Replace the file filter.
    #[must_use]
    pub fn with_filter(mut self, filter: FileFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// Where a scanner is in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    /// No scan has run yet
    Idle,
    /// Walking the tree to count files
    Counting,
    /// Indexing and hashing files
    Scanning,
    /// The last scan finished the whole tree
    Completed,
    /// The last scan stopped with a resumable checkpoint
    Paused,
    /// The last scan was cancelled
    Cancelled,
    /// The last scan hit a catalog error
    Failed,
}

/// How a scan that did not fail ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Every directory was processed
    Completed,
    /// Stopped on request; resumable from the checkpoint
    Paused,
    /// Stopped on request; checkpoint discarded
    Cancelled,
}

/// Result of [`VolumeScanner::scan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    /// Session that recorded the scan
    pub session_id: SessionId,
    /// Counters for the session, including earlier runs of a resumed one
    pub stats: ScanStats,
    /// How the scan ended
    pub outcome: ScanOutcome,
}

/// Describe a plain directory as a volume of its own.
///
/// The uuid is `DIR-` followed by the first 12 hex digits of the MD5 of the
/// path, so scanning the same directory again maps to the same volume. The
/// filesystem and capacity come from the disk holding the directory, when
/// one can be found.
#[must_use]
pub fn directory_volume(path: &Path) -> VolumeInfo {
    let digest = hex::encode(Md5::digest(path_text(path).as_bytes()));
    let uuid = format!("DIR-{}", &digest[..12]);
    let name = path
        .file_name()
        .map_or_else(|| path_text(path), |n| n.to_string_lossy().into_owned());

    let mut info = VolumeInfo::new(uuid, name, path).with_internal(true);

    let disks = sysinfo::Disks::new_with_refreshed_list();
    let disk = disks
        .list()
        .iter()
        .filter(|d| path.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len());
    match disk {
        Some(disk) => {
            info = info
                .with_internal(!disk.is_removable())
                .with_total_size(disk.total_space())
                .with_filesystem(disk.file_system().to_string_lossy());
        }
        None => info = info.with_filesystem("unknown"),
    }
    info
}

/// Relative path of `path` under `mount`, `/`-separated and NFC-normalized.
fn relative_text(path: &Path, mount: &Path) -> Option<String> {
    let rel = path.strip_prefix(mount).ok()?;
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().nfc().collect()),
            _ => None,
        })
        .collect();
    Some(parts.join("/"))
}

/// Scans volumes into a [`Catalog`].
pub struct VolumeScanner {
    catalog: Arc<Catalog>,
    classifier: Arc<Classifier>,
    metadata: MetadataLoader,
    pool: HashPool,
    config: ScannerConfig,
    control: ScanControl,
    phase: Mutex<ScanPhase>,
}

impl VolumeScanner {
    /// Create a scanner with a default classifier.
    ///
    /// # Arguments
    ///
    /// * `catalog` - Catalog to index into
    /// * `config` - Scan tunables
    /// * `control` - Pause/cancel flags polled between files
    #[must_use]
    pub fn new(catalog: Arc<Catalog>, config: ScannerConfig, control: ScanControl) -> Self {
        let metadata = MetadataLoader::new().with_probe_timeout(config.probe_timeout);
        let pool = HashPool::new(config.hash_workers);
        Self {
            catalog,
            classifier: Arc::new(Classifier::new()),
            metadata,
            pool,
            config,
            control,
            phase: Mutex::new(ScanPhase::Idle),
        }
    }

    /// Use a shared classifier, typically loaded with the catalog's
    /// extension overrides.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Use a custom metadata loader.
    #[must_use]
    pub fn with_metadata_loader(mut self, loader: MetadataLoader) -> Self {
        self.metadata = loader;
        self
    }

    /// The pause/cancel handle of this scanner.
    #[must_use]
    pub fn control(&self) -> &ScanControl {
        &self.control
    }

    /// Current phase of the state machine.
    #[must_use]
    pub fn phase(&self) -> ScanPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: ScanPhase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    /// Scan a plain directory, treating it as its own volume.
    ///
    /// # Errors
    ///
    /// See [`VolumeScanner::scan`].
    pub fn scan_directory(
        &self,
        path: &Path,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<ScanReport, ScanError> {
        let volume = directory_volume(path);
        self.scan(&volume, None, None, progress)
    }

    /// Scan a volume, or a subtree of it, into the catalog.
    ///
    /// # Arguments
    ///
    /// * `volume` - Volume description; registered or refreshed in the catalog
    /// * `root` - Subtree to scan; defaults to the mount point (or, when
    ///   resuming, to the session's scan root)
    /// * `resume` - Paused or interrupted session to continue
    /// * `progress` - Receiver of throttled progress updates
    ///
    /// # Errors
    ///
    /// - [`ScanError::NotFound`], [`ScanError::NotADirectory`] or
    ///   [`ScanError::PermissionDenied`] if the root cannot be scanned
    /// - [`ScanError::OutsideVolume`] if the root is not under the mount point
    /// - [`ScanError::InvalidResume`] if the session cannot be resumed
    /// - [`ScanError::Catalog`] if the catalog fails; the session is then
    ///   marked `failed` after a best-effort checkpoint
    pub fn scan(
        &self,
        volume: &VolumeInfo,
        root: Option<&Path>,
        resume: Option<SessionId>,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<ScanReport, ScanError> {
        let volume_id = self.catalog.upsert_volume(volume)?;
        let mount = volume.mount_point.clone();

        let resumed = match resume {
            Some(session_id) => Some(self.prepare_resume(session_id, volume_id)?),
            None => None,
        };

        let root = match (root, &resumed) {
            (Some(root), _) => root.to_path_buf(),
            (None, Some(state)) => state.scan_root.clone().unwrap_or_else(|| mount.clone()),
            (None, None) => mount.clone(),
        };
        validate_root(&root)?;
        let Some(root_rel) = relative_text(&root, &mount) else {
            return Err(ScanError::OutsideVolume {
                path: root,
                mount_point: mount,
            });
        };

        let (session_id, stats, completed, resume_point) = match resumed {
            Some(state) => {
                self.catalog.reopen_session(state.session_id)?;
                log::info!(
                    "Resuming session {} ({} directories already complete)",
                    state.session_id,
                    state.completed.len()
                );
                let point = state.current_dir.zip(state.last_path);
                (state.session_id, state.stats, state.completed, Some(point))
            }
            None => {
                let id = self.catalog.start_session(volume_id, Some(&root))?;
                log::info!("Scanning {} as session {}", root.display(), id);
                (id, ScanStats::default(), BTreeSet::new(), None)
            }
        };
        let is_resume = resume_point.is_some();
        let resume_point = resume_point.flatten();

        let mut run = ScanRun {
            volume_id,
            session_id,
            mount,
            root,
            root_rel,
            is_resume,
            stats,
            boundary: stats,
            boundary_path: resume_point.as_ref().map(|(_, last)| last.clone()),
            current_dir: resume_point.as_ref().map(|(dir, _)| dir.clone()),
            resume_point,
            completed,
            pending: Vec::new(),
            seen: HashSet::new(),
            since_checkpoint: 0,
            last_path: None,
            progress,
            progress_interval: self.config.progress_interval,
            last_progress: None,
        };

        match self.run(&mut run) {
            Ok(outcome) => {
                self.set_phase(match outcome {
                    ScanOutcome::Completed => ScanPhase::Completed,
                    ScanOutcome::Paused => ScanPhase::Paused,
                    ScanOutcome::Cancelled => ScanPhase::Cancelled,
                });
                Ok(ScanReport {
                    session_id,
                    stats: run.stats,
                    outcome,
                })
            }
            Err(source) => {
                self.set_phase(ScanPhase::Failed);
                self.record_failure(&run, &source);
                Err(ScanError::Catalog {
                    session_id: Some(session_id),
                    stats: run.stats,
                    source,
                })
            }
        }
    }

    fn prepare_resume(
        &self,
        session_id: SessionId,
        volume_id: VolumeId,
    ) -> Result<ResumeState, ScanError> {
        let invalid = |reason: &str| ScanError::InvalidResume {
            session_id,
            reason: reason.to_string(),
        };

        let session = self
            .catalog
            .session(session_id)?
            .ok_or_else(|| invalid("session not found"))?;
        if !session.status.is_resumable() {
            return Err(invalid(&format!("session is {}", session.status)));
        }
        if session.volume_id != Some(volume_id) {
            return Err(invalid("session belongs to another volume"));
        }

        let (completed, current_dir) = self
            .catalog
            .load_checkpoint(session_id)?
            .map(|c| (c.directories_completed, c.current_directory))
            .unwrap_or_default();
        Ok(ResumeState {
            session_id,
            scan_root: session.scan_path,
            stats: session.stats,
            completed,
            current_dir,
            last_path: session.last_processed_path,
        })
    }

    fn run(&self, run: &mut ScanRun<'_>) -> Result<ScanOutcome, CatalogError> {
        let excluded: Vec<PathBuf> = self
            .catalog
            .excluded_paths(run.volume_id)?
            .iter()
            .map(|rel| run.mount.join(rel))
            .collect();
        let root = run.root.clone();
        let walker =
            || DirectoryWalker::with_exclusions(&root, &self.config.filter, excluded.clone());

        if !run.is_resume || run.stats.files_total == 0 {
            self.set_phase(ScanPhase::Counting);
            run.report("Counting files...", true);
            let mut total = 0u64;
            let mut interrupted = false;
            for batch in walker() {
                if self.control.should_stop() {
                    interrupted = true;
                    break;
                }
                total += batch
                    .files
                    .iter()
                    .filter(|f| self.classifier.is_supported(&extension_of(f)))
                    .count() as u64;
                run.stats.files_total = total;
                run.report("Counting files...", false);
            }
            // A partial count is dropped so that a resumed scan counts again.
            if interrupted {
                total = 0;
            }
            run.stats.files_total = total;
            run.boundary.files_total = total;
            log::debug!("Found {} files under {}", total, root.display());
        }

        self.set_phase(ScanPhase::Scanning);
        run.report("Scanning...", true);

        let mut stopped = false;
        let walk = walker().with_completed(run.completed.iter().cloned());
        for batch in walk {
            if self.control.should_stop() {
                stopped = true;
                break;
            }
            if batch.already_completed {
                continue;
            }
            run.current_dir = Some(batch.dir.clone());
            let status = format!("Scanning {}", batch.dir.display());
            let done = run.take_resume_prefix(&batch.dir, &batch.files);
            if done > 0 {
                log::debug!(
                    "Skipping {} files already processed in {}",
                    done,
                    batch.dir.display()
                );
            }

            for file in &batch.files[done..] {
                if self.control.should_stop() {
                    stopped = true;
                    break;
                }
                self.process_file(run, file)?;

                if run.pending.len() >= self.config.hash_batch_size {
                    self.flush_hashes(run)?;
                }
                if run.since_checkpoint >= self.config.checkpoint_interval {
                    self.flush_hashes(run)?;
                    self.save_checkpoint(run)?;
                }
                run.report(&status, false);
            }
            if stopped {
                break;
            }

            self.flush_hashes(run)?;
            run.completed.insert(batch.dir);
        }

        if stopped {
            self.flush_hashes(run)?;
            return self.finish_stopped(run);
        }
        self.finish_completed(run)
    }

    fn process_file(&self, run: &mut ScanRun<'_>, path: &Path) -> Result<(), CatalogError> {
        let Some(relative) = relative_text(path, &run.mount) else {
            log::warn!("Skipping file outside volume: {}", path.display());
            run.stats.files_skipped += 1;
            return Ok(());
        };
        run.seen.insert(relative.clone());
        run.last_path = Some(relative.clone());

        let extension = extension_of(path);
        let file_type = self.classifier.classify(&extension);
        if file_type == FileType::Other {
            let dir = relative.rsplit_once('/').map_or("", |(dir, _)| dir);
            self.catalog
                .record_unknown_extension(&extension, run.volume_id, dir)?;
            return Ok(());
        }

        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) => {
                log::warn!("Cannot stat {}: {}", path.display(), e);
                run.stats.files_failed += 1;
                return Ok(());
            }
        };
        if !self
            .config
            .filter
            .should_include_file(path, file_type, Some(meta.len()))
        {
            log::trace!("Filtered out {}", path.display());
            run.stats.files_skipped += 1;
            return Ok(());
        }

        let modified: Option<DateTime<Utc>> = meta.modified().ok().map(DateTime::from);
        let strategy = self
            .classifier
            .hash_strategy(&extension)
            .with_perceptual(self.config.perceptual_algorithm.hash_kind());

        let existing = self.catalog.file_by_path(run.volume_id, &relative)?;
        if let Some(record) = &existing {
            let same = record.modified_at == modified && record.size_bytes == meta.len();
            if same && self.catalog.hash(record.id, strategy.primary)?.is_some() {
                log::trace!("Unchanged: {}", relative);
                run.stats.files_unchanged += 1;
                run.since_checkpoint += 1;
                // A fingerprint of another algorithm does not satisfy this one.
                if let Some(kind) = strategy.secondary.filter(|k| k.is_perceptual()) {
                    if self.catalog.hash(record.id, kind)?.is_none() {
                        run.queue(
                            HashJob {
                                file_id: record.id,
                                path: path.to_path_buf(),
                                strategy: HashStrategy {
                                    primary: kind,
                                    secondary: None,
                                },
                            },
                            Queued::Backfill,
                        );
                    }
                }
                return Ok(());
            }
        }

        let media = self.metadata.load(path, file_type);
        let mut info = FileInfo::new(relative.as_str(), meta.len(), file_type);
        info.width = media.width;
        info.height = media.height;
        info.duration_seconds = media.duration_seconds;
        info.created_at = meta.created().ok().map(DateTime::from);
        info.modified_at = modified;

        let file_id = self.catalog.upsert_file(run.volume_id, &info)?;
        let queued = if existing.is_some() {
            run.stats.files_updated += 1;
            Queued::Updated
        } else {
            run.stats.files_added += 1;
            Queued::Added
        };
        run.stats.files_scanned += 1;
        run.since_checkpoint += 1;
        log::trace!("Indexed {} as {}", relative, file_type);

        run.queue(
            HashJob {
                file_id,
                path: path.to_path_buf(),
                strategy,
            },
            queued,
        );
        Ok(())
    }

    /// Hash every queued job and persist the results. Afterwards every
    /// processed file is in the catalog, so the counters become the new
    /// checkpoint boundary.
    fn flush_hashes(&self, run: &mut ScanRun<'_>) -> Result<(), CatalogError> {
        if !run.pending.is_empty() {
            let mut queued: HashMap<FileId, (HashKind, Queued, PathBuf)> = HashMap::new();
            let jobs: Vec<HashJob> = std::mem::take(&mut run.pending)
                .into_iter()
                .map(|(job, why)| {
                    queued.insert(job.file_id, (job.strategy.primary, why, job.path.clone()));
                    job
                })
                .collect();
            let outcomes = self.pool.hash_batch(jobs, &self.control);

            let mut values = Vec::new();
            for outcome in outcomes {
                if outcome.cancelled {
                    continue;
                }
                if let Some((primary, why, path)) = queued.get(&outcome.file_id) {
                    if outcome.missing.contains(primary) {
                        self.record_hash_failure(run, outcome.file_id, path, *why)?;
                        continue;
                    }
                }
                if !outcome.missing.is_empty() {
                    log::debug!(
                        "File {} is missing hashes: {:?}",
                        outcome.file_id,
                        outcome.missing
                    );
                }
                values.extend(
                    outcome
                        .values
                        .into_iter()
                        .map(|(kind, value)| (outcome.file_id, kind, value)),
                );
            }
            self.catalog.set_hashes(&values)?;
        }
        run.boundary = run.stats;
        if run.last_path.is_some() {
            run.boundary_path.clone_from(&run.last_path);
        }
        Ok(())
    }

    fn record_hash_failure(
        &self,
        run: &mut ScanRun<'_>,
        file_id: FileId,
        path: &Path,
        why: Queued,
    ) -> Result<(), CatalogError> {
        match why {
            Queued::Added => run.stats.files_added = run.stats.files_added.saturating_sub(1),
            Queued::Updated => {
                run.stats.files_updated = run.stats.files_updated.saturating_sub(1);
            }
            Queued::Backfill => {
                log::debug!("Could not fingerprint {}", path.display());
                return Ok(());
            }
        }
        run.stats.files_scanned = run.stats.files_scanned.saturating_sub(1);
        run.stats.files_failed += 1;
        log::warn!("Cannot hash {}", path.display());
        // Hashes of the previous content no longer describe the file.
        self.catalog.clear_hashes(file_id)?;
        // The file vanished after it was indexed.
        if !path.exists() {
            self.catalog.mark_file_deleted(file_id)?;
        }
        Ok(())
    }

    fn checkpoint(&self, run: &ScanRun<'_>) -> ScanCheckpoint {
        ScanCheckpoint {
            session_id: run.session_id,
            checkpoint_at: Utc::now(),
            current_directory: run.current_dir.clone(),
            files_processed: run.boundary.processed(),
            files_total: run.boundary.files_total,
            directories_completed: run.completed.clone(),
        }
    }

    fn save_checkpoint(&self, run: &mut ScanRun<'_>) -> Result<(), CatalogError> {
        let checkpoint = self.checkpoint(run);
        self.catalog
            .save_checkpoint(&checkpoint, &run.boundary, run.boundary_path.as_deref())?;
        run.since_checkpoint = 0;
        Ok(())
    }

    fn finish_stopped(&self, run: &mut ScanRun<'_>) -> Result<ScanOutcome, CatalogError> {
        if self.control.is_cancelled() {
            self.catalog.delete_checkpoint(run.session_id)?;
            self.catalog
                .update_session_counters(run.session_id, &run.stats, run.last_path.as_deref())?;
            self.catalog
                .complete_session(run.session_id, SessionStatus::Cancelled, None)?;
            self.catalog
                .update_volume_scan_status(run.volume_id, ScanStatus::Partial, None)?;
            log::info!("Scan session {} cancelled: {}", run.session_id, run.stats);
            run.report("Scan cancelled", true);
            return Ok(ScanOutcome::Cancelled);
        }

        self.save_checkpoint(run)?;
        self.catalog.pause_session(run.session_id)?;
        self.catalog
            .update_volume_scan_status(run.volume_id, ScanStatus::Partial, None)?;
        log::info!(
            "Scan session {} paused after {} directories",
            run.session_id,
            run.completed.len()
        );
        run.report("Scan paused", true);
        Ok(ScanOutcome::Paused)
    }

    fn finish_completed(&self, run: &mut ScanRun<'_>) -> Result<ScanOutcome, CatalogError> {
        // Only a full walk of a fresh session has seen every file.
        if !run.is_resume {
            run.stats.files_removed =
                self.catalog
                    .mark_unseen_files_deleted(run.volume_id, &run.root_rel, &run.seen)?;
            if run.stats.files_removed > 0 {
                log::info!("{} files no longer present", run.stats.files_removed);
            }
        }

        self.catalog.delete_checkpoint(run.session_id)?;
        self.catalog
            .update_session_counters(run.session_id, &run.stats, run.last_path.as_deref())?;
        self.catalog
            .complete_session(run.session_id, SessionStatus::Completed, None)?;
        let file_count = self.catalog.file_count_for_volume(run.volume_id)?;
        self.catalog
            .update_volume_scan_status(run.volume_id, ScanStatus::Complete, Some(file_count))?;

        log::info!("Scan session {} complete: {}", run.session_id, run.stats);
        run.report("Scan complete", true);
        Ok(ScanOutcome::Completed)
    }

    fn record_failure(&self, run: &ScanRun<'_>, error: &CatalogError) {
        log::error!("Scan session {} failed: {}", run.session_id, error);
        let checkpoint = self.checkpoint(run);
        if let Err(e) =
            self.catalog
                .save_checkpoint(&checkpoint, &run.boundary, run.boundary_path.as_deref())
        {
            log::warn!("Could not save checkpoint for failed session: {}", e);
        }
        let message = error.to_string();
        if let Err(e) =
            self.catalog
                .complete_session(run.session_id, SessionStatus::Failed, Some(&message))
        {
            log::warn!("Could not mark session {} failed: {}", run.session_id, e);
        }
        if let Err(e) = self
            .catalog
            .update_volume_scan_status(run.volume_id, ScanStatus::Partial, None)
        {
            log::warn!("Could not update volume status: {}", e);
        }
    }
}

struct ResumeState {
    session_id: SessionId,
    scan_root: Option<PathBuf>,
    stats: ScanStats,
    completed: BTreeSet<PathBuf>,
    current_dir: Option<PathBuf>,
    last_path: Option<String>,
}

/// Why a file was queued for hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Queued {
    Added,
    Updated,
    /// Unchanged file lacking the configured perceptual fingerprint
    Backfill,
}

/// Mutable state of one scan.
struct ScanRun<'a> {
    volume_id: VolumeId,
    session_id: SessionId,
    mount: PathBuf,
    root: PathBuf,
    root_rel: String,
    is_resume: bool,
    stats: ScanStats,
    /// Counters at the last flush, when every processed file was persisted
    boundary: ScanStats,
    /// Last path processed before that flush
    boundary_path: Option<String>,
    /// Directory a resumed scan was interrupted in, with its last processed path
    resume_point: Option<(PathBuf, String)>,
    completed: BTreeSet<PathBuf>,
    pending: Vec<(HashJob, Queued)>,
    seen: HashSet<String>,
    since_checkpoint: u64,
    current_dir: Option<PathBuf>,
    last_path: Option<String>,
    progress: Option<&'a dyn ProgressSink>,
    progress_interval: Duration,
    last_progress: Option<Instant>,
}

impl ScanRun<'_> {
    fn queue(&mut self, job: HashJob, why: Queued) {
        self.pending.push((job, why));
    }

    /// Number of leading `files` of `dir` already processed before the
    /// interruption being resumed. Consumes the resume point on its
    /// directory.
    fn take_resume_prefix(&mut self, dir: &Path, files: &[PathBuf]) -> usize {
        if self.resume_point.as_ref().map_or(true, |(d, _)| d != dir) {
            return 0;
        }
        let Some((_, last)) = self.resume_point.take() else {
            return 0;
        };
        let Some(dir_rel) = relative_text(dir, &self.mount) else {
            return 0;
        };
        let last_dir = last.rsplit_once('/').map_or("", |(d, _)| d);
        if last_dir != dir_rel {
            return 0;
        }
        let relative: Vec<Option<String>> =
            files.iter().map(|f| relative_text(f, &self.mount)).collect();
        match relative.iter().position(|r| r.as_deref() == Some(last.as_str())) {
            Some(i) => i + 1,
            // The last file is gone; fall back to name order.
            None => relative
                .iter()
                .take_while(|r| r.as_deref().is_some_and(|r| r < last.as_str()))
                .count(),
        }
    }

    fn report(&mut self, status: &str, force: bool) {
        let Some(sink) = self.progress else {
            return;
        };
        let now = Instant::now();
        let due = self
            .last_progress
            .map_or(true, |last| now.duration_since(last) >= self.progress_interval);
        if force || due {
            let current =
                self.stats.processed() + self.stats.files_skipped + self.stats.files_failed;
            sink.on_progress(status, current, self.stats.files_total);
            self.last_progress = Some(now);
        }
    }
}

fn validate_root(root: &Path) -> Result<(), ScanError> {
    let meta = fs::metadata(root).map_err(|e| ScanError::from_io(root, e))?;
    if !meta.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }
    fs::read_dir(root).map_err(|e| ScanError::from_io(root, e))?;
    Ok(())
}
