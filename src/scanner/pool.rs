//! Parallel hash workers.
//!
//! Hashing is I/O bound, so the scanner runs it on a dedicated rayon pool of
//! bounded size instead of the global one. Each job gets its own result
//! slot; outcomes come back in job order. The pool observes cancellation
//! between files but not pause: a paused scan finishes its batch so the
//! checkpoint it writes never claims unhashed work.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use rayon::prelude::*;

use super::hasher::ContentHasher;
use crate::catalog::FileId;
use crate::classify::{HashKind, HashStrategy};
use crate::signal::ScanControl;

/// Upper bound on hash worker threads.
pub const MAX_WORKERS: usize = 16;

/// Worker count used when none is configured: the CPU count, capped.
#[must_use]
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map_or(4, NonZeroUsize::get)
        .min(MAX_WORKERS)
}

/// A file waiting for its fingerprints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashJob {
    /// Catalog row the hashes belong to
    pub file_id: FileId,
    /// Absolute path to read
    pub path: PathBuf,
    /// Kinds to compute
    pub strategy: HashStrategy,
}

/// Result slot of one [`HashJob`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashOutcome {
    /// Catalog row the hashes belong to
    pub file_id: FileId,
    /// Computed values
    pub values: Vec<(HashKind, String)>,
    /// Kinds that could not be computed
    pub missing: Vec<HashKind>,
    /// The job was skipped because the scan was cancelled
    pub cancelled: bool,
}

impl HashOutcome {
    /// The computed value of one kind.
    #[must_use]
    pub fn value(&self, kind: HashKind) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, v)| v.as_str())
    }
}

/// Bounded pool of hash workers.
pub struct HashPool {
    pool: Option<rayon::ThreadPool>,
    hasher: Arc<ContentHasher>,
    workers: usize,
}

impl HashPool {
    /// Create a pool with `workers` threads; 0 picks [`default_workers`].
    #[must_use]
    pub fn new(workers: usize) -> Self {
        let workers = if workers == 0 {
            default_workers()
        } else {
            workers.min(MAX_WORKERS)
        };

        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("dedupe-hash-{i}"))
            .build()
        {
            Ok(pool) => Some(pool),
            Err(e) => {
                log::warn!(
                    "Failed to create hash thread pool ({}), using global pool with {} threads",
                    e,
                    rayon::current_num_threads()
                );
                None
            }
        };

        Self {
            pool,
            hasher: Arc::new(ContentHasher::new()),
            workers,
        }
    }

    /// Number of worker threads.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Hash a batch of files in parallel.
    ///
    /// Returns one outcome per job, in job order. Once `control` is
    /// cancelled, remaining jobs are returned with `cancelled` set.
    pub fn hash_batch(&self, jobs: Vec<HashJob>, control: &ScanControl) -> Vec<HashOutcome> {
        if jobs.is_empty() {
            return Vec::new();
        }
        log::debug!("Hashing batch of {} files on {} workers", jobs.len(), self.workers);

        let run = || {
            jobs.into_par_iter()
                .map(|job| self.hash_one(job, control))
                .collect()
        };
        match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }

    fn hash_one(&self, job: HashJob, control: &ScanControl) -> HashOutcome {
        let mut outcome = HashOutcome {
            file_id: job.file_id,
            values: Vec::new(),
            missing: Vec::new(),
            cancelled: false,
        };
        if control.is_cancelled() {
            outcome.cancelled = true;
            outcome.missing = job.strategy.kinds().collect();
            return outcome;
        }

        for kind in job.strategy.kinds() {
            match self.hasher.compute(&job.path, kind) {
                Some(value) => outcome.values.push((kind, value)),
                None => outcome.missing.push(kind),
            }
        }
        log::trace!(
            "Hashed {} ({} values)",
            job.path.display(),
            outcome.values.len()
        );
        outcome
    }
}

impl Default for HashPool {
    fn default() -> Self {
        Self::new(0)
    }
}
