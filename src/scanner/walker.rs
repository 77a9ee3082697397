//! Depth-first directory walker yielding one batch per directory.
//!
//! # Overview
//!
//! [`DirectoryWalker`] visits the tree below a scan root in a deterministic
//! order (children sorted by name) and groups the regular files of each
//! directory into a [`DirectoryBatch`]. Excluded directories are pruned
//! before descent, so nothing below them is ever listed. The scan root
//! itself is never filtered.
//!
//! Directories listed in the completed set still produce a batch (so their
//! subdirectories are reached) but with no files. This is how a resumed scan
//! skips work it has already persisted.
//!
//! # Example
//!
//! ```no_run
//! use dedupe::classify::FileFilter;
//! use dedupe::scanner::DirectoryWalker;
//! use std::path::Path;
//!
//! let filter = FileFilter::new();
//! for batch in DirectoryWalker::new(Path::new("/data"), &filter) {
//!     println!("{}: {} files", batch.dir.display(), batch.files.len());
//! }
//! ```

use std::cmp::Ordering;
use std::collections::HashSet;
use std::iter::Peekable;
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, FilterEntry, IntoIter, WalkDir};

use crate::classify::FileFilter;

/// Regular files found directly inside one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryBatch {
    /// The directory that was listed
    pub dir: PathBuf,
    /// Its regular files, sorted by name
    pub files: Vec<PathBuf>,
    /// Whether the directory was already completed by an earlier run
    pub already_completed: bool,
}

type Pruned = Box<dyn FnMut(&DirEntry) -> bool + Send>;

/// Sequential depth-first walk producing [`DirectoryBatch`] values.
pub struct DirectoryWalker {
    entries: Peekable<FilterEntry<IntoIter, Pruned>>,
    completed: HashSet<PathBuf>,
}

impl DirectoryWalker {
    /// Create a walker rooted at `root`.
    ///
    /// # Arguments
    ///
    /// * `root` - Directory to walk; never filtered itself
    /// * `filter` - Directory-name rules applied below the root
    #[must_use]
    pub fn new(root: &Path, filter: &FileFilter) -> Self {
        Self::with_exclusions(root, filter, Vec::new())
    }

    /// Create a walker that additionally prunes the given absolute paths.
    ///
    /// # Arguments
    ///
    /// * `root` - Directory to walk
    /// * `filter` - Directory-name rules applied below the root
    /// * `excluded` - Absolute directory paths to prune with everything below
    #[must_use]
    pub fn with_exclusions(root: &Path, filter: &FileFilter, excluded: Vec<PathBuf>) -> Self {
        let filter = filter.clone();
        let excluded: HashSet<PathBuf> = excluded.into_iter().collect();

        let keep: Pruned = Box::new(move |entry: &DirEntry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            if excluded.contains(entry.path()) {
                log::debug!("Skipping excluded path: {}", entry.path().display());
                return false;
            }
            let name = entry.file_name().to_string_lossy();
            let keep = filter.should_include_directory(&name);
            if !keep {
                log::trace!("Pruning directory: {}", entry.path().display());
            }
            keep
        });

        // Files sort before subdirectories, so a directory's own files are
        // contiguous right after its entry.
        let entries = WalkDir::new(root)
            .follow_links(false)
            .sort_by(|a, b| {
                let a_dir = a.file_type().is_dir();
                let b_dir = b.file_type().is_dir();
                match a_dir.cmp(&b_dir) {
                    Ordering::Equal => a.file_name().cmp(b.file_name()),
                    other => other,
                }
            })
            .into_iter()
            .filter_entry(keep)
            .peekable();

        Self {
            entries,
            completed: HashSet::new(),
        }
    }

    /// Directories whose files must not be yielded again.
    #[must_use]
    pub fn with_completed<I>(mut self, completed: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        self.completed = completed.into_iter().collect();
        self
    }

    /// Count the files the walk would yield, without yielding them.
    pub fn count_files(self) -> u64 {
        self.map(|batch| batch.files.len() as u64).sum()
    }
}

impl Iterator for DirectoryWalker {
    type Item = DirectoryBatch;

    fn next(&mut self) -> Option<Self::Item> {
        let dir = loop {
            match self.entries.next()? {
                Ok(entry) if entry.file_type().is_dir() => break entry.into_path(),
                Ok(entry) => {
                    log::trace!("Ignoring non-directory entry: {}", entry.path().display());
                }
                Err(e) => log::warn!("Walk error: {}", e),
            }
        };

        let already_completed = self.completed.contains(&dir);
        let mut files = Vec::new();

        while let Some(next) = self.entries.peek() {
            match next {
                Ok(entry) if entry.file_type().is_dir() => break,
                Ok(_) => {
                    if let Some(Ok(entry)) = self.entries.next() {
                        if entry.file_type().is_file() {
                            if !already_completed {
                                files.push(entry.into_path());
                            }
                        } else {
                            log::trace!("Skipping non-regular file: {}", entry.path().display());
                        }
                    }
                }
                Err(_) => {
                    if let Some(Err(e)) = self.entries.next() {
                        log::warn!("Walk error in {}: {}", dir.display(), e);
                    }
                }
            }
        }

        Some(DirectoryBatch {
            dir,
            files,
            already_completed,
        })
    }
}
