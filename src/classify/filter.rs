//! Exclusion rules for system, application and temporary files.
//!
//! The scanner asks [`FileFilter`] two questions: whether to descend into a
//! directory, and whether a classified file is worth indexing. Directory rules
//! match on the directory's own name; file rules look at the filename, the
//! extension and a per-type minimum size.

use std::collections::HashSet;
use std::path::Path;

use regex::RegexSet;
use serde::{Deserialize, Serialize};

use super::{extension_of, FileType};

/// Directory names skipped on every platform.
const EXCLUDED_DIRS: &[&str] = &[
    // Version control
    ".git", ".svn", ".hg", ".bzr",
    // Dependencies and tool caches
    "node_modules", "__pycache__", ".pytest_cache", ".mypy_cache", ".tox", ".nox", ".eggs",
    "*.egg-info", "bower_components", "vendor",
    // Virtual environments
    "venv", ".venv", "env", ".env", "virtualenv",
    // Build output
    "build", "dist", "target", "out", "bin", "obj",
    // IDE
    ".idea", ".vscode", ".vs", "*.xcodeproj", "*.xcworkspace",
    // Caches
    ".cache", "cache", ".npm", ".yarn", ".gradle", ".m2",
    // Temporary
    "tmp", "temp",
    // Per-user application data
    "Library", "AppData", ".local", ".config",
];

#[cfg(target_os = "macos")]
const PLATFORM_EXCLUDED_DIRS: &[&str] = &[
    ".Trash", ".Spotlight-V100", ".fseventsd", ".DocumentRevisions-V100", ".TemporaryItems",
    "*.app",
];

#[cfg(target_os = "windows")]
const PLATFORM_EXCLUDED_DIRS: &[&str] = &[
    "Windows", "Program Files", "Program Files (x86)", "ProgramData", "$Recycle.Bin",
    "System Volume Information", "Recovery", "MSOCache", "Config.Msi", "$WINDOWS.~BT",
    "$WINDOWS.~WS",
];

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const PLATFORM_EXCLUDED_DIRS: &[&str] = &["lost+found"];

/// Extensions of executables, libraries, databases, logs and other
/// non-personal files.
const EXCLUDED_EXTENSIONS: &[&str] = &[
    "exe", "msi", "dll", "sys", "drv", "ocx", "cpl", "scr", "app", "pkg", "dmg", "framework",
    "bundle", "kext", "dylib", "so", "a", "o", "ko", "deb", "rpm", "snap", "flatpak", "appimage",
    "pyc", "pyo", "pyd", "class", "jar", "war", "ear", "beam", "db", "sqlite", "sqlite3",
    "db-shm", "db-wal", "mdb", "accdb", "frm", "myd", "myi", "log", "lock", "lck", "lnk", "url",
    "ini", "inf", "reg", "tmp", "temp", "bak", "swp", "swo", "map",
];

/// Filename patterns (case-insensitive) for OS metadata and temp files.
const EXCLUDED_FILENAME_PATTERNS: &[&str] = &[
    r"^\.",
    r"^~\$",
    r"\.tmp$",
    r"\.temp$",
    r"\.cache$",
    r"\.bak$",
    r"\.swp$",
    r"\.swo$",
    r"^Thumbs\.db$",
    r"^desktop\.ini$",
    r"^Icon\r$",
    r"^~.*\.tmp$",
    r"\.min\.(js|css)$",
];

/// Minimum sizes in bytes below which a file is considered a thumbnail,
/// icon or system sound rather than a personal file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinSizes {
    /// Images (default 1 KiB).
    pub image: u64,
    /// Videos (default 10 KiB).
    pub video: u64,
    /// Audio (default 1 KiB).
    pub audio: u64,
    /// Documents (default 100 B).
    pub document: u64,
    /// Archives and anything else (default 100 B).
    pub other: u64,
}

impl Default for MinSizes {
    fn default() -> Self {
        Self {
            image: 1024,
            video: 10 * 1024,
            audio: 1024,
            document: 100,
            other: 100,
        }
    }
}

impl MinSizes {
    /// No minimum for any type.
    #[must_use]
    pub fn none() -> Self {
        Self {
            image: 0,
            video: 0,
            audio: 0,
            document: 0,
            other: 0,
        }
    }

    /// Minimum size for a file type.
    #[must_use]
    pub fn for_type(&self, file_type: FileType) -> u64 {
        match file_type {
            FileType::Image => self.image,
            FileType::Video => self.video,
            FileType::Audio => self.audio,
            FileType::Document => self.document,
            FileType::Archive | FileType::Other => self.other,
        }
    }
}

/// Decides which directories to traverse and which files to index.
#[derive(Debug, Clone)]
pub struct FileFilter {
    excluded_dirs: HashSet<String>,
    excluded_dir_suffixes: Vec<String>,
    excluded_extensions: HashSet<String>,
    excluded_names: RegexSet,
    skip_hidden_dirs: bool,
    min_sizes: MinSizes,
}

impl FileFilter {
    /// Create a filter with the built-in rules.
    #[must_use]
    pub fn new() -> Self {
        let mut filter = Self {
            excluded_dirs: HashSet::new(),
            excluded_dir_suffixes: Vec::new(),
            excluded_extensions: EXCLUDED_EXTENSIONS.iter().map(|e| (*e).to_string()).collect(),
            excluded_names: build_name_patterns(),
            skip_hidden_dirs: true,
            min_sizes: MinSizes::default(),
        };
        filter.add_excluded_dirs(EXCLUDED_DIRS.iter().chain(PLATFORM_EXCLUDED_DIRS));
        filter
    }

    /// Add directory names to skip. A leading `*` matches by suffix, so
    /// `*.app` skips every application bundle.
    #[must_use]
    pub fn with_excluded_dirs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.add_excluded_dirs(names);
        self
    }

    /// Set whether hidden (dot-prefixed) directories are skipped.
    #[must_use]
    pub fn with_skip_hidden(mut self, skip: bool) -> Self {
        self.skip_hidden_dirs = skip;
        self
    }

    /// Replace the per-type minimum sizes.
    #[must_use]
    pub fn with_min_sizes(mut self, min_sizes: MinSizes) -> Self {
        self.min_sizes = min_sizes;
        self
    }

    /// The per-type minimum sizes.
    #[must_use]
    pub fn min_sizes(&self) -> MinSizes {
        self.min_sizes
    }

    fn add_excluded_dirs<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            let name = name.as_ref();
            match name.strip_prefix('*') {
                Some(suffix) => self.excluded_dir_suffixes.push(suffix.to_string()),
                None => {
                    self.excluded_dirs.insert(name.to_string());
                }
            }
        }
    }

    /// Whether the scanner should descend into a directory with this name.
    ///
    /// Only the directory's own name is inspected; the scan root itself is
    /// never passed here.
    #[must_use]
    pub fn should_include_directory(&self, name: &str) -> bool {
        if self.excluded_dirs.contains(name) {
            return false;
        }
        if self
            .excluded_dir_suffixes
            .iter()
            .any(|suffix| name.ends_with(suffix.as_str()))
        {
            return false;
        }
        !(self.skip_hidden_dirs && name.starts_with('.') && name != "." && name != "..")
    }

    /// Whether a file should be indexed.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the file (only the filename and extension are read)
    /// * `file_type` - Type assigned by the classifier
    /// * `size` - File size; `None` skips the minimum-size check
    #[must_use]
    pub fn should_include_file(&self, path: &Path, file_type: FileType, size: Option<u64>) -> bool {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
            return false;
        };
        if self.excluded_names.is_match(&name) {
            return false;
        }
        if self.excluded_extensions.contains(&extension_of(path)) {
            return false;
        }
        match size {
            Some(size) => size >= self.min_sizes.for_type(file_type),
            None => true,
        }
    }
}

impl Default for FileFilter {
    fn default() -> Self {
        Self::new()
    }
}

fn build_name_patterns() -> RegexSet {
    let patterns = EXCLUDED_FILENAME_PATTERNS
        .iter()
        .map(|p| format!("(?i){p}"));
    RegexSet::new(patterns).unwrap_or_else(|e| {
        log::warn!("Invalid filename exclusion pattern, name rules disabled: {}", e);
        RegexSet::empty()
    })
}
