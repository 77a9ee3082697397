//! File classification by extension.
//!
//! # Overview
//!
//! Every scanned file is mapped to a [`FileType`] and to the [`HashStrategy`]
//! used to fingerprint it. The built-in extension tables are immutable. User
//! overrides (extra extensions to include, known extensions to ignore) live in
//! an [`ExtensionOverrides`] overlay that is compiled into a fresh snapshot on
//! [`Classifier::reload`]. Readers always classify against a complete
//! snapshot, so a reload never blocks or disturbs an in-flight scan.
//!
//! # Example
//!
//! ```
//! use dedupe::classify::{Classifier, ExtensionOverrides, FileType, HashKind};
//!
//! let classifier = Classifier::new();
//! assert_eq!(classifier.classify("JPG"), FileType::Image);
//!
//! let strategy = classifier.hash_strategy("jpg");
//! assert_eq!(strategy.primary, HashKind::PixelMd5);
//! assert_eq!(strategy.secondary, Some(HashKind::PerceptualPhash));
//!
//! classifier.reload(ExtensionOverrides::default().with_exclude(["txt"]));
//! assert_eq!(classifier.classify("txt"), FileType::Other);
//! ```

pub mod filter;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

pub use filter::{FileFilter, MinSizes};

/// Lossy image formats. Re-encoding changes their bytes, so they are matched
/// on decoded pixels and a perceptual fingerprint.
const LOSSY_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "gif"];

/// Camera RAW formats.
const RAW_IMAGE_EXTENSIONS: &[&str] = &[
    "raw", "cr2", "crw", "cr3", "nef", "nrw", "arw", "srf", "sr2", "raf", "orf", "rw2", "pef",
    "ptx", "dng", "x3f", "3fr", "fff", "mef", "mrw", "kdc", "dcr", "rwl", "iiq", "erf",
];

/// Lossless and high-efficiency image formats.
const LOSSLESS_IMAGE_EXTENSIONS: &[&str] =
    &["png", "bmp", "webp", "tiff", "tif", "heic", "heif", "avif"];

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "mov", "avi", "mkv", "wmv", "flv", "webm", "mpg", "mpeg", "m2v", "mpe", "3gp",
    "3g2", "mts", "m2ts", "ts", "vob", "ogv", "rm", "rmvb", "asf", "divx", "xvid",
];

const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "wav", "flac", "aac", "m4a", "wma", "ogg", "oga", "aiff", "aif", "aifc", "ape", "alac",
    "opus", "mid", "midi", "mka", "ra", "ram", "wv",
];

const DOCUMENT_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "docm", "xls", "xlsx", "xlsm", "xlsb", "ppt", "pptx", "pptm", "odt",
    "ods", "odp", "odg", "pages", "numbers", "keynote", "txt", "rtf", "md", "markdown", "rst",
    "csv", "tsv", "json", "xml", "yaml", "yml", "html", "htm", "xhtml", "epub", "mobi", "azw",
    "azw3", "tex", "latex", "ps", "eps", "xps",
];

const ARCHIVE_EXTENSIONS: &[&str] = &[
    "zip", "rar", "7z", "tar", "gz", "bz2", "xz", "lz", "lzma", "tgz", "tbz2", "txz", "cab", "arj",
    "lzh", "iso", "dmg", "img",
];

/// Semantic category of a file, derived from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Still images, including camera RAW formats.
    Image,
    /// Video containers.
    Video,
    /// Audio files.
    Audio,
    /// Office documents, text and e-books.
    Document,
    /// Compressed archives and disk images.
    Archive,
    /// Anything not in the tables. Never indexed.
    Other,
}

impl FileType {
    /// All file types, in catalog order.
    pub const ALL: [FileType; 6] = [
        Self::Image,
        Self::Video,
        Self::Audio,
        Self::Document,
        Self::Archive,
        Self::Other,
    ];

    /// The name stored in the catalog's `file_type` column.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
            Self::Archive => "archive",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = ClassifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ClassifyError::UnknownFileType(s.to_string()))
    }
}

/// A fingerprint family stored in the catalog's `hashes` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashKind {
    /// MD5 of the full byte stream.
    ExactMd5,
    /// MD5 of the decoded 8-bit RGB pixel buffer.
    PixelMd5,
    /// DCT-based perceptual hash.
    PerceptualPhash,
    /// Gradient (difference) hash.
    PerceptualDhash,
    /// Mean (average) hash.
    PerceptualAhash,
    /// Haar wavelet hash.
    PerceptualWhash,
}

impl HashKind {
    /// All hash kinds.
    pub const ALL: [HashKind; 6] = [
        Self::ExactMd5,
        Self::PixelMd5,
        Self::PerceptualPhash,
        Self::PerceptualDhash,
        Self::PerceptualAhash,
        Self::PerceptualWhash,
    ];

    /// The name stored in the catalog's `hash_type` column.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExactMd5 => "exact_md5",
            Self::PixelMd5 => "pixel_md5",
            Self::PerceptualPhash => "perceptual_phash",
            Self::PerceptualDhash => "perceptual_dhash",
            Self::PerceptualAhash => "perceptual_ahash",
            Self::PerceptualWhash => "perceptual_whash",
        }
    }

    /// Whether values of this kind are compared by Hamming distance rather
    /// than equality.
    #[must_use]
    pub fn is_perceptual(self) -> bool {
        !matches!(self, Self::ExactMd5 | Self::PixelMd5)
    }
}

impl fmt::Display for HashKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashKind {
    type Err = ClassifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ClassifyError::UnknownHashKind(s.to_string()))
    }
}

/// Errors raised when parsing classification names.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ClassifyError {
    /// A `file_type` value that is not one of the known categories.
    #[error("Unknown file type: {0}")]
    UnknownFileType(String),

    /// A `hash_type` value that is not one of the known hash kinds.
    #[error("Unknown hash type: {0}")]
    UnknownHashKind(String),
}

/// Which fingerprints to compute for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashStrategy {
    /// Always computed; the scan is not complete until it is persisted.
    pub primary: HashKind,
    /// Computed alongside the primary when present.
    pub secondary: Option<HashKind>,
}

impl HashStrategy {
    /// The primary kind followed by the secondary, if any.
    pub fn kinds(&self) -> impl Iterator<Item = HashKind> {
        std::iter::once(self.primary).chain(self.secondary)
    }

    /// Replace a perceptual secondary with `kind`; other strategies are
    /// returned unchanged.
    #[must_use]
    pub fn with_perceptual(mut self, kind: HashKind) -> Self {
        if self.secondary.is_some_and(HashKind::is_perceptual) {
            self.secondary = Some(kind);
        }
        self
    }
}

/// Lowercase an extension and strip any leading dots.
#[must_use]
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

/// Normalized extension of a path, or an empty string when it has none.
#[must_use]
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| normalize_extension(&e.to_string_lossy()))
        .unwrap_or_default()
}

/// Collapse spelling variants into one family so `IMG.JPEG` and `IMG.jpg`
/// are compared with each other but never with `IMG.CR2`.
#[must_use]
pub fn extension_family(ext: &str) -> String {
    let ext = normalize_extension(ext);
    match ext.as_str() {
        "cr2" | "crw" | "cr3" | "raw" => "raw".to_string(),
        "jpg" | "jpeg" => "jpg".to_string(),
        "tif" | "tiff" => "tiff".to_string(),
        _ => ext,
    }
}

/// Whether the extension is a camera RAW format.
#[must_use]
pub fn is_raw_extension(ext: &str) -> bool {
    RAW_IMAGE_EXTENSIONS.contains(&normalize_extension(ext).as_str())
}

/// Whether the extension is a lossy image format that gets a perceptual hash.
#[must_use]
pub fn is_lossy_image_extension(ext: &str) -> bool {
    LOSSY_IMAGE_EXTENSIONS.contains(&normalize_extension(ext).as_str())
}

/// Guess a type for a user-included extension from hints in its name.
#[must_use]
pub fn guess_file_type(ext: &str) -> FileType {
    let ext = normalize_extension(ext);
    let has = |hints: &[&str]| hints.iter().any(|h| ext.contains(h));

    if has(&["img", "pic", "photo", "image"]) {
        FileType::Image
    } else if has(&["vid", "movie", "clip"]) {
        FileType::Video
    } else if has(&["aud", "sound", "music"]) {
        FileType::Audio
    } else {
        FileType::Document
    }
}

fn base_table() -> &'static HashMap<String, FileType> {
    static BASE: OnceLock<HashMap<String, FileType>> = OnceLock::new();
    BASE.get_or_init(|| {
        let tables: [(&[&str], FileType); 7] = [
            (LOSSY_IMAGE_EXTENSIONS, FileType::Image),
            (LOSSLESS_IMAGE_EXTENSIONS, FileType::Image),
            (RAW_IMAGE_EXTENSIONS, FileType::Image),
            (VIDEO_EXTENSIONS, FileType::Video),
            (AUDIO_EXTENSIONS, FileType::Audio),
            (DOCUMENT_EXTENSIONS, FileType::Document),
            (ARCHIVE_EXTENSIONS, FileType::Archive),
        ];
        let mut map = HashMap::new();
        for (exts, file_type) in tables {
            for ext in exts {
                // First table wins, so `webm` stays a video
                map.entry((*ext).to_string()).or_insert(file_type);
            }
        }
        map
    })
}

/// User overrides layered on top of the built-in tables.
///
/// Exclusions win over inclusions and over the built-in tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionOverrides {
    /// Extensions to index even though the built-in tables don't know them.
    #[serde(default)]
    pub include: BTreeSet<String>,
    /// Extensions to ignore even though the built-in tables know them.
    #[serde(default)]
    pub exclude: BTreeSet<String>,
}

impl ExtensionOverrides {
    /// Add extensions to include.
    #[must_use]
    pub fn with_include<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.include
            .extend(exts.into_iter().map(|e| normalize_extension(e.as_ref())));
        self
    }

    /// Add extensions to exclude.
    #[must_use]
    pub fn with_exclude<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.exclude
            .extend(exts.into_iter().map(|e| normalize_extension(e.as_ref())));
        self
    }

    /// True when no overrides are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// Compose the effective extension map: `base ⊕ overrides`.
    fn compose(&self, base: &HashMap<String, FileType>) -> HashMap<String, FileType> {
        let mut map = base.clone();
        for ext in &self.include {
            map.entry(ext.clone())
                .or_insert_with(|| guess_file_type(ext));
        }
        for ext in &self.exclude {
            map.remove(ext);
        }
        map
    }
}

/// Maps extensions to file types and hash strategies.
///
/// `Classifier` is `Send + Sync`; share it behind an `Arc`. Lookups read an
/// immutable snapshot, and [`reload`](Self::reload) swaps in a new one.
#[derive(Debug)]
pub struct Classifier {
    overrides: RwLock<ExtensionOverrides>,
    effective: RwLock<Arc<HashMap<String, FileType>>>,
}

impl Classifier {
    /// Create a classifier with the built-in tables only.
    #[must_use]
    pub fn new() -> Self {
        Self::with_overrides(ExtensionOverrides::default())
    }

    /// Create a classifier with user overrides applied.
    #[must_use]
    pub fn with_overrides(overrides: ExtensionOverrides) -> Self {
        let effective = Arc::new(overrides.compose(base_table()));
        Self {
            overrides: RwLock::new(overrides),
            effective: RwLock::new(effective),
        }
    }

    /// Replace the overrides and recompute the effective map.
    ///
    /// The new map is built before the swap; callers holding an older
    /// [`snapshot`](Self::snapshot) keep using it unchanged.
    pub fn reload(&self, overrides: ExtensionOverrides) {
        let effective = Arc::new(overrides.compose(base_table()));
        *self
            .effective
            .write()
            .unwrap_or_else(PoisonError::into_inner) = effective;
        *self
            .overrides
            .write()
            .unwrap_or_else(PoisonError::into_inner) = overrides;
        log::debug!("Extension overrides reloaded");
    }

    /// The overrides currently in effect.
    #[must_use]
    pub fn overrides(&self) -> ExtensionOverrides {
        self.overrides
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The current effective extension map.
    #[must_use]
    pub fn snapshot(&self) -> Arc<HashMap<String, FileType>> {
        Arc::clone(&self.effective.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Classify an extension (case-insensitive, leading dot optional).
    #[must_use]
    pub fn classify(&self, ext: &str) -> FileType {
        self.snapshot()
            .get(&normalize_extension(ext))
            .copied()
            .unwrap_or(FileType::Other)
    }

    /// Classify a path by its extension.
    #[must_use]
    pub fn classify_path(&self, path: &Path) -> FileType {
        self.classify(&extension_of(path))
    }

    /// Which fingerprints to compute for files with this extension.
    ///
    /// Lossy images get `(pixel_md5, perceptual_phash)`, other images get
    /// `(exact_md5, pixel_md5)` and everything else gets `(exact_md5, none)`.
    #[must_use]
    pub fn hash_strategy(&self, ext: &str) -> HashStrategy {
        match self.classify(ext) {
            FileType::Image if is_lossy_image_extension(ext) => HashStrategy {
                primary: HashKind::PixelMd5,
                secondary: Some(HashKind::PerceptualPhash),
            },
            FileType::Image => HashStrategy {
                primary: HashKind::ExactMd5,
                secondary: Some(HashKind::PixelMd5),
            },
            _ => HashStrategy {
                primary: HashKind::ExactMd5,
                secondary: None,
            },
        }
    }

    /// Whether files with this extension are indexed at all.
    #[must_use]
    pub fn is_supported(&self, ext: &str) -> bool {
        self.classify(ext) != FileType::Other
    }

    /// Whether files with this extension carry a perceptual fingerprint.
    #[must_use]
    pub fn uses_perceptual_hash(&self, ext: &str) -> bool {
        self.hash_strategy(ext).kinds().any(HashKind::is_perceptual)
    }

    /// All extensions currently mapped to `file_type`.
    #[must_use]
    pub fn extensions_for(&self, file_type: FileType) -> BTreeSet<String> {
        self.snapshot()
            .iter()
            .filter(|(_, t)| **t == file_type)
            .map(|(ext, _)| ext.clone())
            .collect()
    }

    /// All extensions currently indexed.
    #[must_use]
    pub fn supported_extensions(&self) -> BTreeSet<String> {
        self.snapshot().keys().cloned().collect()
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}
