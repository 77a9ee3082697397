//! Streaming MD5 fingerprints of file bytes and of decoded pixels.
//!
//! # Overview
//!
//! Two content hashes are computed here:
//!
//! - [`exact_md5`] reads the whole file in fixed-size chunks; identical bytes
//!   give identical digests.
//! - [`pixel_md5`] decodes an image to 8-bit RGB and hashes the raw buffer,
//!   so files that differ only in EXIF or other container metadata match.
//!
//! [`ContentHasher`] dispatches on [`HashKind`] and applies the "no hash on
//! failure" policy: a file that cannot be read or decoded simply has no value
//! for that kind. Pixel hashing of a file that fails to decode degrades to
//! the exact hash of its bytes.
//!
//! # Example
//!
//! ```no_run
//! use dedupe::classify::HashKind;
//! use dedupe::scanner::ContentHasher;
//! use std::path::Path;
//!
//! let hasher = ContentHasher::new();
//! if let Some(digest) = hasher.compute(Path::new("photo.png"), HashKind::PixelMd5) {
//!     println!("{digest}");
//! }
//! ```

use std::fs::File;
use std::io::Read;
use std::path::Path;

use image::RgbImage;
use md5::{Digest, Md5};

use super::perceptual::{PerceptualAlgorithm, PerceptualHasher};
use super::HashError;
use crate::classify::{extension_of, is_raw_extension, HashKind};

/// Read size for streaming hashes.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// MD5 of the complete byte stream, as lowercase hex.
///
/// # Errors
///
/// Returns [`HashError`] if the file cannot be opened or read.
pub fn exact_md5(path: &Path) -> Result<String, HashError> {
    let mut file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let read = file
            .read(&mut buffer)
            .map_err(|e| HashError::from_io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// MD5 of the decoded 8-bit RGB pixel buffer, as lowercase hex.
///
/// Unlike [`ContentHasher::compute`], this does not fall back to the exact
/// hash when decoding fails.
///
/// # Errors
///
/// Returns [`HashError::Decode`] for unreadable or unsupported images.
pub fn pixel_md5(path: &Path) -> Result<String, HashError> {
    let rgb = decode_rgb8(path)?;
    let mut hasher = Md5::new();
    hasher.update(rgb.as_raw());
    Ok(hex::encode(hasher.finalize()))
}

/// Decode an image to canonical 8-bit RGB.
///
/// RAW formats are demosaiced when the `raw` feature is enabled and rejected
/// otherwise.
///
/// # Errors
///
/// Returns [`HashError`] on I/O or decode failure.
pub fn decode_rgb8(path: &Path) -> Result<RgbImage, HashError> {
    if is_raw_extension(&extension_of(path)) {
        return decode_raw(path);
    }
    let img = image::open(path).map_err(|e| HashError::decode(path, e))?;
    Ok(img.to_rgb8())
}

#[cfg(feature = "raw")]
fn decode_raw(path: &Path) -> Result<RgbImage, HashError> {
    let decoded =
        imagepipe::simple_decode_8bit(path, 0, 0).map_err(|e| HashError::decode(path, e))?;
    let (width, height) = (decoded.width as u32, decoded.height as u32);
    RgbImage::from_raw(width, height, decoded.data)
        .ok_or_else(|| HashError::decode(path, "RAW buffer does not match its dimensions"))
}

#[cfg(not(feature = "raw"))]
fn decode_raw(path: &Path) -> Result<RgbImage, HashError> {
    Err(HashError::decode(path, "RAW decoding requires the `raw` feature"))
}

/// Computes any [`HashKind`] for a file.
///
/// Holds one configured perceptual hasher per algorithm, so a single
/// instance can be shared by every worker thread.
pub struct ContentHasher {
    perceptual: [PerceptualHasher; 4],
}

impl ContentHasher {
    /// Create a hasher for all kinds.
    #[must_use]
    pub fn new() -> Self {
        Self {
            perceptual: PerceptualAlgorithm::ALL.map(PerceptualHasher::new),
        }
    }

    /// Compute a hash, propagating the failure.
    ///
    /// Pixel hashing still falls back to the exact hash on decode failure;
    /// perceptual kinds have no fallback.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when no value can be produced.
    pub fn try_compute(&self, path: &Path, kind: HashKind) -> Result<String, HashError> {
        match kind {
            HashKind::ExactMd5 => exact_md5(path),
            HashKind::PixelMd5 => pixel_md5(path).or_else(|e| {
                log::debug!("Pixel hash unavailable, using file hash: {}", e);
                exact_md5(path)
            }),
            perceptual => {
                let algorithm = PerceptualAlgorithm::from_hash_kind(perceptual)
                    .ok_or_else(|| HashError::decode(path, "not a perceptual hash kind"))?;
                let hasher = self
                    .perceptual
                    .iter()
                    .find(|h| h.algorithm() == algorithm)
                    .ok_or_else(|| HashError::decode(path, "no hasher for algorithm"))?;
                Ok(hasher.compute(path)?.to_hex())
            }
        }
    }

    /// Compute a hash, returning `None` on any failure.
    ///
    /// A missing value means "exclude from comparisons of this kind".
    #[must_use]
    pub fn compute(&self, path: &Path, kind: HashKind) -> Option<String> {
        match self.try_compute(path, kind) {
            Ok(value) => Some(value),
            Err(e) => {
                log::debug!("No {} for {}: {}", kind, path.display(), e);
                None
            }
        }
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_exact_md5_known_value() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        File::create(&path).unwrap().write_all(b"hello world").unwrap();

        assert_eq!(exact_md5(&path).unwrap(), "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn test_exact_md5_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        File::create(&path).unwrap();

        assert_eq!(exact_md5(&path).unwrap(), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_exact_md5_spans_chunks() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        let mut data = vec![7u8; CHUNK_SIZE * 2 + 17];
        std::fs::write(&a, &data).unwrap();
        *data.last_mut().unwrap() = 8;
        std::fs::write(&b, &data).unwrap();

        assert_ne!(exact_md5(&a).unwrap(), exact_md5(&b).unwrap());
    }

    #[test]
    fn test_exact_md5_missing_file() {
        let err = exact_md5(Path::new("/nonexistent/file.bin")).unwrap_err();
        assert!(matches!(err, HashError::NotFound(_)));
    }

    #[test]
    fn test_pixel_md5_ignores_container_format() {
        let dir = tempdir().unwrap();
        let png = dir.path().join("a.png");
        let bmp = dir.path().join("a.bmp");
        let img = RgbImage::from_fn(16, 16, |x, y| image::Rgb([x as u8 * 10, y as u8 * 10, 99]));
        img.save(&png).unwrap();
        img.save(&bmp).unwrap();

        assert_ne!(exact_md5(&png).unwrap(), exact_md5(&bmp).unwrap());
        assert_eq!(pixel_md5(&png).unwrap(), pixel_md5(&bmp).unwrap());
    }

    #[test]
    fn test_pixel_md5_falls_back_to_exact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"definitely not a png").unwrap();

        assert!(pixel_md5(&path).is_err());
        let hasher = ContentHasher::new();
        assert_eq!(
            hasher.compute(&path, HashKind::PixelMd5),
            Some(exact_md5(&path).unwrap())
        );
    }

    #[test]
    fn test_perceptual_failure_is_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not a jpeg").unwrap();

        let hasher = ContentHasher::new();
        assert_eq!(hasher.compute(&path, HashKind::PerceptualPhash), None);
        assert_eq!(hasher.compute(&path, HashKind::PerceptualWhash), None);
    }

    #[test]
    fn test_compute_all_kinds_on_image() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("img.png");
        RgbImage::from_fn(32, 32, |x, _| image::Rgb([x as u8 * 8, 0, 0]))
            .save(&path)
            .unwrap();

        let hasher = ContentHasher::new();
        for kind in HashKind::ALL {
            assert!(hasher.compute(&path, kind).is_some(), "missing {kind}");
        }
    }

    #[cfg(not(feature = "raw"))]
    #[test]
    fn test_raw_without_feature_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("IMG_0001.CR2");
        std::fs::write(&path, b"raw sensor bytes").unwrap();

        let hasher = ContentHasher::new();
        assert_eq!(
            hasher.compute(&path, HashKind::PixelMd5),
            Some(exact_md5(&path).unwrap())
        );
    }
}
