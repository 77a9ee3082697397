//! Perceptual image hashing for near-duplicate detection.
//!
//! This module provides the [`PerceptualHasher`], which computes fingerprints
//! that stay stable under resizing, recompression and format conversion.
//! EXIF orientation is applied before hashing, so a rotated copy that looks
//! the same on screen produces the same fingerprint.
//!
//! All algorithms produce 64-bit [`Fingerprint`]s compared by Hamming
//! distance.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use image::imageops::FilterType;
use image::{DynamicImage, ImageDecoder, ImageReader};
use image_hasher::{HashAlg, HasherConfig};
use serde::{Deserialize, Serialize};

use super::HashError;
use crate::classify::HashKind;

/// Side length of the hash grid; fingerprints are `HASH_SIZE²` bits.
pub const HASH_SIZE: u32 = 8;

/// Image size fed to the wavelet transform.
const WAVELET_INPUT_SIZE: u32 = 64;

/// Supported perceptual hashing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PerceptualAlgorithm {
    /// pHash (Perceptual Hash) - DCT-based, most resilient to transformations.
    #[default]
    Phash,
    /// dHash (Difference Hash) - Gradient-based, very fast and effective.
    Dhash,
    /// aHash (Average Hash) - Mean-based, fast but less resilient.
    Ahash,
    /// wHash (Wavelet Hash) - Haar low-frequency band, robust to noise.
    Whash,
}

impl PerceptualAlgorithm {
    /// All algorithms.
    pub const ALL: [PerceptualAlgorithm; 4] = [Self::Phash, Self::Dhash, Self::Ahash, Self::Whash];

    /// Get the default similarity threshold (Hamming distance) for this algorithm.
    #[must_use]
    pub fn default_threshold(&self) -> u32 {
        match self {
            Self::Phash => 10,
            Self::Dhash => 2,
            Self::Ahash | Self::Whash => 5,
        }
    }

    /// Fingerprint length in bits.
    #[must_use]
    pub fn bit_len(&self) -> u32 {
        HASH_SIZE * HASH_SIZE
    }

    /// The catalog hash kind this algorithm writes.
    #[must_use]
    pub fn hash_kind(self) -> HashKind {
        match self {
            Self::Phash => HashKind::PerceptualPhash,
            Self::Dhash => HashKind::PerceptualDhash,
            Self::Ahash => HashKind::PerceptualAhash,
            Self::Whash => HashKind::PerceptualWhash,
        }
    }

    /// The algorithm behind a perceptual hash kind.
    #[must_use]
    pub fn from_hash_kind(kind: HashKind) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.hash_kind() == kind)
    }

    /// Lowercase name accepted by [`FromStr`].
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Phash => "phash",
            Self::Dhash => "dhash",
            Self::Ahash => "ahash",
            Self::Whash => "whash",
        }
    }
}

impl fmt::Display for PerceptualAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Phash => write!(f, "pHash"),
            Self::Dhash => write!(f, "dHash"),
            Self::Ahash => write!(f, "aHash"),
            Self::Whash => write!(f, "wHash"),
        }
    }
}

/// An algorithm name that is not one of `phash`, `dhash`, `ahash`, `whash`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown perceptual algorithm '{0}' (expected phash, dhash, ahash or whash)")]
pub struct UnknownAlgorithm(pub String);

impl FromStr for PerceptualAlgorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|a| a.name() == lower)
            .ok_or_else(|| UnknownAlgorithm(s.to_string()))
    }
}

/// A fixed-length perceptual fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(Vec<u8>);

impl Fingerprint {
    /// Wrap raw fingerprint bytes.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Parse the hex form stored in the catalog.
    ///
    /// # Errors
    ///
    /// Returns the hex decoding error for malformed input.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        hex::decode(s).map(Self)
    }

    /// The raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Hex form for storage.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Length in bits.
    #[must_use]
    pub fn bit_len(&self) -> u32 {
        self.0.len() as u32 * 8
    }

    /// Hamming distance, or `None` if the lengths differ.
    #[must_use]
    pub fn distance(&self, other: &Self) -> Option<u32> {
        if self.0.len() != other.0.len() {
            return None;
        }
        Some(
            self.0
                .iter()
                .zip(&other.0)
                .map(|(a, b)| (a ^ b).count_ones())
                .sum(),
        )
    }

    /// `1 - distance / bit_len`, or `None` if the lengths differ.
    #[must_use]
    pub fn similarity(&self, other: &Self) -> Option<f64> {
        let bits = self.bit_len();
        if bits == 0 {
            return None;
        }
        self.distance(other)
            .map(|d| 1.0 - f64::from(d) / f64::from(bits))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

enum Engine {
    ImageHasher(image_hasher::Hasher),
    Wavelet,
}

/// Computes perceptual hashes for images.
pub struct PerceptualHasher {
    engine: Engine,
    algorithm: PerceptualAlgorithm,
}

impl PerceptualHasher {
    /// Create a new `PerceptualHasher` with the given algorithm.
    #[must_use]
    pub fn new(algorithm: PerceptualAlgorithm) -> Self {
        let config = HasherConfig::new().hash_size(HASH_SIZE, HASH_SIZE);

        let engine = match algorithm {
            PerceptualAlgorithm::Phash => {
                Engine::ImageHasher(config.hash_alg(HashAlg::Median).preproc_dct().to_hasher())
            }
            PerceptualAlgorithm::Dhash => {
                Engine::ImageHasher(config.hash_alg(HashAlg::Gradient).to_hasher())
            }
            PerceptualAlgorithm::Ahash => {
                Engine::ImageHasher(config.hash_alg(HashAlg::Mean).to_hasher())
            }
            PerceptualAlgorithm::Whash => Engine::Wavelet,
        };

        Self { engine, algorithm }
    }

    /// Compute the fingerprint of the image at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the image cannot be opened or decoded.
    pub fn compute<P: AsRef<Path>>(&self, path: P) -> Result<Fingerprint, HashError> {
        let path = path.as_ref();
        let img = open_oriented(path).map_err(|e| HashError::decode(path, e))?;
        Ok(self.hash_image(&img))
    }

    /// Compute the fingerprint of an already decoded image.
    #[must_use]
    pub fn hash_image(&self, img: &DynamicImage) -> Fingerprint {
        match &self.engine {
            Engine::ImageHasher(hasher) => Fingerprint::from_bytes(hasher.hash_image(img).as_bytes()),
            Engine::Wavelet => wavelet_hash(img),
        }
    }

    /// Get the algorithm used by this hasher.
    #[must_use]
    pub fn algorithm(&self) -> PerceptualAlgorithm {
        self.algorithm
    }
}

impl Default for PerceptualHasher {
    fn default() -> Self {
        Self::new(PerceptualAlgorithm::Phash)
    }
}

/// Decode an image and rotate/flip it according to its EXIF orientation.
fn open_oriented(path: &Path) -> image::ImageResult<DynamicImage> {
    let mut decoder = ImageReader::open(path)?
        .with_guessed_format()?
        .into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut img = DynamicImage::from_decoder(decoder)?;
    img.apply_orientation(orientation);
    Ok(img)
}

/// Haar wavelet hash: low-frequency band of a 3-level transform over a 64x64
/// grayscale image, thresholded at its median.
fn wavelet_hash(img: &DynamicImage) -> Fingerprint {
    let gray = img
        .resize_exact(WAVELET_INPUT_SIZE, WAVELET_INPUT_SIZE, FilterType::Lanczos3)
        .to_luma8();
    let mut band: Vec<f64> = gray.pixels().map(|p| f64::from(p.0[0]) / 255.0).collect();
    let mut size = WAVELET_INPUT_SIZE as usize;

    while size > HASH_SIZE as usize {
        band = haar_ll(&band, size);
        size /= 2;
    }

    let mut sorted = band.clone();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    let median = (sorted[mid - 1] + sorted[mid]) / 2.0;

    let mut bytes = vec![0u8; band.len().div_ceil(8)];
    for (i, value) in band.iter().enumerate() {
        if *value > median {
            bytes[i / 8] |= 0x80 >> (i % 8);
        }
    }
    Fingerprint::from_bytes(bytes)
}

/// One level of the 2D Haar transform, keeping only the LL band.
fn haar_ll(values: &[f64], size: usize) -> Vec<f64> {
    let half = size / 2;
    let mut out = Vec::with_capacity(half * half);
    for y in 0..half {
        for x in 0..half {
            let at = |dx: usize, dy: usize| values[(2 * y + dy) * size + 2 * x + dx];
            out.push((at(0, 0) + at(1, 0) + at(0, 1) + at(1, 1)) / 2.0);
        }
    }
    out
}
