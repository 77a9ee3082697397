//! Type-specific metadata: image dimensions and video duration.
//!
//! Metadata is best effort. Any failure, including a missing or hung
//! `ffprobe`, leaves the corresponding fields empty and never fails the scan.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::classify::{extension_of, is_raw_extension, FileType};

/// Default limit for one `ffprobe` invocation.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

const PROBE_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Dimensions and duration of a media file.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MediaMetadata {
    /// Width in pixels.
    pub width: Option<u32>,
    /// Height in pixels.
    pub height: Option<u32>,
    /// Duration of a video, in seconds.
    pub duration_seconds: Option<f64>,
}

impl MediaMetadata {
    /// Pixel count, or 0 when the dimensions are unknown.
    #[must_use]
    pub fn resolution(&self) -> u64 {
        match (self.width, self.height) {
            (Some(w), Some(h)) => u64::from(w) * u64::from(h),
            _ => 0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

/// Loads [`MediaMetadata`] for scanned files.
#[derive(Debug, Clone)]
pub struct MetadataLoader {
    ffprobe: PathBuf,
    probe_timeout: Duration,
}

impl MetadataLoader {
    /// Create a loader using `ffprobe` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ffprobe: PathBuf::from("ffprobe"),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Set the per-file probe timeout.
    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Use a specific `ffprobe` executable.
    #[must_use]
    pub fn with_ffprobe(mut self, program: impl Into<PathBuf>) -> Self {
        self.ffprobe = program.into();
        self
    }

    /// Load the metadata relevant to `file_type`.
    #[must_use]
    pub fn load(&self, path: &Path, file_type: FileType) -> MediaMetadata {
        match file_type {
            FileType::Image => image_metadata(path),
            FileType::Video => self.probe_video(path).unwrap_or_default(),
            _ => MediaMetadata::default(),
        }
    }

    /// Run `ffprobe` and read the first video stream.
    ///
    /// Returns `None` when the probe is unavailable, fails, times out or
    /// finds no video stream.
    #[must_use]
    pub fn probe_video(&self, path: &Path) -> Option<MediaMetadata> {
        let mut child = Command::new(&self.ffprobe)
            .args(["-v", "quiet", "-print_format", "json", "-show_streams"])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| log::trace!("ffprobe unavailable: {}", e))
            .ok()?;

        // Drain stdout concurrently so a chatty probe cannot block on a full pipe
        let mut stdout = child.stdout.take()?;
        let reader = thread::spawn(move || {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).map(|_| buf)
        });

        let deadline = Instant::now() + self.probe_timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    log::debug!("ffprobe timed out for {}", path.display());
                    let _ = child.kill();
                    let _ = child.wait();
                    return None;
                }
                Ok(None) => thread::sleep(PROBE_POLL_INTERVAL),
                Err(e) => {
                    log::debug!("ffprobe wait failed for {}: {}", path.display(), e);
                    return None;
                }
            }
        };

        let output = reader.join().ok()?.ok()?;
        if !status.success() {
            return None;
        }
        parse_probe_output(&output)
    }
}

impl Default for MetadataLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_probe_output(json: &[u8]) -> Option<MediaMetadata> {
    let parsed: ProbeOutput = serde_json::from_slice(json).ok()?;
    let stream = parsed
        .streams
        .into_iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))?;
    Some(MediaMetadata {
        width: stream.width,
        height: stream.height,
        duration_seconds: stream.duration.and_then(|d| d.parse().ok()),
    })
}

/// Image dimensions read from the file header.
fn image_metadata(path: &Path) -> MediaMetadata {
    let dims = if is_raw_extension(&extension_of(path)) {
        raw_dimensions(path)
    } else {
        image::image_dimensions(path)
            .map_err(|e| log::trace!("No dimensions for {}: {}", path.display(), e))
            .ok()
    };
    MediaMetadata {
        width: dims.map(|(w, _)| w),
        height: dims.map(|(_, h)| h),
        duration_seconds: None,
    }
}

#[cfg(feature = "raw")]
fn raw_dimensions(path: &Path) -> Option<(u32, u32)> {
    super::hasher::decode_rgb8(path).ok().map(|img| img.dimensions())
}

#[cfg(not(feature = "raw"))]
fn raw_dimensions(_path: &Path) -> Option<(u32, u32)> {
    None
}
