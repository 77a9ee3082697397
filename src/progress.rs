//! Progress reporting utilities using indicatif.
//!
//! This module defines the [`ProgressSink`] trait the scanner reports
//! through, and [`Progress`], an indicatif implementation used by the CLI.
//!
//! # Accessible Mode
//!
//! When accessible mode is enabled, progress reporting uses simplified output:
//! - No spinners or animations
//! - ASCII-only bars
//! - Reduced update frequency for screen reader compatibility

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Receiver of scan progress.
///
/// A `total` of zero means the total is not known yet (the counting pass is
/// still running). Any `Fn(&str, u64, u64)` closure is a sink.
pub trait ProgressSink: Send + Sync {
    /// Called at bounded intervals while a scan runs.
    ///
    /// # Arguments
    ///
    /// * `status` - Short human-readable status line
    /// * `current` - Items processed so far
    /// * `total` - Expected items, or 0 if unknown
    fn on_progress(&self, status: &str, current: u64, total: u64);
}

impl<F> ProgressSink for F
where
    F: Fn(&str, u64, u64) + Send + Sync,
{
    fn on_progress(&self, status: &str, current: u64, total: u64) {
        self(status, current, total);
    }
}

/// Progress reporter using indicatif.
///
/// Shows a spinner while the total is unknown and switches to a bar once
/// the counting pass has produced one.
pub struct Progress {
    bar: Mutex<Option<ProgressBar>>,
    quiet: bool,
    accessible: bool,
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Arguments
    ///
    /// * `quiet` - If true, no progress bars will be displayed.
    /// # Examples
    ///
    /// ```
    /// use dedupe::progress::Progress;
    ///
    /// let progress = Progress::new(false);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self::with_accessible(quiet, false)
    }

    /// Create a new progress reporter with accessible mode.
    ///
    /// # Arguments
    ///
    /// * `quiet` - If true, no progress will be displayed.
    /// * `accessible` - If true, uses simplified output for screen readers.
    #[must_use]
    pub fn with_accessible(quiet: bool, accessible: bool) -> Self {
        Self {
            bar: Mutex::new(None),
            quiet,
            accessible,
        }
    }

    /// Check if accessible mode is enabled.
    #[must_use]
    pub fn is_accessible(&self) -> bool {
        self.accessible
    }

    /// Finish and clear the active bar, if any.
    pub fn finish(&self) {
        let mut bar = self.bar.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pb) = bar.take() {
            pb.finish_and_clear();
        }
    }

    fn spinner_style(&self) -> ProgressStyle {
        if self.accessible {
            ProgressStyle::with_template("{msg} [{elapsed_precise}] {pos} files")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
        } else {
            ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}] {pos} files")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        }
    }

    fn bar_style(&self) -> ProgressStyle {
        if self.accessible {
            ProgressStyle::with_template(
                "[{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg} (ETA: {eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-")
        } else {
            ProgressStyle::with_template(
                "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg} (ETA: {eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█>-")
        }
    }

    fn new_bar(&self, total: u64) -> ProgressBar {
        if total == 0 {
            let pb = ProgressBar::new_spinner();
            pb.set_style(self.spinner_style());
            let tick_rate = if self.accessible { 500 } else { 100 };
            pb.enable_steady_tick(Duration::from_millis(tick_rate));
            pb
        } else {
            let pb = ProgressBar::new(total);
            pb.set_style(self.bar_style());
            pb
        }
    }
}

impl ProgressSink for Progress {
    fn on_progress(&self, status: &str, current: u64, total: u64) {
        if self.quiet {
            return;
        }

        let mut slot = self.bar.lock().unwrap_or_else(PoisonError::into_inner);
        let needs_new = match slot.as_ref() {
            None => true,
            // Spinner to bar once the total is known.
            Some(pb) => pb.length().unwrap_or(0) != total,
        };
        if needs_new {
            if let Some(old) = slot.take() {
                old.finish_and_clear();
            }
            *slot = Some(self.new_bar(total));
        }

        if let Some(pb) = slot.as_ref() {
            pb.set_position(current);
            pb.set_message(truncate_status(status, 40));
        }
    }
}

/// Truncate a status line for display in the progress bar.
fn truncate_status(status: &str, max_len: usize) -> String {
    if status.chars().count() <= max_len {
        return status.to_string();
    }
    let tail: String = status
        .chars()
        .rev()
        .take(max_len.saturating_sub(3))
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("...{tail}")
}
