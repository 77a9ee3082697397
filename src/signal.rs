//! Pause and cancel control for long-running scans.
//!
//! A [`ScanControl`] carries two shared flags. Pausing stops a scan at the
//! next file boundary and leaves a checkpoint to resume from; cancelling
//! stops it and discards the checkpoint. Both are polled cooperatively by
//! the scanner, the hash pool and the grouping engine.
//!
//! # Usage
//!
//! ```rust,no_run
//! use dedupe::signal::install_handler;
//!
//! // First Ctrl+C pauses, a second one cancels.
//! let control = install_handler().expect("Failed to install signal handler");
//!
//! if control.should_stop() {
//!     println!("Stopping at the next file boundary");
//! }
//! ```
//!
//! # Exit Codes
//!
//! A paused CLI scan exits with code 130 (128 + SIGINT) after printing the
//! session id to resume.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Exit code for SIGINT (Ctrl+C) interruption.
/// This follows Unix convention: 128 + signal number (SIGINT = 2).
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Shared pause/cancel flags.
///
/// Clones share the same flags, so a handle kept by a signal handler or
/// another thread controls every component it was passed to.
#[derive(Debug, Clone, Default)]
pub struct ScanControl {
    pause: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
}

impl ScanControl {
    /// Create a control with neither flag set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the running scan to checkpoint and stop.
    pub fn pause(&self) {
        self.pause.store(true, Ordering::SeqCst);
    }

    /// Ask the running scan to stop without keeping a checkpoint.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Whether a pause has been requested.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.pause.load(Ordering::SeqCst)
    }

    /// Whether a cancel has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Whether either flag is set.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.is_paused() || self.is_cancelled()
    }

    /// Clear both flags so the control can drive another scan.
    pub fn reset(&self) {
        self.pause.store(false, Ordering::SeqCst);
        self.cancel.store(false, Ordering::SeqCst);
    }
}

/// Error type for signal handler installation.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Failed to install the Ctrl+C handler.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

static GLOBAL_CONTROL: OnceLock<ScanControl> = OnceLock::new();

/// Install a Ctrl+C handler driving a process-wide [`ScanControl`].
///
/// The first interrupt requests a pause; any further interrupt requests a
/// cancel. Calling this again returns the already-installed control with
/// its flags reset.
///
/// # Errors
///
/// Returns [`SignalError`] only if no handler could be registered and none
/// was registered before by this function.
pub fn install_handler() -> Result<ScanControl, SignalError> {
    if let Some(control) = GLOBAL_CONTROL.get() {
        control.reset();
        return Ok(control.clone());
    }

    let control = ScanControl::new();
    let hooked = control.clone();

    match ctrlc::set_handler(move || {
        let message = if hooked.is_paused() {
            hooked.cancel();
            "\nCancelling..."
        } else {
            hooked.pause();
            "\nPausing after the current file (Ctrl+C again to cancel)..."
        };
        let _ = writeln!(std::io::stderr(), "{message}");
        let _ = std::io::stderr().flush();

        log::info!("Interrupt received");
    }) {
        Ok(()) => {
            let _ = GLOBAL_CONTROL.set(control.clone());
            Ok(control)
        }
        Err(ctrlc::Error::MultipleHandlers) => {
            log::debug!("Ctrl+C handler already registered, using unhooked control");
            let fallback = GLOBAL_CONTROL.get_or_init(ScanControl::new).clone();
            fallback.reset();
            Ok(fallback)
        }
        Err(e) => Err(SignalError::InstallFailed(e)),
    }
}
