//! Output formatters for command results.
//!
//! This module provides the two output formats of the CLI:
//! - [`json`]: machine-readable reports for scripting
//! - [`text`]: human-readable listings for terminals
//!
//! # Example
//!
//! ```
//! use dedupe::classify::HashKind;
//! use dedupe::duplicates::{Candidate, GroupingEngine, Scope};
//! use dedupe::output::json::{write_json, JsonGroupsReport};
//!
//! let candidates = vec![
//!     Candidate::new("/a/x.jpg", 10).with_hash(HashKind::ExactMd5, "f00"),
//!     Candidate::new("/b/x.jpg", 10).with_hash(HashKind::ExactMd5, "f00"),
//! ];
//! let groups = GroupingEngine::new().exact_groups(&candidates, HashKind::ExactMd5, Scope::Global);
//! write_json(&JsonGroupsReport::new(&groups), &mut std::io::stdout()).unwrap();
//! ```

pub mod json;
pub mod text;

pub use json::{write_json, JsonFile, JsonGroup, JsonGroupsReport};

/// Errors that can occur while writing output.
#[derive(thiserror::Error, Debug)]
pub enum OutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error while writing output: {0}")]
    Io(#[from] std::io::Error),
}
