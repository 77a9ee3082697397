//! Duplicate grouping module.
//!
//! This module provides functionality for:
//! - Exact grouping on equal fingerprints (file or pixel MD5)
//! - Perceptual clustering under a Hamming distance threshold
//! - Cross-volume grouping over the catalog
//! - Date-named folder grouping
//! - Keeper selection and group summaries
//!
//! # Example
//!
//! ```
//! use dedupe::classify::HashKind;
//! use dedupe::duplicates::{Candidate, GroupingEngine, Scope};
//!
//! let candidates = vec![
//!     Candidate::new("/photos/a.jpg", 2048).with_hash(HashKind::ExactMd5, "abc"),
//!     Candidate::new("/photos/b.jpg", 2048).with_hash(HashKind::ExactMd5, "abc"),
//! ];
//! let groups = GroupingEngine::new().exact_groups(&candidates, HashKind::ExactMd5, Scope::default());
//! assert_eq!(groups.len(), 1);
//! assert_eq!(groups[0].suggested_delete().len(), 1);
//! ```

pub mod engine;
pub mod groups;
pub mod keeper;
pub mod union_find;

pub use engine::{Candidate, GroupingEngine, GroupingError, Scope};
pub use groups::{DuplicateGroup, GroupMember, GroupSummary, PairSimilarity};
pub use keeper::{KeeperPolicy, LargestFirst, ShortestName};
pub use union_find::UnionFind;
