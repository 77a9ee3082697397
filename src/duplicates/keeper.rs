//! Policies choosing which member of a group to keep.

use std::cmp::Ordering;

use super::groups::GroupMember;

/// Orders group members from most to least worth keeping.
///
/// The keeper is the first member in this order. Implementations must be a
/// total order so the choice does not depend on member order.
pub trait KeeperPolicy: Send + Sync {
    /// Short name for logs and reports.
    fn name(&self) -> &'static str;

    /// `Less` when `a` should be kept over `b`.
    fn compare(&self, a: &GroupMember, b: &GroupMember) -> Ordering;

    /// Index of the member to keep, or `None` for an empty slice.
    fn select(&self, members: &[GroupMember]) -> Option<usize> {
        members
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| self.compare(a, b))
            .map(|(i, _)| i)
    }
}

/// Keep the largest file; higher resolution breaks ties, then the path.
#[derive(Debug, Clone, Copy, Default)]
pub struct LargestFirst;

impl KeeperPolicy for LargestFirst {
    fn name(&self) -> &'static str {
        "largest"
    }

    fn compare(&self, a: &GroupMember, b: &GroupMember) -> Ordering {
        b.size
            .cmp(&a.size)
            .then_with(|| b.resolution().cmp(&a.resolution()))
            .then_with(|| a.path.cmp(&b.path))
    }
}

/// Keep the member with the shortest name, as for date-named folders
/// where `01-18` is the original and `01-18 Grace` a later copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShortestName;

impl KeeperPolicy for ShortestName {
    fn name(&self) -> &'static str {
        "shortest-name"
    }

    fn compare(&self, a: &GroupMember, b: &GroupMember) -> Ordering {
        a.filename
            .chars()
            .count()
            .cmp(&b.filename.chars().count())
            .then_with(|| a.filename.cmp(&b.filename))
            .then_with(|| a.path.cmp(&b.path))
    }
}
