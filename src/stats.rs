//! Per-kind download statistics

use crate::types::{ItemState, MediaKind};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// File names grouped by outcome for one media kind
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct KindStats {
    /// Items that finished
    pub success: BTreeSet<String>,
    /// Items that gave up and never finished later
    pub failure: BTreeSet<String>,
    /// Items that were not transferred
    pub skip: BTreeSet<String>,
}

/// Counts for one kind, for summary tables
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct KindSummary {
    /// Media kind
    pub kind: MediaKind,
    /// Finished items
    pub success: usize,
    /// Failed items
    pub failure: usize,
    /// Skipped items
    pub skip: usize,
}

/// Outcome sets per media kind
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DownloadStats {
    by_kind: BTreeMap<MediaKind, KindStats>,
}

impl DownloadStats {
    /// Empty statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the terminal state of an item
    ///
    /// Only `Verified`, `Failed` and `Skipped` are recorded. An item that
    /// failed once and later succeeded is no longer counted as a failure.
    pub fn record(&mut self, kind: MediaKind, state: ItemState, file_name: &str) {
        let stats = self.by_kind.entry(kind).or_default();
        let set = match state {
            ItemState::Verified => &mut stats.success,
            ItemState::Failed => &mut stats.failure,
            ItemState::Skipped => &mut stats.skip,
            ItemState::Pending | ItemState::Active | ItemState::Mismatched => return,
        };
        set.insert(file_name.to_string());

        if !stats.failure.is_empty() && !stats.success.is_empty() {
            let success = &stats.success;
            stats.failure.retain(|name| !success.contains(name));
        }
    }

    /// Outcome sets for one kind
    pub fn kind(&self, kind: MediaKind) -> Option<&KindStats> {
        self.by_kind.get(&kind)
    }

    /// Counts for every kind that saw at least one item, in kind order
    pub fn summary(&self) -> Vec<KindSummary> {
        self.by_kind
            .iter()
            .map(|(kind, stats)| KindSummary {
                kind: *kind,
                success: stats.success.len(),
                failure: stats.failure.len(),
                skip: stats.skip.len(),
            })
            .collect()
    }

    /// Total finished items across kinds
    pub fn total_success(&self) -> usize {
        self.by_kind.values().map(|s| s.success.len()).sum()
    }

    /// Total failed items across kinds
    pub fn total_failure(&self) -> usize {
        self.by_kind.values().map(|s| s.failure.len()).sum()
    }
}
