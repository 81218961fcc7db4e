//! Per-target bookkeeping and the durable completion history
//!
//! The [`TaskRegistry`] holds one [`TaskMeta`] per canonical key, an alias
//! table for secondary keys (numeric message ids), the set of targets that
//! are currently in flight, and the set of targets that ever completed.
//! The last one is persisted so later runs can skip finished work, together
//! with verified files that could not be moved into the save directory yet.
//!
//! The registry is a plain synchronous value. The downloader keeps it behind
//! a mutex and only touches it in short critical sections; reading and
//! writing the [`History`] file happens outside the lock with
//! [`load_history`] and [`save_history`].

use crate::canonical::canonicalize;
use crate::error::Result;
use crate::types::{CanonicalKey, ErrorKey, LinkType, TaskMeta};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

/// On-disk layout of the completion history
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    /// Every target that ever completed, sorted
    #[serde(default)]
    pub complete_links: Vec<String>,
    /// Verified files still waiting to be moved into the save directory
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_moves: Vec<PendingMove>,
}

/// A verified file whose move into the save directory failed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMove {
    /// Where the verified file sits now
    pub source: PathBuf,
    /// Where it should end up
    pub dest: PathBuf,
}

/// Outcome of [`TaskRegistry::record_completed_item`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemRecord {
    /// Item added; the target still has items outstanding
    Recorded,
    /// Item was already recorded; nothing changed
    AlreadyRecorded,
    /// Item added and the target just became done
    TargetComplete,
    /// The target already holds `member_num` items; the item was not added
    Rejected,
}

/// Keyed store of per-target metadata
#[derive(Debug, Default)]
pub struct TaskRegistry {
    entries: HashMap<CanonicalKey, TaskMeta>,
    aliases: HashMap<String, CanonicalKey>,
    completed: BTreeSet<CanonicalKey>,
    in_flight: HashSet<CanonicalKey>,
    pending_moves: BTreeMap<PathBuf, PathBuf>,
}

impl TaskRegistry {
    /// Registry without durable history
    pub fn new() -> Self {
        Self::default()
    }

    /// Primary key for `key`, following the alias table
    pub fn resolve(&self, key: &str) -> Option<&CanonicalKey> {
        match self.entries.get_key_value(key) {
            Some((primary, _)) => Some(primary),
            None => self.aliases.get(key),
        }
    }

    fn primary_or_self(&self, key: &CanonicalKey) -> CanonicalKey {
        self.resolve(key.as_str()).unwrap_or(key).clone()
    }

    fn entry_mut(&mut self, key: &CanonicalKey) -> &mut TaskMeta {
        let primary = self.primary_or_self(key);
        self.entries.entry(primary).or_default()
    }

    /// Existing entry for `key`, or a zeroed one inserted now
    pub fn get_or_create(&mut self, key: &CanonicalKey) -> &TaskMeta {
        self.entry_mut(key)
    }

    /// Snapshot lookup by key or alias
    pub fn get(&self, key: &str) -> Option<&TaskMeta> {
        let primary = self.resolve(key)?;
        self.entries.get(primary)
    }

    /// Set the resolved link type, creating the entry if needed
    pub fn set_link_type(&mut self, key: &CanonicalKey, link_type: LinkType) {
        self.entry_mut(key).link_type = Some(link_type);
    }

    /// Set the expected item count, creating the entry if needed
    pub fn set_member_num(&mut self, key: &CanonicalKey, member_num: usize) {
        self.entry_mut(key).member_num = member_num;
    }

    /// Record (or overwrite) the latest error for an item or the whole target
    pub fn record_error(&mut self, key: &CanonicalKey, item: Option<&str>, message: impl Into<String>) {
        let error_key = match item {
            Some(name) => ErrorKey::Item(name.to_string()),
            None => ErrorKey::WholeTarget,
        };
        self.entry_mut(key).error_msg.insert(error_key, message.into());
    }

    /// Record one completed item
    ///
    /// When this completes the target, its errors are cleared and the key
    /// joins the completed set; the caller persists the history. A target
    /// transitions to done at most once: once `member_num` items are
    /// recorded, further new items are rejected.
    pub fn record_completed_item(&mut self, key: &CanonicalKey, item: &str) -> ItemRecord {
        let primary = self.primary_or_self(key);
        let meta = self.entries.entry(primary.clone()).or_default();

        if meta.file_name.contains(item) {
            return ItemRecord::AlreadyRecorded;
        }
        if meta.complete_num() >= meta.member_num {
            tracing::warn!(
                key = %primary,
                item,
                member_num = meta.member_num,
                "completed item exceeds expected item count, ignoring"
            );
            return ItemRecord::Rejected;
        }

        meta.file_name.insert(item.to_string());
        if !meta.is_done() {
            return ItemRecord::Recorded;
        }

        meta.error_msg.clear();
        tracing::info!(key = %primary, items = meta.member_num, "target complete");
        self.completed.insert(primary);
        ItemRecord::TargetComplete
    }

    /// Point `alias` at the entry of `primary`
    ///
    /// Returns `false` (and does nothing) if `primary` has no entry.
    pub fn alias(&mut self, alias: impl Into<String>, primary: &CanonicalKey) -> bool {
        let Some(target) = self.resolve(primary.as_str()).cloned() else {
            return false;
        };
        let alias = alias.into();
        if alias == target.as_str() {
            return true;
        }
        self.aliases.insert(alias, target);
        true
    }

    /// Owned copy of every entry, sorted by key
    pub fn snapshot(&self) -> Vec<(CanonicalKey, TaskMeta)> {
        let mut out: Vec<_> = self
            .entries
            .iter()
            .map(|(key, meta)| (key.clone(), meta.clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the target completed in this or any earlier run
    pub fn is_completed(&self, key: &CanonicalKey) -> bool {
        let primary = self.resolve(key.as_str()).unwrap_or(key);
        self.completed.contains(primary)
    }

    /// Every key that ever completed
    pub fn completed(&self) -> &BTreeSet<CanonicalKey> {
        &self.completed
    }

    /// Mark a target as in flight; returns `false` if it already was
    pub fn mark_in_flight(&mut self, key: &CanonicalKey) -> bool {
        let primary = self.primary_or_self(key);
        self.in_flight.insert(primary)
    }

    /// Drop the in-flight marker so the target may be submitted again
    pub fn release_in_flight(&mut self, key: &CanonicalKey) -> bool {
        let primary = self.primary_or_self(key);
        self.in_flight.remove(&primary)
    }

    /// Whether the target is currently in flight
    pub fn is_in_flight(&self, key: &CanonicalKey) -> bool {
        let primary = self.resolve(key.as_str()).unwrap_or(key);
        self.in_flight.contains(primary)
    }

    /// Remember a verified file that still has to reach `dest`
    pub fn add_pending_move(&mut self, source: impl Into<PathBuf>, dest: impl Into<PathBuf>) {
        self.pending_moves.insert(source.into(), dest.into());
    }

    /// Forget a pending move; returns whether one was recorded for `source`
    pub fn remove_pending_move(&mut self, source: &Path) -> bool {
        self.pending_moves.remove(source).is_some()
    }

    /// Every pending move, ordered by source path
    pub fn pending_moves(&self) -> Vec<PendingMove> {
        self.pending_moves
            .iter()
            .map(|(source, dest)| PendingMove {
                source: source.clone(),
                dest: dest.clone(),
            })
            .collect()
    }

    /// Seed the completed set and pending moves from a loaded history
    ///
    /// Every stored link is canonicalized again so keys written by older
    /// versions still match. Returns the number of completed targets added.
    pub fn restore(&mut self, history: History) -> usize {
        let before = self.completed.len();
        self.completed
            .extend(history.complete_links.iter().map(|link| canonicalize(link)));
        for pending in history.pending_moves {
            self.pending_moves.insert(pending.source, pending.dest);
        }
        self.completed.len() - before
    }

    /// The persistent part of the registry
    pub fn history(&self) -> History {
        History {
            complete_links: self.completed.iter().map(|key| key.to_string()).collect(),
            pending_moves: self.pending_moves(),
        }
    }
}

/// Read the history file at `path`
///
/// A missing file is not an error; an unreadable or corrupt one is logged
/// and treated as empty.
pub async fn load_history(path: &Path) -> History {
    match read_history(path).await {
        Ok(Some(history)) => {
            tracing::debug!(
                path = %path.display(),
                completed = history.complete_links.len(),
                pending_moves = history.pending_moves.len(),
                "loaded completion history"
            );
            history
        }
        Ok(None) => History::default(),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load completion history, starting empty"
            );
            History::default()
        }
    }
}

async fn read_history(path: &Path) -> Result<Option<History>> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Ok(None);
    }
    let content = tokio::fs::read_to_string(path).await?;
    if content.trim().is_empty() {
        return Ok(Some(History::default()));
    }
    Ok(Some(serde_json::from_str(&content)?))
}

/// Write `history` to `path` through a sibling temp file and a rename
pub async fn save_history(path: &Path, history: &History) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(history)?;

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
