//! Core downloader implementation split into focused submodules.
//!
//! The `MediaDownloader` struct and its methods are organized by domain:
//! - [`target`] - Target creation (dedup, resolution, scheduling of items)
//! - [`item`] - Per-item checks, admission and transfer
//! - [`completion`] - Outcome handling: relocation, retry, terminal failure
//! - [`progress`] - Per-item status messages in a chat
//! - [`intake`] - Link lists and partitioning against known targets
//! - [`history`] - Message-sourced targets (chat history, conversion service)
//! - [`lifecycle`] - Idle waiting, pending relocations and shutdown coordination

mod completion;
mod history;
mod intake;
mod item;
mod lifecycle;
mod progress;
mod target;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use intake::{LinkPartition, collect_links};

use crate::client::{Notifier, RemoteClient, Uploader};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::gate::AdmissionGate;
use crate::registry::{TaskRegistry, load_history, save_history};
use crate::stats::DownloadStats;
use crate::types::{ActiveItem, CanonicalKey, Event, ItemState, TaskMeta};
use item::ItemJob;
use progress::StatusMessage;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::task::TaskTracker;

/// One submission of a target, counting its items that have not settled yet
#[derive(Debug)]
pub(crate) struct TargetRun {
    pub(crate) key: CanonicalKey,
    pub(crate) outstanding: usize,
}

/// The transfer currently responsible for one temp path
///
/// Other targets covering the same item park their jobs in `waiters` and are
/// settled by the owner's outcome instead of streaming the item again.
#[derive(Debug)]
pub(crate) struct ItemClaim {
    pub(crate) run: u64,
    pub(crate) message_id: i64,
    pub(crate) key: CanonicalKey,
    pub(crate) item: String,
    pub(crate) state: ItemState,
    pub(crate) waiters: Vec<ItemJob>,
    pub(crate) status: Option<StatusMessage>,
}

impl ItemClaim {
    pub(crate) fn owned_by(&self, job: &ItemJob) -> bool {
        self.run == job.run && self.message_id == job.message.id
    }
}

/// Mutable state shared by every task of one downloader
///
/// Only touched inside [`MediaDownloader::with_state`], never across an `.await`.
#[derive(Debug, Default)]
pub(crate) struct SharedState {
    /// Per-target metadata, aliases, in-flight and completed sets
    pub(crate) registry: TaskRegistry,
    /// Per-kind outcome sets
    pub(crate) stats: DownloadStats,
    /// Submissions with items that have not reached a terminal state
    pub(crate) runs: HashMap<u64, TargetRun>,
    next_run: u64,
    /// Items pending, streaming or backing off, by temp path
    pub(crate) claims: HashMap<PathBuf, ItemClaim>,
    /// First process-level failure, if any
    pub(crate) fatal: Option<String>,
}

impl SharedState {
    /// Register a new submission of `key` with `items` outstanding items
    pub(crate) fn start_run(&mut self, key: CanonicalKey, items: usize) -> u64 {
        self.next_run += 1;
        self.runs.insert(
            self.next_run,
            TargetRun {
                key,
                outstanding: items,
            },
        );
        self.next_run
    }
}

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct MediaDownloader {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Remote protocol client
    pub(crate) client: Arc<dyn RemoteClient>,
    /// Registry, statistics and bookkeeping behind one lock
    pub(crate) state: Arc<Mutex<SharedState>>,
    /// Bounds simultaneously active transfers
    pub(crate) gate: AdmissionGate,
    /// Every spawned item task, including retries waiting for their backoff
    pub(crate) tasks: TaskTracker,
    /// Flag to indicate whether new targets are accepted (false after shutdown or a fatal error)
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Receives "target complete" messages
    pub(crate) notifier: Option<Arc<dyn Notifier>>,
    /// Receives finished files of targets created with an upload destination
    pub(crate) uploader: Option<Arc<dyn Uploader>>,
    /// Serializes history file writes
    pub(crate) history_lock: Arc<tokio::sync::Mutex<()>>,
}

impl MediaDownloader {
    /// Create a new MediaDownloader instance
    ///
    /// This validates the configuration, creates the download and temp
    /// directories, and loads the completion history so targets finished in
    /// earlier runs are not downloaded again.
    pub async fn new(config: Config, client: Arc<dyn RemoteClient>) -> Result<Self> {
        config.validate()?;

        for (dir, what) in [
            (&config.download.download_dir, "download"),
            (&config.download.temp_dir, "temp"),
        ] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create {} directory '{}': {}",
                        what,
                        dir.display(),
                        e
                    ),
                ))
            })?;
        }

        let mut registry = TaskRegistry::new();
        let loaded = registry.restore(load_history(&config.persistence.history_path).await);
        tracing::info!(
            completed_targets = loaded,
            max_concurrent = config.download.max_concurrent_downloads,
            "media downloader initialized"
        );

        // Create broadcast channel with buffer size of 1000 events
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        let downloader = Self {
            gate: AdmissionGate::new(config.download.max_concurrent_downloads),
            config: Arc::new(config),
            client,
            state: Arc::new(Mutex::new(SharedState {
                registry,
                ..SharedState::default()
            })),
            tasks: TaskTracker::new(),
            accepting_new: Arc::new(AtomicBool::new(true)),
            event_tx,
            notifier: None,
            uploader: None,
            history_lock: Arc::new(tokio::sync::Mutex::new(())),
        };

        // Verified files an earlier run could not move into the save directory
        downloader.retry_pending_moves().await;
        Ok(downloader)
    }

    /// Send "target complete" messages to `notifier`
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Hand finished files to `uploader` for targets created with `upload_to`
    pub fn with_uploader(mut self, uploader: Arc<dyn Uploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    /// Subscribe to download events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// Events are buffered, but if a subscriber falls behind by more than 1000 events,
    /// it will receive a `RecvError::Lagged` error.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Every known target with its metadata, sorted by key
    pub fn link_report(&self) -> Vec<(CanonicalKey, TaskMeta)> {
        self.with_state(|state| state.registry.snapshot())
    }

    /// Metadata of one target, looked up by key or alias
    pub fn task(&self, key: &str) -> Option<TaskMeta> {
        self.with_state(|state| state.registry.get(key).cloned())
    }

    /// Whether the target completed in this or an earlier run
    pub fn is_completed(&self, key: &CanonicalKey) -> bool {
        self.with_state(|state| state.registry.is_completed(key))
    }

    /// Whether the target is currently being downloaded
    pub fn is_in_flight(&self, key: &CanonicalKey) -> bool {
        self.with_state(|state| state.registry.is_in_flight(key))
    }

    /// Snapshot of the per-kind statistics
    pub fn stats(&self) -> DownloadStats {
        self.with_state(|state| state.stats.clone())
    }

    /// Items that have not reached a terminal state, sorted by target and item
    pub fn active_items(&self) -> Vec<ActiveItem> {
        let mut items: Vec<ActiveItem> = self.with_state(|state| {
            state
                .claims
                .values()
                .map(|claim| ActiveItem {
                    key: claim.key.clone(),
                    item: claim.item.clone(),
                    state: claim.state,
                    waiting: claim.waiters.iter().map(|job| job.key.clone()).collect(),
                })
                .collect()
        });
        items.sort_by(|a, b| (&a.key, &a.item).cmp(&(&b.key, &b.item)));
        items
    }

    /// Number of transfers currently holding an admission slot
    pub fn active_transfers(&self) -> usize {
        self.gate.active()
    }

    /// The process-level failure that stopped intake, if any
    pub fn fatal_error(&self) -> Option<String> {
        self.with_state(|state| state.fatal.clone())
    }

    /// Run `f` with exclusive access to the shared state
    ///
    /// A panic in another task while holding the lock does not make the
    /// state unusable; the registry is only ever left between complete
    /// mutations.
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut SharedState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Fail with the reason new targets are refused, if they are
    pub(crate) fn ensure_accepting(&self) -> Result<()> {
        if self.accepting_new.load(Ordering::SeqCst) {
            return Ok(());
        }
        match self.fatal_error() {
            Some(message) => Err(Error::Fatal(message)),
            None => Err(Error::ShuttingDown),
        }
    }

    /// Write the completion history outside the state lock
    ///
    /// Failures are logged; the in-memory state stays authoritative for the
    /// current run. Returns whether the write succeeded.
    pub(crate) async fn persist_history(&self) -> bool {
        let _writer = self.history_lock.lock().await;
        let history = self.with_state(|state| state.registry.history());
        let path = &self.config.persistence.history_path;
        match save_history(path, &history).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to save completion history"
                );
                false
            }
        }
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
