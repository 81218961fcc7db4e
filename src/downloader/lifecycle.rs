//! Idle waiting, pending relocations and shutdown coordination.

use crate::error::Result;
use crate::registry::PendingMove;
use crate::types::Event;
use crate::utils::move_to_save_directory;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::MediaDownloader;

/// How often idle waiting re-checks the task set
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

impl MediaDownloader {
    /// Gracefully shut down the downloader
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting new targets
    /// 2. Waits for active transfers and pending retries to drain, bounded by
    ///    `download.shutdown_timeout`
    /// 3. Persists the completion history
    /// 4. Emits [`Event::Shutdown`]
    ///
    /// Transfers are never cancelled mid-stream. Whatever is still running
    /// when the timeout expires keeps its staging file for the next run.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        // 1. Stop accepting new targets
        self.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new targets");

        // 2. Wait for active transfers with timeout
        self.tasks.close();
        let shutdown_timeout = self.config.download.shutdown_timeout;
        match tokio::time::timeout(shutdown_timeout, self.tasks.wait()).await {
            Ok(()) => {
                tracing::info!("All active transfers completed gracefully");
            }
            Err(_) => {
                tracing::warn!(
                    remaining = self.tasks.len(),
                    "Timeout waiting for transfers to complete, proceeding with shutdown"
                );
            }
        }

        // 3. Persist final state
        if self.persist_history().await {
            tracing::info!("Completion history persisted");
        }

        // 4. Emit shutdown event
        self.emit_event(Event::Shutdown);

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Move verified files an earlier run left in the temp directory
    ///
    /// Moves that fail again stay recorded for the next start. A source that
    /// no longer exists is dropped.
    pub(crate) async fn retry_pending_moves(&self) {
        let pending = self.with_state(|state| state.registry.pending_moves());
        if pending.is_empty() {
            return;
        }

        let mut settled = 0usize;
        for PendingMove { source, dest } in pending {
            if tokio::fs::try_exists(&source).await.unwrap_or(false) {
                match move_to_save_directory(&source, &dest).await {
                    Ok(saved) => {
                        tracing::info!(path = %saved.display(), "moved verified file into the save directory");
                    }
                    Err(e) => {
                        tracing::warn!(
                            source = %source.display(),
                            error = %e,
                            "verified file still cannot be moved"
                        );
                        continue;
                    }
                }
            } else {
                tracing::warn!(source = %source.display(), "verified file is gone, dropping its pending move");
            }
            self.with_state(|state| state.registry.remove_pending_move(&source));
            settled += 1;
        }

        if settled > 0 {
            self.persist_history().await;
        }
    }

    /// Wait until no item task is left (active, queued or backing off)
    ///
    /// Unlike [`shutdown`](Self::shutdown) this keeps accepting targets, so
    /// it returns at the first moment the downloader happens to be idle.
    pub async fn wait_for_idle(&self) {
        loop {
            let remaining = self.tasks.len();
            if remaining == 0 {
                return;
            }
            tracing::trace!(remaining, "Waiting for item tasks to complete");
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }

    /// Whether new targets are still accepted
    pub fn is_accepting(&self) -> bool {
        self.accepting_new.load(Ordering::SeqCst)
    }
}
