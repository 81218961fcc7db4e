//! Outcome handling - relocation, retry and terminal failure of items.
//!
//! Every item ends in exactly one of four places: [`on_verified`] (or
//! [`on_duplicate`]) when its bytes are complete, [`on_failed`] when it
//! gives up, [`on_shared`] when another target's job transferred it, or a
//! terminal skip decided at scheduling time. Each of them calls
//! [`finish_item`], which releases the target's in-flight marker once no
//! submission of the target has an item left.
//!
//! A verified file whose move into the save directory fails is still
//! counted. Its move is kept in the history file and tried again at startup.
//!
//! [`on_verified`]: MediaDownloader::on_verified
//! [`on_duplicate`]: MediaDownloader::on_duplicate
//! [`on_failed`]: MediaDownloader::on_failed
//! [`on_shared`]: MediaDownloader::on_shared
//! [`finish_item`]: MediaDownloader::finish_item

use crate::error::{Error, RemoteError, ResolveFailure, Result};
use crate::gate::AdmissionPermit;
use crate::registry::ItemRecord;
use crate::retry::{IsRetryable, backoff_delay};
use crate::transfer::TransferOutcome;
use crate::types::{CanonicalKey, Event, ItemState, RetryState};
use crate::utils::move_to_save_directory;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::MediaDownloader;
use super::item::{ItemJob, JobOrigin, retry_filter};

impl MediaDownloader {
    /// Route the result of one transfer attempt
    ///
    /// The admission slot is released before anything else so a waiting item
    /// can start while this one relocates or sleeps for its backoff.
    pub(crate) async fn handle_outcome(
        &self,
        job: ItemJob,
        permit: AdmissionPermit,
        outcome: Result<TransferOutcome>,
    ) {
        drop(permit);

        match outcome {
            Ok(TransferOutcome::AlreadyComplete { path }) => {
                tracing::debug!(key = %job.key, item = %job.file_name, "transfer already complete");
                self.on_verified(&job, path).await;
            }
            Ok(TransferOutcome::Completed { path, streamed }) => {
                tracing::debug!(key = %job.key, item = %job.file_name, streamed, "transfer verified");
                self.on_verified(&job, path).await;
            }
            Ok(TransferOutcome::Mismatched {
                downloaded,
                expected,
                ..
            }) => {
                let reason = format!("size mismatch: downloaded {downloaded} of {expected} bytes");
                self.on_retryable(job, reason, None).await;
            }
            Err(e) if e.is_fatal() => {
                self.enter_fatal(&e);
                self.on_failed(&job, &e.to_string()).await;
            }
            Err(e) if e.is_retryable() => {
                let min_delay = match &e {
                    Error::Remote(RemoteError::FloodWait { seconds }) => {
                        Some(Duration::from_secs(*seconds))
                    }
                    _ => None,
                };
                self.on_retryable(job, e.to_string(), min_delay).await;
            }
            Err(e) => self.on_failed(&job, &e.to_string()).await,
        }
    }

    /// Count a verified item, then move it into the save directory
    pub(crate) async fn on_verified(&self, job: &ItemJob, path: PathBuf) {
        let record = self.with_state(|state| {
            state.stats.record(job.media.kind, ItemState::Verified, &job.file_name);
            state.registry.record_completed_item(&job.key, &job.file_name)
        });
        if record == ItemRecord::Rejected {
            tracing::warn!(key = %job.key, item = %job.file_name, "verified item not counted");
        }

        match move_to_save_directory(&path, &job.save_path).await {
            Ok(saved) => {
                tracing::info!(key = %job.key, item = %job.file_name, path = ?saved, "item complete");
                self.emit_event(Event::ItemComplete {
                    key: job.key.clone(),
                    item: job.file_name.clone(),
                    path: saved.clone(),
                });
                if let (Some(uploader), Some(destination)) =
                    (&self.uploader, job.options.upload_to.as_deref())
                {
                    uploader.on_downloaded(&saved, &job.media, destination).await;
                }
            }
            Err(e) => {
                // The bytes are verified; only the final move failed
                tracing::error!(
                    key = %job.key,
                    item = %job.file_name,
                    error = %e,
                    "failed to move verified file to the save directory, retrying at next start"
                );
                self.with_state(|state| {
                    state
                        .registry
                        .add_pending_move(path.clone(), job.save_path.clone());
                    state
                        .registry
                        .record_error(&job.key, Some(&job.file_name), e.to_string());
                });
                self.emit_event(Event::ItemFailed {
                    key: job.key.clone(),
                    item: job.file_name.clone(),
                    error: e.to_string(),
                });
                if record != ItemRecord::TargetComplete {
                    self.persist_history().await;
                }
            }
        }

        if record == ItemRecord::TargetComplete {
            self.after_complete(&job.key).await;
        }
        self.settle_claim(job, true).await;
        self.finish_item(job.run);
    }

    /// Count an item whose identical file is already in the save directory
    pub(crate) async fn on_duplicate(&self, job: &ItemJob) {
        self.count_skipped(job, "already downloaded".to_string()).await;
        self.settle_claim(job, true).await;
        self.finish_item(job.run);
    }

    /// Count an item another target's job has just transferred
    async fn on_shared(&self, job: &ItemJob, owner: &CanonicalKey) {
        tracing::info!(key = %job.key, item = %job.file_name, owner = %owner, "item downloaded by another target");
        self.count_skipped(job, format!("downloaded for {owner}")).await;
        self.finish_item(job.run);
    }

    async fn count_skipped(&self, job: &ItemJob, reason: String) {
        let record = self.with_state(|state| {
            state.stats.record(job.media.kind, ItemState::Skipped, &job.file_name);
            state.registry.record_completed_item(&job.key, &job.file_name)
        });
        self.emit_event(Event::ItemSkipped {
            key: job.key.clone(),
            item: job.file_name.clone(),
            reason,
        });

        if record == ItemRecord::TargetComplete {
            self.after_complete(&job.key).await;
        }
    }

    /// Release the claim `job` holds on its temp path
    ///
    /// Jobs of other targets waiting on it are counted as done when the bytes
    /// were verified; otherwise they are dispatched again and the first of
    /// them takes the claim over.
    async fn settle_claim(&self, job: &ItemJob, verified: bool) {
        let claim = self.with_state(|state| {
            let owned = state
                .claims
                .get(&job.temp_path)
                .is_some_and(|claim| claim.owned_by(job));
            if owned {
                state.claims.remove(&job.temp_path)
            } else {
                None
            }
        });
        let Some(claim) = claim else {
            return;
        };

        if let Some(status) = &claim.status {
            self.close_status(status, &job.file_name, verified).await;
        }
        for waiter in claim.waiters {
            if verified {
                self.on_shared(&waiter, &job.key).await;
            } else {
                self.dispatch(waiter);
            }
        }
    }

    /// Re-submit the item after a backoff, or give up once retries run out
    async fn on_retryable(&self, job: ItemJob, reason: String, min_delay: Option<Duration>) {
        let max = self.config.download.max_download_retries;
        self.with_state(|state| {
            state
                .registry
                .record_error(&job.key, Some(&job.file_name), reason.clone());
        });

        if job.retry.count >= max {
            tracing::error!(
                key = %job.key,
                item = %job.file_name,
                attempts = job.retry.count,
                "retries exhausted"
            );
            self.with_state(|state| state.registry.release_in_flight(&job.key));
            self.on_failed(&job, &format!("{reason} (max retries reached: {max})"))
                .await;
            return;
        }

        let retry = RetryState {
            id: Some(job.message.id),
            count: job.retry.count + 1,
        };
        let delay = backoff_delay(&self.config.retry, retry.count).max(min_delay.unwrap_or_default());
        tracing::warn!(
            key = %job.key,
            item = %job.file_name,
            reason = %reason,
            attempt = retry.count,
            max_attempts = max,
            delay_ms = delay.as_millis() as u64,
            "item will be retried"
        );
        self.emit_event(Event::ItemRetry {
            key: job.key.clone(),
            item: job.file_name.clone(),
            attempt: retry.count,
            max_attempts: max,
        });
        self.set_claim_state(&job, ItemState::Mismatched);

        tokio::time::sleep(delay).await;

        match job.origin {
            JobOrigin::Message => {
                self.schedule_item(
                    job.key.clone(),
                    job.run,
                    job.origin,
                    job.message.clone(),
                    job.options.clone(),
                    retry,
                );
            }
            JobOrigin::Link { single } => {
                match self.client.resolve_reference(job.key.as_str(), single).await {
                    Ok(resolved) => match retry_filter(resolved.items, &retry).pop() {
                        Some(message) => {
                            self.schedule_item(
                                job.key.clone(),
                                job.run,
                                job.origin,
                                message,
                                job.options.clone(),
                                retry,
                            );
                        }
                        None => {
                            self.on_failed(&job, "message is no longer available").await;
                            return;
                        }
                    },
                    Err(e) => {
                        if e.is_fatal() {
                            self.enter_fatal(&Error::Remote(e.clone()));
                        }
                        self.on_failed(&job, &ResolveFailure::from_remote(&e).to_string())
                            .await;
                        return;
                    }
                }
            }
        }

        // The re-resolved message landed on another path, or was skipped outright
        let stale = self.with_state(|state| {
            state
                .claims
                .get(&job.temp_path)
                .is_some_and(|claim| claim.owned_by(&job) && claim.state == ItemState::Mismatched)
        });
        if stale {
            self.settle_claim(&job, false).await;
        }
    }

    /// Record a terminal failure of one item; its siblings continue
    pub(crate) async fn on_failed(&self, job: &ItemJob, error: &str) {
        tracing::error!(key = %job.key, item = %job.file_name, error, "item failed");
        self.with_state(|state| {
            state
                .registry
                .record_error(&job.key, Some(&job.file_name), error);
            state.stats.record(job.media.kind, ItemState::Failed, &job.file_name);
        });
        self.emit_event(Event::ItemFailed {
            key: job.key.clone(),
            item: job.file_name.clone(),
            error: error.to_string(),
        });
        self.settle_claim(job, false).await;
        self.finish_item(job.run);
    }

    /// The target just became done
    async fn after_complete(&self, key: &CanonicalKey) {
        self.with_state(|state| state.registry.release_in_flight(key));
        self.emit_event(Event::TargetComplete { key: key.clone() });
        self.persist_history().await;

        if let Some(notifier) = &self.notifier {
            notifier.notify(&format!("\"{key}\" download complete.")).await;
        }
    }

    /// One item of submission `run` reached a terminal state
    ///
    /// Once every item of every submission of the target has, the in-flight
    /// marker is dropped whether or not the target completed, so a later
    /// submission can try again.
    pub(crate) fn finish_item(&self, run: u64) {
        let released = self.with_state(|state| {
            let run_entry = state.runs.get_mut(&run)?;
            run_entry.outstanding = run_entry.outstanding.saturating_sub(1);
            if run_entry.outstanding > 0 {
                return None;
            }
            let done = state.runs.remove(&run)?;
            if state.runs.values().any(|other| other.key == done.key) {
                return None;
            }
            state
                .registry
                .release_in_flight(&done.key)
                .then_some(done.key)
        });
        if let Some(key) = released {
            tracing::debug!(key = %key, "all items settled, target no longer in flight");
        }
    }

    /// Stop intake after a process-level failure
    ///
    /// Transfers already admitted run to their end. Only the first failure is kept.
    pub(crate) fn enter_fatal(&self, err: &Error) {
        let message = err.to_string();
        let first = self.with_state(|state| {
            if state.fatal.is_some() {
                return false;
            }
            state.fatal = Some(message.clone());
            true
        });
        self.accepting_new.store(false, Ordering::SeqCst);

        if first {
            tracing::error!(error = %message, "fatal error, no longer accepting new targets");
            self.emit_event(Event::Fatal { error: message });
        }
    }
}
