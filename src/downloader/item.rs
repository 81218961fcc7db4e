//! Per-item scheduling - kind checks, item claims, duplicate detection,
//! admission and transfer.
//!
//! Two targets can cover the same message, e.g. an album and a `?single`
//! link into it. Both map to the same temp path, so each path is claimed by
//! one job at a time. Jobs of other targets wait on the claim and are settled
//! with the owner's outcome.

use crate::error::Error;
use crate::naming;
use crate::transfer;
use crate::types::{
    CanonicalKey, Event, ItemState, MediaItem, MediaKind, RemoteMessage, RetryState,
    TargetOptions,
};
use crate::utils::is_file_duplicate;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::hash_map::Entry;
use std::path::PathBuf;
use tokio::sync::watch;

use super::{ItemClaim, MediaDownloader};

/// Where a target's items came from, which decides how retries re-submit them
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum JobOrigin {
    /// Resolved from a link; retries resolve the link again
    Link {
        /// Whether resolution was restricted to the referenced message
        single: bool,
    },
    /// Built from a message already in hand; retries reuse it
    Message,
}

/// One item of a target on its way through admission
#[derive(Clone, Debug)]
pub(crate) struct ItemJob {
    pub(crate) key: CanonicalKey,
    /// Submission of the target this job belongs to
    pub(crate) run: u64,
    pub(crate) origin: JobOrigin,
    pub(crate) message: RemoteMessage,
    pub(crate) media: MediaItem,
    pub(crate) file_name: String,
    /// Final path of the transfer, inside the per-chat temp directory
    pub(crate) temp_path: PathBuf,
    /// Where the finished file is moved to
    pub(crate) save_path: PathBuf,
    pub(crate) options: TargetOptions,
    pub(crate) retry: RetryState,
}

impl MediaDownloader {
    /// Check one message of a target and spawn its transfer
    ///
    /// Messages without media, or with media of a kind that is not enabled,
    /// reach a terminal state right here.
    pub(crate) fn schedule_item(
        &self,
        key: CanonicalKey,
        run: u64,
        origin: JobOrigin,
        message: RemoteMessage,
        options: TargetOptions,
        retry: RetryState,
    ) {
        let Some(media) = message.media.clone() else {
            let item = message.id.to_string();
            let error = Error::UnsupportedMedia("message carries no media".to_string());
            tracing::debug!(key = %key, message_id = message.id, "message carries no media");
            self.with_state(|state| {
                state
                    .registry
                    .record_error(&key, Some(&item), error.to_string());
            });
            self.emit_event(Event::ItemSkipped {
                key: key.clone(),
                item,
                reason: "no media".to_string(),
            });
            self.finish_item(run);
            return;
        };

        let file_name = naming::file_name(&media, message.date);
        if !self.kind_enabled(media.kind, &options) {
            tracing::info!(
                key = %key,
                item = %file_name,
                kind = %media.kind,
                "media kind not enabled, skipping"
            );
            let error = Error::UnsupportedMedia(media.kind.to_string());
            self.with_state(|state| {
                state
                    .registry
                    .record_error(&key, Some(&file_name), error.to_string());
                state.stats.record(media.kind, ItemState::Skipped, &file_name);
            });
            self.emit_event(Event::ItemSkipped {
                key: key.clone(),
                item: file_name,
                reason: format!("{} downloads are not enabled", media.kind),
            });
            self.finish_item(run);
            return;
        }

        let temp_path = self
            .config
            .temp_dir()
            .join(media.chat_id.to_string())
            .join(&file_name);
        let save_path = self.config.download_dir().join(&file_name);

        let job = ItemJob {
            key,
            run,
            origin,
            message,
            media,
            file_name,
            temp_path,
            save_path,
            options,
            retry,
        };
        tracing::debug!(
            key = %job.key,
            item = %job.file_name,
            attempt = job.retry.count,
            "item pending admission"
        );
        self.dispatch(job);
    }

    /// Spawn the transfer of `job` unless another target's job holds its temp path
    ///
    /// A retry of the claim owner takes the claim back over; any other job is
    /// parked on the claim until the owner settles.
    pub(crate) fn dispatch(&self, job: ItemJob) {
        let job = self.with_state(move |state| match state.claims.entry(job.temp_path.clone()) {
            Entry::Occupied(mut entry) if !entry.get().owned_by(&job) => {
                tracing::info!(
                    key = %job.key,
                    item = %job.file_name,
                    owner = %entry.get().key,
                    "item already being downloaded by another target, waiting"
                );
                entry.get_mut().waiters.push(job);
                None
            }
            Entry::Occupied(mut entry) => {
                entry.get_mut().state = ItemState::Pending;
                Some(job)
            }
            Entry::Vacant(entry) => {
                entry.insert(ItemClaim {
                    run: job.run,
                    message_id: job.message.id,
                    key: job.key.clone(),
                    item: job.file_name.clone(),
                    state: ItemState::Pending,
                    waiters: Vec::new(),
                    status: None,
                });
                Some(job)
            }
        });
        if let Some(job) = job {
            self.tasks.spawn(self.clone().run_item(job));
        }
    }

    /// Update the reported state of the claim `job` owns
    pub(crate) fn set_claim_state(&self, job: &ItemJob, item_state: ItemState) {
        self.with_state(|state| {
            if let Some(claim) = state.claims.get_mut(&job.temp_path)
                && claim.owned_by(job)
            {
                claim.state = item_state;
            }
        });
    }

    fn kind_enabled(&self, kind: MediaKind, options: &TargetOptions) -> bool {
        if kind == MediaKind::Unknown {
            return false;
        }
        options
            .download_types
            .as_ref()
            .unwrap_or(&self.config.download.download_types)
            .contains(&kind)
    }

    /// Transfer one item under an admission slot
    ///
    /// Boxed because retries spawn it again from inside its own outcome handling.
    pub(crate) fn run_item(self, job: ItemJob) -> BoxFuture<'static, ()> {
        async move {
            let expected = job.media.file_size;

            // An identical file in the save directory counts as done without transferring
            if expected > 0 && is_file_duplicate(&job.save_path, expected).await {
                tracing::info!(
                    key = %job.key,
                    item = %job.file_name,
                    path = ?job.save_path,
                    "file already downloaded, skipping"
                );
                self.on_duplicate(&job).await;
                return;
            }

            let permit = match self.gate.acquire().await {
                Ok(permit) => permit,
                Err(e) => {
                    self.on_failed(&job, &e.to_string()).await;
                    return;
                }
            };
            self.set_claim_state(&job, ItemState::Active);

            tracing::info!(
                key = %job.key,
                item = %job.file_name,
                size = expected,
                attempt = job.retry.count,
                "item admitted"
            );
            self.emit_event(Event::ItemStarted {
                key: job.key.clone(),
                item: job.file_name.clone(),
                total: expected,
            });

            let status = self.open_status(&job).await;
            let (progress_tx, progress_rx) = watch::channel(0u64);
            let event_tx = self.event_tx.clone();
            let progress_key = job.key.clone();
            let progress_item = job.file_name.clone();
            let transfer = transfer::resume(
                self.client.as_ref(),
                &job.media,
                &job.temp_path,
                (expected > 0).then_some(expected),
                self.config.download.chunk_size,
                move |downloaded| {
                    event_tx
                        .send(Event::Downloading {
                            key: progress_key.clone(),
                            item: progress_item.clone(),
                            downloaded,
                            total: expected,
                        })
                        .ok();
                    progress_tx.send_replace(downloaded);
                },
            );
            let outcome = match &status {
                Some(status) => {
                    let reporter = self.report_progress(status, &job, progress_rx);
                    tokio::join!(transfer, reporter).0
                }
                None => transfer.await,
            };

            self.handle_outcome(job, permit, outcome).await;
        }
        .boxed()
    }
}

/// Keep only the message a retry is about
///
/// A first attempt keeps everything. A retry keeps the message whose id the
/// retry state names, so re-resolving an album re-submits just that item.
pub(crate) fn retry_filter(items: Vec<RemoteMessage>, retry: &RetryState) -> Vec<RemoteMessage> {
    match retry.id {
        Some(id) if retry.is_retry() => items.into_iter().filter(|m| m.id == id).collect(),
        _ => items,
    }
}
