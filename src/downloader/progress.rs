//! Per-item status messages
//!
//! A target created with [`TargetOptions::status_chat`] gets one message per
//! item in that chat. It is sent when the item is first admitted, edited with
//! throttled progress while bytes arrive, and finalized once the item
//! settles. Retries of the same item keep editing the same message.
//!
//! Sending or editing never affects the transfer; failures are logged at
//! debug level and the item carries on without a status message.
//!
//! [`TargetOptions::status_chat`]: crate::TargetOptions::status_chat

use crate::types::ChatRef;
use std::time::Instant;
use tokio::sync::watch;

use super::MediaDownloader;
use super::item::ItemJob;

const BAR_LENGTH: usize = 20;
const MAX_DISPLAY_NAME: usize = 48;

/// A status message sent for one item
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct StatusMessage {
    pub(crate) chat: ChatRef,
    pub(crate) message_id: i64,
}

impl MediaDownloader {
    /// Status message of the item, sending it on the first admission
    pub(crate) async fn open_status(&self, job: &ItemJob) -> Option<StatusMessage> {
        let chat = job.options.status_chat.as_ref()?;
        let existing = self.with_state(|state| {
            state
                .claims
                .get(&job.temp_path)
                .filter(|claim| claim.owned_by(job))
                .and_then(|claim| claim.status.clone())
        });
        if existing.is_some() {
            return existing;
        }

        let text = progress_text(&job.file_name, 0, job.media.file_size, 0.0);
        match self.client.send_message(chat, &text).await {
            Ok(message_id) => {
                let status = StatusMessage {
                    chat: chat.clone(),
                    message_id,
                };
                self.with_state(|state| {
                    if let Some(claim) = state.claims.get_mut(&job.temp_path)
                        && claim.owned_by(job)
                    {
                        claim.status = Some(status.clone());
                    }
                });
                Some(status)
            }
            Err(e) => {
                tracing::debug!(chat = %chat, item = %job.file_name, error = %e, "failed to send status message");
                None
            }
        }
    }

    /// Edit the status message as progress arrives, at most once per interval
    ///
    /// Returns once the sending side of `progress` is dropped.
    pub(crate) async fn report_progress(
        &self,
        status: &StatusMessage,
        job: &ItemJob,
        mut progress: watch::Receiver<u64>,
    ) {
        let interval = self.config.download.progress_interval;
        let total = job.media.file_size;
        let mut last_edit = Instant::now();
        let mut last_bytes = *progress.borrow();

        while progress.changed().await.is_ok() {
            let elapsed = last_edit.elapsed();
            if elapsed < interval {
                continue;
            }
            let downloaded = *progress.borrow_and_update();
            let seconds = elapsed.as_secs_f64();
            let speed = if seconds > 0.0 {
                downloaded.saturating_sub(last_bytes) as f64 / seconds
            } else {
                0.0
            };

            let text = progress_text(&job.file_name, downloaded, total, speed);
            match self
                .client
                .edit_message(&status.chat, status.message_id, &text)
                .await
            {
                Ok(()) => {
                    last_edit = Instant::now();
                    last_bytes = downloaded;
                }
                Err(e) => {
                    tracing::debug!(item = %job.file_name, error = %e, "failed to update status message");
                }
            }
        }
    }

    /// Replace the status message with the item's final outcome
    pub(crate) async fn close_status(&self, status: &StatusMessage, file_name: &str, success: bool) {
        let text = final_text(file_name, success);
        if let Err(e) = self
            .client
            .edit_message(&status.chat, status.message_id, &text)
            .await
        {
            tracing::debug!(item = %file_name, error = %e, "failed to finalize status message");
        }
    }
}

/// Text of a status message while the item transfers
pub(crate) fn progress_text(file_name: &str, downloaded: u64, total: u64, speed: f64) -> String {
    let name = display_name(file_name);
    if total == 0 {
        return format!("Preparing download...\n{name}");
    }

    let ratio = (downloaded as f64 / total as f64).clamp(0.0, 1.0);
    let filled = (ratio * BAR_LENGTH as f64) as usize;
    let bar = format!("{}{}", "#".repeat(filled), "-".repeat(BAR_LENGTH - filled));
    let speed = if speed > 0.0 {
        format!("{}/s", display_size(speed as u64))
    } else {
        "measuring...".to_string()
    };
    format!(
        "Downloading...\n{name}\n[{bar}] {:.1}%\n{} / {}\n{speed}",
        ratio * 100.0,
        display_size(downloaded),
        display_size(total),
    )
}

/// Text of a status message once the item settled
pub(crate) fn final_text(file_name: &str, success: bool) -> String {
    let outcome = if success {
        "Download complete"
    } else {
        "Download failed"
    };
    format!("{outcome}\n{}", display_name(file_name))
}

fn display_name(file_name: &str) -> String {
    if file_name.chars().count() <= MAX_DISPLAY_NAME {
        return file_name.to_string();
    }
    let head: String = file_name.chars().take(MAX_DISPLAY_NAME - 3).collect();
    format!("{head}...")
}

/// Byte count in the largest unit that keeps the value at or above one
fn display_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}
