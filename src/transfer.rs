//! Resumable chunked transfer of one remote object
//!
//! An object is streamed into a staging file (`<final path>.temp`) and
//! moved to its final path once the byte count matches the size the remote
//! reported. A staging file left behind by an interrupted or mismatched
//! attempt is picked up by the next one, which asks the remote to continue
//! from the first chunk not yet on disk.
//!
//! The remote addresses objects by chunk, not by byte, so resumption is
//! chunk-granular: a staging file whose length is not a multiple of the
//! chunk size is cut back to the last chunk boundary before appending.

use crate::client::RemoteClient;
use crate::error::Result;
use crate::types::MediaItem;
use crate::utils::{file_size, move_file, staging_path};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Result of one call to [`resume`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The final file (or a complete staging file) was already on disk; nothing was streamed
    AlreadyComplete {
        /// Final path
        path: PathBuf,
    },
    /// The object was streamed and verified
    Completed {
        /// Final path
        path: PathBuf,
        /// Bytes streamed by this call (excludes resumed bytes)
        streamed: u64,
    },
    /// The stream ended at the wrong size; the staging file is kept for the next attempt
    Mismatched {
        /// Staging file holding the partial contents
        staging: PathBuf,
        /// Bytes on disk after the stream ended
        downloaded: u64,
        /// Size the remote reported
        expected: u64,
    },
}

impl TransferOutcome {
    /// Whether the file is now at its final path
    pub fn is_verified(&self) -> bool {
        !matches!(self, TransferOutcome::Mismatched { .. })
    }

    /// Bytes streamed by this call
    pub fn streamed(&self) -> u64 {
        match self {
            TransferOutcome::Completed { streamed, .. } => *streamed,
            _ => 0,
        }
    }
}

/// Stream `item` into `final_path`, resuming any earlier partial transfer
///
/// `expected_size` of `None` skips verification. `progress` is called with
/// the running byte count (resumed bytes included) after every chunk.
///
/// Errors from the remote stream are returned as-is, with everything
/// received so far left in the staging file. Failing to move a complete
/// staging file surfaces as [`Error::Relocation`](crate::error::Error::Relocation).
pub async fn resume<F>(
    client: &dyn RemoteClient,
    item: &MediaItem,
    final_path: &Path,
    expected_size: Option<u64>,
    chunk_size: u64,
    mut progress: F,
) -> Result<TransferOutcome>
where
    F: FnMut(u64) + Send,
{
    let chunk_size = chunk_size.max(1);
    let staging = staging_path(final_path);
    if let Some(parent) = final_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    if let Some(size) = file_size(final_path).await {
        match expected_size {
            None => {
                return Ok(TransferOutcome::AlreadyComplete {
                    path: final_path.to_path_buf(),
                });
            }
            Some(expected) if size == expected => {
                tracing::debug!(path = ?final_path, size, "final file already complete");
                return Ok(TransferOutcome::AlreadyComplete {
                    path: final_path.to_path_buf(),
                });
            }
            Some(expected) => {
                tracing::warn!(
                    path = ?final_path,
                    size,
                    expected,
                    "final file has the wrong size, resuming it as a partial transfer"
                );
                tokio::fs::rename(final_path, &staging).await?;
            }
        }
    }

    let mut already = file_size(&staging).await.unwrap_or(0);
    if let Some(expected) = expected_size {
        if already > 0 && already == expected {
            move_file(&staging, final_path).await?;
            tracing::debug!(path = ?final_path, "staging file already complete");
            return Ok(TransferOutcome::AlreadyComplete {
                path: final_path.to_path_buf(),
            });
        }
        if already > expected {
            tracing::warn!(
                staging = ?staging,
                size = already,
                expected,
                "staging file larger than the remote object, restarting from zero"
            );
            tokio::fs::remove_file(&staging).await?;
            already = 0;
        }
    }

    let aligned = already - already % chunk_size;
    let mut file = if aligned > 0 {
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .open(&staging)
            .await?;
        if aligned != already {
            tracing::debug!(
                staging = ?staging,
                size = already,
                aligned,
                "truncating partial chunk before resuming"
            );
            file.set_len(aligned).await?;
        }
        drop(file);
        tokio::fs::OpenOptions::new()
            .append(true)
            .open(&staging)
            .await?
    } else {
        tokio::fs::File::create(&staging).await?
    };

    let start_chunk = aligned / chunk_size;
    tracing::debug!(
        chat_id = item.chat_id,
        message_id = item.message_id,
        start_chunk,
        resumed_bytes = aligned,
        "streaming object"
    );

    let mut downloaded = aligned;
    let streamed = async {
        let mut stream = client.stream_object(item, start_chunk).await?;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            progress(downloaded);
        }
        Ok::<(), crate::error::Error>(())
    }
    .await;
    file.flush().await?;
    drop(file);
    streamed?;

    match expected_size {
        Some(expected) if downloaded != expected => {
            tracing::warn!(
                staging = ?staging,
                downloaded,
                expected,
                "downloaded size does not match the remote object"
            );
            Ok(TransferOutcome::Mismatched {
                staging,
                downloaded,
                expected,
            })
        }
        _ => {
            move_file(&staging, final_path).await?;
            Ok(TransferOutcome::Completed {
                path: final_path.to_path_buf(),
                streamed: downloaded - aligned,
            })
        }
    }
}
