//! Custom test assertions for integration tests

use media_dl::{CanonicalKey, Event, MediaDownloader};
use std::path::Path;
use std::time::Duration;
use tokio::sync::broadcast;

/// Result of waiting for a target to settle
#[derive(Debug)]
pub enum WaitResult {
    /// Every item of the target completed
    Completed,
    /// An item failed permanently
    Failed(String),
    /// Timeout waiting for completion
    Timeout,
    /// Channel closed unexpectedly
    ChannelClosed,
}

/// Wait on an existing subscription until `key` completes or one of its items fails
pub async fn wait_for_target(
    events: &mut broadcast::Receiver<Event>,
    key: &CanonicalKey,
    timeout: Duration,
) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::TargetComplete { key: done }) if &done == key => {
                    return WaitResult::Completed;
                }
                Ok(Event::ItemFailed {
                    key: failed, error, ..
                }) if &failed == key => {
                    return WaitResult::Failed(error);
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return WaitResult::ChannelClosed,
            }
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Collect events until the downloader is idle
pub async fn collect_until_idle(
    downloader: &MediaDownloader,
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
) -> Vec<Event> {
    tokio::time::timeout(timeout, downloader.wait_for_idle())
        .await
        .expect("downloader did not become idle");

    let mut collected = Vec::new();
    while let Ok(event) = events.try_recv() {
        collected.push(event);
    }
    collected
}

/// Assert that files exist in the download directory
pub fn assert_files_exist(dir: &Path, expected_files: &[String]) {
    for filename in expected_files {
        let path = dir.join(filename);
        assert!(path.exists(), "Expected file not found: {}", path.display());
    }
}
