use super::test_helpers::*;
use super::*;
use crate::canonical::canonicalize;
use crate::error::RemoteError;
use crate::types::{
    ErrorKey, LinkType, MediaKind, RemoteMessage, ResolvedTarget, TargetOptions, TargetResult,
};
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::broadcast;


/// Drain every event received so far
fn drain(events: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// Create a target and wait until its items have settled
async fn download(downloader: &MediaDownloader, link: &str) -> TargetResult {
    let result = downloader
        .create_target(link, TargetOptions::default())
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(10), downloader.wait_for_idle())
        .await
        .expect("downloader did not become idle");
    result
}

/// Save path of a video message created by `media_message`
fn saved_video(dir: &tempfile::TempDir, id: i64) -> std::path::PathBuf {
    dir.path()
        .join("downloads")
        .join(format!("{id} - clip{id}.mp4"))
}
