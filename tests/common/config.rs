//! Test configuration helpers for creating downloaders over the fake remote

use super::fixtures::{FakeRemote, TEST_CHUNK_SIZE};
use media_dl::{Config, MediaDownloader};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Configuration rooted in `root` with instant retries
pub fn create_test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.download.download_dir = root.join("downloads");
    config.download.temp_dir = root.join("temp");
    config.download.chunk_size = TEST_CHUNK_SIZE as u64;
    config.download.max_concurrent_downloads = 2;
    config.download.max_download_retries = 3;
    config.download.shutdown_timeout = Duration::from_secs(5);
    config.persistence.history_path = root.join("state").join("history.json");
    config.retry.initial_delay = Duration::ZERO;
    config.retry.jitter = false;
    config
}

/// Downloader over a fresh [`FakeRemote`]
///
/// The temp dir must be kept alive for the duration of the test.
pub async fn create_test_downloader() -> (MediaDownloader, Arc<FakeRemote>, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let remote = FakeRemote::new();
    let downloader = MediaDownloader::new(create_test_config(temp_dir.path()), remote.clone())
        .await
        .unwrap();
    (downloader, remote, temp_dir)
}
