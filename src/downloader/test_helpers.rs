//! Shared test helpers: an in-memory remote client and downloader setup.

use crate::client::{ChunkStream, Notifier, RemoteClient, Uploader};
use crate::config::Config;
use crate::downloader::MediaDownloader;
use crate::error::RemoteError;
use crate::types::{
    ChatRef, DateRange, LinkType, MediaItem, MediaKind, RemoteMessage, ResolvedTarget,
};
use chrono::{TimeZone, Utc};
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;

/// How one `stream_object` call behaves
#[derive(Clone, Debug)]
pub(crate) enum StreamBehavior {
    /// Deliver every remaining chunk
    Full,
    /// Deliver at most this many chunks, then end the stream cleanly
    Truncated(usize),
    /// Deliver this many chunks, then yield the error
    FailAfter(usize, RemoteError),
    /// Fail before any chunk is delivered
    FailToStart(RemoteError),
}

/// Decrements the active stream count when the stream is dropped
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory [`RemoteClient`]
pub(crate) struct MockRemote {
    chunk_size: usize,
    chunk_delay: Mutex<Duration>,
    objects: Mutex<HashMap<(i64, i64), Vec<u8>>>,
    scripts: Mutex<HashMap<i64, VecDeque<StreamBehavior>>>,
    requests: Mutex<Vec<(i64, u64)>>,
    targets: Mutex<HashMap<String, Result<ResolvedTarget, RemoteError>>>,
    resolve_calls: Mutex<Vec<(String, bool)>>,
    history: Mutex<Vec<RemoteMessage>>,
    replies: Mutex<Vec<RemoteMessage>>,
    sent: Mutex<Vec<(ChatRef, String)>>,
    edits: Mutex<Vec<(i64, String)>>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl MockRemote {
    pub(crate) fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            chunk_delay: Mutex::new(Duration::ZERO),
            objects: Mutex::new(HashMap::new()),
            scripts: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            targets: Mutex::new(HashMap::new()),
            resolve_calls: Mutex::new(Vec::new()),
            history: Mutex::new(Vec::new()),
            replies: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            edits: Mutex::new(Vec::new()),
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sleep this long before every chunk
    pub(crate) fn set_chunk_delay(&self, delay: Duration) {
        *self.chunk_delay.lock().unwrap() = delay;
    }

    /// Register the bytes behind a message's media
    pub(crate) fn add_object(&self, message: &RemoteMessage, content: Vec<u8>) {
        self.objects
            .lock()
            .unwrap()
            .insert((message.chat_id, message.id), content);
    }

    /// Queue behaviours for successive streams of one message
    pub(crate) fn script(&self, message_id: i64, behaviors: impl IntoIterator<Item = StreamBehavior>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(message_id)
            .or_default()
            .extend(behaviors);
    }

    /// Resolution result for a link (matched by canonical key)
    pub(crate) fn add_target(&self, link: &str, result: Result<ResolvedTarget, RemoteError>) {
        let key = crate::canonical::canonicalize(link).to_string();
        self.targets.lock().unwrap().insert(key, result);
    }

    pub(crate) fn add_history(&self, message: RemoteMessage) {
        self.history.lock().unwrap().push(message);
    }

    /// Messages that appear in history once anything is sent
    pub(crate) fn set_replies(&self, replies: Vec<RemoteMessage>) {
        *self.replies.lock().unwrap() = replies;
    }

    /// `(message id, start chunk)` of every stream request, in order
    pub(crate) fn stream_requests(&self) -> Vec<(i64, u64)> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn resolve_calls(&self) -> Vec<(String, bool)> {
        self.resolve_calls.lock().unwrap().clone()
    }

    pub(crate) fn sent(&self) -> Vec<(ChatRef, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// `(message id, text)` of every edit, in order
    pub(crate) fn edits(&self) -> Vec<(i64, String)> {
        self.edits.lock().unwrap().clone()
    }

    /// Highest number of streams that were open at the same time
    pub(crate) fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

fn chat_matches(chat: &ChatRef, message: &RemoteMessage) -> bool {
    match chat {
        ChatRef::Id(id) => message.chat_id == *id,
        ChatRef::Username(name) => message
            .chat_username
            .as_deref()
            .is_some_and(|u| u.eq_ignore_ascii_case(name)),
    }
}

#[async_trait::async_trait]
impl RemoteClient for MockRemote {
    async fn resolve_reference(
        &self,
        reference: &str,
        single: bool,
    ) -> Result<ResolvedTarget, RemoteError> {
        self.resolve_calls
            .lock()
            .unwrap()
            .push((reference.to_string(), single));
        let key = crate::canonical::canonicalize(reference).to_string();
        let targets = self.targets.lock().unwrap();
        let found = targets
            .get(&key)
            .or_else(|| key.split_once('?').and_then(|(base, _)| targets.get(base)))
            .cloned()
            .unwrap_or_else(|| Err(RemoteError::MessageNotFound(reference.to_string())));
        let mut resolved = found?;
        if single && resolved.items.len() > 1 {
            resolved.items.truncate(1);
            resolved.link_type = LinkType::Single;
        }
        Ok(resolved)
    }

    async fn stream_object(
        &self,
        item: &MediaItem,
        start_chunk: u64,
    ) -> Result<ChunkStream, RemoteError> {
        self.requests
            .lock()
            .unwrap()
            .push((item.message_id, start_chunk));

        let behavior = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&item.message_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(StreamBehavior::Full);
        let content = self
            .objects
            .lock()
            .unwrap()
            .get(&(item.chat_id, item.message_id))
            .cloned()
            .ok_or_else(|| RemoteError::MessageNotFound(item.message_id.to_string()))?;

        let offset = (start_chunk as usize * self.chunk_size).min(content.len());
        let mut chunks: Vec<Result<Vec<u8>, RemoteError>> = content[offset..]
            .chunks(self.chunk_size)
            .map(|c| Ok(c.to_vec()))
            .collect();
        match behavior {
            StreamBehavior::Full => {}
            StreamBehavior::Truncated(n) => chunks.truncate(n),
            StreamBehavior::FailAfter(n, err) => {
                chunks.truncate(n);
                chunks.push(Err(err));
            }
            StreamBehavior::FailToStart(err) => return Err(err),
        }

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let guard = ActiveGuard(Arc::clone(&self.active));
        let delay = *self.chunk_delay.lock().unwrap();

        let stream = futures::stream::unfold(
            (chunks.into_iter(), guard, delay),
            |(mut iter, guard, delay)| async move {
                let next = iter.next()?;
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Some((next, (iter, guard, delay)))
            },
        );
        Ok(stream.boxed())
    }

    async fn history(
        &self,
        chat: &ChatRef,
        range: &DateRange,
        limit: Option<usize>,
    ) -> Result<Vec<RemoteMessage>, RemoteError> {
        let mut messages: Vec<RemoteMessage> = self
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|m| chat_matches(chat, m) && range.contains(m.date))
            .cloned()
            .collect();
        messages.sort_by(|a, b| b.id.cmp(&a.id));
        if let Some(limit) = limit {
            messages.truncate(limit);
        }
        Ok(messages)
    }

    async fn send_message(&self, chat: &ChatRef, text: &str) -> Result<i64, RemoteError> {
        self.sent.lock().unwrap().push((chat.clone(), text.to_string()));
        let replies = std::mem::take(&mut *self.replies.lock().unwrap());
        self.history.lock().unwrap().extend(replies);
        Ok(self.sent.lock().unwrap().len() as i64)
    }

    async fn edit_message(
        &self,
        _chat: &ChatRef,
        message_id: i64,
        text: &str,
    ) -> Result<(), RemoteError> {
        self.edits
            .lock()
            .unwrap()
            .push((message_id, text.to_string()));
        Ok(())
    }
}

/// Notifier that records every message
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    pub(crate) messages: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, text: &str) {
        self.messages.lock().unwrap().push(text.to_string());
    }
}

/// Uploader that records every hand-off
#[derive(Default)]
pub(crate) struct RecordingUploader {
    pub(crate) uploads: Mutex<Vec<(PathBuf, String)>>,
}

#[async_trait::async_trait]
impl Uploader for RecordingUploader {
    async fn on_downloaded(&self, path: &Path, _item: &MediaItem, upload_to: &str) {
        self.uploads
            .lock()
            .unwrap()
            .push((path.to_path_buf(), upload_to.to_string()));
    }
}

/// A video message of `size` bytes named `clip<id>.mp4`
pub(crate) fn media_message(chat_id: i64, id: i64, size: u64) -> RemoteMessage {
    media_message_of(MediaKind::Video, chat_id, id, size)
}

pub(crate) fn media_message_of(kind: MediaKind, chat_id: i64, id: i64, size: u64) -> RemoteMessage {
    RemoteMessage {
        chat_id,
        chat_username: Some("testchan".into()),
        id,
        date: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::minutes(id),
        text: None,
        caption: None,
        media: Some(MediaItem {
            chat_id,
            message_id: id,
            kind,
            file_name: Some(format!("clip{id}.mp4")),
            file_unique_id: Some(format!("uniq{id}")),
            mime_type: Some("video/mp4".into()),
            file_size: size,
        }),
        link: Some(format!("https://t.me/testchan/{id}")),
        from_bot: false,
    }
}

/// Deterministic content of `len` bytes
pub(crate) fn content(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

/// Register `count` messages of `size` bytes as one album behind `link`
pub(crate) fn add_album(
    remote: &MockRemote,
    link: &str,
    chat_id: i64,
    first_id: i64,
    count: i64,
    size: usize,
) -> Vec<RemoteMessage> {
    let messages: Vec<RemoteMessage> = (first_id..first_id + count)
        .map(|id| media_message(chat_id, id, size as u64))
        .collect();
    for message in &messages {
        remote.add_object(message, content(size, message.id as u8));
    }
    let link_type = if count > 1 {
        LinkType::Album
    } else {
        LinkType::Single
    };
    remote.add_target(
        link,
        Ok(ResolvedTarget {
            chat_id,
            link_type,
            items: messages.clone(),
        }),
    );
    messages
}

/// Config rooted in a fresh temp dir, with instant retries
pub(crate) fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.download.download_dir = root.join("downloads");
    config.download.temp_dir = root.join("temp");
    config.download.chunk_size = 4;
    config.download.max_concurrent_downloads = 3;
    config.download.shutdown_timeout = Duration::from_secs(5);
    config.persistence.history_path = root.join("history.json");
    config.download.progress_interval = Duration::ZERO;
    config.retry.initial_delay = Duration::ZERO;
    config.retry.jitter = false;
    config
}

/// Downloader over a [`MockRemote`] with 4-byte chunks.
/// Returns the downloader, the remote and the tempdir (which must be kept alive).
pub(crate) async fn create_test_downloader() -> (MediaDownloader, Arc<MockRemote>, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let config = test_config(temp_dir.path());
    let remote = Arc::new(MockRemote::new(config.download.chunk_size as usize));
    let downloader = MediaDownloader::new(config, remote.clone()).await.unwrap();
    (downloader, remote, temp_dir)
}
