//! In-memory remote and message fixtures

use chrono::{TimeZone, Utc};
use futures::StreamExt;
use media_dl::{
    ChatRef, ChunkStream, DateRange, LinkType, MediaItem, MediaKind, RemoteClient, RemoteError,
    RemoteMessage, canonicalize, types::ResolvedTarget,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Chunk size every fixture is built around
pub const TEST_CHUNK_SIZE: usize = 4;

/// Remote serving registered targets and objects from memory
///
/// Streams of a message can be cut short a configured number of times,
/// which is how size mismatches are produced.
#[derive(Default)]
pub struct FakeRemote {
    targets: Mutex<HashMap<String, ResolvedTarget>>,
    objects: Mutex<HashMap<i64, Vec<u8>>>,
    short_streams: Mutex<HashMap<i64, usize>>,
    requests: Mutex<Vec<(i64, u64)>>,
    chunk_delay: Mutex<Duration>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

struct OpenStream(Arc<AtomicUsize>);

impl Drop for OpenStream {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `count` video messages of `size` bytes behind `link`
    pub fn add_album(&self, link: &str, first_id: i64, count: i64, size: usize) -> Vec<RemoteMessage> {
        let messages: Vec<RemoteMessage> = (first_id..first_id + count)
            .map(|id| video_message(id, size as u64))
            .collect();
        for message in &messages {
            self.objects
                .lock()
                .unwrap()
                .insert(message.id, object_bytes(size, message.id));
        }
        self.targets.lock().unwrap().insert(
            canonicalize(link).to_string(),
            ResolvedTarget {
                chat_id: CHAT_ID,
                link_type: if count > 1 {
                    LinkType::Album
                } else {
                    LinkType::Single
                },
                items: messages.clone(),
            },
        );
        messages
    }

    /// End the next `times` streams of `message_id` after a single chunk
    pub fn cut_short(&self, message_id: i64, times: usize) {
        self.short_streams.lock().unwrap().insert(message_id, times);
    }

    pub fn set_chunk_delay(&self, delay: Duration) {
        *self.chunk_delay.lock().unwrap() = delay;
    }

    /// `(message id, start chunk)` of every stream request
    pub fn requests(&self) -> Vec<(i64, u64)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn peak_streams(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RemoteClient for FakeRemote {
    async fn resolve_reference(
        &self,
        reference: &str,
        single: bool,
    ) -> Result<ResolvedTarget, RemoteError> {
        let key = canonicalize(reference).to_string();
        let base = key.split('?').next().unwrap_or_default().to_string();
        let mut resolved = self
            .targets
            .lock()
            .unwrap()
            .get(&base)
            .cloned()
            .ok_or_else(|| RemoteError::MessageNotFound(reference.to_string()))?;
        if single {
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
        let bytes = self
            .objects
            .lock()
            .unwrap()
            .get(&item.message_id)
            .cloned()
            .ok_or_else(|| RemoteError::MessageNotFound(item.message_id.to_string()))?;

        let cut = {
            let mut short = self.short_streams.lock().unwrap();
            match short.get_mut(&item.message_id) {
                Some(left) if *left > 0 => {
                    *left -= 1;
                    true
                }
                _ => false,
            }
        };

        let offset = (start_chunk as usize * TEST_CHUNK_SIZE).min(bytes.len());
        let mut chunks: Vec<Vec<u8>> = bytes[offset..]
            .chunks(TEST_CHUNK_SIZE)
            .map(<[u8]>::to_vec)
            .collect();
        if cut {
            chunks.truncate(1);
        }

        let open = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(open, Ordering::SeqCst);
        let guard = OpenStream(Arc::clone(&self.active));
        let delay = *self.chunk_delay.lock().unwrap();

        let stream = futures::stream::unfold(
            (chunks.into_iter(), guard),
            move |(mut chunks, guard)| async move {
                let chunk = chunks.next()?;
                tokio::time::sleep(delay).await;
                Some((Ok(chunk), (chunks, guard)))
            },
        );
        Ok(stream.boxed())
    }

    async fn history(
        &self,
        _chat: &ChatRef,
        _range: &DateRange,
        _limit: Option<usize>,
    ) -> Result<Vec<RemoteMessage>, RemoteError> {
        Ok(Vec::new())
    }

    async fn send_message(&self, _chat: &ChatRef, _text: &str) -> Result<i64, RemoteError> {
        Ok(1)
    }

    async fn edit_message(
        &self,
        _chat: &ChatRef,
        _message_id: i64,
        _text: &str,
    ) -> Result<(), RemoteError> {
        Ok(())
    }
}

/// Chat every fixture message belongs to
pub const CHAT_ID: i64 = -1_001_234_567;

/// Video message named `movie<id>.mp4` in the `fixtures` channel
pub fn video_message(id: i64, size: u64) -> RemoteMessage {
    RemoteMessage {
        chat_id: CHAT_ID,
        chat_username: Some("fixtures".to_string()),
        id,
        date: Utc.with_ymd_and_hms(2025, 2, 1, 8, 0, 0).unwrap(),
        text: None,
        caption: None,
        media: Some(MediaItem {
            chat_id: CHAT_ID,
            message_id: id,
            kind: MediaKind::Video,
            file_name: Some(format!("movie{id}.mp4")),
            file_unique_id: Some(format!("u{id}")),
            mime_type: Some("video/mp4".to_string()),
            file_size: size,
        }),
        link: Some(format!("https://t.me/fixtures/{id}")),
        from_bot: false,
    }
}

/// Deterministic object contents
pub fn object_bytes(size: usize, id: i64) -> Vec<u8> {
    (0..size).map(|i| (i as u8) ^ (id as u8)).collect()
}

/// File name the engine gives `video_message(id, _)`
pub fn video_file_name(id: i64) -> String {
    format!("{id} - movie{id}.mp4")
}
