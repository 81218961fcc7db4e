//! Collaborator interfaces
//!
//! The engine does not speak any remote protocol itself. A [`RemoteClient`]
//! resolves references, streams objects and reads chat history; a
//! [`Notifier`] receives "target complete" messages; an [`Uploader`] takes
//! finished files. All three are supplied by the embedding application.

use crate::error::RemoteError;
use crate::types::{ChatRef, DateRange, MediaItem, RemoteMessage, ResolvedTarget};
use futures::stream::BoxStream;
use std::path::Path;

/// Ordered stream of byte chunks for one remote object
///
/// Every chunk except the last has exactly the configured chunk size.
pub type ChunkStream = BoxStream<'static, std::result::Result<Vec<u8>, RemoteError>>;

/// Remote protocol client consumed by the downloader
#[async_trait::async_trait]
pub trait RemoteClient: Send + Sync {
    /// Resolve a textual reference to its chat, link type and messages
    ///
    /// With `single` set, an album reference resolves to the referenced
    /// message only.
    async fn resolve_reference(
        &self,
        reference: &str,
        single: bool,
    ) -> std::result::Result<ResolvedTarget, RemoteError>;

    /// Stream an object starting at chunk index `start_chunk`
    async fn stream_object(
        &self,
        item: &MediaItem,
        start_chunk: u64,
    ) -> std::result::Result<ChunkStream, RemoteError>;

    /// Messages of a chat inside `range`, newest first, at most `limit` when set
    async fn history(
        &self,
        chat: &ChatRef,
        range: &DateRange,
        limit: Option<usize>,
    ) -> std::result::Result<Vec<RemoteMessage>, RemoteError>;

    /// Send a text message, returning its id
    async fn send_message(&self, chat: &ChatRef, text: &str)
    -> std::result::Result<i64, RemoteError>;

    /// Replace the text of a previously sent message
    async fn edit_message(
        &self,
        chat: &ChatRef,
        message_id: i64,
        text: &str,
    ) -> std::result::Result<(), RemoteError>;
}

/// Receives a message whenever a target completes
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `text`; failures are the notifier's own concern
    async fn notify(&self, text: &str);
}

/// Takes files once they reached their save path
#[async_trait::async_trait]
pub trait Uploader: Send + Sync {
    /// Called after a successful download and relocation
    async fn on_downloaded(&self, path: &Path, item: &MediaItem, upload_to: &str);
}
