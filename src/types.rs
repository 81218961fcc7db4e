//! Core types for media-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::error::ResolveFailure;

/// Normalized identity of a target, stable across equivalent spellings
///
/// Produced by [`canonicalize`](crate::canonical::canonicalize) and
/// [`canonicalize_message`](crate::canonical::canonicalize_message).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalKey(pub(crate) String);

impl CanonicalKey {
    /// Wrap a string that is already canonical (e.g. read back from a report)
    pub fn from_canonical(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::borrow::Borrow<str> for CanonicalKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for CanonicalKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// How a target's reference maps onto remote items
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    /// Exactly one message
    Single,
    /// A span of consecutive message ids
    Range,
    /// A grouped media album
    Album,
    /// A message together with its comment thread
    Comment,
    /// A message inside a forum topic
    Topic,
    /// Resolution did not say
    Unknown,
}

/// Key of one entry in [`TaskMeta::errors`]
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKey {
    /// Error attached to one item, keyed by its file name
    Item(String),
    /// Error concerning the target as a whole
    WholeTarget,
}

impl std::fmt::Display for ErrorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKey::Item(name) => f.write_str(name),
            ErrorKey::WholeTarget => f.write_str("all_member"),
        }
    }
}

/// Per-target bookkeeping kept by the [`TaskRegistry`](crate::registry::TaskRegistry)
///
/// The completed count is always derived from the set of completed file names.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskMeta {
    /// Resolved link type (`None` until resolution)
    pub link_type: Option<LinkType>,
    /// Expected number of items (0 until resolution)
    pub member_num: usize,
    pub(crate) file_name: BTreeSet<String>,
    pub(crate) error_msg: BTreeMap<ErrorKey, String>,
}

impl TaskMeta {
    /// Number of distinct completed items
    pub fn complete_num(&self) -> usize {
        self.file_name.len()
    }

    /// File names of the completed items
    pub fn file_names(&self) -> &BTreeSet<String> {
        &self.file_name
    }

    /// Latest error per item (or for the whole target)
    pub fn errors(&self) -> &BTreeMap<ErrorKey, String> {
        &self.error_msg
    }

    /// Error recorded for one item, if any
    pub fn item_error(&self, item: &str) -> Option<&str> {
        self.error_msg
            .get(&ErrorKey::Item(item.to_string()))
            .map(String::as_str)
    }

    /// Every expected item has completed
    pub fn is_done(&self) -> bool {
        self.member_num > 0 && self.complete_num() == self.member_num
    }
}

/// Which item of a target is being retried, and how often it already was
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Message id of the item last attempted (`None` before the first attempt)
    pub id: Option<i64>,
    /// Attempts so far
    pub count: u32,
}

impl RetryState {
    /// Whether this state describes a re-submission rather than a first attempt
    pub fn is_retry(&self) -> bool {
        self.count > 0
    }
}

/// Kind of media carried by a message
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Video file
    Video,
    /// Compressed photo
    Photo,
    /// Arbitrary document
    Document,
    /// Music or other audio file
    Audio,
    /// Voice note
    Voice,
    /// GIF-like animation
    Animation,
    /// Anything else
    Unknown,
}

impl MediaKind {
    /// Every kind that can actually be downloaded
    pub const DOWNLOADABLE: [MediaKind; 6] = [
        MediaKind::Video,
        MediaKind::Photo,
        MediaKind::Document,
        MediaKind::Audio,
        MediaKind::Voice,
        MediaKind::Animation,
    ];

    /// Lowercase name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Photo => "photo",
            MediaKind::Document => "document",
            MediaKind::Audio => "audio",
            MediaKind::Voice => "voice",
            MediaKind::Animation => "animation",
            MediaKind::Unknown => "unknown",
        }
    }

    /// Extension used when neither the original name nor the MIME type gives one
    pub fn default_extension(&self) -> &'static str {
        match self {
            MediaKind::Video | MediaKind::Animation => "mp4",
            MediaKind::Photo => "jpg",
            MediaKind::Document => "zip",
            MediaKind::Audio => "mp3",
            MediaKind::Voice => "ogg",
            MediaKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One downloadable remote object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    /// Chat the object was posted in
    pub chat_id: i64,
    /// Message carrying the object
    pub message_id: i64,
    /// Kind of media
    pub kind: MediaKind,
    /// Original file name, if the sender supplied one
    pub file_name: Option<String>,
    /// Stable remote identifier of the file contents
    pub file_unique_id: Option<String>,
    /// MIME type reported by the remote
    pub mime_type: Option<String>,
    /// Size reported by the remote, in bytes
    pub file_size: u64,
}

/// A remote message as seen by the engine
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMessage {
    /// Chat id
    pub chat_id: i64,
    /// Public username of the chat, if any
    pub chat_username: Option<String>,
    /// Message id
    pub id: i64,
    /// Send time
    pub date: DateTime<Utc>,
    /// Plain text body
    pub text: Option<String>,
    /// Caption attached to media
    pub caption: Option<String>,
    /// Attached media
    pub media: Option<MediaItem>,
    /// Public link to the message, if it has one
    pub link: Option<String>,
    /// Whether the sender is a bot
    pub from_bot: bool,
}

/// Chat addressed by id or by public username
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChatRef {
    /// Numeric chat id
    Id(i64),
    /// Public username, without the leading `@`
    Username(String),
}

impl From<i64> for ChatRef {
    fn from(id: i64) -> Self {
        ChatRef::Id(id)
    }
}

impl From<&str> for ChatRef {
    fn from(name: &str) -> Self {
        match name.trim().parse::<i64>() {
            Ok(id) => ChatRef::Id(id),
            Err(_) => ChatRef::Username(name.trim().trim_start_matches('@').to_string()),
        }
    }
}

impl std::fmt::Display for ChatRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatRef::Id(id) => write!(f, "{id}"),
            ChatRef::Username(name) => write!(f, "@{name}"),
        }
    }
}

/// Inclusive time window; either bound may be open
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Earliest accepted send time
    pub start: Option<DateTime<Utc>>,
    /// Latest accepted send time
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    /// Whether `date` lies inside the window
    pub fn contains(&self, date: DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| start <= date) && self.end.is_none_or(|end| date <= end)
    }
}

/// What a reference resolved to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Chat the items belong to
    pub chat_id: i64,
    /// How the reference maps onto items
    pub link_type: LinkType,
    /// The messages making up the target, in order
    pub items: Vec<RemoteMessage>,
}

/// A reference submitted for download
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetRef {
    /// Textual link
    Link(String),
    /// A message object already in hand
    Message(Box<RemoteMessage>),
}

impl From<&str> for TargetRef {
    fn from(link: &str) -> Self {
        TargetRef::Link(link.to_string())
    }
}

impl From<RemoteMessage> for TargetRef {
    fn from(message: RemoteMessage) -> Self {
        TargetRef::Message(Box::new(message))
    }
}

/// Per-target options
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TargetOptions {
    /// Resolve only the referenced message, never its album
    pub single: bool,
    /// Kinds to download for this target (falls back to the configured set)
    pub download_types: Option<BTreeSet<MediaKind>>,
    /// Hand finished files to the uploader for this destination
    pub upload_to: Option<String>,
    /// Chat that receives a status message per item, edited as it progresses
    pub status_chat: Option<ChatRef>,
}

/// Structured result of creating a target
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetResult {
    /// Items were resolved and handed to admission
    Scheduled {
        /// Target key
        key: CanonicalKey,
        /// Chat the items belong to
        chat_id: i64,
        /// Resolved link type
        link_type: LinkType,
        /// Number of items in the target
        member_num: usize,
    },
    /// The target completed in this or an earlier run
    AlreadyCompleted {
        /// Target key
        key: CanonicalKey,
    },
    /// The target is already being downloaded
    AlreadyInFlight {
        /// Target key
        key: CanonicalKey,
    },
    /// The reference could not be resolved
    Failed {
        /// Target key
        key: CanonicalKey,
        /// Why resolution failed
        failure: ResolveFailure,
    },
}

impl TargetResult {
    /// Key of the target this result concerns
    pub fn key(&self) -> &CanonicalKey {
        match self {
            TargetResult::Scheduled { key, .. }
            | TargetResult::AlreadyCompleted { key }
            | TargetResult::AlreadyInFlight { key }
            | TargetResult::Failed { key, .. } => key,
        }
    }

    /// Whether this result represents a resolution failure
    pub fn is_failure(&self) -> bool {
        matches!(self, TargetResult::Failed { .. })
    }
}

/// Lifecycle state of one item attempt
///
/// `Pending`, `Active` and `Mismatched` are reported by
/// [`MediaDownloader::active_items`](crate::MediaDownloader::active_items);
/// the terminal states end up in [`DownloadStats`](crate::stats::DownloadStats).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    /// Waiting for admission
    Pending,
    /// Admitted and streaming
    Active,
    /// Final size matched
    Verified,
    /// Final size did not match (or a transient error interrupted the stream)
    Mismatched,
    /// Not transferred: kind disabled or identical file already saved
    Skipped,
    /// Gave up
    Failed,
}

/// An item that has not reached a terminal state yet
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActiveItem {
    /// Target the transfer runs for
    pub key: CanonicalKey,
    /// Item file name
    pub item: String,
    /// Current state
    pub state: ItemState,
    /// Targets waiting on this transfer instead of streaming the item themselves
    pub waiting: Vec<CanonicalKey>,
}

/// Events emitted during the download lifecycle
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A target was resolved and its items are being scheduled
    TargetCreated {
        /// Target key
        key: CanonicalKey,
        /// Resolved link type
        link_type: LinkType,
        /// Number of items
        member_num: usize,
    },
    /// A target could not be resolved
    TargetFailed {
        /// Target key
        key: CanonicalKey,
        /// Human-readable reason
        error: String,
    },
    /// An item was admitted and started streaming
    ItemStarted {
        /// Target key
        key: CanonicalKey,
        /// Item file name
        item: String,
        /// Expected size in bytes
        total: u64,
    },
    /// Streaming progress for an item
    Downloading {
        /// Target key
        key: CanonicalKey,
        /// Item file name
        item: String,
        /// Bytes written so far (including resumed bytes)
        downloaded: u64,
        /// Expected size in bytes
        total: u64,
    },
    /// An item finished and was moved to its save path
    ItemComplete {
        /// Target key
        key: CanonicalKey,
        /// Item file name
        item: String,
        /// Where the file now lives
        path: PathBuf,
    },
    /// An item was not transferred
    ItemSkipped {
        /// Target key
        key: CanonicalKey,
        /// Item file name (or message id when no name can be derived)
        item: String,
        /// Why it was skipped
        reason: String,
    },
    /// An item will be attempted again
    ItemRetry {
        /// Target key
        key: CanonicalKey,
        /// Item file name
        item: String,
        /// Attempt number of the upcoming retry
        attempt: u32,
        /// Configured maximum
        max_attempts: u32,
    },
    /// An item failed permanently
    ItemFailed {
        /// Target key
        key: CanonicalKey,
        /// Item file name
        item: String,
        /// Error message
        error: String,
    },
    /// Every item of a target has completed
    TargetComplete {
        /// Target key
        key: CanonicalKey,
    },
    /// A process-level failure stopped intake of new targets
    Fatal {
        /// Error message
        error: String,
    },
    /// The downloader finished shutting down
    Shutdown,
}
