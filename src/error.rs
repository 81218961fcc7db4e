//! Error types for media-dl
//!
//! This module provides the error handling for the library:
//! - [`Error`], the crate-wide error used by every fallible operation
//! - [`RemoteError`], failures reported by the remote protocol client, classified
//!   into transient, permanent and fatal groups
//! - [`ResolveFailure`], the structured result handed back when a target cannot be
//!   resolved at all

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "chunk_size")
        key: Option<String>,
    },

    /// Remote protocol client failure
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Moving a finished file to its final location failed
    #[error("failed to move {source_path} to {dest_path}: {reason}")]
    Relocation {
        /// The file being moved
        source_path: PathBuf,
        /// Where the file should have ended up
        dest_path: PathBuf,
        /// The reason the move failed
        reason: String,
    },

    /// A different file already occupies the destination path
    #[error("file collision at {path}: {reason}")]
    FileCollision {
        /// The path where the collision occurred
        path: PathBuf,
        /// The reason for the collision
        reason: String,
    },

    /// The item carries no media, or media of a kind that is not enabled
    #[error("unsupported or ignored type: {0}")]
    UnsupportedMedia(String),

    /// A time-boxed wait (e.g. conversion service polling) expired
    #[error("timed out after {seconds}s waiting for {operation}")]
    Timeout {
        /// What was being waited for
        operation: String,
        /// How long the wait lasted
        seconds: u64,
    },

    /// Shutdown in progress - not accepting new targets
    #[error("shutdown in progress: not accepting new targets")]
    ShuttingDown,

    /// Process-level failure; no new targets are accepted after this
    #[error("fatal error: {0}")]
    Fatal(String),
}

impl Error {
    /// Whether this error invalidates the whole process rather than a single item
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Fatal(_) => true,
            Error::Remote(e) => e.is_fatal(),
            _ => false,
        }
    }
}

/// Failures reported by the remote protocol client
///
/// The variants mirror the ways a reference can fail to resolve or an object can
/// fail to stream. [`RemoteError::classification`] maps each to a human-readable
/// reason suitable for status messages.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The referenced message does not exist (deleted or never existed)
    #[error("message not found: {0}")]
    MessageNotFound(String),

    /// The channel username in the link is invalid
    #[error("username invalid: {0}")]
    UsernameInvalid(String),

    /// No chat is registered under the username
    #[error("username not occupied: {0}")]
    UsernameNotOccupied(String),

    /// The chat id is invalid for the current account (private or topic chat)
    #[error("channel invalid: {0}")]
    ChannelInvalid(String),

    /// The chat is private and the account is not a member
    #[error("channel private: {0}")]
    ChannelPrivate(String),

    /// The text does not contain a usable reference
    #[error("no valid link: {0}")]
    NoValidLink(String),

    /// The account session was revoked or expired
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A bot-token session was used for a user-only method
    #[error("bot session used for account method: {0}")]
    BotSession(String),

    /// The remote asked us to slow down
    #[error("flood wait: retry after {seconds}s")]
    FloodWait {
        /// Seconds the remote asked to wait
        seconds: u64,
    },

    /// Connection-level failure
    #[error("network failure: {0}")]
    Network(String),

    /// The remote did not answer in time
    #[error("remote request timed out")]
    Timeout,

    /// Anything the client could not classify
    #[error("{0}")]
    Other(String),
}

impl RemoteError {
    /// Human-readable reason for the failure
    pub fn classification(&self) -> &'static str {
        match self {
            RemoteError::MessageNotFound(_) => "message does not exist, it may have been deleted",
            RemoteError::UsernameInvalid(_) => {
                "channel username is invalid, it may have changed or the channel was dissolved"
            }
            RemoteError::UsernameNotOccupied(_) => "channel does not exist",
            RemoteError::ChannelInvalid(_) => {
                "channel may be private or a topic channel, join it with this account and retry"
            }
            RemoteError::ChannelPrivate(_) => "channel is private and cannot be accessed",
            RemoteError::NoValidLink(_) => "no valid link found",
            RemoteError::Unauthorized(_) => "account session is no longer valid, log in again",
            RemoteError::BotSession(_) => {
                "a bot token session was used for the account, remove the session and log in with a phone number"
            }
            RemoteError::FloodWait { .. } => "rate limited by the remote",
            RemoteError::Network(_) | RemoteError::Timeout => "network failure",
            RemoteError::Other(_) => "unclassified error",
        }
    }

    /// Whether the failure invalidates the session for every target
    pub fn is_fatal(&self) -> bool {
        matches!(self, RemoteError::Unauthorized(_) | RemoteError::BotSession(_))
    }
}

/// Structured failure returned when a target cannot be created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveFailure {
    /// Human-readable classification of the failure
    pub classification: String,
    /// The raw underlying error text
    pub raw: String,
}

impl ResolveFailure {
    /// Build a failure from a classified remote error
    pub fn from_remote(err: &RemoteError) -> Self {
        Self {
            classification: err.classification().to_string(),
            raw: err.to_string(),
        }
    }
}

impl std::fmt::Display for ResolveFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.classification, self.raw)
    }
}
