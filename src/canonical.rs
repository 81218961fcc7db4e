//! Target identity
//!
//! Every reference to a target, whether typed by a user, read from a link
//! list, or taken from a message object, is reduced to one [`CanonicalKey`]
//! before it touches the registry. Two references to the same remote object
//! always produce the same key; markers that change which items a target
//! covers (`single`, `comment=<n>`, a message range) are kept.
//!
//! Canonicalization never fails: a string that is not recognisable as a
//! message link is returned unchanged, so deduplication degrades to exact
//! string comparison instead of rejecting the input.

use crate::types::{CanonicalKey, LinkType};
use url::Url;

/// Host spellings that all address the same service
const KNOWN_HOSTS: &[&str] = &[
    "t.me",
    "www.t.me",
    "telegram.me",
    "www.telegram.me",
    "telegram.dog",
];

const CANONICAL_BASE: &str = "https://t.me";

/// Chat part of a parsed link
#[derive(Debug, Clone, PartialEq, Eq)]
enum ChatPart {
    /// Public username, lowercased
    Public(String),
    /// Internal channel id (the digits after `-100`)
    Internal(u64),
}

/// Message part of a parsed link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessagePart {
    One(u64),
    /// Inclusive ascending range, `start < end`
    Range(u64, u64),
}

/// Structured form of a message link
#[derive(Debug, Clone, PartialEq, Eq)]
struct ParsedLink {
    chat: ChatPart,
    topic: Option<u64>,
    message: MessagePart,
    comment: Option<u64>,
    single: bool,
}

impl ParsedLink {
    fn parse(reference: &str) -> Option<Self> {
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return None;
        }

        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        };
        let url = Url::parse(&with_scheme).ok()?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return None;
        }
        let host = url.host_str()?.to_ascii_lowercase();
        if !KNOWN_HOSTS.contains(&host.as_str()) {
            return None;
        }

        let mut segments: Vec<&str> = url
            .path_segments()?
            .filter(|segment| !segment.is_empty())
            .collect();
        if segments.first() == Some(&"s") {
            segments.remove(0);
        }

        let (chat, rest) = match segments.as_slice() {
            ["c", chat_id, rest @ ..] => (ChatPart::Internal(parse_id(chat_id)?), rest),
            [username, rest @ ..] if is_username(username) => {
                (ChatPart::Public(username.to_ascii_lowercase()), rest)
            }
            _ => return None,
        };

        let (mut topic, message) = match rest {
            [message] => (None, parse_message(message)?),
            [topic, message] => (Some(parse_id(topic)?), parse_message(message)?),
            _ => return None,
        };

        let mut comment = None;
        let mut single = false;
        for (name, value) in url.query_pairs() {
            match name.as_ref() {
                "single" => single = true,
                "comment" => comment = parse_id(&value).or(comment),
                "thread" | "topic" if topic.is_none() => topic = parse_id(&value),
                _ => {}
            }
        }

        Some(Self {
            chat,
            topic,
            message,
            comment,
            single,
        })
    }

    fn render(&self) -> String {
        let mut out = String::from(CANONICAL_BASE);
        match &self.chat {
            ChatPart::Public(name) => {
                out.push('/');
                out.push_str(name);
            }
            ChatPart::Internal(id) => {
                out.push_str("/c/");
                out.push_str(&id.to_string());
            }
        }
        if let Some(topic) = self.topic {
            out.push('/');
            out.push_str(&topic.to_string());
        }
        match self.message {
            MessagePart::One(id) => out.push_str(&format!("/{id}")),
            MessagePart::Range(start, end) => out.push_str(&format!("/{start}-{end}")),
        }

        let mut query = Vec::new();
        if let Some(comment) = self.comment {
            query.push(format!("comment={comment}"));
        }
        if self.single {
            query.push("single".to_string());
        }
        if !query.is_empty() {
            out.push('?');
            out.push_str(&query.join("&"));
        }
        out
    }
}

fn parse_id(segment: &str) -> Option<u64> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

fn parse_message(segment: &str) -> Option<MessagePart> {
    match segment.split_once('-') {
        Some((a, b)) => {
            let (a, b) = (parse_id(a)?, parse_id(b)?);
            Some(match a.cmp(&b) {
                std::cmp::Ordering::Equal => MessagePart::One(a),
                std::cmp::Ordering::Less => MessagePart::Range(a, b),
                std::cmp::Ordering::Greater => MessagePart::Range(b, a),
            })
        }
        None => parse_id(segment).map(MessagePart::One),
    }
}

fn is_username(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "c"
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !segment.chars().all(|c| c.is_ascii_digit())
}

/// Reduce a textual reference to its canonical key
///
/// Unrecognised input is returned unchanged.
///
/// # Examples
///
/// ```
/// use media_dl::canonical::canonicalize;
///
/// let a = canonicalize("telegram.me/S/Demo/12/?utm_source=x#frag");
/// let b = canonicalize("https://t.me/demo/12");
/// assert_eq!(a, b);
/// assert_eq!(a.as_str(), "https://t.me/demo/12");
///
/// assert_eq!(
///     canonicalize("https://t.me/demo/12?single=1&comment=3").as_str(),
///     "https://t.me/demo/12?comment=3&single"
/// );
/// ```
pub fn canonicalize(reference: &str) -> CanonicalKey {
    match ParsedLink::parse(reference) {
        Some(link) => CanonicalKey(link.render()),
        None => CanonicalKey(reference.to_string()),
    }
}

/// Canonical key for a message object rather than a textual link
///
/// Public chats are keyed by username. Internal channel ids (`-100<id>`)
/// use the `/c/<id>/` form; other chat ids fall back to their absolute
/// value. Object references always address exactly one message, so the key
/// carries the `single` marker.
pub fn canonicalize_message(chat_id: i64, username: Option<&str>, message_id: i64) -> CanonicalKey {
    let message = message_id.unsigned_abs();
    let chat = match username.map(str::trim).filter(|name| is_username(name)) {
        Some(name) => ChatPart::Public(name.to_ascii_lowercase()),
        None => {
            let raw = chat_id.to_string();
            let internal = raw
                .strip_prefix("-100")
                .and_then(parse_id)
                .unwrap_or(chat_id.unsigned_abs());
            ChatPart::Internal(internal)
        }
    };
    let link = ParsedLink {
        chat,
        topic: None,
        message: MessagePart::One(message),
        comment: None,
        single: true,
    };
    CanonicalKey(link.render())
}

/// Whether a reference is a recognisable message link
pub fn is_message_link(reference: &str) -> bool {
    ParsedLink::parse(reference).is_some()
}

/// Preliminary link type derived from the markers in a key
///
/// Album vs. single cannot be known before resolution; a plain message link
/// yields [`LinkType::Unknown`].
pub fn link_type_hint(key: &CanonicalKey) -> LinkType {
    match ParsedLink::parse(key.as_str()) {
        Some(link) if link.comment.is_some() => LinkType::Comment,
        Some(ParsedLink {
            message: MessagePart::Range(..),
            ..
        }) => LinkType::Range,
        Some(link) if link.single => LinkType::Single,
        Some(link) if link.topic.is_some() => LinkType::Topic,
        _ => LinkType::Unknown,
    }
}
