//! Message filters for chat history downloads

use crate::types::{DateRange, MediaKind, RemoteMessage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Criteria a history message must meet to be downloaded
///
/// All three filters must pass. Empty criteria pass everything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatFilter {
    /// Inclusive send-time window
    #[serde(default)]
    pub date_range: DateRange,

    /// Kinds to keep; `None` keeps every kind
    #[serde(default)]
    pub download_types: Option<BTreeSet<MediaKind>>,

    /// Keep messages whose text or caption contains any of these (case-insensitive)
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl ChatFilter {
    /// Whether `message` passes every filter
    pub fn matches(&self, message: &RemoteMessage) -> bool {
        date_range(message, &self.date_range)
            && self
                .download_types
                .as_ref()
                .is_none_or(|kinds| dtype(message, kinds))
            && keywords(message, &self.keywords)
    }
}

/// Send time lies inside the window
pub fn date_range(message: &RemoteMessage, range: &DateRange) -> bool {
    range.contains(message.date)
}

/// Message carries media of one of `kinds`
pub fn dtype(message: &RemoteMessage, kinds: &BTreeSet<MediaKind>) -> bool {
    message
        .media
        .as_ref()
        .is_some_and(|media| kinds.contains(&media.kind))
}

/// Text or caption contains any non-empty keyword, ignoring case
///
/// An empty keyword list passes everything.
pub fn keywords(message: &RemoteMessage, keywords: &[String]) -> bool {
    if keywords.is_empty() {
        return true;
    }
    let full_text = format!(
        "{} {}",
        message.text.as_deref().unwrap_or_default(),
        message.caption.as_deref().unwrap_or_default()
    )
    .to_lowercase();

    keywords
        .iter()
        .map(|keyword| keyword.trim().to_lowercase())
        .filter(|keyword| !keyword.is_empty())
        .any(|keyword| full_text.contains(&keyword))
}
