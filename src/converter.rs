//! Conversion service polling
//!
//! Some sources cannot be fetched natively. For those, the URL is sent to a
//! conversion bot, and its media replies are downloaded like any other
//! message. The wait for replies is bounded by [`ConverterConfig::timeout`].

use crate::client::RemoteClient;
use crate::config::ConverterConfig;
use crate::error::{Error, Result};
use crate::types::{ChatRef, DateRange, MediaKind, RemoteMessage};
use std::collections::HashSet;

/// Send `url` to `converter` and wait for its media replies
///
/// Only messages newer than the last one seen before sending, sent by a
/// bot, and carrying downloadable media are returned (oldest first).
/// Poll failures are logged and retried until the timeout expires, which
/// yields [`Error::Timeout`].
pub async fn fetch_from_converter(
    client: &dyn RemoteClient,
    converter: &str,
    url: &str,
    config: &ConverterConfig,
) -> Result<Vec<RemoteMessage>> {
    let chat = ChatRef::Username(converter.trim().trim_start_matches('@').to_string());
    let everything = DateRange::default();

    // A first conversation may have no history at all
    let last_id = match client.history(&chat, &everything, Some(1)).await {
        Ok(messages) => messages.iter().map(|m| m.id).max().unwrap_or(0),
        Err(e) => {
            tracing::debug!(converter = %chat, error = %e, "could not read converter history");
            0
        }
    };

    client.send_message(&chat, url).await?;
    tracing::info!(converter = %chat, url, "sent link to conversion service");

    let poll = async {
        let mut seen = HashSet::new();
        loop {
            match client
                .history(&chat, &everything, Some(config.history_limit))
                .await
            {
                Ok(messages) => {
                    let mut collected: Vec<RemoteMessage> = messages
                        .into_iter()
                        .filter(|m| m.id > last_id && seen.insert(m.id))
                        .filter(|m| m.from_bot)
                        .filter(|m| {
                            m.media
                                .as_ref()
                                .is_some_and(|media| media.kind != MediaKind::Unknown)
                        })
                        .collect();
                    if !collected.is_empty() {
                        collected.sort_by_key(|m| m.id);
                        return collected;
                    }
                }
                Err(e) => {
                    tracing::debug!(converter = %chat, error = %e, "converter poll failed");
                }
            }
            tokio::time::sleep(config.poll_interval).await;
        }
    };

    tokio::time::timeout(config.timeout, poll)
        .await
        .map_err(|_| Error::Timeout {
            operation: format!("media from {chat}"),
            seconds: config.timeout.as_secs(),
        })
}
