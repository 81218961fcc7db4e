//! Message-sourced targets - chat history and the conversion service.

use crate::converter::fetch_from_converter;
use crate::error::Result;
use crate::filter::ChatFilter;
use crate::types::{ChatRef, RemoteMessage, TargetOptions, TargetResult};

use super::MediaDownloader;

impl MediaDownloader {
    /// Download every message of a chat that passes `filter`
    ///
    /// History is walked oldest first so items are admitted in posting
    /// order. Each surviving message becomes its own single-item target;
    /// messages already completed in an earlier run are reported as such and
    /// not fetched again.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use media_dl::*;
    /// # async fn example(downloader: MediaDownloader) -> Result<()> {
    /// let filter = ChatFilter {
    ///     keywords: vec!["lecture".into()],
    ///     ..ChatFilter::default()
    /// };
    /// let results = downloader
    ///     .download_chat("somechannel", &filter, TargetOptions::default())
    ///     .await?;
    /// println!("{} targets", results.len());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn download_chat(
        &self,
        chat: impl Into<ChatRef>,
        filter: &ChatFilter,
        options: TargetOptions,
    ) -> Result<Vec<TargetResult>> {
        self.ensure_accepting()?;
        let chat = chat.into();

        let mut messages = self
            .client
            .history(&chat, &filter.date_range, None)
            .await?;
        messages.reverse();

        let total = messages.len();
        let selected: Vec<RemoteMessage> = messages
            .into_iter()
            .filter(|message| filter.matches(message))
            .collect();
        tracing::info!(
            chat = %chat,
            total,
            selected = selected.len(),
            "filtered chat history"
        );

        self.create_message_targets(selected, options).await
    }

    /// Send `url` to a conversion service and download its media replies
    ///
    /// Fails with [`Error::Timeout`](crate::error::Error::Timeout) if no
    /// media reply arrives within the configured converter timeout.
    pub async fn download_via_converter(
        &self,
        converter: &str,
        url: &str,
        options: TargetOptions,
    ) -> Result<Vec<TargetResult>> {
        self.ensure_accepting()?;
        let replies =
            fetch_from_converter(self.client.as_ref(), converter, url, &self.config.converter)
                .await?;
        tracing::info!(converter, url, replies = replies.len(), "conversion service replied");

        self.create_message_targets(replies, options).await
    }

    async fn create_message_targets(
        &self,
        messages: Vec<RemoteMessage>,
        options: TargetOptions,
    ) -> Result<Vec<TargetResult>> {
        let mut results = Vec::with_capacity(messages.len());
        for message in messages {
            results.push(self.create_target(message, options.clone()).await?);
        }
        Ok(results)
    }
}
