//! Link intake - link lists from text or `.txt` files, partitioned against known targets.

use crate::canonical::{canonicalize, is_message_link};
use crate::error::{Error, Result};
use crate::types::{TargetOptions, TargetResult};
use std::collections::HashSet;
use std::path::Path;

use super::MediaDownloader;

/// Incoming links sorted by what should happen to them
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkPartition {
    /// Links not seen before; these get scheduled
    pub new: Vec<String>,
    /// Links that completed earlier or are in flight right now
    pub existing: Vec<String>,
    /// Lines that are not message links, or failed to resolve
    pub invalid: Vec<String>,
}

/// Read a link list from `input`
///
/// If `input` names an existing `.txt` file, its lines are read; otherwise
/// `input` itself is split on whitespace. Blank lines and lines starting with
/// `#` are dropped, as are exact repeats.
pub async fn collect_links(input: &str) -> Result<Vec<String>> {
    let trimmed = input.trim();
    let path = Path::new(trimmed);
    let is_list_file = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"))
        && tokio::fs::try_exists(path).await.unwrap_or(false);

    let content = if is_list_file {
        tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read link list '{}': {}", path.display(), e),
            ))
        })?
    } else {
        trimmed.to_string()
    };

    let mut seen = HashSet::new();
    let links = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .flat_map(str::split_whitespace)
        .filter(|link| seen.insert(link.to_string()))
        .map(str::to_string)
        .collect();
    Ok(links)
}

impl MediaDownloader {
    /// Sort links into new, already known and invalid
    ///
    /// Links are compared by canonical key, so two spellings of one link
    /// count once. Known means completed in this or an earlier run, or in
    /// flight right now.
    pub fn partition_links(&self, links: &[String]) -> LinkPartition {
        let mut partition = LinkPartition::default();
        let mut new_keys = HashSet::new();

        self.with_state(|state| {
            for link in links {
                if !is_message_link(link) {
                    tracing::warn!(link = %link, "not a message link, skipping");
                    partition.invalid.push(link.clone());
                    continue;
                }
                let key = canonicalize(link);
                if state.registry.is_completed(&key) || state.registry.is_in_flight(&key) {
                    partition.existing.push(link.clone());
                } else if new_keys.insert(key) {
                    partition.new.push(link.clone());
                }
            }
        });

        tracing::info!(
            new = partition.new.len(),
            existing = partition.existing.len(),
            invalid = partition.invalid.len(),
            "partitioned links"
        );
        partition
    }

    /// Read, partition and schedule a link list
    ///
    /// Every new link is created as a target with `options`. Links whose
    /// target could not be resolved move from `new` to `invalid`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use media_dl::*;
    /// # async fn example(downloader: MediaDownloader) -> Result<()> {
    /// let (partition, _results) = downloader
    ///     .submit_links("links.txt", TargetOptions::default())
    ///     .await?;
    /// println!("{} new, {} known", partition.new.len(), partition.existing.len());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn submit_links(
        &self,
        input: &str,
        options: TargetOptions,
    ) -> Result<(LinkPartition, Vec<TargetResult>)> {
        let links = collect_links(input).await?;
        let mut partition = self.partition_links(&links);

        let mut results = Vec::with_capacity(partition.new.len());
        let mut scheduled = Vec::with_capacity(partition.new.len());
        for link in std::mem::take(&mut partition.new) {
            let result = self.create_target(link.as_str(), options.clone()).await?;
            match &result {
                TargetResult::Failed { .. } => partition.invalid.push(link),
                TargetResult::AlreadyCompleted { .. } | TargetResult::AlreadyInFlight { .. } => {
                    partition.existing.push(link)
                }
                TargetResult::Scheduled { .. } => scheduled.push(link),
            }
            results.push(result);
        }
        partition.new = scheduled;

        Ok((partition, results))
    }
}
