//! Target creation - dedup, resolution and scheduling of a target's items.
//!
//! Creating a target runs in three explicit phases:
//! 1. [`before_create`](MediaDownloader::before_create) computes the key and
//!    consults the completed set and the in-flight set
//! 2. resolution asks the remote client which items make up the target
//! 3. [`after_create`](MediaDownloader::after_create) records the resolved
//!    shape and hands every item to admission

use crate::canonical::{canonicalize, canonicalize_message, link_type_hint};
use crate::error::{Error, RemoteError, ResolveFailure, Result};
use crate::types::{
    CanonicalKey, Event, LinkType, ResolvedTarget, RetryState, TargetOptions, TargetRef,
    TargetResult,
};

use super::MediaDownloader;
use super::item::JobOrigin;

/// Outcome of the dedup phase
enum Admission {
    /// The target is new; its in-flight marker is now set
    Proceed(CanonicalKey),
    /// Nothing to do; report this result
    Skip(TargetResult),
}

impl MediaDownloader {
    /// Create a download target from a link or a message
    ///
    /// The reference is canonicalized first, so equivalent spellings of the
    /// same link share one target. A target that completed in this or an
    /// earlier run, or that is still being downloaded, is not scheduled again.
    ///
    /// # Returns
    ///
    /// - `Ok(TargetResult::Scheduled { .. })` - items were handed to admission
    /// - `Ok(TargetResult::AlreadyCompleted { .. })` / `Ok(TargetResult::AlreadyInFlight { .. })`
    /// - `Ok(TargetResult::Failed { .. })` - the reference could not be resolved;
    ///   the reason is also recorded under the whole-target key
    ///
    /// # Errors
    ///
    /// - [`Error::ShuttingDown`] after [`shutdown`](Self::shutdown) was called
    /// - [`Error::Fatal`] after a process-level failure stopped intake
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use media_dl::*;
    /// # async fn example(downloader: MediaDownloader) -> Result<()> {
    /// let result = downloader
    ///     .create_target("https://t.me/somechannel/42", TargetOptions::default())
    ///     .await?;
    /// println!("{} -> {:?}", result.key(), result);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn create_target(
        &self,
        target: impl Into<TargetRef>,
        options: TargetOptions,
    ) -> Result<TargetResult> {
        let target = target.into();
        let key = match self.before_create(&target)? {
            Admission::Proceed(key) => key,
            Admission::Skip(result) => return Ok(result),
        };

        let (resolved, origin) = match target {
            TargetRef::Link(_) => {
                let single = options.single || link_type_hint(&key) == LinkType::Single;
                tracing::debug!(key = %key, single, "resolving target");
                match self.client.resolve_reference(key.as_str(), single).await {
                    Ok(resolved) => (resolved, JobOrigin::Link { single }),
                    Err(e) => return Ok(self.fail_target(&key, &e)),
                }
            }
            TargetRef::Message(message) => {
                let resolved = ResolvedTarget {
                    chat_id: message.chat_id,
                    link_type: LinkType::Single,
                    items: vec![*message],
                };
                (resolved, JobOrigin::Message)
            }
        };

        if resolved.items.is_empty() {
            let err = RemoteError::NoValidLink(format!("{key} resolved to no messages"));
            return Ok(self.fail_target(&key, &err));
        }

        Ok(self.after_create(key, resolved, origin, options))
    }

    /// Canonicalize and consult the completed and in-flight sets
    fn before_create(&self, target: &TargetRef) -> Result<Admission> {
        self.ensure_accepting()?;

        let key = match target {
            TargetRef::Link(link) => canonicalize(link),
            TargetRef::Message(message) => canonicalize_message(
                message.chat_id,
                message.chat_username.as_deref(),
                message.id,
            ),
        };

        self.with_state(|state| {
            if state.registry.is_completed(&key) {
                tracing::info!(key = %key, "target already completed, skipping");
                return Ok(Admission::Skip(TargetResult::AlreadyCompleted { key }));
            }
            if !state.registry.mark_in_flight(&key) {
                tracing::info!(key = %key, "target already in flight, skipping");
                return Ok(Admission::Skip(TargetResult::AlreadyInFlight { key }));
            }

            state.registry.get_or_create(&key);
            if let TargetRef::Message(message) = target {
                state.registry.alias(message.id.to_string(), &key);
            }
            Ok(Admission::Proceed(key))
        })
    }

    /// Record the resolved shape, announce the target and schedule its items
    fn after_create(
        &self,
        key: CanonicalKey,
        resolved: ResolvedTarget,
        origin: JobOrigin,
        options: TargetOptions,
    ) -> TargetResult {
        let member_num = resolved.items.len();
        let run = self.with_state(|state| {
            state.registry.set_link_type(&key, resolved.link_type);
            state.registry.set_member_num(&key, member_num);
            state.start_run(key.clone(), member_num)
        });

        tracing::info!(
            key = %key,
            link_type = ?resolved.link_type,
            member_num,
            "target created"
        );
        self.emit_event(Event::TargetCreated {
            key: key.clone(),
            link_type: resolved.link_type,
            member_num,
        });

        for message in resolved.items {
            self.schedule_item(
                key.clone(),
                run,
                origin,
                message,
                options.clone(),
                RetryState::default(),
            );
        }

        TargetResult::Scheduled {
            key,
            chat_id: resolved.chat_id,
            link_type: resolved.link_type,
            member_num,
        }
    }

    /// Record a resolution failure against the whole target
    fn fail_target(&self, key: &CanonicalKey, err: &RemoteError) -> TargetResult {
        if err.is_fatal() {
            self.enter_fatal(&Error::Remote(err.clone()));
        }

        let failure = ResolveFailure::from_remote(err);
        tracing::warn!(key = %key, error = %failure, "failed to resolve target");
        self.with_state(|state| {
            state.registry.record_error(key, None, failure.to_string());
            state.registry.release_in_flight(key);
        });
        self.emit_event(Event::TargetFailed {
            key: key.clone(),
            error: failure.to_string(),
        });

        TargetResult::Failed {
            key: key.clone(),
            failure,
        }
    }
}
