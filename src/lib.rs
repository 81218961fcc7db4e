//! # media-dl
//!
//! Transfer orchestration engine for media hosted behind a messaging protocol.
//!
//! ## Design Philosophy
//!
//! media-dl is designed to be:
//! - **Resumable** - Interrupted transfers continue from the last whole chunk on disk
//! - **Bounded** - A fixed number of transfers run at once, queued items wait their turn
//! - **Idempotent** - Equivalent links share one target, finished targets are never fetched twice
//! - **Library-first** - The remote protocol is a trait; no client, CLI or UI is bundled
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_dl::{Config, MediaDownloader, RemoteClient, TargetOptions};
//! use std::sync::Arc;
//!
//! # fn connect() -> Arc<dyn RemoteClient> { unimplemented!() }
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_json_str(r#"{"download": {"max_concurrent_downloads": 5}}"#)?;
//!     let client: Arc<dyn RemoteClient> = connect();
//!
//!     let downloader = MediaDownloader::new(config, client).await?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     downloader
//!         .create_target("https://t.me/somechannel/42", TargetOptions::default())
//!         .await?;
//!     downloader.wait_for_idle().await;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Canonical keys for target references
pub mod canonical;
/// Remote client, notifier and uploader interfaces
pub mod client;
/// Configuration types
pub mod config;
/// Conversion service polling
pub mod converter;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Chat history message filters
pub mod filter;
/// Admission control for transfers
pub mod gate;
/// File name derivation
pub mod naming;
/// Per-target metadata and completion history
pub mod registry;
/// Retry classification and backoff
pub mod retry;
/// Per-kind download statistics
pub mod stats;
/// Resumable chunked transfers
pub mod transfer;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use canonical::{canonicalize, canonicalize_message};
pub use client::{ChunkStream, Notifier, RemoteClient, Uploader};
pub use config::Config;
pub use downloader::{LinkPartition, MediaDownloader, collect_links};
pub use error::{Error, RemoteError, ResolveFailure, Result};
pub use filter::ChatFilter;
pub use stats::DownloadStats;
pub use types::{
    ActiveItem, CanonicalKey, ChatRef, DateRange, Event, ItemState, LinkType, MediaItem,
    MediaKind, RemoteMessage, TargetOptions, TargetRef, TargetResult, TaskMeta,
};

/// Helper function to run the downloader with graceful signal handling.
///
/// Waits for a termination signal and then calls the downloader's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use media_dl::{Config, MediaDownloader, RemoteClient, run_with_shutdown};
/// use std::sync::Arc;
///
/// # fn connect() -> Arc<dyn RemoteClient> { unimplemented!() }
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = MediaDownloader::new(Config::default(), connect()).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(downloader).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: MediaDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
