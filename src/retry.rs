//! Retry classification and backoff
//!
//! Items whose transfer fails verification, or fails with a transient remote
//! error, are re-submitted through admission after a backoff delay. This module
//! decides which errors are worth another attempt and how long to wait.
//!
//! # Example
//!
//! ```
//! use media_dl::retry::{IsRetryable, backoff_delay};
//! use media_dl::config::RetryConfig;
//! use media_dl::error::RemoteError;
//! use std::time::Duration;
//!
//! assert!(RemoteError::Timeout.is_retryable());
//!
//! let config = RetryConfig { jitter: false, ..RetryConfig::default() };
//! assert_eq!(backoff_delay(&config, 1), Duration::from_secs(1));
//! assert_eq!(backoff_delay(&config, 3), Duration::from_secs(4));
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, RemoteError};
use rand::Rng;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, rate limiting, connection reset) should return `true`.
/// Permanent failures (missing message, unsupported media, revoked session) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for RemoteError {
    fn is_retryable(&self) -> bool {
        match self {
            RemoteError::FloodWait { .. } | RemoteError::Network(_) | RemoteError::Timeout => true,
            // Unclassified failures mid-stream are usually dropped connections
            RemoteError::Other(msg) => {
                msg.contains("timeout")
                    || msg.contains("connection")
                    || msg.contains("temporar")
                    || msg.contains("reset")
            }
            RemoteError::MessageNotFound(_)
            | RemoteError::UsernameInvalid(_)
            | RemoteError::UsernameNotOccupied(_)
            | RemoteError::ChannelInvalid(_)
            | RemoteError::ChannelPrivate(_)
            | RemoteError::NoValidLink(_)
            | RemoteError::Unauthorized(_)
            | RemoteError::BotSession(_) => false,
        }
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Remote(e) => e.is_retryable(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            // Relocation happens after verification; retrying the transfer cannot fix it
            Error::Relocation { .. } | Error::FileCollision { .. } => false,
            Error::Config { .. } => false,
            Error::Serialization(_) => false,
            Error::UnsupportedMedia(_) => false,
            Error::Timeout { .. } => false,
            Error::ShuttingDown => false,
            Error::Fatal(_) => false,
        }
    }
}

/// Delay to wait before retry number `attempt` (1-based)
///
/// Grows exponentially from `initial_delay` by `backoff_multiplier`, capped at
/// `max_delay`. With jitter enabled the result lies between the computed delay
/// and twice that value.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1) as i32;
    let secs = config.initial_delay.as_secs_f64() * config.backoff_multiplier.powi(exponent);
    let capped = Duration::from_secs_f64(secs.min(config.max_delay.as_secs_f64()));
    if config.jitter {
        add_jitter(capped)
    } else {
        capped
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
