//! Retry logic with a fixed backoff
//!
//! Both retry loops of a job (per-link extraction and per-file upload) run
//! through [`with_retry`].
//!
//! # Example
//!
//! ```no_run
//! use audio_relay::retry::{IsRetryable, with_retry};
//! use audio_relay::config::RetryConfig;
//! use std::time::Duration;
//!
//! #[derive(Debug)]
//! struct Flaky;
//!
//! impl std::fmt::Display for Flaky {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "flaky")
//!     }
//! }
//!
//! impl IsRetryable for Flaky {
//!     fn is_retryable(&self) -> bool {
//!         true
//!     }
//! }
//!
//! # async fn example() -> Result<(), Flaky> {
//! let policy = RetryConfig::fixed(2, Duration::from_secs(9));
//! let value = with_retry(&policy, || async { Ok::<_, Flaky>(7) }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, FetchError, RelayError};
use std::future::Future;

/// Trait for errors that can be classified as retryable or not
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            // Any extractor failure is retried, including an empty result
            FetchError::Extraction { .. } => true,
            FetchError::InvalidOutput(_) => true,
            // A missing binary will still be missing after the pause
            FetchError::ToolNotFound(_) => false,
        }
    }
}

impl IsRetryable for RelayError {
    fn is_retryable(&self) -> bool {
        match self {
            RelayError::Transfer { .. } => true,
            RelayError::Protocol(_) => true,
            // The directory handle is re-resolved on every attempt
            RelayError::DirectoryNotReady { .. } => true,
            // Connection failures are terminal for the relay session
            RelayError::Connection(_) => false,
            RelayError::NotConnected => false,
            // Capacity is cached per session and will not change between attempts
            RelayError::InsufficientCapacity { .. } => false,
        }
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Fetch(e) => e.is_retryable(),
            Error::Relay(e) => e.is_retryable(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            Error::Gate(_) => false,
            Error::Config { .. } => false,
            Error::Validation(_) => false,
            Error::QueueBusy { .. } => false,
            Error::ShuttingDown => false,
            Error::ApiServerError(_) => false,
        }
    }
}

/// Execute an async operation until it succeeds or the attempts run out
///
/// `config.max_attempts` counts every call including the first. Attempts are
/// separated by `config.delay`; there is no pause after the final attempt.
///
/// Returns the successful result, the first non-retryable error, or the last
/// error after all attempts are exhausted.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = config.delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(config.delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(error = %e, "Operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}
