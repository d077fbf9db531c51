//! # audio-relay
//!
//! Fetches audio from media links, cleans up the file names and relays the
//! files to a WebDAV storage account, one job at a time per browser session.
//!
//! ## How a job runs
//!
//! - The session's slot in a shared key-value store (Redis) is marked `busy`
//! - Every link is fetched into a staging directory with yt-dlp
//! - File names are sanitized, optionally transliterated to ASCII
//! - Each file is uploaded, verified and removed from staging
//! - The slot is marked `free` again, whatever happened in between
//!
//! The slot value expires on its own, so a crashed worker never blocks a
//! session for longer than the configured retention.
//!
//! ## Quick Start
//!
//! ```no_run
//! use audio_relay::{Config, JobRequest, RelayService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = RelayService::new(Config::default())?;
//!     service.start_worker_pool();
//!
//!     let mut events = service.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let handle = service
//!         .submit(JobRequest {
//!             session_key: "abc_youtube_download".to_string(),
//!             links: vec!["https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string()],
//!             path: "Music".to_string(),
//!             bitrate: "192".to_string(),
//!             transliterate: true,
//!             source: "youtube".to_string(),
//!         })
//!         .await?;
//!
//!     if let Some(report) = handle.wait().await {
//!         println!("{:?}", report.outcome);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Media fetching into the staging directory
pub mod fetch;
/// Per-session admission gate
pub mod gate;
/// Job requests and validated job descriptors
pub mod job;
/// Remote storage relay
pub mod relay;
/// Retry logic with backoff
pub mod retry;
/// File name sanitization and transliteration
pub mod sanitize;
/// Job dispatch service (decomposed into focused submodules)
pub mod service;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{
    ApiError, Error, ErrorDetail, FetchError, RelayError, Result, ToHttpStatus, ValidationError,
};
pub use gate::{AdmissionGate, GateStatus, GateStore};
pub use job::{JobDescriptor, JobRequest};
pub use service::{Components, JobHandle, RelayService};
pub use types::{Event, JobId, JobOutcome, JobReport};

/// Helper function to run the service with graceful signal handling.
///
/// Waits for a termination signal and then calls the service's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use audio_relay::{Config, RelayService, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let service = RelayService::new(Config::default())?;
///     service.start_worker_pool();
///
///     run_with_shutdown(service).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(service: RelayService) -> Result<()> {
    shutdown_signal().await;
    service.shutdown().await
}

/// Resolves when the process receives a termination signal
#[cfg(unix)]
pub async fn shutdown_signal() {
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

/// Resolves when the process receives Ctrl+C
#[cfg(not(unix))]
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
