//! Error types for audio-relay
//!
//! Components at the edge of the system (gate store, storage account, media
//! extractor) report typed errors through these enums. The job pipeline itself
//! folds them into boolean outcomes and log lines, so nothing raised here ever
//! escapes a running job. The HTTP layer maps the remaining variants to status
//! codes and machine-readable JSON bodies.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for audio-relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for audio-relay
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "fetch.attempts")
        key: Option<String>,
    },

    /// The job request could not be turned into a job descriptor
    #[error("invalid job request: {0}")]
    Validation(#[from] ValidationError),

    /// The admission gate for this session key is occupied
    #[error("queue is busy for session {session_key}")]
    QueueBusy {
        /// Session key whose slot is occupied
        session_key: String,
    },

    /// The shared gate store could not be reached or rejected a command
    #[error("gate store error: {0}")]
    Gate(String),

    /// Remote storage relay error
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),

    /// Media fetch error
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),
}

/// Job descriptor validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// No session key was supplied with the request
    #[error("session key is missing")]
    MissingSessionKey,

    /// Every submitted link was blank or not an HTTP(S) URL
    #[error("no valid http(s) links were submitted")]
    NoValidLinks,

    /// More links were submitted than a single job accepts
    #[error("too many links: {count} submitted, at most {max} allowed")]
    TooManyLinks {
        /// Number of links in the request
        count: usize,
        /// Maximum number of links per job
        max: usize,
    },

    /// The media source kind is not handled by this service
    #[error("unsupported source: {0}")]
    UnsupportedSource(String),
}

/// Remote storage relay errors
#[derive(Debug, Error)]
pub enum RelayError {
    /// Authentication or network failure while talking to the storage account
    #[error("connection to storage failed: {0}")]
    Connection(String),

    /// An operation was attempted without an authenticated session
    #[error("not connected to storage")]
    NotConnected,

    /// Upload attempted before the target directory was ensured
    #[error("directory {name} is not available in storage")]
    DirectoryNotReady {
        /// Remote directory name
        name: String,
    },

    /// The storage account does not have room for the file
    #[error("insufficient storage capacity: need {required} bytes, have {available} bytes")]
    InsufficientCapacity {
        /// Size of the local file in bytes
        required: u64,
        /// Last known free capacity in bytes
        available: u64,
    },

    /// The transfer itself failed
    #[error("transfer of {path} failed: {reason}")]
    Transfer {
        /// Local file being uploaded
        path: PathBuf,
        /// Reason reported by the storage client
        reason: String,
    },

    /// The storage server answered with something the client cannot interpret
    #[error("unexpected storage response: {0}")]
    Protocol(String),
}

/// Media fetch errors
#[derive(Debug, Error)]
pub enum FetchError {
    /// The extractor failed for this URL
    #[error("extraction of {url} failed: {reason}")]
    Extraction {
        /// Link being fetched
        url: String,
        /// Reason reported by the extractor
        reason: String,
    },

    /// The extraction tool binary could not be located
    #[error("extraction tool not found: {0}")]
    ToolNotFound(String),

    /// The extractor produced output that could not be parsed
    #[error("invalid extractor output: {0}")]
    InvalidOutput(String),
}

/// Standardized API error response format
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "queue_busy",
///     "message": "queue is busy for session abc_youtube_download",
///     "details": {
///       "session_key": "abc_youtube_download"
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "queue_busy", "validation_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an API error with additional details
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Config { .. } => 400,

            // The UI shows these as the "uncorrected input" flag
            Error::Validation(_) => 422,

            Error::QueueBusy { .. } => 409,

            Error::Relay(RelayError::InsufficientCapacity { .. }) => 507,

            // 502 Bad Gateway - External service errors
            Error::Gate(_) => 502,
            Error::Relay(_) => 502,
            Error::Fetch(_) => 502,

            Error::ShuttingDown => 503,

            Error::Io(_) => 500,
            Error::ApiServerError(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Validation(_) => "validation_error",
            Error::QueueBusy { .. } => "queue_busy",
            Error::Gate(_) => "gate_error",
            Error::Relay(e) => match e {
                RelayError::Connection(_) => "storage_connection_failed",
                RelayError::NotConnected => "storage_not_connected",
                RelayError::DirectoryNotReady { .. } => "directory_not_ready",
                RelayError::InsufficientCapacity { .. } => "insufficient_capacity",
                RelayError::Transfer { .. } => "transfer_failed",
                RelayError::Protocol(_) => "storage_protocol_error",
            },
            Error::Fetch(_) => "fetch_error",
            Error::Io(_) => "io_error",
            Error::ShuttingDown => "shutting_down",
            Error::ApiServerError(_) => "api_server_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Validation(_) => Some(serde_json::json!({
                "uncorrected": true,
            })),
            Error::QueueBusy { session_key } => Some(serde_json::json!({
                "session_key": session_key,
            })),
            Error::Relay(RelayError::InsufficientCapacity {
                required,
                available,
            }) => Some(serde_json::json!({
                "required_bytes": required,
                "available_bytes": available,
            })),
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({
                "key": key,
            })),
            _ => None,
        };

        match details {
            Some(details) => ApiError::with_details(code, message, details),
            None => ApiError::new(code, message),
        }
    }
}
