//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`jobs`] - Job submission and slot status
//! - [`system`] - Health, events, OpenAPI

use crate::types::JobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

mod jobs;
mod system;

pub use jobs::*;
pub use system::*;

// ============================================================================
// Response Types (shared across handlers)
// ============================================================================

/// Slot status for one session
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QueueStatusResponse {
    /// Session key that was checked
    pub session_key: String,
    /// True when a job can be submitted
    pub queue_free: bool,
}

/// Response for an accepted job
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobAccepted {
    /// Job ID
    pub id: JobId,
    /// Session key the job runs under
    pub session_key: String,
    /// When the job was queued
    #[schema(value_type = String, format = DateTime)]
    pub queued_at: DateTime<Utc>,
}
