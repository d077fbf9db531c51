//! Core types for audio-relay

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Unique identifier for a submitted job
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a job run ended
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    /// The gate store could not be reached, nothing ran
    Rejected,

    /// No link produced a local file
    NothingFetched,

    /// The destination folder could not be found or created
    DirectoryUnavailable {
        /// Remote folder name
        folder: String,
    },

    /// Every fetched file went through the relay step
    Completed {
        /// Files that reached storage
        uploaded: usize,
        /// Files that did not
        failed: usize,
    },

    /// The run stopped on an unexpected fault
    Aborted {
        /// Description of the fault
        reason: String,
    },
}

/// Final report of one job run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct JobReport {
    /// Job ID
    pub id: JobId,
    /// Gate slot the job ran under
    pub session_key: String,
    /// How the run ended
    pub outcome: JobOutcome,
    /// Whether the closing "free" publish reached the gate store
    pub gate_released: bool,
    /// When the run ended
    #[schema(value_type = String, format = DateTime)]
    pub finished_at: DateTime<Utc>,
}

/// Event emitted during the job lifecycle
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Job accepted and placed on the worker queue
    JobQueued {
        /// Job ID
        id: JobId,
        /// Gate slot
        session_key: String,
        /// Number of links after validation
        links: usize,
    },

    /// A worker picked the job up and marked the slot busy
    JobStarted {
        /// Job ID
        id: JobId,
        /// Gate slot
        session_key: String,
    },

    /// The gate store was unreachable, the job did not run
    JobRejected {
        /// Job ID
        id: JobId,
        /// Gate slot
        session_key: String,
    },

    /// All links went through the fetch pipeline
    FetchFinished {
        /// Job ID
        id: JobId,
        /// Links that produced a local file
        fetched: usize,
        /// Links that did not
        failed: usize,
    },

    /// One file reached remote storage
    FileUploaded {
        /// Job ID
        id: JobId,
        /// Sanitized file name
        name: String,
        /// Remote folder
        folder: String,
    },

    /// One file could not be relayed
    FileFailed {
        /// Job ID
        id: JobId,
        /// File name (sanitized when the rename went through)
        name: String,
        /// What went wrong
        error: String,
    },

    /// The job released its slot
    JobFinished {
        /// Final report
        report: JobReport,
    },
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_is_transparent() {
        let id = JobId(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn test_event_tagging() {
        let event = Event::JobQueued {
            id: JobId(1),
            session_key: "abc_youtube_download".to_string(),
            links: 2,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "job_queued");
        assert_eq!(json["id"], 1);
        assert_eq!(json["links"], 2);
    }

    #[test]
    fn test_outcome_tagging() {
        let json = serde_json::to_value(JobOutcome::Completed {
            uploaded: 2,
            failed: 1,
        })
        .unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["uploaded"], 2);

        let json = serde_json::to_value(JobOutcome::Rejected).unwrap();
        assert_eq!(json["status"], "rejected");
    }
}
