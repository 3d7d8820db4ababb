use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::JobId;

/// Lifecycle events for structured observability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobEvent {
    /// Job was accepted and persisted
    Submitted {
        job_id: JobId,
        due_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },

    /// Job was claimed by a worker
    Claimed {
        job_id: JobId,
        attempt: u32,
        at: DateTime<Utc>,
    },

    /// Attempt failed and a retry was scheduled
    Retrying {
        job_id: JobId,
        attempt: u32,
        retry_at: DateTime<Utc>,
        error: String,
        at: DateTime<Utc>,
    },

    /// Job completed successfully
    Completed {
        job_id: JobId,
        attempt: u32,
        at: DateTime<Utc>,
    },

    /// Job failed permanently (retries exhausted)
    Failed {
        job_id: JobId,
        attempt: u32,
        error: String,
        at: DateTime<Utc>,
    },

    /// Pending job was removed before it was claimed
    Canceled {
        job_id: JobId,
        at: DateTime<Utc>,
    },

    /// An outcome could not be written after repeated store failures
    StoreAlert {
        job_id: JobId,
        operation: String,
        error: String,
        at: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get event type name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Submitted { .. } => "submitted",
            Self::Claimed { .. } => "claimed",
            Self::Retrying { .. } => "retrying",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Canceled { .. } => "canceled",
            Self::StoreAlert { .. } => "store_alert",
        }
    }

    /// Get the job ID from any event
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Submitted { job_id, .. }
            | Self::Claimed { job_id, .. }
            | Self::Retrying { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::Canceled { job_id, .. }
            | Self::StoreAlert { job_id, .. } => job_id,
        }
    }

    /// Get the timestamp from any event
    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::Submitted { at, .. }
            | Self::Claimed { at, .. }
            | Self::Retrying { at, .. }
            | Self::Completed { at, .. }
            | Self::Failed { at, .. }
            | Self::Canceled { at, .. }
            | Self::StoreAlert { at, .. } => at,
        }
    }
}
