use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{EmailPayload, JobId};
use crate::{SchedulerError, SchedulerResult};

/// Job status lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Waiting for its due time (initial, and again after a retry is scheduled)
    Pending,

    /// Claimed by a worker, action in progress
    InFlight,

    /// Action succeeded
    Completed,

    /// Attempts exhausted, last attempt errored
    Failed,
}

impl JobStatus {
    /// Check if the job is in a terminal state (completed or failed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Get the status name as a string
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InFlight => "IN_FLIGHT",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A state change requested of the job store.
///
/// Outcome transitions carry the attempt they resolve so a stale or replayed
/// write can never resolve a later attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// `PENDING -> IN_FLIGHT`, increments `attempt`
    Claim { at: DateTime<Utc> },

    /// `IN_FLIGHT -> COMPLETED`
    Complete { attempt: u32, at: DateTime<Utc> },

    /// `IN_FLIGHT -> PENDING` with a later due time
    Retry {
        attempt: u32,
        at: DateTime<Utc>,
        due_at: DateTime<Utc>,
        error: String,
    },

    /// `IN_FLIGHT -> FAILED`, only once attempts are exhausted
    Fail {
        attempt: u32,
        at: DateTime<Utc>,
        error: String,
    },

    /// `IN_FLIGHT -> PENDING` for an attempt interrupted before its outcome was recorded
    Requeue {
        at: DateTime<Utc>,
        due_at: DateTime<Utc>,
        error: String,
    },
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Claim { .. } => "claim",
            Self::Complete { .. } => "complete",
            Self::Retry { .. } => "retry",
            Self::Fail { .. } => "fail",
            Self::Requeue { .. } => "requeue",
        }
    }
}

/// Whether applying a transition changed the job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Changed,
    /// The job was already in the target state; nothing was written
    Unchanged,
}

/// Job record - the durable unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier
    pub id: JobId,

    /// What to deliver
    pub payload: EmailPayload,

    /// Current job status
    pub status: JobStatus,

    /// Execution attempts made so far (starts at 0)
    pub attempt: u32,

    /// Ceiling on attempts
    pub max_attempts: u32,

    /// The job must not execute before this time
    pub due_at: DateTime<Utc>,

    /// Last failure reason (if any)
    pub last_error: Option<String>,

    /// When the job was created
    pub created_at: DateTime<Utc>,

    /// When the job was last updated
    pub updated_at: DateTime<Utc>,

    /// Set once, on transition to COMPLETED
    pub completed_at: Option<DateTime<Utc>>,

    /// Set once, on transition to FAILED
    pub failed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new pending job record
    pub fn new(payload: EmailPayload, due_at: DateTime<Utc>, max_attempts: u32) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            payload,
            status: JobStatus::Pending,
            attempt: 0,
            max_attempts,
            due_at,
            last_error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            failed_at: None,
        }
    }

    /// Check if the job can be claimed at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.due_at <= now
    }

    /// Apply a transition in place, enforcing the forward-only lifecycle.
    ///
    /// Re-applying the outcome that produced the current state is a no-op
    /// reported as [`Applied::Unchanged`].
    pub fn apply(&mut self, transition: &Transition) -> SchedulerResult<Applied> {
        match (self.status, transition) {
            (JobStatus::Pending, Transition::Claim { at }) => {
                if *at < self.due_at || self.attempt >= self.max_attempts {
                    return Err(self.claim_conflict());
                }
                self.status = JobStatus::InFlight;
                self.attempt += 1;
                self.updated_at = *at;
                Ok(Applied::Changed)
            }
            (_, Transition::Claim { .. }) => Err(self.claim_conflict()),

            (JobStatus::InFlight, Transition::Complete { attempt, at }) if *attempt == self.attempt => {
                self.status = JobStatus::Completed;
                self.completed_at = Some(*at);
                self.updated_at = *at;
                Ok(Applied::Changed)
            }
            (JobStatus::Completed, Transition::Complete { attempt, .. }) if *attempt == self.attempt => {
                Ok(Applied::Unchanged)
            }

            (JobStatus::InFlight, Transition::Retry { attempt, at, due_at, error })
                if *attempt == self.attempt && self.attempt < self.max_attempts =>
            {
                self.status = JobStatus::Pending;
                self.due_at = *due_at;
                self.last_error = Some(error.clone());
                self.updated_at = *at;
                Ok(Applied::Changed)
            }
            (JobStatus::Pending, Transition::Retry { attempt, .. })
                if *attempt == self.attempt && self.attempt > 0 =>
            {
                Ok(Applied::Unchanged)
            }

            (JobStatus::InFlight, Transition::Fail { attempt, at, error })
                if *attempt == self.attempt && self.attempt >= self.max_attempts =>
            {
                self.status = JobStatus::Failed;
                self.failed_at = Some(*at);
                self.last_error = Some(error.clone());
                self.updated_at = *at;
                Ok(Applied::Changed)
            }
            (JobStatus::Failed, Transition::Fail { attempt, .. }) if *attempt == self.attempt => {
                Ok(Applied::Unchanged)
            }

            (JobStatus::InFlight, Transition::Requeue { at, due_at, error })
                if self.attempt < self.max_attempts =>
            {
                self.status = JobStatus::Pending;
                self.due_at = *due_at;
                self.last_error = Some(error.clone());
                self.updated_at = *at;
                Ok(Applied::Changed)
            }

            (from, transition) => Err(SchedulerError::InvalidTransition {
                job_id: self.id.to_string(),
                from: from.to_string(),
                transition: transition.name().to_string(),
            }),
        }
    }

    fn claim_conflict(&self) -> SchedulerError {
        SchedulerError::ClaimConflict {
            job_id: self.id.to_string(),
            status: self.status.to_string(),
        }
    }
}
