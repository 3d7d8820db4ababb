use thiserror::Error;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Submission and infrastructure errors raised by the scheduler
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job store unavailable: {0}")]
    StoreUnavailable(String),

    /// Benign race: the job is already claimed, terminal, or not yet due
    #[error("Job {job_id} cannot be claimed in status {status}")]
    ClaimConflict { job_id: String, status: String },

    #[error("Invalid transition for job {job_id}: {from} -> {transition}")]
    InvalidTransition {
        job_id: String,
        from: String,
        transition: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Scheduler already started")]
    AlreadyStarted,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SchedulerError {
    /// Whether the error is a transient store failure worth retrying
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// Whether the error is a benign claim race
    pub fn is_claim_conflict(&self) -> bool {
        matches!(self, Self::ClaimConflict { .. })
    }
}

/// Failure reported by a delivery action. Always routed to the retry controller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Delivery failed: {reason}")]
pub struct DeliveryError {
    reason: String,
}

impl DeliveryError {
    /// Create a delivery error with the given reason
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Get the failure reason
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl From<std::io::Error> for SchedulerError {
    fn from(err: std::io::Error) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}

#[cfg(feature = "json")]
impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
