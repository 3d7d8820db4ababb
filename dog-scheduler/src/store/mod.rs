#[cfg(feature = "memory")]
pub mod memory;
#[cfg(feature = "json")]
pub mod file;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{EmailPayload, Job, JobId, SchedulerResult, Transition};

/// Durable record of every job and its lifecycle state.
///
/// Every write is atomic per job id. Implementations validate transitions
/// with [`Job::apply`], so the forward-only lifecycle holds no matter which
/// component writes. Infrastructure failures surface as
/// [`SchedulerError::StoreUnavailable`](crate::SchedulerError::StoreUnavailable).
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new PENDING job with attempt 0
    async fn create(
        &self,
        payload: EmailPayload,
        due_at: DateTime<Utc>,
        max_attempts: u32,
    ) -> SchedulerResult<Job>;

    /// Apply a transition atomically and return the resulting job.
    ///
    /// Re-applying the outcome that produced the current state returns the
    /// job unchanged without writing.
    async fn update_status(&self, job_id: &JobId, transition: Transition) -> SchedulerResult<Job>;

    /// Get one job
    async fn get(&self, job_id: &JobId) -> SchedulerResult<Job>;

    /// All jobs, most recently created first
    async fn list(&self) -> SchedulerResult<Vec<Job>>;

    /// Remove a job that is still PENDING. Claimed or terminal jobs conflict.
    async fn remove_pending(&self, job_id: &JobId) -> SchedulerResult<Job>;

    /// Cheap reachability check
    async fn ping(&self) -> SchedulerResult<()>;
}

/// Newest first; ties broken by id so the order is stable
pub(crate) fn sort_recent_first(jobs: &mut [Job]) {
    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}
