use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use tracing::{error, info, warn};

use crate::{
    observability::ObservabilityLayer,
    retry::RetryController,
    store::JobStore,
    DeliveryError, Job, JobStatus, SchedulerError, SchedulerResult, Transition,
};

/// Retry policy for store writes. Independent of job-level backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRetryPolicy {
    /// Delay before the second write attempt
    pub base: Duration,
    /// Total write attempts before raising an alert
    pub max_attempts: u32,
    /// Multiplier applied after every failed write
    pub factor: u32,
}

impl Default for StoreRetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(50),
            max_attempts: 5,
            factor: 2,
        }
    }
}

impl StoreRetryPolicy {
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max_attempts,
            ..Self::default()
        }
    }

    /// Delay after the `n`th failed write (1-indexed)
    pub fn delay_for(&self, n: u32) -> Duration {
        let exponent = n.saturating_sub(1).min(16);
        self.base.saturating_mul(self.factor.saturating_pow(exponent))
    }
}

/// Result of one execution attempt, consumed as data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure(DeliveryError),
}

/// Where a job ended up after its outcome was recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Completed(Job),
    /// Back to PENDING; the caller re-admits it to the delay queue
    Retrying(Job),
    Failed(Job),
}

impl Resolution {
    pub fn job(&self) -> &Job {
        match self {
            Self::Completed(job) | Self::Retrying(job) | Self::Failed(job) => job,
        }
    }
}

/// Writes attempt outcomes back to the job store, once per attempt
pub struct StatusReconciler {
    store: Arc<dyn JobStore>,
    retry: RetryController,
    policy: StoreRetryPolicy,
    observability: ObservabilityLayer,
}

impl StatusReconciler {
    pub fn new(
        store: Arc<dyn JobStore>,
        retry: RetryController,
        policy: StoreRetryPolicy,
        observability: ObservabilityLayer,
    ) -> Self {
        Self {
            store,
            retry,
            policy,
            observability,
        }
    }

    /// Record the outcome of the attempt `job` is currently on.
    ///
    /// The transition is computed once, so a retried write carries the same
    /// due time. Re-reconciling an outcome already recorded returns the
    /// current job without emitting events twice.
    pub async fn reconcile(&self, job: &Job, outcome: Outcome) -> SchedulerResult<Resolution> {
        let now = Utc::now();
        let transition = match &outcome {
            Outcome::Success => Transition::Complete {
                attempt: job.attempt,
                at: now,
            },
            Outcome::Failure(err) => self.retry.transition_for(job, err, now),
        };

        let updated = self.write_with_retry(job, transition.clone()).await?;
        let changed = produced_by(&updated, &transition);

        let resolution = match updated.status {
            JobStatus::Completed => {
                if changed {
                    self.observability.record_completed(&updated);
                    info!("Job {} completed on attempt {}", updated.id, updated.attempt);
                }
                Resolution::Completed(updated)
            }
            JobStatus::Pending => {
                if changed {
                    self.observability.record_retrying(&updated);
                    warn!(
                        "Job {} attempt {} failed, retrying at {}: {}",
                        updated.id,
                        updated.attempt,
                        updated.due_at,
                        updated.last_error.as_deref().unwrap_or_default()
                    );
                }
                Resolution::Retrying(updated)
            }
            JobStatus::Failed => {
                if changed {
                    self.observability.record_failed(&updated);
                    error!(
                        "Job {} failed permanently after {} attempts: {}",
                        updated.id,
                        updated.attempt,
                        updated.last_error.as_deref().unwrap_or_default()
                    );
                }
                Resolution::Failed(updated)
            }
            JobStatus::InFlight => {
                return Err(SchedulerError::Internal(format!(
                    "job {} still in flight after reconcile",
                    updated.id
                )))
            }
        };

        Ok(resolution)
    }

    /// Apply `transition`, retrying only while the store is unavailable
    pub async fn write_with_retry(&self, job: &Job, transition: Transition) -> SchedulerResult<Job> {
        let mut failures = 0;

        loop {
            match self.store.update_status(&job.id, transition.clone()).await {
                Ok(updated) => return Ok(updated),
                Err(err) if err.is_store_unavailable() => {
                    failures += 1;
                    self.observability.metrics().increment_store_errors();

                    if failures >= self.policy.max_attempts {
                        error!(
                            "Giving up on {} write for job {} after {} attempts: {}",
                            transition.name(),
                            job.id,
                            failures,
                            err
                        );
                        self.observability
                            .record_store_alert(&job.id, transition.name(), &err.to_string());
                        return Err(err);
                    }

                    let delay = self.policy.delay_for(failures);
                    warn!(
                        "Store unavailable writing {} for job {}, retry {} in {:?}",
                        transition.name(),
                        job.id,
                        failures,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Whether the stored job carries the stamp of this particular transition,
/// as opposed to an earlier write of the same outcome
fn produced_by(job: &Job, transition: &Transition) -> bool {
    match transition {
        Transition::Complete { at, .. } => job.completed_at == Some(*at),
        Transition::Fail { at, .. } => job.failed_at == Some(*at),
        Transition::Retry { due_at, .. } => job.due_at == *due_at,
        Transition::Claim { .. } | Transition::Requeue { .. } => false,
    }
}
