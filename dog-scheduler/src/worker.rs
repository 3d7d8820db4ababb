use std::sync::Arc;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument};

use crate::{
    action::DeliveryAction,
    config::SchedulerConfig,
    observability::{tracing::attempt_span, ObservabilityLayer},
    queue::{DelayQueue, QueuedJob},
    rate::RateLimiter,
    reconciler::{Outcome, Resolution, StatusReconciler},
    store::JobStore,
    DeliveryError, Job, JobId, JobStatus, SchedulerError, SchedulerResult, Transition,
};

/// Everything a worker needs, shared by the whole pool
pub(crate) struct WorkerContext {
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<DelayQueue>,
    pub limiter: Arc<RateLimiter>,
    pub action: Arc<dyn DeliveryAction>,
    pub reconciler: Arc<StatusReconciler>,
    pub observability: ObservabilityLayer,
    pub config: SchedulerConfig,
}

/// One member of the pool. Handles a single job at a time.
pub(crate) struct Worker {
    id: usize,
    ctx: Arc<WorkerContext>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Worker {
    pub fn new(id: usize, ctx: Arc<WorkerContext>, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self { id, ctx, shutdown_rx }
    }

    /// Take due jobs until the queue closes or shutdown is signalled
    pub async fn run(mut self) -> SchedulerResult<()> {
        info!("Worker {} started", self.id);

        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }

            let queued = tokio::select! {
                _ = self.shutdown_rx.changed() => break,
                queued = self.ctx.queue.take() => match queued {
                    Some(queued) => queued,
                    None => break,
                },
            };

            if let Err(e) = self.process(queued).await {
                error!("Worker {} error processing job: {}", self.id, e);
            }
        }

        info!("Worker {} stopped", self.id);
        Ok(())
    }

    /// Claim, execute and resolve one released job
    async fn process(&mut self, queued: QueuedJob) -> SchedulerResult<()> {
        let job_id = queued.job_id;

        if !self.still_due(&job_id).await? {
            return Ok(());
        }

        // The permit comes first so a throttled job is never left IN_FLIGHT
        let token = match self.ctx.limiter.try_acquire() {
            Ok(token) => token,
            Err(wait) => {
                self.ctx.observability.metrics().increment_rate_limited();
                debug!("Worker {} rate limited for {:?} before job {}", self.id, wait, job_id);
                tokio::select! {
                    token = self.ctx.limiter.acquire() => token,
                    _ = self.shutdown_rx.changed() => {
                        // Still PENDING in the store; picked up again on next start
                        debug!("Worker {} stopping while rate limited, job {} left pending", self.id, job_id);
                        return Ok(());
                    }
                }
            }
        };

        let claimed = match self
            .ctx
            .store
            .update_status(&job_id, Transition::Claim { at: Utc::now() })
            .await
        {
            Ok(job) => job,
            Err(SchedulerError::ClaimConflict { status, .. }) => {
                self.ctx.limiter.refund(token);
                self.ctx.observability.metrics().increment_claim_conflicts();
                debug!("Job {} not claimable ({}), skipping", job_id, status);
                return Ok(());
            }
            Err(SchedulerError::JobNotFound(_)) => {
                self.ctx.limiter.refund(token);
                debug!("Job {} removed before claim, skipping", job_id);
                return Ok(());
            }
            Err(e) if e.is_store_unavailable() => {
                self.ctx.limiter.refund(token);
                self.defer(&job_id, &e);
                return Ok(());
            }
            Err(e) => {
                self.ctx.limiter.refund(token);
                return Err(e);
            }
        };

        self.ctx.observability.record_claimed(&claimed);

        let span = attempt_span(&claimed);
        let outcome = self.execute(&claimed).instrument(span.clone()).await;

        let resolution = self.resolve(&claimed, outcome).instrument(span).await?;

        if let Resolution::Retrying(job) = resolution {
            self.ctx.queue.admit(job.id, job.due_at);
        }

        Ok(())
    }

    /// Record the outcome, holding on to it through store outages.
    ///
    /// The action already ran, so running it again would repeat the delivery.
    /// Only shutdown makes the worker let go; the job then stays IN_FLIGHT
    /// and is recovered on the next start.
    async fn resolve(&mut self, job: &Job, outcome: Outcome) -> SchedulerResult<Resolution> {
        let policy = &self.ctx.config.store_retry;
        let pause = policy.delay_for(policy.max_attempts);

        loop {
            match self.ctx.reconciler.reconcile(job, outcome.clone()).await {
                Err(e) if e.is_store_unavailable() => {
                    warn!(
                        "Worker {} holding outcome of job {} attempt {}, replaying in {:?}",
                        self.id, job.id, job.attempt, pause
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(pause) => {}
                        _ = self.shutdown_rx.changed() => {
                            error!(
                                "Worker {} stopping with outcome of job {} unrecorded",
                                self.id, job.id
                            );
                            return Err(e);
                        }
                    }
                }
                result => return result,
            }
        }
    }

    /// Skip entries for jobs that were canceled, already handled, or moved later
    async fn still_due(&self, job_id: &JobId) -> SchedulerResult<bool> {
        match self.ctx.store.get(job_id).await {
            Ok(job) if job.is_due(Utc::now()) => Ok(true),
            Ok(job) => {
                if job.status == JobStatus::Pending {
                    debug!("Job {} not due until {}, skipping stale entry", job_id, job.due_at);
                } else {
                    debug!("Job {} is {}, skipping", job_id, job.status);
                }
                Ok(false)
            }
            Err(SchedulerError::JobNotFound(_)) => {
                debug!("Job {} no longer exists, skipping", job_id);
                Ok(false)
            }
            Err(e) if e.is_store_unavailable() => {
                self.defer(job_id, &e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Put a job back in the queue after a store failure; its attempt count is untouched
    fn defer(&self, job_id: &JobId, error: &SchedulerError) {
        self.ctx.observability.metrics().increment_store_errors();
        let delay = self.ctx.config.store_retry.base;
        let retry_at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|delta| Utc::now().checked_add_signed(delta))
            .unwrap_or_else(Utc::now);

        warn!("Store unavailable for job {}, retrying claim in {:?}: {}", job_id, delay, error);
        self.ctx.queue.admit(job_id.clone(), retry_at);
    }

    async fn execute(&self, job: &Job) -> Outcome {
        let _in_flight = self.ctx.observability.metrics().track_in_flight();
        debug!("Delivering job {} to {}", job.id, job.payload.recipient);

        let result = match self.ctx.config.action_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.ctx.action.perform(&job.payload)).await {
                Ok(result) => result,
                Err(_) => Err(DeliveryError::new(format!("delivery timed out after {:?}", limit))),
            },
            None => self.ctx.action.perform(&job.payload).await,
        };

        match result {
            Ok(()) => Outcome::Success,
            Err(e) => Outcome::Failure(e),
        }
    }
}
