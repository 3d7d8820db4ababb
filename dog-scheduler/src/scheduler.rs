use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::{
    action::DeliveryAction,
    config::SchedulerConfig,
    observability::{layer::BoxStream, LiveMetrics, ObservabilityLayer},
    queue::DelayQueue,
    rate::RateLimiter,
    reconciler::StatusReconciler,
    retry::RetryController,
    store::JobStore,
    worker::{Worker, WorkerContext},
    EmailPayload, Job, JobEvent, JobId, JobStatus, SchedulerError, SchedulerResult, Transition,
};

const INTERRUPTED: &str = "interrupted";

/// What `recover` found in the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// PENDING jobs re-admitted at their due time
    pub pending: usize,
    /// IN_FLIGHT jobs put back to PENDING
    pub requeued: usize,
    /// IN_FLIGHT jobs on their last attempt, marked FAILED
    pub failed: usize,
}

/// Result of [`Scheduler::health`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub store_reachable: bool,
    pub store_error: Option<String>,
    pub queued: usize,
    pub in_flight: u64,
    pub started: bool,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.store_reachable
    }
}

/// Delayed job scheduler.
///
/// Owns the job store, delay queue, rate limiter and delivery action.
/// Accepts submissions at any time; jobs only execute once [`start`](Self::start)
/// has spawned the worker pool.
pub struct Scheduler {
    store: Arc<dyn JobStore>,
    queue: Arc<DelayQueue>,
    limiter: Arc<RateLimiter>,
    action: Arc<dyn DeliveryAction>,
    reconciler: Arc<StatusReconciler>,
    observability: ObservabilityLayer,
    config: SchedulerConfig,
    started: AtomicBool,
    /// Serializes recovery with `start` so the two never overlap
    lifecycle: Mutex<()>,
}

impl Scheduler {
    /// Create a scheduler; fails if `config` is invalid
    pub fn new<S, A>(store: S, action: A, config: SchedulerConfig) -> SchedulerResult<Self>
    where
        S: JobStore + 'static,
        A: DeliveryAction,
    {
        Self::with_shared(Arc::new(store), Arc::new(action), config)
    }

    /// Create a scheduler from already shared components
    pub fn with_shared(
        store: Arc<dyn JobStore>,
        action: Arc<dyn DeliveryAction>,
        config: SchedulerConfig,
    ) -> SchedulerResult<Self> {
        config.validate()?;

        let observability = ObservabilityLayer::new();
        let reconciler = StatusReconciler::new(
            store.clone(),
            RetryController::new(config.backoff.clone()),
            config.store_retry.clone(),
            observability.clone(),
        );

        Ok(Self {
            queue: Arc::new(DelayQueue::new(config.poll_interval)),
            limiter: Arc::new(RateLimiter::new(config.rate_limit)),
            reconciler: Arc::new(reconciler),
            store,
            action,
            observability,
            config,
            started: AtomicBool::new(false),
            lifecycle: Mutex::new(()),
        })
    }

    /// Accept a job. `due_at` of `None` means now.
    ///
    /// Nothing is stored when the payload or schedule is rejected.
    #[instrument(skip(self, payload), fields(recipient = %payload.recipient))]
    pub async fn submit(
        &self,
        payload: EmailPayload,
        due_at: Option<DateTime<Utc>>,
    ) -> SchedulerResult<JobId> {
        payload.validate()?;

        let now = Utc::now();
        let due_at = due_at.unwrap_or(now);
        let tolerance = chrono::Duration::from_std(self.config.clock_skew_tolerance)
            .map_err(|e| SchedulerError::InvalidConfig(format!("clock skew tolerance: {e}")))?;
        if due_at < now - tolerance {
            return Err(SchedulerError::InvalidSchedule(format!(
                "scheduled time {due_at} is in the past"
            )));
        }

        let job = self
            .store
            .create(payload, due_at, self.config.max_attempts)
            .await?;
        self.queue.admit(job.id.clone(), job.due_at);
        self.observability.record_submitted(&job);

        info!("Submitted job {} due at {}", job.id, job.due_at);
        Ok(job.id)
    }

    pub async fn get_job(&self, job_id: &JobId) -> SchedulerResult<Job> {
        self.store.get(job_id).await
    }

    /// All jobs, most recently created first
    pub async fn list_jobs(&self) -> SchedulerResult<Vec<Job>> {
        self.store.list().await
    }

    /// Remove a job that has not been claimed yet
    #[instrument(skip(self))]
    pub async fn cancel(&self, job_id: &JobId) -> SchedulerResult<Job> {
        let job = self.store.remove_pending(job_id).await?;
        self.observability.record_canceled(job_id);
        info!("Canceled job {}", job_id);
        Ok(job)
    }

    /// Rebuild the delay queue from the store without starting workers.
    ///
    /// Jobs left IN_FLIGHT by an earlier process never recorded an outcome:
    /// they go back to PENDING while attempts remain, otherwise they fail.
    /// Assumes no other scheduler is running against the same store.
    ///
    /// Returns [`SchedulerError::AlreadyStarted`] once the worker pool is
    /// running, since IN_FLIGHT jobs then belong to live workers.
    /// [`start`](Self::start) recovers on its own.
    pub async fn recover(&self) -> SchedulerResult<RecoveryReport> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.started.load(Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyStarted);
        }
        self.recover_store().await
    }

    async fn recover_store(&self) -> SchedulerResult<RecoveryReport> {
        self.queue.clear();
        let mut report = RecoveryReport::default();
        let now = Utc::now();

        for job in self.store.list().await? {
            match job.status {
                JobStatus::Pending => {
                    self.queue.admit(job.id.clone(), job.due_at);
                    report.pending += 1;
                }
                JobStatus::InFlight if job.attempt < job.max_attempts => {
                    let transition = Transition::Requeue {
                        at: now,
                        due_at: now,
                        error: INTERRUPTED.to_string(),
                    };
                    let job = self.reconciler.write_with_retry(&job, transition).await?;
                    warn!("Requeued interrupted job {} (attempt {})", job.id, job.attempt);
                    self.queue.admit(job.id.clone(), job.due_at);
                    report.requeued += 1;
                }
                JobStatus::InFlight => {
                    let transition = Transition::Fail {
                        attempt: job.attempt,
                        at: now,
                        error: INTERRUPTED.to_string(),
                    };
                    let job = self.reconciler.write_with_retry(&job, transition).await?;
                    error!("Job {} interrupted on its last attempt, marked failed", job.id);
                    self.observability.record_failed(&job);
                    report.failed += 1;
                }
                JobStatus::Completed | JobStatus::Failed => {}
            }
        }

        info!(
            "Recovered {} pending, {} requeued, {} failed jobs",
            report.pending, report.requeued, report.failed
        );
        Ok(report)
    }

    /// Recover from the store and spawn the worker pool. Can only be called once.
    pub async fn start(&self) -> SchedulerResult<WorkerHandle> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.started.load(Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyStarted);
        }

        self.recover_store().await?;
        self.started.store(true, Ordering::SeqCst);

        let ctx = Arc::new(WorkerContext {
            store: self.store.clone(),
            queue: self.queue.clone(),
            limiter: self.limiter.clone(),
            action: self.action.clone(),
            reconciler: self.reconciler.clone(),
            observability: self.observability.clone(),
            config: self.config.clone(),
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let workers = (0..self.config.concurrency)
            .map(|id| {
                let worker = Worker::new(id, ctx.clone(), shutdown_rx.clone());
                tokio::spawn(worker.run())
            })
            .collect();

        info!(
            "Started {} workers, rate limit {} per {:?}",
            self.config.concurrency, self.config.rate_limit.max, self.config.rate_limit.window
        );

        Ok(WorkerHandle {
            shutdown_tx,
            queue: self.queue.clone(),
            workers,
            drain_timeout: self.config.drain_timeout,
        })
    }

    /// Lifecycle event stream
    pub fn events(&self) -> BoxStream<JobEvent> {
        self.observability.subscribe()
    }

    pub fn metrics(&self) -> &LiveMetrics {
        self.observability.metrics()
    }

    /// Ping the store and report queue state
    pub async fn health(&self) -> HealthStatus {
        let store_error = self.store.ping().await.err().map(|e| e.to_string());
        HealthStatus {
            store_reachable: store_error.is_none(),
            store_error,
            queued: self.queue.len(),
            in_flight: self.metrics().in_flight(),
            started: self.started.load(Ordering::SeqCst),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Entries waiting in the delay queue, including stale ones
    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

/// Handle for the running worker pool
pub struct WorkerHandle {
    shutdown_tx: watch::Sender<bool>,
    queue: Arc<DelayQueue>,
    workers: Vec<JoinHandle<SchedulerResult<()>>>,
    drain_timeout: std::time::Duration,
}

impl WorkerHandle {
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Stop releasing jobs and wait for in-flight attempts to finish.
    ///
    /// Workers still running after the drain timeout are aborted; their jobs
    /// stay IN_FLIGHT and are recovered on the next start.
    pub async fn shutdown(self) -> SchedulerResult<()> {
        self.queue.close();
        let _ = self.shutdown_tx.send(true);

        let aborts: Vec<_> = self.workers.iter().map(|w| w.abort_handle()).collect();
        let drained = tokio::time::timeout(
            self.drain_timeout,
            futures::future::join_all(self.workers),
        )
        .await;

        match drained {
            Ok(results) => {
                for result in results {
                    result.map_err(|e| SchedulerError::Internal(format!("Worker join error: {e}")))??;
                }
                info!("Scheduler shut down");
                Ok(())
            }
            Err(_) => {
                warn!("Drain timeout of {:?} reached, aborting workers", self.drain_timeout);
                for abort in aborts {
                    abort.abort();
                }
                Ok(())
            }
        }
    }
}
