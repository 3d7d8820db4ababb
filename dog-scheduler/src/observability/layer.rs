use std::pin::Pin;
use std::sync::Arc;
use chrono::Utc;
use futures_core::Stream;
use tokio::sync::broadcast;
use tracing::debug;

use crate::{Job, JobEvent, JobId};
use super::LiveMetrics;

/// Type alias for boxed streams (stable Rust compatible)
pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

/// Event broadcasting plus counters, shared by every scheduler component
#[derive(Clone)]
pub struct ObservabilityLayer {
    event_broadcaster: broadcast::Sender<JobEvent>,
    metrics: Arc<LiveMetrics>,
}

impl ObservabilityLayer {
    pub fn new() -> Self {
        let (event_broadcaster, _) = broadcast::channel(10000);

        Self {
            event_broadcaster,
            metrics: Arc::new(LiveMetrics::new()),
        }
    }

    pub fn metrics(&self) -> &LiveMetrics {
        &self.metrics
    }

    /// Event stream for subscribers; lagging subscribers skip missed events
    pub fn subscribe(&self) -> BoxStream<JobEvent> {
        use tokio_stream::{wrappers::BroadcastStream, StreamExt};

        let stream = BroadcastStream::new(self.event_broadcaster.subscribe())
            .filter_map(|result| result.ok());
        Box::pin(stream)
    }

    fn emit(&self, event: JobEvent) {
        debug!("Job event {} for {}", event.event_name(), event.job_id());
        let _ = self.event_broadcaster.send(event);
    }

    pub fn record_submitted(&self, job: &Job) {
        self.metrics.increment_jobs_submitted();
        self.emit(JobEvent::Submitted {
            job_id: job.id.clone(),
            due_at: job.due_at,
            at: Utc::now(),
        });
    }

    pub fn record_claimed(&self, job: &Job) {
        self.metrics.increment_jobs_claimed();
        self.emit(JobEvent::Claimed {
            job_id: job.id.clone(),
            attempt: job.attempt,
            at: Utc::now(),
        });
    }

    pub fn record_completed(&self, job: &Job) {
        self.metrics.increment_jobs_completed();
        self.emit(JobEvent::Completed {
            job_id: job.id.clone(),
            attempt: job.attempt,
            at: job.completed_at.unwrap_or_else(Utc::now),
        });
    }

    pub fn record_retrying(&self, job: &Job) {
        self.metrics.increment_jobs_retried();
        self.emit(JobEvent::Retrying {
            job_id: job.id.clone(),
            attempt: job.attempt,
            retry_at: job.due_at,
            error: job.last_error.clone().unwrap_or_default(),
            at: Utc::now(),
        });
    }

    pub fn record_failed(&self, job: &Job) {
        self.metrics.increment_jobs_failed();
        self.emit(JobEvent::Failed {
            job_id: job.id.clone(),
            attempt: job.attempt,
            error: job.last_error.clone().unwrap_or_default(),
            at: job.failed_at.unwrap_or_else(Utc::now),
        });
    }

    pub fn record_canceled(&self, job_id: &JobId) {
        self.metrics.increment_jobs_canceled();
        self.emit(JobEvent::Canceled {
            job_id: job_id.clone(),
            at: Utc::now(),
        });
    }

    /// Operational alert: an outcome could not be persisted
    pub fn record_store_alert(&self, job_id: &JobId, operation: &str, error: &str) {
        self.metrics.increment_store_alerts();
        self.emit(JobEvent::StoreAlert {
            job_id: job_id.clone(),
            operation: operation.to_string(),
            error: error.to_string(),
            at: Utc::now(),
        });
    }
}

impl Default for ObservabilityLayer {
    fn default() -> Self {
        Self::new()
    }
}
