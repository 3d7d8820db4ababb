//! # dog-scheduler: Delayed Job Scheduling for DogRS
//!
//! **Time-deferred email delivery with durable status tracking**
//!
//! dog-scheduler accepts jobs with an optional due time, persists them,
//! releases them no earlier than that time and delivers them under a
//! concurrency bound and a global rate ceiling. Failed deliveries are retried
//! with exponential backoff; every outcome is written back to the job store.
//!
//! ## 🎯 Guarantees
//!
//! - **Forward-only lifecycle**: `PENDING → IN_FLIGHT → {PENDING, COMPLETED, FAILED}`, enforced by the store
//! - **Exclusive claims**: at most one execution of a job at a time
//! - **Bounded throughput**: at most `concurrency` actions at once, at most `rate_limit.max` per rolling window
//! - **Idempotent outcomes**: recording the same outcome twice changes nothing
//! - **Restart recovery**: the delay queue is rebuilt from the store on start
//!
//! ## 🚀 Quick Start
//!
//! ```rust,no_run
//! use dog_scheduler::prelude::*;
//!
//! # async fn run() -> SchedulerResult<()> {
//! let config = SchedulerConfig::from_env()?;
//! let transport = JsonTransport::new(config.sender.clone());
//! let scheduler = Scheduler::new(MemoryStore::new(), transport, config)?;
//!
//! let job_id = scheduler
//!     .submit(EmailPayload::new("a@x.com", "Hello", "Body"), None)
//!     .await?;
//!
//! let workers = scheduler.start().await?;
//! // ...
//! let job = scheduler.get_job(&job_id).await?;
//! println!("{} is {}", job.id, job.status);
//! workers.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod types;
pub mod error;
pub mod config;
pub mod store;
pub mod queue;
pub mod rate;
pub mod retry;
pub mod reconciler;
pub mod action;
pub mod scheduler;
pub mod observability;

mod worker;

pub use types::{Applied, EmailPayload, Job, JobEvent, JobId, JobStatus, Transition};
pub use error::{DeliveryError, SchedulerError, SchedulerResult};
pub use config::{RateLimit, SchedulerConfig};
pub use store::JobStore;
pub use queue::{DelayQueue, QueuedJob};
pub use rate::RateLimiter;
pub use retry::{BackoffPolicy, RetryController, RetryDecision};
pub use reconciler::{Outcome, Resolution, StatusReconciler, StoreRetryPolicy};
pub use action::{DeliveryAction, FnAction};
pub use scheduler::{HealthStatus, RecoveryReport, Scheduler, WorkerHandle};

#[cfg(feature = "json")]
pub use action::JsonTransport;

#[cfg(feature = "memory")]
pub use store::memory::MemoryStore;

#[cfg(feature = "json")]
pub use store::file::FileStore;

// Observability exports
pub use observability::{LiveMetrics, MetricsSnapshot, ObservabilityLayer};

#[cfg(feature = "tracing-basic")]
pub use observability::init_tracing;

/// Common imports
pub mod prelude {
    pub use crate::{
        BackoffPolicy, DeliveryAction, DeliveryError, EmailPayload, FnAction, Job, JobEvent,
        JobId, JobStatus, JobStore, RateLimit, Scheduler, SchedulerConfig, SchedulerError,
        SchedulerResult, WorkerHandle,
    };

    #[cfg(feature = "json")]
    pub use crate::{FileStore, JsonTransport};

    #[cfg(feature = "memory")]
    pub use crate::MemoryStore;
}
