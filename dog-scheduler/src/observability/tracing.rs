use tracing::Span;

use crate::Job;

/// Span wrapping one execution attempt of a job
pub fn attempt_span(job: &Job) -> Span {
    tracing::info_span!(
        "job_attempt",
        job_id = %job.id,
        attempt = job.attempt,
        max_attempts = job.max_attempts,
    )
}

/// Install a global `tracing` subscriber. Respects `RUST_LOG`; falls back to `default_level`.
///
/// Returns an error if a global subscriber is already set.
#[cfg(feature = "tracing-basic")]
pub fn init_tracing(default_level: &str, json: bool) -> crate::SchedulerResult<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = fmt().with_env_filter(filter).with_target(true);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| crate::SchedulerError::Internal(format!("tracing init failed: {e}")))
}
