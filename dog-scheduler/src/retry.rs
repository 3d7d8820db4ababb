use std::time::Duration;
use chrono::{DateTime, Utc};
use rand::Rng;

use crate::{DeliveryError, Job, Transition};

/// Exponential backoff between job attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay after the first failed attempt
    pub base: Duration,
    /// Optional ceiling on a single delay
    pub max: Option<Duration>,
    /// Add up to 10% random extra delay
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: None,
            jitter: false,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration) -> Self {
        Self {
            base,
            ..Self::default()
        }
    }

    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = Some(max);
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay after `attempt` (1-indexed) failed: `base * 2^(attempt-1)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let mut delay = self.base.saturating_mul(1u32 << exponent);

        if let Some(max) = self.max {
            delay = delay.min(max);
        }

        if self.jitter {
            let extra_ms = (delay.as_millis() / 10) as u64;
            if extra_ms > 0 {
                delay += Duration::from_millis(rand::thread_rng().gen_range(0..=extra_ms));
            }
        }

        delay
    }
}

/// What happens to a job after a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Back to PENDING, visible again at `due_at`
    Retry { due_at: DateTime<Utc>, delay: Duration },
    /// Attempts exhausted, the job becomes FAILED
    Exhausted,
}

/// Pure retry decision logic. Performs no I/O.
#[derive(Debug, Clone)]
pub struct RetryController {
    policy: BackoffPolicy,
}

impl RetryController {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Decide the next state for a job whose attempt number `attempt` just failed
    pub fn decide(&self, attempt: u32, max_attempts: u32, now: DateTime<Utc>) -> RetryDecision {
        if attempt >= max_attempts {
            return RetryDecision::Exhausted;
        }

        let delay = self.policy.delay_for(attempt);
        let due_at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        RetryDecision::Retry { due_at, delay }
    }

    /// The store transition for a failed attempt of `job`
    pub fn transition_for(&self, job: &Job, error: &DeliveryError, now: DateTime<Utc>) -> Transition {
        match self.decide(job.attempt, job.max_attempts, now) {
            RetryDecision::Retry { due_at, .. } => Transition::Retry {
                attempt: job.attempt,
                at: now,
                due_at,
                error: error.reason().to_string(),
            },
            RetryDecision::Exhausted => Transition::Fail {
                attempt: job.attempt,
                at: now,
                error: error.reason().to_string(),
            },
        }
    }
}
