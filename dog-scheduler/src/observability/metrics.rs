use std::sync::atomic::{AtomicU64, Ordering};
use serde::{Deserialize, Serialize};

/// Live counters for scheduler activity
#[derive(Debug, Default)]
pub struct LiveMetrics {
    jobs_submitted: AtomicU64,
    jobs_claimed: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_retried: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_canceled: AtomicU64,
    claim_conflicts: AtomicU64,
    store_errors: AtomicU64,
    store_alerts: AtomicU64,
    rate_limited: AtomicU64,
    in_flight: AtomicU64,
}

/// Point-in-time copy of [`LiveMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub jobs_submitted: u64,
    pub jobs_claimed: u64,
    pub jobs_completed: u64,
    pub jobs_retried: u64,
    pub jobs_failed: u64,
    pub jobs_canceled: u64,
    pub claim_conflicts: u64,
    pub store_errors: u64,
    pub store_alerts: u64,
    pub rate_limited: u64,
    pub in_flight: u64,
}

impl LiveMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_jobs_submitted(&self) {
        self.jobs_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_jobs_claimed(&self) {
        self.jobs_claimed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_jobs_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_jobs_retried(&self) {
        self.jobs_retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_jobs_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_jobs_canceled(&self) {
        self.jobs_canceled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_claim_conflicts(&self) {
        self.claim_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_store_errors(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_store_alerts(&self) {
        self.store_alerts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    /// Mark one action as started; the returned guard marks it finished on drop
    pub fn track_in_flight(&self) -> InFlightGuard<'_> {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard { metrics: self }
    }

    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_submitted: self.jobs_submitted.load(Ordering::Relaxed),
            jobs_claimed: self.jobs_claimed.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_retried: self.jobs_retried.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_canceled: self.jobs_canceled.load(Ordering::Relaxed),
            claim_conflicts: self.claim_conflicts.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            store_alerts: self.store_alerts.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }
}

pub struct InFlightGuard<'a> {
    metrics: &'a LiveMetrics,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.metrics.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}
