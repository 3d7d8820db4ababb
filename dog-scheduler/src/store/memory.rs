use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::{
    EmailPayload, Job, JobId, JobStatus, SchedulerError, SchedulerResult, Transition,
    store::JobStore,
};

/// In-memory job store for testing and development.
///
/// Cloning shares the underlying state. Faults can be injected to exercise
/// the `StoreUnavailable` paths.
#[derive(Clone, Default)]
pub struct MemoryStore {
    /// Job records indexed by id
    jobs: Arc<RwLock<HashMap<JobId, Job>>>,

    /// Ids in creation order
    order: Arc<RwLock<Vec<JobId>>>,

    /// When set, every call fails with `StoreUnavailable`
    unavailable: Arc<AtomicBool>,

    /// Number of upcoming writes that fail with `StoreUnavailable`
    failing_writes: Arc<AtomicU32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the store going down or coming back
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Fail the next `count` writes, then recover
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Replace a record wholesale, bypassing transition checks (test setup)
    pub fn insert_raw(&self, job: Job) {
        let mut jobs = self.jobs.write();
        if !jobs.contains_key(&job.id) {
            self.order.write().push(job.id.clone());
        }
        jobs.insert(job.id.clone(), job);
    }

    fn check_available(&self) -> SchedulerResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SchedulerError::StoreUnavailable("memory store offline".to_string()));
        }
        Ok(())
    }

    fn check_writable(&self) -> SchedulerResult<()> {
        self.check_available()?;
        let injected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if injected.is_ok() {
            return Err(SchedulerError::StoreUnavailable("injected write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create(
        &self,
        payload: EmailPayload,
        due_at: DateTime<Utc>,
        max_attempts: u32,
    ) -> SchedulerResult<Job> {
        self.check_writable()?;

        let job = Job::new(payload, due_at, max_attempts);
        let mut jobs = self.jobs.write();
        jobs.insert(job.id.clone(), job.clone());
        self.order.write().push(job.id.clone());

        Ok(job)
    }

    async fn update_status(&self, job_id: &JobId, transition: Transition) -> SchedulerResult<Job> {
        self.check_writable()?;

        let mut jobs = self.jobs.write();
        let record = jobs
            .get_mut(job_id)
            .ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))?;

        // Apply to a copy so a rejected transition leaves the record untouched
        let mut updated = record.clone();
        updated.apply(&transition)?;
        *record = updated.clone();

        Ok(updated)
    }

    async fn get(&self, job_id: &JobId) -> SchedulerResult<Job> {
        self.check_available()?;

        self.jobs
            .read()
            .get(job_id)
            .cloned()
            .ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))
    }

    async fn list(&self) -> SchedulerResult<Vec<Job>> {
        self.check_available()?;

        let jobs = self.jobs.read();
        let order = self.order.read();
        Ok(order
            .iter()
            .rev()
            .filter_map(|job_id| jobs.get(job_id).cloned())
            .collect())
    }

    async fn remove_pending(&self, job_id: &JobId) -> SchedulerResult<Job> {
        self.check_writable()?;

        let mut jobs = self.jobs.write();
        let record = jobs
            .get(job_id)
            .ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))?;

        if record.status != JobStatus::Pending {
            return Err(SchedulerError::ClaimConflict {
                job_id: job_id.to_string(),
                status: record.status.to_string(),
            });
        }

        let removed = jobs
            .remove(job_id)
            .ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))?;
        self.order.write().retain(|id| id != job_id);

        Ok(removed)
    }

    async fn ping(&self) -> SchedulerResult<()> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn payload() -> EmailPayload {
        EmailPayload::new("a@x.com", "S", "B")
    }

    #[tokio::test]
    async fn test_create_get() {
        let store = MemoryStore::new();
        let job = store.create(payload(), Utc::now(), 3).await.unwrap();

        let fetched = store.get(&job.id).await.unwrap();
        assert_eq!(fetched, job);
        assert_eq!(fetched.status, JobStatus::Pending);
        assert_eq!(fetched.attempt, 0);
    }

    #[tokio::test]
    async fn test_rejected_transition_leaves_record() {
        let store = MemoryStore::new();
        let job = store.create(payload(), Utc::now(), 3).await.unwrap();

        let result = store
            .update_status(&job.id, Transition::Complete { attempt: 1, at: Utc::now() })
            .await;
        assert!(matches!(result, Err(SchedulerError::InvalidTransition { .. })));
        assert_eq!(store.get(&job.id).await.unwrap(), job);
    }

    #[tokio::test]
    async fn test_injected_write_failures_recover() {
        let store = MemoryStore::new();
        store.fail_next_writes(2);

        assert!(store.create(payload(), Utc::now(), 3).await.unwrap_err().is_store_unavailable());
        assert!(store.create(payload(), Utc::now(), 3).await.unwrap_err().is_store_unavailable());
        assert_ok!(store.create(payload(), Utc::now(), 3).await);
    }

    #[tokio::test]
    async fn test_offline_store_fails_reads() {
        let store = MemoryStore::new();
        store.set_available(false);
        assert!(store.list().await.unwrap_err().is_store_unavailable());
        assert_err!(store.ping().await);

        store.set_available(true);
        assert_ok!(store.ping().await);
    }
}
