use std::path::PathBuf;
use chrono::{Duration, Utc};

use dog_scheduler::{
    store::{file::FileStore, memory::MemoryStore, JobStore},
    EmailPayload, JobId, JobStatus, SchedulerError, Transition,
};

/// Test factory functions
fn create_test_payload() -> EmailPayload {
    EmailPayload::new("a@x.com", "S", "B")
}

fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("dog-scheduler-conformance-{}", uuid::Uuid::new_v4()))
}

/// A1. Create Persists Pending Job
async fn create_persists_pending_job(store: impl JobStore) {
    // Act: create
    let due_at = Utc::now() + Duration::seconds(30);
    let job = store.create(create_test_payload(), due_at, 3).await.unwrap();

    // Assert: initial state
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.attempt, 0);
    assert_eq!(job.max_attempts, 3);
    assert_eq!(job.due_at, due_at);
    assert!(job.last_error.is_none());
    assert!(job.completed_at.is_none() && job.failed_at.is_none());

    // Verify get returns the same record
    assert_eq!(store.get(&job.id).await.unwrap(), job);
}

/// A2. Claim Is Exclusive
async fn claim_is_exclusive(store: impl JobStore) {
    // Arrange: one due job
    let job = store.create(create_test_payload(), Utc::now(), 3).await.unwrap();

    // Act: claim twice
    let first = store.update_status(&job.id, Transition::Claim { at: Utc::now() }).await;
    let second = store.update_status(&job.id, Transition::Claim { at: Utc::now() }).await;

    // Assert: only the first claim wins, attempt incremented once
    let claimed = first.unwrap();
    assert_eq!(claimed.status, JobStatus::InFlight);
    assert_eq!(claimed.attempt, 1);
    assert!(second.unwrap_err().is_claim_conflict());
    assert_eq!(store.get(&job.id).await.unwrap().attempt, 1);
}

/// A3. Claim Before Due Time Conflicts
async fn claim_before_due_conflicts(store: impl JobStore) {
    let job = store
        .create(create_test_payload(), Utc::now() + Duration::seconds(60), 3)
        .await
        .unwrap();

    let result = store.update_status(&job.id, Transition::Claim { at: Utc::now() }).await;

    assert!(result.unwrap_err().is_claim_conflict());
    assert_eq!(store.get(&job.id).await.unwrap().status, JobStatus::Pending);
}

/// A4. Terminal States Are Final And Replays Are No-ops
async fn terminal_states_are_final(store: impl JobStore) {
    // Arrange: completed job
    let job = store.create(create_test_payload(), Utc::now(), 3).await.unwrap();
    store.update_status(&job.id, Transition::Claim { at: Utc::now() }).await.unwrap();
    let done = Transition::Complete { attempt: 1, at: Utc::now() };
    let completed = store.update_status(&job.id, done.clone()).await.unwrap();

    // Act: replay the outcome, then try to move it elsewhere
    let replayed = store.update_status(&job.id, done).await.unwrap();
    let reclaim = store.update_status(&job.id, Transition::Claim { at: Utc::now() }).await;
    let fail = store
        .update_status(
            &job.id,
            Transition::Fail { attempt: 1, at: Utc::now(), error: "late".to_string() },
        )
        .await;

    // Assert: unchanged
    assert_eq!(replayed, completed);
    assert!(reclaim.is_err());
    assert!(matches!(fail, Err(SchedulerError::InvalidTransition { .. })));
    assert_eq!(store.get(&job.id).await.unwrap(), completed);
}

/// A5. Retry Returns To Pending With Later Due Time
async fn retry_returns_to_pending(store: impl JobStore) {
    let job = store.create(create_test_payload(), Utc::now(), 3).await.unwrap();
    let claimed = store.update_status(&job.id, Transition::Claim { at: Utc::now() }).await.unwrap();

    let retry_at = Utc::now() + Duration::seconds(1);
    let retried = store
        .update_status(
            &job.id,
            Transition::Retry {
                attempt: 1,
                at: Utc::now(),
                due_at: retry_at,
                error: "smtp down".to_string(),
            },
        )
        .await
        .unwrap();

    assert_eq!(retried.status, JobStatus::Pending);
    assert_eq!(retried.attempt, 1);
    assert!(retried.due_at > claimed.updated_at);
    assert_eq!(retried.last_error.as_deref(), Some("smtp down"));
}

/// A6. List Is Most Recent First
async fn list_is_most_recent_first(store: impl JobStore) {
    let first = store.create(create_test_payload(), Utc::now(), 3).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = store.create(create_test_payload(), Utc::now(), 3).await.unwrap();

    let ids: Vec<JobId> = store.list().await.unwrap().into_iter().map(|job| job.id).collect();

    assert_eq!(ids, vec![second.id, first.id]);
}

/// A7. Only Pending Jobs Can Be Removed
async fn only_pending_jobs_can_be_removed(store: impl JobStore) {
    let pending = store.create(create_test_payload(), Utc::now(), 3).await.unwrap();
    let claimed = store.create(create_test_payload(), Utc::now(), 3).await.unwrap();
    store.update_status(&claimed.id, Transition::Claim { at: Utc::now() }).await.unwrap();

    assert_eq!(store.remove_pending(&pending.id).await.unwrap().id, pending.id);
    assert!(store.remove_pending(&claimed.id).await.unwrap_err().is_claim_conflict());
    assert!(matches!(
        store.remove_pending(&pending.id).await,
        Err(SchedulerError::JobNotFound(_))
    ));
    assert!(matches!(store.get(&pending.id).await, Err(SchedulerError::JobNotFound(_))));
}

/// A8. Unknown Ids Are Not Found
async fn unknown_ids_are_not_found(store: impl JobStore) {
    let missing = JobId::new();

    assert!(matches!(store.get(&missing).await, Err(SchedulerError::JobNotFound(_))));
    assert!(matches!(
        store.update_status(&missing, Transition::Claim { at: Utc::now() }).await,
        Err(SchedulerError::JobNotFound(_))
    ));
    assert!(store.ping().await.is_ok());
}

macro_rules! conformance {
    ($($name:ident),* $(,)?) => {
        mod memory {
            use super::*;
            $(
                #[tokio::test]
                async fn $name() {
                    super::$name(MemoryStore::new()).await;
                }
            )*
        }

        mod file {
            use super::*;
            $(
                #[tokio::test]
                async fn $name() {
                    let dir = temp_dir();
                    super::$name(FileStore::open(&dir).await.unwrap()).await;
                    let _ = std::fs::remove_dir_all(&dir);
                }
            )*
        }
    };
}

conformance!(
    create_persists_pending_job,
    claim_is_exclusive,
    claim_before_due_conflicts,
    terminal_states_are_final,
    retry_returns_to_pending,
    list_is_most_recent_first,
    only_pending_jobs_can_be_removed,
    unknown_ids_are_not_found,
);

/// A9. Memory Store Surfaces Outages
#[tokio::test]
async fn test_memory_store_surfaces_outages() {
    let store = MemoryStore::new();
    let job = store.create(create_test_payload(), Utc::now(), 3).await.unwrap();

    // Arrange: take the store down
    store.set_available(false);

    // Assert: no fake success
    assert!(store.get(&job.id).await.unwrap_err().is_store_unavailable());
    assert!(store
        .update_status(&job.id, Transition::Claim { at: Utc::now() })
        .await
        .unwrap_err()
        .is_store_unavailable());

    // Recovers with state intact
    store.set_available(true);
    assert_eq!(store.get(&job.id).await.unwrap().status, JobStatus::Pending);
}

/// A10. Concurrent Claims Have One Winner
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_have_one_winner() {
    let store = MemoryStore::new();
    let job = store.create(create_test_payload(), Utc::now(), 3).await.unwrap();

    let claims: Vec<_> = (0..16)
        .map(|_| {
            let store = store.clone();
            let job_id = job.id.clone();
            tokio::spawn(async move {
                store.update_status(&job_id, Transition::Claim { at: Utc::now() }).await
            })
        })
        .collect();

    let mut winners = 0;
    for claim in claims {
        match claim.await.unwrap() {
            Ok(_) => winners += 1,
            Err(e) => assert!(e.is_claim_conflict()),
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(store.get(&job.id).await.unwrap().attempt, 1);
}
