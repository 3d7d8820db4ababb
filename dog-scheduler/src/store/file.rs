use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    Applied, EmailPayload, Job, JobId, JobStatus, SchedulerError, SchedulerResult, Transition,
    store::{sort_recent_first, JobStore},
};

const RECORD_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

/// Directory-backed job store: one JSON document per job.
///
/// Records are written to a temp file and renamed into place, so a crash
/// leaves either the old record or the new one. All records are read into
/// memory at open; reads are served from that index.
#[derive(Clone)]
pub struct FileStore {
    root: PathBuf,
    index: Arc<RwLock<HashMap<JobId, Job>>>,
    /// Serializes writes so check-and-apply plus persist is atomic per store
    write_gate: Arc<Mutex<()>>,
}

impl FileStore {
    /// Open the store rooted at `dir`, creating it if missing
    pub async fn open(dir: impl AsRef<Path>) -> SchedulerResult<Self> {
        let root = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;

        let mut index = HashMap::new();
        let mut entries = tokio::fs::read_dir(&root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            match path.extension().and_then(|ext| ext.to_str()) {
                Some(RECORD_EXTENSION) => {
                    let bytes = tokio::fs::read(&path).await?;
                    let job: Job = serde_json::from_slice(&bytes).map_err(|e| {
                        SchedulerError::SerializationError(format!("{}: {e}", path.display()))
                    })?;
                    index.insert(job.id.clone(), job);
                }
                Some(TEMP_EXTENSION) => {
                    // Leftover from an interrupted write; the record itself is intact
                    warn!("Removing incomplete write {}", path.display());
                    tokio::fs::remove_file(&path).await?;
                }
                _ => {}
            }
        }

        info!("Opened file store at {} with {} jobs", root.display(), index.len());

        Ok(Self {
            root,
            index: Arc::new(RwLock::new(index)),
            write_gate: Arc::new(Mutex::new(())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, job_id: &JobId) -> PathBuf {
        self.root.join(format!("{}.{RECORD_EXTENSION}", job_id.as_str()))
    }

    async fn persist(&self, job: &Job) -> SchedulerResult<()> {
        let path = self.path_for(&job.id);
        let tmp = path.with_extension(TEMP_EXTENSION);
        let bytes = serde_json::to_vec_pretty(job)?;

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &path).await?;

        debug!("Persisted job {} as {}", job.id, job.status);
        Ok(())
    }

    fn lookup(&self, job_id: &JobId) -> SchedulerResult<Job> {
        self.index
            .read()
            .get(job_id)
            .cloned()
            .ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))
    }
}

#[async_trait]
impl JobStore for FileStore {
    async fn create(
        &self,
        payload: EmailPayload,
        due_at: DateTime<Utc>,
        max_attempts: u32,
    ) -> SchedulerResult<Job> {
        let job = Job::new(payload, due_at, max_attempts);

        let _gate = self.write_gate.lock().await;
        self.persist(&job).await?;
        self.index.write().insert(job.id.clone(), job.clone());

        Ok(job)
    }

    async fn update_status(&self, job_id: &JobId, transition: Transition) -> SchedulerResult<Job> {
        let _gate = self.write_gate.lock().await;

        let mut job = self.lookup(job_id)?;
        if job.apply(&transition)? == Applied::Unchanged {
            return Ok(job);
        }

        self.persist(&job).await?;
        self.index.write().insert(job.id.clone(), job.clone());

        Ok(job)
    }

    async fn get(&self, job_id: &JobId) -> SchedulerResult<Job> {
        self.lookup(job_id)
    }

    async fn list(&self) -> SchedulerResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self.index.read().values().cloned().collect();
        sort_recent_first(&mut jobs);
        Ok(jobs)
    }

    async fn remove_pending(&self, job_id: &JobId) -> SchedulerResult<Job> {
        let _gate = self.write_gate.lock().await;

        let job = self.lookup(job_id)?;
        if job.status != JobStatus::Pending {
            return Err(SchedulerError::ClaimConflict {
                job_id: job_id.to_string(),
                status: job.status.to_string(),
            });
        }

        tokio::fs::remove_file(self.path_for(job_id)).await?;
        self.index.write().remove(job_id);

        Ok(job)
    }

    async fn ping(&self) -> SchedulerResult<()> {
        tokio::fs::metadata(&self.root).await?;
        Ok(())
    }
}
