//! `JobStore` — job records over an optional fast backend plus the file floor.
//!
//! Every write goes to both backends before returning: the fast write is
//! best-effort, the file write is mandatory. Reads prefer the fast backend and
//! fall back to the file; one backend answers each read, records are never merged.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;

use crate::error::StoreError;
use crate::job::{Job, JobStatus, JobUpdate, NewJob};
use crate::store::files::FileJobStore;
use crate::store::kv::KvBackend;

/// Durable, queryable job persistence.
pub struct JobStore {
    files: FileJobStore,
    fast: Option<Arc<dyn KvBackend>>,
    key_prefix: String,
    /// Result of the one-time connectivity probe.
    fast_ready: OnceCell<bool>,
}

impl JobStore {
    /// Build a store. `fast` is probed lazily on first use; if the probe fails
    /// the store runs file-only for the rest of its life.
    pub fn new(
        files: FileJobStore,
        fast: Option<Arc<dyn KvBackend>>,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            files,
            fast,
            key_prefix: key_prefix.into(),
            fast_ready: OnceCell::new(),
        }
    }

    /// File-only store.
    pub fn file_only(files: FileJobStore) -> Self {
        Self::new(files, None, "agent-jobs")
    }

    pub fn files(&self) -> &FileJobStore {
        &self.files
    }

    fn job_key(&self, id: &str) -> String {
        format!("{}:job:{}", self.key_prefix, id)
    }

    fn job_key_prefix(&self) -> String {
        format!("{}:job:", self.key_prefix)
    }

    /// The fast backend, if configured and the probe succeeded.
    async fn fast(&self) -> Option<&Arc<dyn KvBackend>> {
        let backend = self.fast.as_ref()?;
        let ready = *self
            .fast_ready
            .get_or_init(|| async {
                match backend.ping().await {
                    Ok(()) => {
                        tracing::info!(backend = backend.name(), "Fast job backend connected");
                        true
                    }
                    Err(e) => {
                        tracing::warn!(
                            backend = backend.name(),
                            "Fast job backend unreachable, using file store only: {}",
                            e
                        );
                        false
                    }
                }
            })
            .await;
        ready.then_some(backend)
    }

    /// Whether reads and writes currently reach the fast backend.
    pub async fn fast_enabled(&self) -> bool {
        self.fast().await.is_some()
    }

    /// Persist to every configured backend.
    async fn save(&self, job: &Job) -> Result<(), StoreError> {
        if let Some(fast) = self.fast().await {
            let ttl = (job.ttl_seconds > 0).then(|| Duration::from_secs(job.ttl_seconds));
            let write = match serde_json::to_string(job) {
                Ok(json) => fast.put(&self.job_key(&job.id), &json, ttl).await,
                Err(e) => Err(e.into()),
            };
            if let Err(e) = write {
                tracing::warn!(job_id = %job.id, "Fast backend write failed: {}", e);
            }
        }
        self.files.save(job).await
    }

    /// Create a queued job with a fresh id.
    pub async fn create(&self, new: NewJob) -> Result<Job, StoreError> {
        let job = new.into_job();
        self.save(&job).await?;
        tracing::debug!(job_id = %job.id, "Job created");
        Ok(job)
    }

    /// Fetch a job by id.
    pub async fn get(&self, id: &str) -> Result<Option<Job>, StoreError> {
        if let Some(fast) = self.fast().await {
            match fast.get(&self.job_key(id)).await {
                Ok(Some(json)) => return Ok(Some(serde_json::from_str(&json)?)),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(job_id = %id, "Fast backend read failed, using file: {}", e);
                }
            }
        }
        self.files.load(id).await
    }

    /// Apply `changes` to an existing job. Returns `None` if the job does not exist.
    ///
    /// This does not check the status machine; see [`JobStore::advance`].
    pub async fn update(&self, id: &str, changes: JobUpdate) -> Result<Option<Job>, StoreError> {
        let Some(mut job) = self.get(id).await? else {
            return Ok(None);
        };
        changes.apply(&mut job);
        self.save(&job).await?;
        Ok(Some(job))
    }

    /// Like [`JobStore::update`], but never moves a job out of a terminal status.
    ///
    /// If the job is already terminal (e.g. cancelled while the agent ran), the
    /// status and timestamp changes and the error are dropped. The remaining
    /// fields (exit code, output, session id, PR URL) are still recorded.
    pub async fn advance(&self, id: &str, mut changes: JobUpdate) -> Result<Option<Job>, StoreError> {
        let Some(mut job) = self.get(id).await? else {
            return Ok(None);
        };
        if let Some(target) = changes.status {
            if !job.status.can_transition_to(target) && job.status != target {
                tracing::debug!(
                    job_id = %id,
                    from = %job.status,
                    to = %target,
                    "Ignoring status change out of terminal state"
                );
                changes.status = None;
                changes.started_at = None;
                changes.ended_at = None;
                changes.error = None;
            }
        }
        if changes.is_empty() {
            return Ok(Some(job));
        }
        changes.apply(&mut job);
        self.save(&job).await?;
        Ok(Some(job))
    }

    /// Most recent jobs first, optionally filtered by exact status.
    pub async fn list(&self, limit: usize, status: Option<JobStatus>) -> Result<Vec<Job>, StoreError> {
        let mut jobs = match self.fast().await {
            Some(fast) => match self.list_fast(fast.as_ref()).await {
                Ok(jobs) => jobs,
                Err(e) => {
                    tracing::warn!("Fast backend scan failed, using files: {}", e);
                    self.files.load_all().await?
                }
            },
            None => self.files.load_all().await?,
        };

        if let Some(status) = status {
            jobs.retain(|j| j.status == status);
        }
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn list_fast(&self, fast: &dyn KvBackend) -> Result<Vec<Job>, StoreError> {
        let keys = fast.scan_prefix(&self.job_key_prefix()).await?;
        let mut jobs = Vec::with_capacity(keys.len());
        for key in keys {
            // A key may expire between scan and get.
            if let Some(json) = fast.get(&key).await? {
                jobs.push(serde_json::from_str(&json)?);
            }
        }
        Ok(jobs)
    }

    /// Cancel a queued or running job.
    ///
    /// Terminal jobs are returned unchanged. A running job's process (if a pid
    /// was recorded) is sent SIGTERM; a process that is already gone is fine.
    /// Steps without a pid (cloning, materializing) are not interrupted: only
    /// the stored status changes.
    pub async fn cancel(&self, id: &str) -> Result<Option<Job>, StoreError> {
        let Some(job) = self.get(id).await? else {
            return Ok(None);
        };
        if job.status.is_terminal() {
            return Ok(Some(job));
        }

        // Persist first so the runner observes `cancelled` once the agent dies.
        let cancelled = self.update(id, JobUpdate::finished(JobStatus::Cancelled)).await?;
        // Signal the pid as persisted; it may have been recorded after our read.
        if let Some(pid) = cancelled.as_ref().and_then(|j| j.pid) {
            terminate_process(pid);
        }

        tracing::info!(job_id = %id, from = %job.status, "Job cancelled");
        Ok(cancelled)
    }
}

/// Send SIGTERM to `pid`, tolerating a process that already exited.
#[cfg(unix)]
fn terminate_process(pid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        tracing::warn!(pid, "Refusing to signal out-of-range pid");
        return;
    };
    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) => tracing::debug!(pid, "Sent SIGTERM"),
        Err(Errno::ESRCH) => tracing::debug!(pid, "Process already exited"),
        Err(e) => tracing::warn!(pid, "Failed to signal process: {}", e),
    }
}

#[cfg(not(unix))]
fn terminate_process(pid: u32) {
    tracing::warn!(pid, "Process signalling is not supported on this platform");
}
