//! `JobRunner` — drives one job from `queued` to a terminal state.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

use crate::error::{ProfileError, RunnerError};
use crate::job::{Job, JobStatus, JobUpdate};
use crate::pr::{GhPrCreator, PrCreator};
use crate::profiles::{Profile, ProfileResolver};
use crate::repos::RepoCache;
use crate::runner::command::{AgentCommand, AgentEnv};
use crate::runner::session::extract_session_id;
use crate::store::JobStore;
use crate::telemetry::{JobTelemetry, TracingTelemetry};

/// How long to wait for pipes to close after killing a timed-out agent.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of waiting on the agent process.
enum Completion {
    Exited { status: ExitStatus, stdout: String, stderr: String },
    TimedOut { stdout: String, stderr: String },
    WaitFailed(std::io::Error),
}

/// Executes jobs. Cheap to share behind an `Arc`.
pub struct JobRunner {
    store: Arc<JobStore>,
    repos: Arc<RepoCache>,
    profiles: Arc<dyn ProfileResolver>,
    pr: Arc<dyn PrCreator>,
    telemetry: Arc<dyn JobTelemetry>,
    binary: String,
    env: AgentEnv,
}

impl JobRunner {
    pub fn new(
        store: Arc<JobStore>,
        repos: Arc<RepoCache>,
        profiles: Arc<dyn ProfileResolver>,
        binary: impl Into<String>,
    ) -> Self {
        Self {
            store,
            repos,
            profiles,
            pr: Arc::new(GhPrCreator::new()),
            telemetry: Arc::new(TracingTelemetry),
            binary: binary.into(),
            env: AgentEnv::default(),
        }
    }

    pub fn with_pr_creator(mut self, pr: Arc<dyn PrCreator>) -> Self {
        self.pr = pr;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn JobTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_env(mut self, env: AgentEnv) -> Self {
        self.env = env;
        self
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn profiles(&self) -> &Arc<dyn ProfileResolver> {
        &self.profiles
    }

    /// Run `job` to completion. Never fails: every error ends up in the
    /// returned record's `error` with `status = failed`.
    pub async fn run_job(&self, job: Job) -> Job {
        let result = self.drive(job).await;
        // Hooks see the latest persisted record, falling back to ours.
        let latest = match self.store.get(&result.id).await {
            Ok(Some(persisted)) => persisted,
            Ok(None) => result,
            Err(e) => {
                tracing::warn!(job_id = %result.id, "Could not re-read job for telemetry: {}", e);
                result
            }
        };
        self.telemetry.job_finished(&latest).await;
        latest
    }

    async fn drive(&self, job: Job) -> Job {
        let Some(profile) = self.profiles.resolve(&job.profile).await else {
            let error = ProfileError::NotFound(job.profile.clone()).to_string();
            tracing::warn!(job_id = %job.id, "{}", error);
            return self.finish(&job, JobUpdate::failed(error)).await;
        };

        let job = self.finish(&job, JobUpdate::started()).await;
        if job.status != JobStatus::Running {
            tracing::info!(job_id = %job.id, status = %job.status, "Job no longer runnable, skipping");
            return job;
        }
        tracing::info!(job_id = %job.id, profile = %profile.name, repo = %job.repo_url, "Job started");
        self.telemetry.job_started(&job).await;

        self.execute(job, &profile).await
    }

    /// Steps after the `running` transition.
    async fn execute(&self, job: Job, profile: &Profile) -> Job {
        let mut cwd: Option<PathBuf> = None;
        let mut base_ref = job.base_ref.clone();

        if !job.repo_url.is_empty() {
            match self.repos.ensure_clone(&job.repo_url).await {
                Ok(dir) => {
                    if base_ref.is_empty() {
                        base_ref = self.repos.default_branch(&dir).await;
                    }
                    cwd = Some(dir);
                }
                Err(e) => {
                    tracing::warn!(job_id = %job.id, repo = %job.repo_url, "Clone failed: {}", e);
                    return self.finish(&job, JobUpdate::failed(format!("Clone failed: {e}"))).await;
                }
            }
        }

        if let Some(dir) = &cwd {
            if let Err(e) = self.profiles.materialize(profile, dir).await {
                tracing::warn!(job_id = %job.id, "Profile materialization failed: {}", e);
                return self
                    .finish(&job, JobUpdate::failed(format!("Profile materialization failed: {e}")))
                    .await;
            }
        }

        // Clone and materialize are not interruptible; a cancel only flips the status.
        if let Some(latest) = self.stopped_meanwhile(&job).await {
            tracing::info!(job_id = %job.id, status = %latest.status, "Job stopped before agent spawn");
            return latest;
        }

        let command = AgentCommand::new(&self.binary, profile, &job, &base_ref, &self.env);
        let mut child = match command.to_command(cwd.as_deref()).spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let error = RunnerError::BinaryNotFound(self.binary.clone()).to_string();
                tracing::error!(job_id = %job.id, "{}", error);
                return self.finish(&job, JobUpdate::failed(error)).await;
            }
            Err(source) => {
                let error = RunnerError::Io {
                    program: self.binary.clone(),
                    source,
                }
                .to_string();
                tracing::error!(job_id = %job.id, "{}", error);
                return self.finish(&job, JobUpdate::failed(error)).await;
            }
        };

        let mut job = job;
        if let Some(pid) = child.id() {
            job = self.record(&job, JobUpdate::new().with_pid(pid)).await;
            tracing::debug!(job_id = %job.id, pid, "Agent spawned");
        }

        let timeout_secs = profile.claude.timeout;
        let stdout = child.stdout.take().map(|pipe| tokio::spawn(read_pipe(pipe)));
        let stderr = child.stderr.take().map(|pipe| tokio::spawn(read_pipe(pipe)));

        let waited = tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait()).await;
        let completion = match waited {
            Ok(Ok(status)) => Completion::Exited {
                status,
                stdout: collect(stdout).await,
                stderr: collect(stderr).await,
            },
            Ok(Err(e)) => Completion::WaitFailed(e),
            Err(_) => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(job_id = %job.id, "Failed to kill timed-out agent: {}", e);
                }
                Completion::TimedOut {
                    stdout: collect(stdout).await,
                    stderr: collect(stderr).await,
                }
            }
        };

        match completion {
            Completion::TimedOut { stdout, .. } => {
                tracing::warn!(job_id = %job.id, timeout_secs, "Agent timed out");
                let mut changes = JobUpdate::failed(RunnerError::Timeout(timeout_secs).to_string()).with_exit_code(-1);
                if !stdout.is_empty() {
                    changes = changes.with_output(stdout);
                }
                self.finish(&job, changes).await
            }
            Completion::WaitFailed(e) => {
                tracing::error!(job_id = %job.id, "Waiting on agent failed: {}", e);
                self.finish(&job, JobUpdate::failed(e.to_string())).await
            }
            Completion::Exited { status, stdout, stderr } => {
                self.complete(job, profile, cwd.as_deref(), status, stdout, stderr).await
            }
        }
    }

    /// Record a normal exit, then attempt auto-PR on success.
    async fn complete(
        &self,
        job: Job,
        profile: &Profile,
        cwd: Option<&Path>,
        status: ExitStatus,
        stdout: String,
        stderr: String,
    ) -> Job {
        let mut job = job;
        if let Some(session_id) = extract_session_id(&stdout) {
            job = self.record(&job, JobUpdate::new().with_session_id(session_id)).await;
        }

        // Killed by a signal has no code.
        let exit_code = status.code().unwrap_or(-1);
        let outcome = if exit_code == 0 {
            JobStatus::Succeeded
        } else {
            JobStatus::Failed
        };
        let mut changes = JobUpdate::finished(outcome)
            .with_exit_code(exit_code)
            .with_output(stdout);
        if !stderr.is_empty() {
            changes = changes.with_error(stderr);
        }
        let job = self.finish(&job, changes).await;
        tracing::info!(job_id = %job.id, status = %job.status, exit_code, "Agent exited");

        match cwd {
            Some(dir) if job.status == JobStatus::Succeeded && profile.auto_pr && !job.repo_url.is_empty() => {
                self.auto_pr(job, dir).await
            }
            _ => job,
        }
    }

    async fn auto_pr(&self, job: Job, dir: &Path) -> Job {
        match self.pr.create_pr(&job, dir).await {
            Ok(Some(url)) => self.record(&job, JobUpdate::new().with_pr_url(url)).await,
            Ok(None) => job,
            Err(e) => {
                tracing::warn!(job_id = %job.id, "Auto-PR failed: {}", e);
                job
            }
        }
    }

    /// Persist a forward transition. Store failures are logged and the
    /// change is applied to the in-memory record instead.
    async fn finish(&self, job: &Job, changes: JobUpdate) -> Job {
        match self.store.advance(&job.id, changes.clone()).await {
            Ok(Some(updated)) => updated,
            Ok(None) => {
                tracing::warn!(job_id = %job.id, "Job vanished from the store");
                applied(job, changes)
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, "Failed to persist job: {}", e);
                applied(job, changes)
            }
        }
    }

    /// The persisted record, if it reached a terminal status behind our back.
    async fn stopped_meanwhile(&self, job: &Job) -> Option<Job> {
        match self.store.get(&job.id).await {
            Ok(Some(latest)) if latest.status.is_terminal() => Some(latest),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(job_id = %job.id, "Could not re-read job: {}", e);
                None
            }
        }
    }

    /// Persist a non-status field (pid, session id, PR URL).
    async fn record(&self, job: &Job, changes: JobUpdate) -> Job {
        match self.store.update(&job.id, changes.clone()).await {
            Ok(Some(updated)) => updated,
            Ok(None) => applied(job, changes),
            Err(e) => {
                tracing::warn!(job_id = %job.id, "Failed to persist job: {}", e);
                applied(job, changes)
            }
        }
    }
}

fn applied(job: &Job, changes: JobUpdate) -> Job {
    let mut job = job.clone();
    changes.apply(&mut job);
    job
}

async fn read_pipe<R: AsyncRead + Unpin>(mut pipe: R) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Err(e) = pipe.read_to_end(&mut buf).await {
        tracing::debug!("Agent pipe read ended early: {}", e);
    }
    buf
}

/// Decode a reader task's bytes, replacing invalid UTF-8.
async fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> String {
    let Some(handle) = reader else {
        return String::new();
    };
    match tokio::time::timeout(DRAIN_TIMEOUT, handle).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        Ok(Err(e)) => {
            tracing::debug!("Agent pipe reader failed: {}", e);
            String::new()
        }
        Err(_) => {
            tracing::debug!("Agent pipe still open after drain timeout");
            String::new()
        }
    }
}
