//! `JobService` — the submission API every front end calls.

use std::sync::Arc;

use crate::config::{Config, LockMode};
use crate::error::Error;
use crate::job::{Job, JobListResponse, JobMode, JobResponse, JobStatus, NewJob, SubmitRequest};
use crate::pr::GhPrCreator;
use crate::profiles::{DirProfileResolver, Profile};
use crate::repos::{Backoff, CommandGit, RepoCache, RepoLocker};
use crate::router;
use crate::runner::command::AgentEnv;
use crate::runner::runner::JobRunner;
use crate::runner::supervisor::JobSupervisor;
use crate::store::{FileJobStore, JobStore, KvBackend, RedisKv};

/// Submits, queries and cancels jobs.
pub struct JobService {
    runner: Arc<JobRunner>,
    supervisor: JobSupervisor,
    default_profile: String,
    ttl_seconds: u64,
}

impl JobService {
    pub fn new(runner: Arc<JobRunner>, default_profile: impl Into<String>, ttl_seconds: u64) -> Self {
        Self {
            runner,
            supervisor: JobSupervisor::new(),
            default_profile: default_profile.into(),
            ttl_seconds,
        }
    }

    /// Wire the production components from configuration.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let fast: Option<Arc<dyn KvBackend>> = match &config.store.redis_url {
            Some(url) => Some(Arc::new(RedisKv::new(url)?) as Arc<dyn KvBackend>),
            None => None,
        };
        let store = Arc::new(JobStore::new(
            FileJobStore::new(&config.store.jobs_dir),
            fast.clone(),
            config.store.key_prefix.clone(),
        ));

        let locker = match (config.lock.mode, fast) {
            (LockMode::Local, _) => RepoLocker::Local,
            (LockMode::Distributed, Some(kv)) => RepoLocker::Distributed {
                kv,
                key_prefix: config.store.key_prefix.clone(),
                deadline: config.lock.timeout,
                backoff: Backoff::default(),
            },
            (LockMode::Distributed, None) => {
                tracing::warn!("Distributed locking needs a fast backend; using local file locks");
                RepoLocker::Local
            }
        };
        let repos = Arc::new(
            RepoCache::new(&config.repos.root, Arc::new(CommandGit::new()), locker)
                .with_token(config.github.token.clone()),
        );

        let profiles = Arc::new(
            DirProfileResolver::new(config.profiles.dirs.clone())
                .with_default_timeout(config.agent.timeout.as_secs()),
        );

        let runner = JobRunner::new(store, repos, profiles, config.agent.binary.clone())
            .with_pr_creator(Arc::new(GhPrCreator::new().with_token(config.github.token.clone())))
            .with_env(AgentEnv::from_config(config));

        Ok(Self::new(
            Arc::new(runner),
            config.agent.default_profile.clone(),
            config.repos.job_ttl_seconds,
        ))
    }

    pub fn runner(&self) -> &Arc<JobRunner> {
        &self.runner
    }

    pub fn supervisor(&self) -> &JobSupervisor {
        &self.supervisor
    }

    /// Create a job and run it inline (`wait`) or in the background.
    ///
    /// A background submission returns the freshly created `queued` record.
    pub async fn submit(&self, req: SubmitRequest) -> JobResponse {
        if req.task.trim().is_empty() {
            return JobResponse::err("task must not be empty");
        }

        let profile = router::route(self.runner.profiles().as_ref(), &req.profile, &self.default_profile).await;
        let new = NewJob::new(req.task)
            .with_profile(profile)
            .with_repo(req.repo_url)
            .with_base_ref(req.base_ref)
            .with_mode(JobMode::from_wait(req.wait))
            .with_session(req.session_id)
            .with_ttl(self.ttl_seconds);

        let job = match self.runner.store().create(new).await {
            Ok(job) => job,
            Err(e) => {
                tracing::error!("Failed to create job: {}", e);
                return JobResponse::err(e.to_string());
            }
        };
        tracing::info!(job_id = %job.id, profile = %job.profile, mode = ?job.mode, "Job submitted");

        if req.wait {
            return JobResponse::ok(self.runner.run_job(job).await);
        }

        let runner = self.runner.clone();
        let queued = job.clone();
        self.supervisor.spawn(job.id.clone(), async move {
            runner.run_job(job).await;
        });
        JobResponse::ok(queued)
    }

    pub async fn get(&self, id: &str) -> JobResponse {
        match self.runner.store().get(id).await {
            Ok(Some(job)) => JobResponse::ok(job),
            Ok(None) => JobResponse::err(format!("Job not found: {id}")),
            Err(e) => JobResponse::err(e.to_string()),
        }
    }

    pub async fn list(&self, limit: usize, status: Option<JobStatus>) -> JobListResponse {
        match self.runner.store().list(limit, status).await {
            Ok(jobs) => JobListResponse::ok(jobs),
            Err(e) => JobListResponse::err(e.to_string()),
        }
    }

    pub async fn cancel(&self, id: &str) -> JobResponse {
        match self.runner.store().cancel(id).await {
            Ok(Some(job)) => {
                tracing::info!(job_id = %id, status = %job.status, "Cancel requested");
                JobResponse::ok(job)
            }
            Ok(None) => JobResponse::err(format!("Job not found: {id}")),
            Err(e) => JobResponse::err(e.to_string()),
        }
    }

    pub async fn profiles(&self) -> Vec<Profile> {
        self.runner.profiles().list().await
    }

    /// Wait for background jobs.
    pub async fn shutdown(&self) {
        self.supervisor.shutdown().await;
    }

    /// Poll until `id` reaches a terminal status or disappears.
    pub async fn wait_for(&self, id: &str, interval: std::time::Duration) -> Option<Job> {
        loop {
            match self.runner.store().get(id).await {
                Ok(Some(job)) if job.status.is_terminal() => return Some(job),
                Ok(Some(_)) => tokio::time::sleep(interval).await,
                Ok(None) => return None,
                Err(e) => {
                    tracing::warn!(job_id = %id, "Polling failed: {}", e);
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }
}
