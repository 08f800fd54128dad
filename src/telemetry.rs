//! Job lifecycle hooks for observability.
//!
//! Hooks return `()`: an implementation that fails internally must log and
//! carry on.

use async_trait::async_trait;

use crate::job::Job;

#[async_trait]
pub trait JobTelemetry: Send + Sync {
    /// The job has entered `running`.
    async fn job_started(&self, job: &Job);

    /// The job's latest persisted record after the run, whatever the outcome.
    async fn job_finished(&self, job: &Job);
}

/// Emits structured `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

#[async_trait]
impl JobTelemetry for TracingTelemetry {
    async fn job_started(&self, job: &Job) {
        tracing::info!(
            target: "agent_jobs::telemetry",
            job_id = %job.id,
            profile = %job.profile,
            repo = %job.repo_url,
            session_id = job.session_id.as_deref().unwrap_or(""),
            "job started"
        );
    }

    async fn job_finished(&self, job: &Job) {
        let duration_ms = match (job.started_at, job.ended_at) {
            (Some(start), Some(end)) => (end - start).num_milliseconds(),
            _ => -1,
        };
        tracing::info!(
            target: "agent_jobs::telemetry",
            job_id = %job.id,
            status = %job.status,
            exit_code = job.exit_code.unwrap_or(-1),
            duration_ms,
            session_id = job.session_id.as_deref().unwrap_or(""),
            pr_url = job.pr_url.as_deref().unwrap_or(""),
            "job finished"
        );
    }
}

/// Does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

#[async_trait]
impl JobTelemetry for NoopTelemetry {
    async fn job_started(&self, _job: &Job) {}

    async fn job_finished(&self, _job: &Job) {}
}
