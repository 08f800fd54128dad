//! Job record and state machine.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stored output is capped at this many characters.
pub const MAX_OUTPUT_CHARS: usize = 50_000;

/// Stored error text is capped at this many characters.
pub const MAX_ERROR_CHARS: usize = 10_000;

/// Default base ref for new jobs.
pub const DEFAULT_BASE_REF: &str = "main";

/// Default record TTL in the fast backend (one day).
pub const DEFAULT_TTL_SECONDS: u64 = 86_400;

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, not yet picked up by a runner.
    Queued,
    /// The runner is preparing or executing the agent.
    Running,
    /// The agent exited with code 0.
    Succeeded,
    /// Any failure before or during the agent run.
    Failed,
    /// Cancelled by an external request.
    Cancelled,
    /// The record outlived its TTL.
    Expired,
}

impl JobStatus {
    /// Check if this status allows moving to `target`.
    pub fn can_transition_to(&self, target: JobStatus) -> bool {
        use JobStatus::*;

        matches!(
            (self, target),
            (Queued, Running) | (Queued, Cancelled) | (Queued, Failed) |
            (Running, Succeeded) | (Running, Failed) | (Running, Cancelled) |
            (Queued, Expired) | (Running, Expired)
        )
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Cancelled | Self::Expired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "expired" => Ok(Self::Expired),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Whether the submitting caller blocks on the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobMode {
    FireAndForget,
    Sync,
}

impl JobMode {
    pub fn from_wait(wait: bool) -> Self {
        if wait { Self::Sync } else { Self::FireAndForget }
    }
}

fn default_base_ref() -> String {
    DEFAULT_BASE_REF.to_string()
}

fn default_ttl() -> u64 {
    DEFAULT_TTL_SECONDS
}

/// One request to run the agent against a task/repository pair.
///
/// Optional fields that are unset are omitted from the serialized form and
/// stay `None` when read back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    #[serde(default)]
    pub repo_url: String,
    #[serde(default = "default_base_ref")]
    pub base_ref: String,
    pub task: String,
    #[serde(default)]
    pub profile: String,
    pub status: JobStatus,
    pub mode: JobMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

/// Fields supplied at creation time.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub task: String,
    pub profile: String,
    pub repo_url: String,
    pub base_ref: String,
    pub mode: JobMode,
    pub session_id: Option<String>,
    pub ttl_seconds: u64,
}

impl NewJob {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            profile: String::new(),
            repo_url: String::new(),
            base_ref: default_base_ref(),
            mode: JobMode::FireAndForget,
            session_id: None,
            ttl_seconds: DEFAULT_TTL_SECONDS,
        }
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    pub fn with_repo(mut self, repo_url: impl Into<String>) -> Self {
        self.repo_url = repo_url.into();
        self
    }

    pub fn with_base_ref(mut self, base_ref: impl Into<String>) -> Self {
        self.base_ref = base_ref.into();
        self
    }

    pub fn with_mode(mut self, mode: JobMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn with_ttl(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    /// Build the queued record with a fresh id and creation timestamp.
    pub fn into_job(self) -> Job {
        Job {
            id: Uuid::new_v4().to_string(),
            repo_url: self.repo_url,
            base_ref: self.base_ref,
            task: self.task,
            profile: self.profile,
            status: JobStatus::Queued,
            mode: self.mode,
            exit_code: None,
            session_id: self.session_id,
            pr_url: None,
            output: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            ttl_seconds: self.ttl_seconds,
            pid: None,
        }
    }
}

/// A partial update to a job record. Only fields that are `Some` are written.
///
/// `id`, `task`, `repo_url`, `mode` and `created_at` have no counterpart here:
/// they are fixed at creation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub exit_code: Option<i32>,
    pub session_id: Option<String>,
    pub pr_url: Option<String>,
    pub output: Option<String>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub pid: Option<u32>,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// `running` with `started_at = now`.
    pub fn started() -> Self {
        Self {
            status: Some(JobStatus::Running),
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// A terminal status with `ended_at = now`.
    pub fn finished(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ended_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// `failed` with the given error and `ended_at = now`.
    pub fn failed(error: impl Into<String>) -> Self {
        Self::finished(JobStatus::Failed).with_error(error)
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_pr_url(mut self, pr_url: impl Into<String>) -> Self {
        self.pr_url = Some(pr_url.into());
        self
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the set fields to `job`, bounding output and error sizes.
    pub fn apply(self, job: &mut Job) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(code) = self.exit_code {
            job.exit_code = Some(code);
        }
        if let Some(session_id) = self.session_id {
            job.session_id = Some(session_id);
        }
        if let Some(pr_url) = self.pr_url {
            job.pr_url = Some(pr_url);
        }
        if let Some(output) = self.output {
            job.output = Some(truncate_chars(&output, MAX_OUTPUT_CHARS));
        }
        if let Some(error) = self.error {
            job.error = Some(truncate_chars(&error, MAX_ERROR_CHARS));
        }
        if let Some(started_at) = self.started_at {
            job.started_at = Some(started_at);
        }
        if let Some(ended_at) = self.ended_at {
            job.ended_at = Some(ended_at);
        }
        if let Some(pid) = self.pid {
            job.pid = Some(pid);
        }
    }
}

/// Keep the first `max` characters of `s` (UTF-8 safe).
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_job() -> Job {
        let mut job = NewJob::new("fix the build")
            .with_repo("https://github.com/acme/widgets.git")
            .with_profile("code")
            .with_base_ref("develop")
            .with_mode(JobMode::Sync)
            .with_session(Some("sess-1".to_string()))
            .with_ttl(60)
            .into_job();
        JobUpdate::started().with_pid(4242).apply(&mut job);
        JobUpdate::finished(JobStatus::Succeeded)
            .with_exit_code(0)
            .with_output("done")
            .with_error("")
            .with_pr_url("https://github.com/acme/widgets/pull/7")
            .apply(&mut job);
        job
    }

    #[test]
    fn status_transitions_valid() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Succeeded));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Cancelled));
    }

    #[test]
    fn status_transitions_out_of_terminal_rejected() {
        for terminal in [
            JobStatus::Succeeded,
            JobStatus::Failed,
            JobStatus::Cancelled,
            JobStatus::Expired,
        ] {
            assert!(terminal.is_terminal());
            for target in [JobStatus::Queued, JobStatus::Running, JobStatus::Cancelled] {
                assert!(!terminal.can_transition_to(target));
            }
        }
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn status_string_forms() {
        assert_eq!(JobStatus::Succeeded.to_string(), "succeeded");
        assert_eq!(
            serde_json::to_string(&JobMode::FireAndForget).unwrap(),
            "\"fire_and_forget\""
        );
        assert_eq!("cancelled".parse::<JobStatus>(), Ok(JobStatus::Cancelled));
        assert!("done".parse::<JobStatus>().is_err());
    }

    #[test]
    fn new_job_is_queued_with_fresh_id() {
        let a = NewJob::new("a").into_job();
        let b = NewJob::new("a").into_job();
        assert_eq!(a.status, JobStatus::Queued);
        assert_ne!(a.id, b.id);
        assert!(a.started_at.is_none());
        assert!(a.ended_at.is_none());
        assert_eq!(a.base_ref, "main");
    }

    #[test]
    fn serialization_omits_absent_fields() {
        let job = NewJob::new("list files").into_job();
        let value = serde_json::to_value(&job).unwrap();
        let obj = value.as_object().unwrap();
        for key in [
            "exit_code",
            "session_id",
            "pr_url",
            "output",
            "error",
            "started_at",
            "ended_at",
            "pid",
        ] {
            assert!(!obj.contains_key(key), "{key} should be omitted");
        }
        assert!(obj.values().all(|v| !v.is_null()));
    }

    #[test]
    fn roundtrip_preserves_present_and_absent_fields() {
        let sparse = NewJob::new("list files").into_job();
        let full = full_job();
        for job in [sparse, full] {
            let json = serde_json::to_string(&job).unwrap();
            let back: Job = serde_json::from_str(&json).unwrap();
            assert_eq!(back, job);
        }
    }

    #[test]
    fn empty_string_stays_distinct_from_absent() {
        let job = full_job();
        assert_eq!(job.error.as_deref(), Some(""));
        let back: Job = serde_json::from_str(&serde_json::to_string(&job).unwrap()).unwrap();
        assert_eq!(back.error.as_deref(), Some(""));
    }

    #[test]
    fn update_applies_only_set_fields() {
        let mut job = full_job();
        let before = job.clone();
        JobUpdate::new().with_session_id("sess-2").apply(&mut job);
        assert_eq!(job.session_id.as_deref(), Some("sess-2"));
        assert_eq!(job.status, before.status);
        assert_eq!(job.pr_url, before.pr_url);
        assert_eq!(job.ended_at, before.ended_at);
    }

    #[test]
    fn update_truncates_output_and_error() {
        let mut job = NewJob::new("t").into_job();
        JobUpdate::failed("e".repeat(MAX_ERROR_CHARS + 5))
            .with_output("é".repeat(MAX_OUTPUT_CHARS + 10))
            .apply(&mut job);
        assert_eq!(job.output.unwrap().chars().count(), MAX_OUTPUT_CHARS);
        assert_eq!(job.error.unwrap().chars().count(), MAX_ERROR_CHARS);
    }

    #[test]
    fn truncate_chars_short_input_unchanged() {
        assert_eq!(truncate_chars("café", 10), "café");
        assert_eq!(truncate_chars("café", 3), "caf");
    }
}
