//! Auto-PR: push the agent's worktree branch and open a pull request.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::process::Command;

use crate::error::RunnerError;
use crate::job::Job;
use crate::job::model::truncate_chars;
use crate::repos::cache::credential_args;
use crate::repos::git::redact_credentials;

/// Branch prefix used by the agent for `--worktree` branches.
pub const WORKTREE_BRANCH_PREFIX: &str = "cc-";
const PR_TITLE_CHARS: usize = 70;
const STEP_TIMEOUT: Duration = Duration::from_secs(300);

#[async_trait]
pub trait PrCreator: Send + Sync {
    /// Open a PR for `job`'s changes in `repo_dir`.
    ///
    /// `Ok(None)` means there was nothing to propose or a step declined.
    async fn create_pr(&self, job: &Job, repo_dir: &Path) -> Result<Option<String>, RunnerError>;
}

/// `git` + `gh` CLI implementation.
#[derive(Debug, Clone)]
pub struct GhPrCreator {
    git: String,
    gh: String,
    token: Option<SecretString>,
}

impl Default for GhPrCreator {
    fn default() -> Self {
        Self::new()
    }
}

impl GhPrCreator {
    pub fn new() -> Self {
        Self::with_programs("git", "gh")
    }

    /// Override the program paths.
    pub fn with_programs(git: impl Into<String>, gh: impl Into<String>) -> Self {
        Self {
            git: git.into(),
            gh: gh.into(),
            token: None,
        }
    }

    /// Authenticate the push and `gh` with `token`.
    pub fn with_token(mut self, token: Option<SecretString>) -> Self {
        self.token = token;
        self
    }

    /// Stdout on success, `None` on a non-zero exit or timeout.
    async fn step(&self, program: &str, args: &[&str], cwd: &Path) -> Result<Option<String>, RunnerError> {
        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(cwd)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(token) = &self.token {
            command.env("GH_TOKEN", token.expose_secret());
        }
        let child = command
            .spawn()
            .map_err(|source| RunnerError::Io {
                program: program.to_string(),
                source,
            })?;

        let output = match tokio::time::timeout(STEP_TIMEOUT, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| RunnerError::Io {
                program: program.to_string(),
                source,
            })?,
            Err(_) => {
                tracing::warn!(program, args = %redact_credentials(&args.join(" ")), "Auto-PR step timed out");
                return Ok(None);
            }
        };

        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
        } else {
            tracing::warn!(
                program,
                args = %redact_credentials(&args.join(" ")),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Auto-PR step failed"
            );
            Ok(None)
        }
    }
}

/// Last `cc-*` branch from `git branch --list` output.
fn pick_worktree_branch(listing: &str) -> Option<String> {
    listing
        .lines()
        .map(|l| l.trim().trim_start_matches(['*', '+']).trim())
        .filter(|b| b.starts_with(WORKTREE_BRANCH_PREFIX))
        .next_back()
        .map(str::to_string)
}

fn pr_body(job: &Job) -> String {
    format!("Job: {}\n\nTask: {}\n\nProfile: {}", job.id, job.task, job.profile)
}

#[async_trait]
impl PrCreator for GhPrCreator {
    async fn create_pr(&self, job: &Job, repo_dir: &Path) -> Result<Option<String>, RunnerError> {
        if job.repo_url.is_empty() || !repo_dir.exists() {
            return Ok(None);
        }

        let pattern = format!("{WORKTREE_BRANCH_PREFIX}*");
        let Some(listing) = self.step(&self.git, &["branch", "--list", &pattern], repo_dir).await? else {
            return Ok(None);
        };
        let Some(branch) = pick_worktree_branch(&listing) else {
            tracing::info!(job_id = %job.id, "No worktree branch, skipping PR");
            return Ok(None);
        };

        let range = format!("origin/HEAD..{branch}");
        let log = self
            .step(&self.git, &["log", &range, "--oneline"], repo_dir)
            .await?
            .unwrap_or_default();
        if log.trim().is_empty() {
            tracing::info!(job_id = %job.id, branch = %branch, "No new commits, skipping PR");
            return Ok(None);
        }

        let mut push = credential_args(&job.repo_url, self.token.as_ref());
        push.extend(["push".to_string(), "origin".to_string(), branch.clone()]);
        let push: Vec<&str> = push.iter().map(String::as_str).collect();
        if self.step(&self.git, &push, repo_dir).await?.is_none() {
            return Ok(None);
        }

        let title = truncate_chars(&job.task, PR_TITLE_CHARS);
        let body = pr_body(job);
        let url = self
            .step(
                &self.gh,
                &["pr", "create", "--title", &title, "--body", &body, "--head", &branch],
                repo_dir,
            )
            .await?
            .map(|out| out.trim().to_string())
            .filter(|url| !url.is_empty());

        if let Some(url) = &url {
            tracing::info!(job_id = %job.id, pr_url = %url, "Opened pull request");
        }
        Ok(url)
    }
}
