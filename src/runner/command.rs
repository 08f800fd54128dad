//! Agent command line and environment.

use std::path::Path;

use secrecy::ExposeSecret;

use crate::config::Config;
use crate::job::Job;
use crate::profiles::{Profile, build_cli_args};

/// Everything needed to spawn the agent, minus the working directory.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Added on top of the inherited process environment.
    pub env: Vec<(String, String)>,
}

/// `Job: … | Task: … | Repo: … | Branch: …`, skipping empty parts.
pub fn context_prompt(job: &Job, base_ref: &str) -> Option<String> {
    let parts: Vec<String> = [
        ("Job", job.id.as_str()),
        ("Task", job.task.as_str()),
        ("Repo", job.repo_url.as_str()),
        ("Branch", base_ref),
    ]
    .iter()
    .filter(|(_, value)| !value.is_empty())
    .map(|(label, value)| format!("{label}: {value}"))
    .collect();
    (!parts.is_empty()).then(|| parts.join(" | "))
}

/// Profile flags, job context, the task and an optional resume flag.
pub fn build_args(profile: &Profile, job: &Job, base_ref: &str) -> Vec<String> {
    let mut args = build_cli_args(&profile.claude);
    if let Some(prompt) = context_prompt(job, base_ref) {
        args.push("--append-system-prompt".to_string());
        args.push(prompt);
    }
    args.push("-p".to_string());
    args.push(job.task.clone());
    if let Some(session_id) = job.session_id.as_deref().filter(|s| !s.is_empty()) {
        args.push("--resume".to_string());
        args.push(session_id.to_string());
    }
    args
}

/// Environment variables the agent receives in addition to ours.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentEnv {
    vars: Vec<(String, String)>,
}

impl AgentEnv {
    pub fn from_config(config: &Config) -> Self {
        let mut vars = Vec::new();
        let mut set = |key: &str, value: String| vars.push((key.to_string(), value));

        let otel = &config.otel;
        if otel.enabled {
            let flag = |on: bool| (if on { "1" } else { "0" }).to_string();
            set("CLAUDE_CODE_ENABLE_TELEMETRY", "1".to_string());
            set("OTEL_METRICS_EXPORTER", "otlp".to_string());
            set("OTEL_LOGS_EXPORTER", "otlp".to_string());
            set("OTEL_EXPORTER_OTLP_PROTOCOL", otel.protocol.clone());
            set("OTEL_EXPORTER_OTLP_ENDPOINT", otel.endpoint.clone());
            set("OTEL_LOG_USER_PROMPTS", flag(otel.log_prompts));
            set("OTEL_LOG_TOOL_DETAILS", flag(otel.log_tool_details));
        }

        if let Some(dir) = &config.agent.config_dir {
            set("CLAUDE_CONFIG_DIR", dir.to_string_lossy().into_owned());
        }

        if let Some(token) = &config.github.token {
            set("GITHUB_TOKEN", token.expose_secret().to_string());
        }

        if let (Some(id), Some(secret)) = (&config.proxy.client_id, &config.proxy.client_secret) {
            set(
                "ANTHROPIC_CUSTOM_HEADERS",
                format!(
                    "CF-Access-Client-Id: {id}\nCF-Access-Client-Secret: {}",
                    secret.expose_secret()
                ),
            );
        }

        Self { vars }
    }

    pub fn vars(&self) -> &[(String, String)] {
        &self.vars
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

impl AgentCommand {
    pub fn new(binary: &str, profile: &Profile, job: &Job, base_ref: &str, env: &AgentEnv) -> Self {
        Self {
            program: binary.to_string(),
            args: build_args(profile, job, base_ref),
            env: env.vars().to_vec(),
        }
    }

    /// A `tokio` command with piped output, killed when dropped.
    pub fn to_command(&self, cwd: Option<&Path>) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use secrecy::SecretString;

    use super::*;
    use crate::job::NewJob;

    fn job() -> Job {
        NewJob::new("fix the tests")
            .with_repo("https://github.com/acme/widgets.git")
            .into_job()
    }

    #[test]
    fn args_end_with_task_then_resume() {
        let mut job = job();
        job.session_id = Some("sess-1".into());
        let args = build_args(&Profile::named("code"), &job, "develop");

        let p = args.iter().position(|a| a == "-p").unwrap();
        assert_eq!(args[p + 1], "fix the tests");
        assert_eq!(&args[p + 2..], ["--resume", "sess-1"]);
        assert_eq!(args[0], "--worktree");

        let prompt_at = args.iter().position(|a| a == "--append-system-prompt").unwrap();
        assert_eq!(
            args[prompt_at + 1],
            format!(
                "Job: {} | Task: fix the tests | Repo: https://github.com/acme/widgets.git | Branch: develop",
                job.id
            )
        );
    }

    #[test]
    fn no_resume_without_session() {
        let args = build_args(&Profile::named("code"), &job(), "main");
        assert_eq!(args.last().map(String::as_str), Some("fix the tests"));
        assert!(!args.contains(&"--resume".to_string()));
    }

    #[test]
    fn context_prompt_skips_empty_parts() {
        let job = NewJob::new("hello").into_job();
        let prompt = context_prompt(&job, "").unwrap();
        assert_eq!(prompt, format!("Job: {} | Task: hello", job.id));
    }

    #[test]
    fn otel_vars_only_when_enabled() {
        let mut config = Config::defaults();
        config.otel.enabled = false;
        config.github.token = None;
        config.proxy.client_id = None;
        config.proxy.client_secret = None;
        config.agent.config_dir = None;
        assert!(AgentEnv::from_config(&config).vars().is_empty());

        config.otel.enabled = true;
        config.otel.log_prompts = false;
        config.otel.log_tool_details = true;
        let env = AgentEnv::from_config(&config);
        assert_eq!(env.get("CLAUDE_CODE_ENABLE_TELEMETRY"), Some("1"));
        assert_eq!(env.get("OTEL_METRICS_EXPORTER"), Some("otlp"));
        assert_eq!(env.get("OTEL_LOG_USER_PROMPTS"), Some("0"));
        assert_eq!(env.get("OTEL_LOG_TOOL_DETAILS"), Some("1"));
        assert_eq!(env.get("OTEL_EXPORTER_OTLP_ENDPOINT"), Some(config.otel.endpoint.as_str()));
    }

    #[test]
    fn auth_and_proxy_vars() {
        let mut config = Config::defaults();
        config.otel.enabled = false;
        config.agent.config_dir = Some(PathBuf::from("/etc/claude"));
        config.github.token = Some(SecretString::from("ghp_x"));
        config.proxy.client_id = Some("cid".into());
        config.proxy.client_secret = Some(SecretString::from("csecret"));

        let env = AgentEnv::from_config(&config);
        assert_eq!(env.get("CLAUDE_CONFIG_DIR"), Some("/etc/claude"));
        assert_eq!(env.get("GITHUB_TOKEN"), Some("ghp_x"));
        assert_eq!(
            env.get("ANTHROPIC_CUSTOM_HEADERS"),
            Some("CF-Access-Client-Id: cid\nCF-Access-Client-Secret: csecret")
        );
    }

    #[test]
    fn proxy_headers_need_both_halves() {
        let mut config = Config::defaults();
        config.proxy.client_id = Some("cid".into());
        config.proxy.client_secret = None;
        assert!(AgentEnv::from_config(&config).get("ANTHROPIC_CUSTOM_HEADERS").is_none());
    }
}
