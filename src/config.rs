//! Configuration types.
//!
//! Values come from an optional YAML file overlaid by environment variables
//! (env > YAML > defaults). An empty environment value counts as unset.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::ConfigError;

/// Repository cache settings.
#[derive(Debug, Clone)]
pub struct ReposConfig {
    /// Root directory holding `{key}/repo` clones.
    pub root: PathBuf,
    /// Admission-control hint for front ends. Not enforced by the runner.
    pub max_parallel_jobs: usize,
    /// TTL applied to job records in the fast backend.
    pub job_ttl_seconds: u64,
}

/// Agent binary settings.
#[derive(Debug, Clone)]
pub struct AgentBinaryConfig {
    /// Path or name of the agent CLI.
    pub binary: String,
    /// Fallback timeout when a profile does not set one.
    pub timeout: Duration,
    /// Profile used when a request names none (or an unknown one).
    pub default_profile: String,
    /// Exported as `CLAUDE_CONFIG_DIR` to the agent when set.
    pub config_dir: Option<PathBuf>,
}

/// Job store settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory for `{id}.json` job files.
    pub jobs_dir: PathBuf,
    /// Fast backend URL (`redis://…`). `None` means file-only.
    pub redis_url: Option<String>,
    /// Key namespace in the fast backend.
    pub key_prefix: String,
}

/// How clone/fetch is serialized per repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Advisory file lock, single host only.
    Local,
    /// Lease key in the fast backend, for hosts sharing a filesystem.
    Distributed,
}

impl std::str::FromStr for LockMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" | "file" => Ok(Self::Local),
            "distributed" | "redis" => Ok(Self::Distributed),
            other => Err(ConfigError::InvalidValue {
                key: "lock.mode".to_string(),
                message: format!("expected local or distributed, got {other}"),
            }),
        }
    }
}

/// Repository lock settings.
#[derive(Debug, Clone)]
pub struct LockConfig {
    pub mode: LockMode,
    /// Total time to wait for a distributed lock; also the lease length.
    pub timeout: Duration,
}

/// OpenTelemetry settings forwarded to the agent subprocess.
#[derive(Debug, Clone)]
pub struct OtelConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub protocol: String,
    pub log_prompts: bool,
    pub log_tool_details: bool,
}

/// GitHub credentials.
#[derive(Debug, Clone, Default)]
pub struct GithubConfig {
    pub token: Option<SecretString>,
}

/// Access-proxy client credentials, forwarded as custom request headers.
#[derive(Debug, Clone, Default)]
pub struct ProxyAuthConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
}

/// Profile search locations.
#[derive(Debug, Clone, Default)]
pub struct ProfilesConfig {
    /// Searched in order; later directories override earlier ones.
    pub dirs: Vec<PathBuf>,
}

/// Full orchestrator configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub repos: ReposConfig,
    pub agent: AgentBinaryConfig,
    pub store: StoreConfig,
    pub lock: LockConfig,
    pub otel: OtelConfig,
    pub github: GithubConfig,
    pub proxy: ProxyAuthConfig,
    pub profiles: ProfilesConfig,
}

// ── YAML shape ──────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    repos: RawRepos,
    agent: RawAgent,
    store: RawStore,
    lock: RawLock,
    otel: RawOtel,
    github: RawGithub,
    proxy: RawProxy,
    profiles: RawProfiles,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRepos {
    root: Option<String>,
    max_parallel_jobs: Option<usize>,
    job_ttl_seconds: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAgent {
    binary: Option<String>,
    timeout: Option<u64>,
    default_profile: Option<String>,
    config_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawStore {
    jobs_dir: Option<String>,
    redis_url: Option<String>,
    key_prefix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawLock {
    mode: Option<String>,
    timeout: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawOtel {
    enabled: Option<bool>,
    endpoint: Option<String>,
    protocol: Option<String>,
    log_prompts: Option<bool>,
    log_tool_details: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawGithub {
    token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawProxy {
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawProfiles {
    dirs: Vec<String>,
}

/// Home directory, falling back to the current directory.
pub fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Base directory for orchestrator state (`~/.agent-jobs`).
pub fn state_dir() -> PathBuf {
    home_dir().join(".agent-jobs")
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => home_dir().join(rest),
        None if path == "~" => home_dir(),
        None => PathBuf::from(path),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got {other}"),
        }),
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

impl Config {
    /// Default config file location.
    pub fn default_path() -> PathBuf {
        state_dir().join("config.yml")
    }

    /// Load from `path` (or the default location) with process env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        let yaml = if path.exists() {
            std::fs::read_to_string(&path)?
        } else {
            String::new()
        };
        Self::from_sources(&path, &yaml, |key| std::env::var(key).ok())
    }

    /// Build from YAML text and an environment lookup.
    pub fn from_sources<F>(path: &Path, yaml: &str, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw: RawConfig = if yaml.trim().is_empty() {
            RawConfig::default()
        } else {
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        };
        let env = |key: &str| env(key).filter(|v| !v.is_empty());

        let repos_root = env("AGENT_JOBS_REPOS_ROOT")
            .or(raw.repos.root)
            .map(|p| expand_home(&p))
            .unwrap_or_else(|| home_dir().join("agent-jobs-repos"));
        let max_parallel_jobs = match env("AGENT_JOBS_MAX_PARALLEL_JOBS") {
            Some(v) => parse_num("AGENT_JOBS_MAX_PARALLEL_JOBS", &v)?,
            None => raw.repos.max_parallel_jobs.unwrap_or(3),
        };
        let job_ttl_seconds = match env("AGENT_JOBS_JOB_TTL") {
            Some(v) => parse_num("AGENT_JOBS_JOB_TTL", &v)?,
            None => raw.repos.job_ttl_seconds.unwrap_or(86_400),
        };

        let timeout_secs: u64 = match env("AGENT_JOBS_AGENT_TIMEOUT") {
            Some(v) => parse_num("AGENT_JOBS_AGENT_TIMEOUT", &v)?,
            None => raw.agent.timeout.unwrap_or(3600),
        };
        let agent = AgentBinaryConfig {
            binary: env("AGENT_JOBS_AGENT_BINARY")
                .or(raw.agent.binary)
                .unwrap_or_else(|| "claude".to_string()),
            timeout: Duration::from_secs(timeout_secs),
            default_profile: env("AGENT_JOBS_DEFAULT_PROFILE")
                .or(raw.agent.default_profile)
                .unwrap_or_else(|| "code".to_string()),
            config_dir: env("AGENT_JOBS_AGENT_CONFIG_DIR")
                .or(raw.agent.config_dir)
                .map(|p| expand_home(&p)),
        };

        let store = StoreConfig {
            jobs_dir: env("AGENT_JOBS_JOBS_DIR")
                .or(raw.store.jobs_dir)
                .map(|p| expand_home(&p))
                .unwrap_or_else(|| state_dir().join("jobs")),
            redis_url: env("REDIS_URL").or(raw.store.redis_url),
            key_prefix: env("REDIS_KEY_PREFIX")
                .or(raw.store.key_prefix)
                .unwrap_or_else(|| "agent-jobs".to_string()),
        };

        let lock_mode = env("AGENT_JOBS_LOCK_MODE").or(raw.lock.mode);
        let lock_timeout: u64 = match env("AGENT_JOBS_LOCK_TIMEOUT") {
            Some(v) => parse_num("AGENT_JOBS_LOCK_TIMEOUT", &v)?,
            None => raw.lock.timeout.unwrap_or(600),
        };
        let lock = LockConfig {
            mode: match lock_mode {
                Some(m) => m.parse()?,
                None => LockMode::Local,
            },
            timeout: Duration::from_secs(lock_timeout),
        };

        let bool_setting = |key: &str, yaml: Option<bool>, default: bool| match env(key) {
            Some(v) => parse_bool(key, &v),
            None => Ok(yaml.unwrap_or(default)),
        };
        let otel = OtelConfig {
            enabled: bool_setting("AGENT_JOBS_OTEL_ENABLED", raw.otel.enabled, true)?,
            endpoint: env("OTEL_EXPORTER_OTLP_ENDPOINT")
                .or(raw.otel.endpoint)
                .unwrap_or_else(|| "http://otel-collector:4317".to_string()),
            protocol: env("OTEL_EXPORTER_OTLP_PROTOCOL")
                .or(raw.otel.protocol)
                .unwrap_or_else(|| "grpc".to_string()),
            log_prompts: bool_setting("AGENT_JOBS_OTEL_LOG_PROMPTS", raw.otel.log_prompts, false)?,
            log_tool_details: bool_setting(
                "AGENT_JOBS_OTEL_LOG_TOOL_DETAILS",
                raw.otel.log_tool_details,
                true,
            )?,
        };

        let github = GithubConfig {
            token: env("GITHUB_TOKEN")
                .or(raw.github.token)
                .map(SecretString::from),
        };
        let proxy = ProxyAuthConfig {
            client_id: env("CF_ACCESS_CLIENT_ID").or(raw.proxy.client_id),
            client_secret: env("CF_ACCESS_CLIENT_SECRET")
                .or(raw.proxy.client_secret)
                .map(SecretString::from),
        };

        let mut profile_dirs: Vec<PathBuf> = match env("AGENT_JOBS_PROFILES_DIRS") {
            Some(v) => v
                .split(':')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(expand_home)
                .collect(),
            None => raw.profiles.dirs.iter().map(|p| expand_home(p)).collect(),
        };
        let user_profiles = state_dir().join("profiles");
        if !profile_dirs.contains(&user_profiles) {
            profile_dirs.push(user_profiles);
        }

        Ok(Self {
            repos: ReposConfig {
                root: repos_root,
                max_parallel_jobs,
                job_ttl_seconds,
            },
            agent,
            store,
            lock,
            otel,
            github,
            proxy,
            profiles: ProfilesConfig { dirs: profile_dirs },
        })
    }

    /// Defaults only, ignoring file and environment.
    pub fn defaults() -> Self {
        Self::from_sources(Path::new("<defaults>"), "", |_| None)
            .expect("default configuration is valid")
    }
}
