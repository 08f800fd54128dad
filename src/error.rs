//! Error types for the job orchestrator.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Repository error: {0}")]
    Repo(#[from] RepoError),

    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    #[error("Runner error: {0}")]
    Runner(#[from] RunnerError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration file {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Job persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Fast backend error: {0}")]
    Backend(String),

    #[error("Failed to write job file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read job file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Repository cache errors.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("git failed: {command}: {stderr}")]
    GitFailed { command: String, stderr: String },

    #[error("git timed out after {timeout:?}: {command}")]
    GitTimeout { command: String, timeout: Duration },

    #[error("Failed to spawn git: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Repository lock error for {key}: {reason}")]
    Lock { key: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Profile loading and materialization errors.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("Profile not found: {0}")]
    NotFound(String),

    #[error("Invalid profile at {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },

    #[error("Failed to materialize {path}: {source}")]
    Materialize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid .mcp.json at {path}: {reason}")]
    McpJson { path: PathBuf, reason: String },
}

/// Agent subprocess and auto-PR errors.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Agent binary not found: {0}")]
    BinaryNotFound(String),

    #[error("Timeout after {0}s")]
    Timeout(u64),

    #[error("Failed to run {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
