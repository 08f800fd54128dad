//! Per-repository mutual exclusion for clone/fetch.
//!
//! Two modes:
//! - **Local**: an exclusive advisory lock on `{root}/{key}/.lock`. Only reliable
//!   on a single host.
//! - **Distributed**: a lease key in the fast key/value backend, taken with
//!   exponential backoff. If the deadline passes (or the backend errors) the
//!   caller proceeds without the lock: clone/fetch is idempotent, so the worst
//!   case is a wasted double fetch.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fs2::FileExt;
use uuid::Uuid;

use crate::error::RepoError;
use crate::store::KvBackend;

/// Retry schedule for the distributed lock.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}

/// Lock strategy for the repository cache.
#[derive(Clone)]
pub enum RepoLocker {
    Local,
    Distributed {
        kv: Arc<dyn KvBackend>,
        key_prefix: String,
        /// Total time to wait; also the lease length.
        deadline: Duration,
        backoff: Backoff,
    },
}

impl std::fmt::Debug for RepoLocker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => f.write_str("Local"),
            Self::Distributed {
                kv,
                key_prefix,
                deadline,
                ..
            } => f
                .debug_struct("Distributed")
                .field("backend", &kv.name())
                .field("key_prefix", key_prefix)
                .field("deadline", deadline)
                .finish(),
        }
    }
}

/// A held (or skipped) repository lock. Call [`RepoLockGuard::release`].
///
/// A file lock is also released when the guard is dropped.
pub enum RepoLockGuard {
    File { file: File, path: PathBuf },
    Lease {
        kv: Arc<dyn KvBackend>,
        key: String,
        token: String,
    },
    /// Proceeding without mutual exclusion.
    Skipped,
}

impl RepoLockGuard {
    /// Whether mutual exclusion is actually held.
    pub fn is_held(&self) -> bool {
        !matches!(self, Self::Skipped)
    }

    /// Release the lock. Never fails; problems are logged.
    pub async fn release(self) {
        match self {
            Self::File { file, path } => {
                let result = tokio::task::spawn_blocking(move || FileExt::unlock(&file)).await;
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::warn!(path = %path.display(), "Failed to unlock repo lock: {}", e)
                    }
                    Err(e) => tracing::warn!(path = %path.display(), "Unlock task failed: {}", e),
                }
            }
            Self::Lease { kv, key, token } => match kv.delete_if_equals(&key, &token).await {
                Ok(true) => {}
                Ok(false) => tracing::warn!(key = %key, "Repo lease expired before release"),
                Err(e) => tracing::warn!(key = %key, "Failed to release repo lease: {}", e),
            },
            Self::Skipped => {}
        }
    }
}

impl RepoLocker {
    /// Acquire the lock for `key`, whose directory is `key_dir`.
    pub async fn acquire(&self, key: &str, key_dir: &Path) -> Result<RepoLockGuard, RepoError> {
        match self {
            Self::Local => acquire_file_lock(key, key_dir.join(".lock")).await,
            Self::Distributed {
                kv,
                key_prefix,
                deadline,
                backoff,
            } => {
                let lease_key = format!("{key_prefix}:repo-lock:{key}");
                Ok(acquire_lease(kv.clone(), lease_key, *deadline, *backoff).await)
            }
        }
    }
}

async fn acquire_file_lock(key: &str, path: PathBuf) -> Result<RepoLockGuard, RepoError> {
    let lock_path = path.clone();
    let file = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        file.lock_exclusive()?;
        Ok(file)
    })
    .await
    .map_err(|e| RepoError::Lock {
        key: key.to_string(),
        reason: e.to_string(),
    })??;

    tracing::debug!(repo_key = %key, "Acquired repo file lock");
    Ok(RepoLockGuard::File { file, path })
}

async fn acquire_lease(
    kv: Arc<dyn KvBackend>,
    key: String,
    deadline: Duration,
    backoff: Backoff,
) -> RepoLockGuard {
    let token = Uuid::new_v4().to_string();
    let started = Instant::now();
    let mut delay = backoff.initial;

    loop {
        match kv.set_if_absent(&key, &token, deadline).await {
            Ok(true) => {
                tracing::debug!(key = %key, waited = ?started.elapsed(), "Acquired repo lease");
                return RepoLockGuard::Lease { kv, key, token };
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(key = %key, "Repo lease backend error, proceeding without lock: {}", e);
                return RepoLockGuard::Skipped;
            }
        }

        let elapsed = started.elapsed();
        if elapsed >= deadline {
            tracing::warn!(
                key = %key,
                waited = ?elapsed,
                "Could not acquire repo lease before deadline, proceeding without lock"
            );
            return RepoLockGuard::Skipped;
        }
        tokio::time::sleep(delay.min(deadline - elapsed)).await;
        delay = (delay * 2).min(backoff.max);
    }
}
