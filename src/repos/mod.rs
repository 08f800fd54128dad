//! Repository cache — one canonical clone per repository URL.
//!
//! Layout:
//! ```text
//! {repos_root}/{sha256(url)[:12]}/.lock
//! {repos_root}/{sha256(url)[:12]}/repo/
//! ```
//!
//! - `git` — the `GitRunner` seam and the production `git` CLI runner
//! - `lock` — per-repository mutual exclusion (file lock or lease key)
//! - `cache` — `RepoCache`: clone-once, fetch-on-reuse

pub mod cache;
pub mod git;
pub mod lock;

pub use cache::{RepoCache, repo_key};
pub use git::{CommandGit, GIT_TIMEOUT, GitOutput, GitRunner};
pub use lock::{Backoff, RepoLockGuard, RepoLocker};
