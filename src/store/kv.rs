//! Fast key/value backend trait.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

/// A networked (or in-process) key/value store with per-key expiry.
///
/// Used for job records and for distributed repository locks. Implementations
/// handle their own concurrency for distinct keys.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Check connectivity.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Store `value` under `key`, replacing any previous value.
    /// `ttl = None` means no expiry.
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Fetch the value under `key`, if present and unexpired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// List all live keys starting with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Atomically store `value` only if `key` is absent. Returns whether it was stored.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
    -> Result<bool, StoreError>;

    /// Atomically delete `key` only if it currently holds `value`.
    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, StoreError>;
}
