//! In-process `KvBackend` with lazy TTL expiry.
//!
//! Suitable for single-process deployments and tests. Expired entries are
//! dropped when they are next touched.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::store::kv::KvBackend;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-memory key/value store.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl KvBackend for MemoryKv {
    fn name(&self) -> &str {
        "memory"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: ttl.map(|t| Instant::now() + t),
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, e| e.is_live(now));
        Ok(entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| e.value == value) {
            entries.remove(key);
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_and_scan() {
        let kv = MemoryKv::new();
        kv.put("p:job:1", "a", None).await.unwrap();
        kv.put("p:job:2", "b", Some(Duration::from_secs(60))).await.unwrap();
        kv.put("other:1", "c", None).await.unwrap();

        assert_eq!(kv.get("p:job:1").await.unwrap().as_deref(), Some("a"));
        assert_eq!(kv.get("missing").await.unwrap(), None);

        let mut keys = kv.scan_prefix("p:job:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["p:job:1".to_string(), "p:job:2".to_string()]);
    }

    #[tokio::test]
    async fn entries_expire() {
        let kv = MemoryKv::new();
        kv.put("k", "v", Some(Duration::from_millis(20))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(kv.get("k").await.unwrap(), None);
        assert!(kv.is_empty().await);
    }

    #[tokio::test]
    async fn set_if_absent_is_exclusive_until_expiry() {
        let kv = MemoryKv::new();
        let ttl = Duration::from_millis(30);
        assert!(kv.set_if_absent("lock", "a", ttl).await.unwrap());
        assert!(!kv.set_if_absent("lock", "b", ttl).await.unwrap());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(kv.set_if_absent("lock", "b", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn delete_if_equals_checks_holder() {
        let kv = MemoryKv::new();
        kv.set_if_absent("lock", "a", Duration::from_secs(5)).await.unwrap();
        assert!(!kv.delete_if_equals("lock", "b").await.unwrap());
        assert!(kv.delete_if_equals("lock", "a").await.unwrap());
        assert_eq!(kv.get("lock").await.unwrap(), None);
    }
}
