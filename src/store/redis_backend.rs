//! Redis-backed `KvBackend`.
//!
//! One multiplexed connection is opened on first use and shared by all callers.
//! Connecting and every command are bounded by a timeout, so an unreachable
//! server reads as an unavailable backend instead of a hang.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tokio::sync::OnceCell;

use crate::error::StoreError;
use crate::store::kv::KvBackend;

/// Deletes KEYS[1] only when it holds ARGV[1].
const COMPARE_AND_DELETE: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Keys fetched per SCAN round trip.
const SCAN_COUNT: usize = 100;

pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RedisKv {
    client: redis::Client,
    conn: OnceCell<MultiplexedConnection>,
    timeout: Duration,
}

impl RedisKv {
    /// Parse the URL. No connection is made until the first command.
    pub fn new(url: &str) -> Result<Self, StoreError> {
        Ok(Self {
            client: redis::Client::open(url)?,
            conn: OnceCell::new(),
            timeout: DEFAULT_SOCKET_TIMEOUT,
        })
    }

    /// Bound for connecting and for each command.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// A failed or timed-out connect leaves the cell empty, so the next call retries.
    async fn conn(&self) -> Result<MultiplexedConnection, StoreError> {
        self.conn
            .get_or_try_init(|| {
                self.bounded("connect", self.client.get_multiplexed_async_connection())
            })
            .await
            .cloned()
    }

    async fn bounded<T, F>(&self, op: &str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, redis::RedisError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Backend(format!(
                "redis {op} timed out after {}ms",
                self.timeout.as_millis()
            ))),
        }
    }
}

impl std::fmt::Debug for RedisKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisKv")
            .field("connected", &self.conn.initialized())
            .finish()
    }
}

#[async_trait]
impl KvBackend for RedisKv {
    fn name(&self) -> &str {
        "redis"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: String = self
            .bounded("PING", redis::cmd("PING").query_async(&mut conn))
            .await?;
        Ok(())
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        self.bounded("SET", async {
            let reply: Result<(), redis::RedisError> = match ttl {
                Some(ttl) => conn.set_ex(key, value, ttl.as_secs().max(1)).await,
                None => conn.set(key, value).await,
            };
            reply
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn().await?;
        let value: Option<String> = self.bounded("GET", conn.get(key)).await?;
        Ok(value)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn().await?;
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let mut scan = redis::cmd("SCAN");
            scan.arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT);
            let (next, batch): (u64, Vec<String>) =
                self.bounded("SCAN", scan.query_async(&mut conn)).await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let mut set = redis::cmd("SET");
        set.arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis().max(1) as u64);
        let reply: Option<String> = self.bounded("SET NX", set.query_async(&mut conn)).await?;
        Ok(reply.is_some())
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let script = redis::Script::new(COMPARE_AND_DELETE);
        let mut invocation = script.prepare_invoke();
        invocation.key(key).arg(value);
        let deleted: i64 = self
            .bounded("EVALSHA", invocation.invoke_async(&mut conn))
            .await?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_url() {
        assert!(RedisKv::new("not a url").is_err());
    }

    #[tokio::test]
    async fn unreachable_server_fails_ping() {
        // Port 1 is reserved and never has a listener.
        let kv = RedisKv::new("redis://127.0.0.1:1/").unwrap();
        assert!(kv.ping().await.is_err());
    }

    #[tokio::test]
    async fn silent_server_times_out_instead_of_hanging() {
        // Accepts TCP connections but never answers the handshake.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let kv = RedisKv::new(&format!("redis://{addr}/"))
            .unwrap()
            .with_timeout(Duration::from_millis(200));
        let started = std::time::Instant::now();
        let err = kv.ping().await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(err.to_string().contains("timed out"), "{err}");
        assert!(kv.get("k").await.is_err());
        accept.abort();
    }
}
