use async_trait::async_trait;
use deadpool_redis::{Connection, Pool};
use redis::AsyncCommands;
use roster::ports::KeyValueStore;
use shared::{Error, Result};
use std::time::Duration;

/// Compare-and-delete: only the holder of the stored token may remove it.
const DELETE_IF_EQUALS_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// Add to an existing integer, clamp at zero, renew the TTL. Absent keys stay absent.
const ADJUST_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
    return nil
end
local next = tonumber(current) + tonumber(ARGV[1])
if next < 0 then
    next = 0
end
redis.call('SET', KEYS[1], next, 'PX', ARGV[2])
return next
"#;

const SCAN_BATCH: usize = 200;

/// Shared store for multi-instance deployments.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Builds a pool for `url` and checks that a connection can be made.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self> {
        let mut config = deadpool_redis::Config::from_url(url);
        let mut pool_config = config.pool.take().unwrap_or_default();
        pool_config.timeouts.wait = Some(timeout);
        pool_config.timeouts.create = Some(timeout);
        pool_config.timeouts.recycle = Some(timeout);
        config.pool = Some(pool_config);

        let pool = config
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(|e| Error::Unavailable(format!("Failed to create Redis pool: {}", e)))?;

        let store = Self::new(pool);
        store.connection().await?;
        tracing::info!("Connected to Redis");
        Ok(store)
    }

    async fn connection(&self) -> Result<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| Error::Unavailable(format!("Redis connection unavailable: {}", e)))
    }
}

fn redis_err(e: redis::RedisError) -> Error {
    Error::Storage(format!("Redis error: {}", e))
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;
        conn.get::<_, Option<Vec<u8>>>(key).await.map_err(redis_err)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut conn = self.connection().await?;
        conn.pset_ex::<_, _, ()>(key, value, ttl_millis(ttl))
            .await
            .map_err(redis_err)
    }

    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool> {
        let mut conn = self.connection().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut *conn)
            .await
            .map_err(redis_err)?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection().await?;
        let removed: u64 = conn.del(key).await.map_err(redis_err)?;
        Ok(removed > 0)
    }

    async fn delete_if_equals(&self, key: &str, expected: &[u8]) -> Result<bool> {
        let mut conn = self.connection().await?;
        let removed: i64 = redis::Script::new(DELETE_IF_EQUALS_SCRIPT)
            .key(key)
            .arg(expected)
            .invoke_async(&mut *conn)
            .await
            .map_err(redis_err)?;
        Ok(removed > 0)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let mut conn = self.connection().await?;
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        let mut removed = 0u64;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut *conn)
                .await
                .map_err(redis_err)?;

            if !keys.is_empty() {
                let count: u64 = conn.del(&keys).await.map_err(redis_err)?;
                removed += count;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }

        tracing::debug!(prefix, removed, "prefix invalidated");
        Ok(removed)
    }

    async fn adjust(&self, key: &str, delta: i64, ttl: Duration) -> Result<Option<i64>> {
        let mut conn = self.connection().await?;
        redis::Script::new(ADJUST_SCRIPT)
            .key(key)
            .arg(delta)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut *conn)
            .await
            .map_err(redis_err)
    }
}
