//! Redis-based cache implementation
//!
//! This module implements caching using Redis as the backend.
//! It's suitable for distributed deployments where several service instances
//! must share revocation state and rate-limit counters.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;

use crate::error::CacheError;

use super::traits::CachePlugin;

/// INCR and set the expiry only when the key was just created.
/// Redis runs the script atomically, so no increment is lost.
const INCREMENT_WITH_TTL: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return count
"#;

/// Configuration for the Redis cache
#[derive(Debug, Clone)]
pub struct RedisCacheConfig {
    /// Redis connection URL
    pub url: String,
    /// Key prefix for all cache entries
    pub prefix: String,
    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            prefix: "auth-service:".to_string(),
            connection_timeout_secs: 5,
        }
    }
}

impl RedisCacheConfig {
    /// Generates a prefixed key for Redis storage
    fn make_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

/// Redis-based cache implementation
pub struct RedisCache {
    config: RedisCacheConfig,
    conn: ConnectionManager,
    increment: Script,
}

impl RedisCache {
    /// Connects to Redis with the given configuration
    pub async fn connect(config: RedisCacheConfig) -> Result<Self, CacheError> {
        let client = redis::Client::open(config.url.as_str())?;
        let timeout = Duration::from_secs(config.connection_timeout_secs);

        let conn = tokio::time::timeout(timeout, client.get_connection_manager())
            .await
            .map_err(|_| {
                CacheError::Unavailable(format!("timed out connecting to {}", config.url))
            })??;

        tracing::info!(prefix = %config.prefix, "Connected to Redis cache");

        Ok(Self {
            config,
            conn,
            increment: Script::new(INCREMENT_WITH_TTL),
        })
    }

    /// Returns the configured Redis URL
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Returns the key prefix
    pub fn prefix(&self) -> &str {
        &self.config.prefix
    }
}

/// Milliseconds for PX/PEXPIRE; Redis rejects zero
fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl CachePlugin for RedisCache {
    fn name(&self) -> &str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(self.config.make_key(key))
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(self.config.make_key(key))
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn increment_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64, CacheError> {
        let mut conn = self.conn.clone();
        let count: u64 = self
            .increment
            .key(self.config.make_key(key))
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(self.config.make_key(key))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }
}
