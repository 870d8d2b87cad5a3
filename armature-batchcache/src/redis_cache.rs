//! Redis cache implementation.

use crate::config::{CacheBackend, CacheConfig};
use crate::error::{CacheError, CacheResult};
use crate::traits::CacheStore;
use async_trait::async_trait;
use redis::{AsyncCommands, Client, RedisResult, aio::ConnectionManager};
use std::collections::HashMap;
use std::future::Future;
use tracing::debug;

/// Redis cache store.
///
/// Batch reads use a single `MGET`, batch writes a single pipeline and batch
/// deletes a single `DEL`. Redis has no notion of expire-after-access, so an
/// [`Expiry::AfterAccess`](crate::config::Expiry::AfterAccess) policy is
/// applied as a write TTL.
#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
    config: CacheConfig,
}

impl RedisCache {
    /// Create a new Redis cache instance.
    ///
    /// # Arguments
    ///
    /// * `config` - Cache configuration
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use armature_batchcache::*;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), CacheError> {
    ///     let config = CacheConfig::redis("redis://localhost:6379")?;
    ///     let cache = RedisCache::new(config).await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn new(config: CacheConfig) -> CacheResult<Self> {
        if config.backend != CacheBackend::Redis {
            return Err(CacheError::Configuration(
                "RedisCache requires a Redis configuration".to_string(),
            ));
        }

        let client =
            Client::open(config.url.as_str()).map_err(|e| CacheError::Connection(e.to_string()))?;

        let connection =
            tokio::time::timeout(config.connection_timeout, ConnectionManager::new(client))
                .await
                .map_err(|_| CacheError::Timeout)?
                .map_err(|e| CacheError::Connection(e.to_string()))?;

        debug!(url = %config.url, "Connected Redis cache store");
        Ok(Self { connection, config })
    }

    /// Get the underlying connection manager.
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    fn build_key(&self, key: &str) -> String {
        self.config.build_key(key)
    }

    fn ttl_seconds(&self) -> Option<u64> {
        self.config
            .expiry
            .map(|expiry| expiry.duration().as_secs().max(1))
    }

    async fn timed<T, F>(&self, operation: F) -> CacheResult<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.config.operation_timeout, operation).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(CacheError::Timeout),
        }
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get_json(&self, key: &str) -> CacheResult<Option<String>> {
        let key = self.build_key(key);
        let mut conn = self.connection.clone();
        self.timed(conn.get(&key)).await
    }

    async fn set_json(&self, key: &str, value: String) -> CacheResult<()> {
        let key = self.build_key(key);
        let mut conn = self.connection.clone();

        match self.ttl_seconds() {
            Some(seconds) => self.timed(conn.set_ex(&key, value, seconds)).await,
            None => self.timed(conn.set(&key, value)).await,
        }
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let key = self.build_key(key);
        let mut conn = self.connection.clone();
        self.timed(conn.del(&key)).await
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let key = self.build_key(key);
        let mut conn = self.connection.clone();
        self.timed(conn.exists(&key)).await
    }

    async fn clear(&self) -> CacheResult<()> {
        let mut conn = self.connection.clone();
        self.timed(redis::cmd("FLUSHDB").query_async(&mut conn)).await
    }

    async fn get_many(&self, keys: &[&str]) -> CacheResult<HashMap<String, String>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let full_keys: Vec<String> = keys.iter().map(|k| self.build_key(k)).collect();
        let mut conn = self.connection.clone();
        let values: Vec<Option<String>> = self.timed(conn.mget(&full_keys)).await?;

        Ok(keys
            .iter()
            .zip(values)
            .filter_map(|(key, value)| value.map(|value| (key.to_string(), value)))
            .collect())
    }

    async fn set_many(&self, items: &[(&str, String)]) -> CacheResult<()> {
        if items.is_empty() {
            return Ok(());
        }

        let ttl = self.ttl_seconds();
        let mut pipe = redis::pipe();
        for (key, value) in items {
            let key = self.build_key(key);
            match ttl {
                Some(seconds) => pipe.set_ex(key, value, seconds).ignore(),
                None => pipe.set(key, value).ignore(),
            };
        }

        let mut conn = self.connection.clone();
        self.timed(pipe.query_async(&mut conn)).await
    }

    async fn delete_many(&self, keys: &[&str]) -> CacheResult<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let full_keys: Vec<String> = keys.iter().map(|k| self.build_key(k)).collect();
        let mut conn = self.connection.clone();
        self.timed(conn.del(&full_keys)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_key() {
        let config = CacheConfig::redis("redis://localhost:6379")
            .unwrap()
            .with_key_prefix("test");

        assert_eq!(config.build_key("company-1"), "test:company-1");
    }

    #[tokio::test]
    async fn test_rejects_memory_config() {
        let result = RedisCache::new(CacheConfig::memory()).await;
        assert!(matches!(result, Err(CacheError::Configuration(_))));
    }
}
