//! Cache store trait definition.

use crate::error::CacheResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Storage collaborator used by the reconcilers.
///
/// Values are opaque JSON strings; expiration and eviction policy belong to
/// the store. Implementations must be safe to call from many tasks at once.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a JSON value from the cache.
    ///
    /// # Returns
    ///
    /// Returns `Ok(Some(value))` if the key exists, `Ok(None)` if not found,
    /// or an error if the operation fails.
    async fn get_json(&self, key: &str) -> CacheResult<Option<String>>;

    /// Add or overwrite a JSON value.
    async fn set_json(&self, key: &str, value: String) -> CacheResult<()>;

    /// Delete a key from the cache.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Check if a key exists in the cache.
    async fn exists(&self, key: &str) -> CacheResult<bool> {
        Ok(self.get_json(key).await?.is_some())
    }

    /// Clear all keys from the cache.
    ///
    /// **Warning:** This operation may be destructive and affect all keys.
    async fn clear(&self) -> CacheResult<()>;

    // ========== Batch Operations ==========

    /// Get multiple keys at once.
    ///
    /// # Returns
    ///
    /// A map holding only the keys that were found. Stores with a native
    /// multi-get should override this.
    async fn get_many(&self, keys: &[&str]) -> CacheResult<HashMap<String, String>> {
        use futures::future::try_join_all;

        let futures = keys.iter().map(|key| self.get_json(key));
        let values = try_join_all(futures).await?;

        Ok(keys
            .iter()
            .zip(values)
            .filter_map(|(key, value)| value.map(|value| (key.to_string(), value)))
            .collect())
    }

    /// Set multiple key-value pairs at once.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use armature_batchcache::*;
    /// # async fn example(cache: &impl CacheStore) -> CacheResult<()> {
    /// let items = vec![
    ///     ("company-1", r#"{"id":1,"name":"Acme"}"#.to_string()),
    ///     ("company-2", r#"{"id":2,"name":"Globex"}"#.to_string()),
    /// ];
    ///
    /// cache.set_many(&items).await?;
    /// # Ok(())
    /// # }
    /// ```
    async fn set_many(&self, items: &[(&str, String)]) -> CacheResult<()> {
        use futures::future::try_join_all;

        let futures = items
            .iter()
            .map(|(key, value)| self.set_json(key, value.clone()));

        try_join_all(futures).await?;
        Ok(())
    }

    /// Delete multiple keys at once.
    async fn delete_many(&self, keys: &[&str]) -> CacheResult<()> {
        use futures::future::try_join_all;

        let futures = keys.iter().map(|key| self.delete(key));
        try_join_all(futures).await?;
        Ok(())
    }
}

#[async_trait]
impl<S: CacheStore + ?Sized> CacheStore for Arc<S> {
    async fn get_json(&self, key: &str) -> CacheResult<Option<String>> {
        (**self).get_json(key).await
    }

    async fn set_json(&self, key: &str, value: String) -> CacheResult<()> {
        (**self).set_json(key, value).await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        (**self).delete(key).await
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        (**self).exists(key).await
    }

    async fn clear(&self) -> CacheResult<()> {
        (**self).clear().await
    }

    async fn get_many(&self, keys: &[&str]) -> CacheResult<HashMap<String, String>> {
        (**self).get_many(keys).await
    }

    async fn set_many(&self, items: &[(&str, String)]) -> CacheResult<()> {
        (**self).set_many(items).await
    }

    async fn delete_many(&self, keys: &[&str]) -> CacheResult<()> {
        (**self).delete_many(keys).await
    }
}
