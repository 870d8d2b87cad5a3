//! Shared entry point handing out readers and evictors.

use crate::config::CacheBinding;
use crate::error::{CacheError, CacheResult};
use crate::evict::{BatchEvictor, run_then_evict};
use crate::key::{FieldSelector, Namespace};
use crate::reader::{BatchReader, load_entry};
use crate::traits::CacheStore;
use serde::{Serialize, de::DeserializeOwned};
use std::future::Future;
use std::sync::Arc;

/// Batch cache over one shared store.
///
/// Readers and evictors created here all share the same store, so an
/// evictor bound to `company` invalidates what a `company` reader cached.
pub struct BatchCache<S: CacheStore + ?Sized> {
    store: Arc<S>,
}

impl<S: CacheStore> BatchCache<S> {
    /// Create a new batch cache owning `store`.
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
        }
    }
}

impl<S: CacheStore + ?Sized> BatchCache<S> {
    /// Create from an already shared store.
    pub fn from_arc(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The shared store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Bind a reader for `binding`.
    pub fn reader<K, V>(
        &self,
        binding: &CacheBinding,
        id_selector: FieldSelector<K>,
    ) -> CacheResult<BatchReader<Arc<S>, K, V>> {
        BatchReader::from_binding(self.store.clone(), binding, id_selector)
    }

    /// Bind an evictor for `binding`.
    pub fn evictor<K>(
        &self,
        binding: &CacheBinding,
        selector: FieldSelector<K>,
    ) -> CacheResult<BatchEvictor<Arc<S>, K>> {
        BatchEvictor::from_binding(self.store.clone(), binding, selector)
    }

    /// Serve the whole entry cached under `namespace`, loading it on a miss.
    pub async fn get_all<T, E, F, Fut>(&self, namespace: &str, loader: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let namespace = Namespace::new(namespace)?;
        load_entry(&*self.store, namespace.as_str(), loader).await
    }

    /// Run `operation`, then delete the bare keys of a comma-separated
    /// namespace list.
    pub async fn evict_all<T, E, F, Fut>(&self, namespaces: &str, operation: F) -> Result<T, E>
    where
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let keys = Namespace::parse_list(namespaces)?
            .into_iter()
            .map(|ns| ns.as_str().to_string())
            .collect();
        run_then_evict(&*self.store, keys, operation()).await
    }
}

impl<S: CacheStore + ?Sized> Clone for BatchCache<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}
