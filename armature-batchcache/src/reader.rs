//! Batch read reconciliation.
//!
//! A [`BatchReader`] sits in front of a loader that fetches objects by
//! identifier. For each call it derives one key per identifier, looks all of
//! them up with a single multi-get, invokes the loader once with only the
//! missing identifiers, writes what the loader returned back to the store and
//! merges hits and loaded values into the loader's own return type.
//!
//! ```
//! use armature_batchcache::prelude::*;
//! use std::collections::HashMap;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), CacheError> {
//! let store = InMemoryCache::new();
//! let reader = BatchReader::new(store.clone(), "company", FieldSelector::<i32>::identity())?;
//!
//! let names: HashMap<i32, String> = reader
//!     .load_many(vec![1, 2], |ids: Vec<i32>| async move {
//!         Ok::<_, CacheError>(ids.into_iter().map(|id| (id, format!("company {id}"))).collect())
//!     })
//!     .await?;
//!
//! assert_eq!(names[&2], "company 2");
//! assert!(store.exists("company-1").await?);
//! # Ok(())
//! # }
//! ```

use crate::codec;
use crate::config::CacheBinding;
use crate::error::{CacheError, CacheResult};
use crate::key::{FieldSelector, Namespace, derive_key};
use crate::shape::{BatchOutput, IdBatch};
use crate::traits::CacheStore;
use serde::{Serialize, de::DeserializeOwned};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use tracing::{debug, trace};

/// Cache-aside reader bound to one namespace.
///
/// `K` is the identifier-bearing element of the loader's argument and `V`
/// the value type cached per identifier. A value selector is only needed
/// when the loader returns a list or set, since such results no longer carry
/// the identifier each value was loaded for.
pub struct BatchReader<S, K, V> {
    store: S,
    namespace: Namespace,
    id_selector: FieldSelector<K>,
    value_selector: Option<FieldSelector<V>>,
}

impl<S: CacheStore, K, V> BatchReader<S, K, V> {
    /// Bind a reader to a namespace.
    ///
    /// Fails with [`CacheError::Configuration`] for a blank namespace, before
    /// the store is ever used.
    pub fn new(
        store: S,
        namespace: impl Into<String>,
        id_selector: FieldSelector<K>,
    ) -> CacheResult<Self> {
        Ok(Self {
            store,
            namespace: Namespace::new(namespace)?,
            id_selector,
            value_selector: None,
        })
    }

    /// Bind a reader from a declared binding.
    ///
    /// A field selector must read the field the binding declares, otherwise
    /// this fails with [`CacheError::Configuration`].
    pub fn from_binding(
        store: S,
        binding: &CacheBinding,
        id_selector: FieldSelector<K>,
    ) -> CacheResult<Self> {
        binding.check_selector(&id_selector)?;
        Ok(Self {
            store,
            namespace: binding.read_namespace()?,
            id_selector,
            value_selector: None,
        })
    }

    /// Set the selector extracting the identifier from loaded values.
    pub fn with_value_selector(mut self, selector: FieldSelector<V>) -> Self {
        self.value_selector = Some(selector);
        self
    }

    /// The namespace keys are derived in.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Wrap a batched loader so every call goes through this reader.
    pub fn wrap<F>(self, loader: F) -> CachedLoader<S, K, V, F> {
        CachedLoader {
            reader: self,
            loader,
        }
    }

    /// Load a batch of identifiers, calling `loader` for the misses only.
    ///
    /// The loader receives an argument of the same concrete type as `ids`,
    /// holding each missing identifier once, in first-seen order. It is not
    /// called at all when every identifier is a hit. An absent batch
    /// (`None` for `Option` arguments) bypasses the cache entirely.
    ///
    /// The result is rebuilt from one entry per requested identifier, in
    /// request order, so a repeated identifier appears as often in a list
    /// result whether it was a hit or a miss. Values the loader returns for
    /// identifiers that were not missing are neither cached nor returned.
    ///
    /// Errors returned by the loader are passed through untouched.
    pub async fn load_many<A, R, E, F, Fut>(&self, ids: A, loader: F) -> Result<R, E>
    where
        A: IdBatch<Id = K>,
        K: Clone,
        R: BatchOutput<K, Value = V>,
        V: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce(A) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        if ids.identifiers().is_none() {
            debug!(namespace = %self.namespace, "Absent argument, bypassing cache");
            return loader(ids).await;
        }

        if R::SHAPE.needs_value_selector() && self.value_selector.is_none() {
            return Err(self.missing_value_selector::<R>().into());
        }

        let identifiers = ids.identifiers().unwrap_or_default();
        let keys = identifiers
            .iter()
            .map(|id| derive_key(&self.namespace, &self.id_selector, *id))
            .collect::<CacheResult<Vec<String>>>()?;

        let mut seen = HashSet::with_capacity(keys.len());
        let lookup: Vec<&str> = keys
            .iter()
            .map(String::as_str)
            .filter(|key| seen.insert(*key))
            .collect();
        let found = self.store.get_many(&lookup).await?;

        // One slot per requested occurrence, filled on a hit
        let mut slots: Vec<Option<V>> = Vec::with_capacity(keys.len());
        let mut missing: Vec<K> = Vec::new();
        let mut missing_keys: HashSet<&str> = HashSet::new();

        for (id, key) in identifiers.iter().zip(&keys) {
            let cached = match found.get(key) {
                Some(json) => codec::decode::<V>(json)?,
                None => None,
            };

            if cached.is_some() {
                trace!(key = %key, "Cache hit");
            } else if missing_keys.insert(key.as_str()) {
                trace!(key = %key, "Cache miss");
                missing.push((*id).clone());
            }
            slots.push(cached);
        }

        debug!(
            namespace = %self.namespace,
            argument = %A::SHAPE,
            result = %R::SHAPE,
            requested = identifiers.len(),
            hits = slots.iter().filter(|slot| slot.is_some()).count(),
            misses = missing.len(),
            "Reconciled batch read"
        );

        let mut loaded = if missing.is_empty() {
            Loaded::default()
        } else {
            let output = loader(ids.rebuild(missing)).await?;
            self.populate(output, &missing_keys).await?
        };

        let mut entries = Vec::with_capacity(slots.len());
        for ((id, key), slot) in identifiers.iter().zip(&keys).zip(slots) {
            let value = match slot {
                Some(value) => Some(value),
                None => loaded.take(key)?,
            };
            if let Some(value) = value {
                entries.push(((*id).clone(), value));
            }
        }

        Ok(R::from_entries(entries))
    }

    /// Load a single identifier.
    ///
    /// `None` calls the loader directly without touching the store. A cached
    /// null counts as a miss; the loader's result is stored whatever it is.
    pub async fn load_one<T, E, F, Fut>(&self, id: Option<&K>, loader: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(id) = id else {
            debug!(namespace = %self.namespace, "Absent identifier, bypassing cache");
            return loader().await;
        };

        let key = derive_key(&self.namespace, &self.id_selector, id)?;
        load_entry(&self.store, &key, loader).await
    }

    /// Load the whole entry cached under the bare namespace.
    pub async fn load_whole<T, E, F, Fut>(&self, loader: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        load_entry(&self.store, self.namespace.as_str(), loader).await
    }

    fn missing_value_selector<R: BatchOutput<K>>(&self) -> CacheError {
        CacheError::UnsupportedShape(format!(
            "{} result for namespace '{}' requires a value selector",
            R::SHAPE,
            self.namespace
        ))
    }

    // Writes back the loaded values whose key was missing and keeps them for
    // assembly. Anything else the loader returned is dropped.
    async fn populate<R>(&self, output: R, missing_keys: &HashSet<&str>) -> CacheResult<Loaded<V>>
    where
        R: BatchOutput<K, Value = V>,
        V: Serialize,
    {
        let mut entries: HashMap<String, (Option<V>, String)> = HashMap::new();

        for (id, value) in output.into_entries() {
            let key = match &id {
                Some(id) => derive_key(&self.namespace, &self.id_selector, id)?,
                None => {
                    let selector = self
                        .value_selector
                        .as_ref()
                        .ok_or_else(|| self.missing_value_selector::<R>())?;
                    derive_key(&self.namespace, selector, &value)?
                }
            };

            if !missing_keys.contains(key.as_str()) {
                trace!(key = %key, "Dropping value that was not requested");
                continue;
            }
            if entries.contains_key(&key) {
                continue;
            }

            let json = codec::encode(&value)?;
            entries.insert(key, (Some(value), json));
        }

        if !entries.is_empty() {
            trace!(namespace = %self.namespace, count = entries.len(), "Populating cache");
            let items: Vec<(&str, String)> = entries
                .iter()
                .map(|(key, (_, json))| (key.as_str(), json.clone()))
                .collect();
            self.store.set_many(&items).await?;
        }

        Ok(Loaded { entries })
    }
}

/// Freshly loaded values by key, alongside their encoded form.
struct Loaded<V> {
    entries: HashMap<String, (Option<V>, String)>,
}

impl<V> Default for Loaded<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<V: DeserializeOwned> Loaded<V> {
    // The first occurrence gets the loaded value, repeats decode a copy.
    fn take(&mut self, key: &str) -> CacheResult<Option<V>> {
        match self.entries.get_mut(key) {
            Some((value, json)) => match value.take() {
                Some(value) => Ok(Some(value)),
                None => codec::decode(json),
            },
            None => Ok(None),
        }
    }
}

impl<S: Clone, K, V> Clone for BatchReader<S, K, V> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            namespace: self.namespace.clone(),
            id_selector: self.id_selector.clone(),
            value_selector: self.value_selector.clone(),
        }
    }
}

impl<S, K, V> fmt::Debug for BatchReader<S, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchReader")
            .field("namespace", &self.namespace)
            .field("id_selector", &self.id_selector)
            .field("value_selector", &self.value_selector)
            .finish_non_exhaustive()
    }
}

/// A batched loader wrapped by a [`BatchReader`].
pub struct CachedLoader<S, K, V, F> {
    reader: BatchReader<S, K, V>,
    loader: F,
}

impl<S: CacheStore, K, V, F> CachedLoader<S, K, V, F> {
    /// Call the wrapped loader through the cache.
    pub async fn call<A, R, E, Fut>(&self, ids: A) -> Result<R, E>
    where
        A: IdBatch<Id = K>,
        K: Clone,
        R: BatchOutput<K, Value = V>,
        V: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        self.reader.load_many(ids, &self.loader).await
    }

    /// The reader this loader goes through.
    pub fn reader(&self) -> &BatchReader<S, K, V> {
        &self.reader
    }
}

/// Serve `key` from the store, or load and store it.
pub(crate) async fn load_entry<S, T, E, F, Fut>(store: &S, key: &str, loader: F) -> Result<T, E>
where
    S: CacheStore + ?Sized,
    T: Serialize + DeserializeOwned,
    E: From<CacheError>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if let Some(value) = codec::get::<S, T>(store, key).await? {
        trace!(key = %key, "Cache hit");
        return Ok(value);
    }

    trace!(key = %key, "Cache miss");
    let value = loader().await?;
    codec::set(store, key, &value).await?;
    Ok(value)
}
