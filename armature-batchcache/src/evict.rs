//! Batch evict reconciliation.
//!
//! A [`BatchEvictor`] wraps a mutating operation. The operation always runs
//! first; the affected keys are deleted afterwards, whether the operation
//! succeeded or failed, so the store never keeps an entry the mutation may
//! have invalidated. Keys are the product of every configured namespace with
//! every identifier of the call.

use crate::config::CacheBinding;
use crate::error::{CacheError, CacheResult};
use crate::key::{FieldSelector, Namespace, derive_keys};
use crate::shape::IdBatch;
use crate::traits::CacheStore;
use futures::FutureExt;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, resume_unwind};
use tracing::{debug, trace, warn};

/// Evicting wrapper bound to one or more namespaces.
pub struct BatchEvictor<S, K> {
    store: S,
    namespaces: Vec<Namespace>,
    selector: FieldSelector<K>,
}

impl<S: CacheStore, K> BatchEvictor<S, K> {
    /// Bind an evictor to a comma-separated namespace list such as
    /// `"company, company-list"`.
    pub fn new(store: S, namespaces: &str, selector: FieldSelector<K>) -> CacheResult<Self> {
        Ok(Self {
            store,
            namespaces: Namespace::parse_list(namespaces)?,
            selector,
        })
    }

    /// Bind an evictor from a declared binding.
    ///
    /// Fails with [`CacheError::Configuration`] when a field selector reads
    /// another field than the binding declares.
    pub fn from_binding(
        store: S,
        binding: &CacheBinding,
        selector: FieldSelector<K>,
    ) -> CacheResult<Self> {
        binding.check_selector(&selector)?;
        Ok(Self {
            store,
            namespaces: binding.evict_namespaces()?,
            selector,
        })
    }

    /// Namespaces evicted by this evictor.
    pub fn namespaces(&self) -> &[Namespace] {
        &self.namespaces
    }

    /// Wrap a batched operation so every call evicts afterwards.
    pub fn wrap<F>(self, operation: F) -> EvictingOperation<S, K, F> {
        EvictingOperation {
            evictor: self,
            operation,
        }
    }

    /// Run `operation`, then delete the bare namespace keys.
    pub async fn evict_whole<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let keys = self
            .namespaces
            .iter()
            .map(|ns| ns.as_str().to_string())
            .collect();
        run_then_evict(&self.store, keys, operation()).await
    }

    /// Run `operation`, then delete the keys of one identifier.
    ///
    /// `None` runs the operation without evicting anything.
    pub async fn evict_one<T, E, F, Fut>(&self, id: Option<&K>, operation: F) -> Result<T, E>
    where
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(id) = id else {
            debug!(namespaces = %self.joined(), "Absent identifier, skipping eviction");
            return operation().await;
        };

        let keys = derive_keys(&self.namespaces, &self.selector, id)?;
        run_then_evict(&self.store, keys, operation()).await
    }

    /// Run `operation` on the batch, then delete the keys of every
    /// identifier in it.
    ///
    /// Keys are derived before the operation runs, so an identifier without
    /// a key fails the call without running the operation.
    pub async fn evict_many<A, T, E, F, Fut>(&self, ids: A, operation: F) -> Result<T, E>
    where
        A: IdBatch<Id = K>,
        E: From<CacheError>,
        F: FnOnce(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if ids.identifiers().is_none() {
            debug!(namespaces = %self.joined(), "Absent argument, skipping eviction");
            return operation(ids).await;
        }

        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        for id in ids.identifiers().unwrap_or_default() {
            for key in derive_keys(&self.namespaces, &self.selector, id)? {
                if seen.insert(key.clone()) {
                    keys.push(key);
                }
            }
        }

        run_then_evict(&self.store, keys, operation(ids)).await
    }

    fn joined(&self) -> String {
        self.namespaces
            .iter()
            .map(Namespace::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl<S: Clone, K> Clone for BatchEvictor<S, K> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            namespaces: self.namespaces.clone(),
            selector: self.selector.clone(),
        }
    }
}

impl<S, K> fmt::Debug for BatchEvictor<S, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchEvictor")
            .field("namespaces", &self.namespaces)
            .field("selector", &self.selector)
            .finish_non_exhaustive()
    }
}

/// A batched operation wrapped by a [`BatchEvictor`].
pub struct EvictingOperation<S, K, F> {
    evictor: BatchEvictor<S, K>,
    operation: F,
}

impl<S: CacheStore, K, F> EvictingOperation<S, K, F> {
    /// Call the wrapped operation, then evict.
    pub async fn call<A, T, E, Fut>(&self, ids: A) -> Result<T, E>
    where
        A: IdBatch<Id = K>,
        E: From<CacheError>,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.evictor.evict_many(ids, &self.operation).await
    }

    /// The evictor this operation goes through.
    pub fn evictor(&self) -> &BatchEvictor<S, K> {
        &self.evictor
    }
}

/// Await `operation`, then delete `keys` whatever its outcome.
///
/// A failed operation wins over a failed cleanup; the cleanup failure is
/// only logged in that case. A panic in the operation is resumed once the
/// keys are deleted.
pub(crate) async fn run_then_evict<S, T, E, Fut>(
    store: &S,
    keys: Vec<String>,
    operation: Fut,
) -> Result<T, E>
where
    S: CacheStore + ?Sized,
    E: From<CacheError>,
    Fut: Future<Output = Result<T, E>>,
{
    // A panicking operation still evicts before the panic carries on
    let outcome = AssertUnwindSafe(operation).catch_unwind().await;

    let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
    for key in &refs {
        trace!(key = %key, "Evicting");
    }
    let cleanup = store.delete_many(&refs).await;

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(panic) => {
            if let Err(err) = &cleanup {
                warn!(error = %err, keys = keys.len(), "Eviction failed after operation panic");
            }
            resume_unwind(panic);
        }
    };

    debug!(
        keys = keys.len(),
        operation_failed = outcome.is_err(),
        cleanup_failed = cleanup.is_err(),
        "Reconciled batch eviction"
    );

    match (outcome, cleanup) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(E::from(err)),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(cleanup_err)) => {
            warn!(error = %cleanup_err, keys = keys.len(), "Eviction failed after operation error");
            Err(err)
        }
    }
}
