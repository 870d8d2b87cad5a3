//! Batching cache-aside layer for Armature loaders.
//!
//! Wraps operations that load objects by identifier so that a call for N
//! objects is served from the cache as far as possible, the underlying
//! loader only sees the identifiers that were missing, and the caller gets
//! back exactly the shape the loader returns (a single value, a list, a set
//! or a map keyed by identifier). A companion evictor runs mutating
//! operations and then deletes every affected key, across one or more
//! namespaces.
//!
//! # Features
//!
//! - `redis` - Enable the Redis store (enabled by default)
//! - **Partial-hit reconciliation** - One multi-get, one loader call for the misses
//! - **Shape preservation** - Loaders receive arguments of their own concrete type
//! - **Multi-namespace eviction** - `"company, company-list"` evicts both key spaces
//!
//! Cache keys have the form `<namespace>-<identifier>`; integer identifiers
//! of any width and their string form share a key.
//!
//! # Examples
//!
//! ## Batched Reads
//!
//! ```
//! use armature_batchcache::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Serialize, Deserialize)]
//! struct Company {
//!     id: i64,
//!     name: String,
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), CacheError> {
//! let cache = BatchCache::new(InMemoryCache::new());
//! let companies = cache
//!     .reader(&CacheBinding::new("company"), FieldSelector::<i64>::identity())?
//!     .with_value_selector(FieldSelector::field("id", |c: &Company| c.id))
//!     .wrap(|ids: Vec<i64>| async move {
//!         Ok::<Vec<Company>, CacheError>(
//!             ids.into_iter()
//!                 .map(|id| Company { id, name: format!("company {id}") })
//!                 .collect(),
//!         )
//!     });
//!
//! let loaded = companies.call(vec![1, 2, 3]).await?;
//! assert_eq!(loaded.len(), 3);
//! # Ok(())
//! # }
//! ```
//!
//! ## Eviction
//!
//! ```
//! use armature_batchcache::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), CacheError> {
//! let cache = BatchCache::new(InMemoryCache::new());
//! let evictor = cache.evictor(
//!     &CacheBinding::new("company, company-list"),
//!     FieldSelector::<i64>::identity(),
//! )?;
//!
//! // Deletes company-7 and company-list-7 once the update returns
//! evictor
//!     .evict_one(Some(&7), || async { Ok::<_, CacheError>(()) })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Redis Store
//!
//! ```no_run
//! use armature_batchcache::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), CacheError> {
//!     let config = CacheConfig::redis("redis://localhost:6379")?
//!         .with_key_prefix("myapp")
//!         .with_default_ttl(Duration::from_secs(3600));
//!     let cache = BatchCache::new(RedisCache::new(config).await?);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod evict;
pub mod key;
pub mod manager;
pub mod memory;
pub mod reader;
pub mod shape;
pub mod traits;

#[cfg(feature = "redis")]
pub mod redis_cache;

pub use config::{CacheBackend, CacheBinding, CacheConfig, Expiry};
pub use error::{CacheError, CacheResult};
pub use evict::{BatchEvictor, EvictingOperation};
pub use key::{CacheIdentifier, FieldSelector, Identifier, Namespace, derive_key, derive_keys};
pub use manager::BatchCache;
pub use memory::{CacheStats, InMemoryCache};
pub use reader::{BatchReader, CachedLoader};
pub use shape::{ArgShape, BatchOutput, IdBatch, MapKind, ResultShape};
pub use traits::CacheStore;

#[cfg(feature = "redis")]
pub use redis_cache::RedisCache;

/// Prelude for common imports.
///
/// ```
/// use armature_batchcache::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{CacheBinding, CacheConfig};
    pub use crate::error::{CacheError, CacheResult};
    pub use crate::evict::BatchEvictor;
    pub use crate::key::{CacheIdentifier, FieldSelector};
    pub use crate::manager::BatchCache;
    pub use crate::memory::InMemoryCache;
    pub use crate::reader::BatchReader;
    pub use crate::shape::{BatchOutput, IdBatch};
    pub use crate::traits::CacheStore;

    #[cfg(feature = "redis")]
    pub use crate::redis_cache::RedisCache;
}
