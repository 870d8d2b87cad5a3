//! Cache configuration types.

use crate::error::{CacheError, CacheResult};
use crate::key::{FieldSelector, Namespace};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cache backend type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackend {
    /// In-process memory
    Memory,
    /// Redis backend
    Redis,
}

/// Expiration policy applied by a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Entries expire a fixed time after they were written
    AfterWrite(Duration),
    /// Entries expire a fixed time after they were last read or written
    AfterAccess(Duration),
}

impl Expiry {
    /// The configured duration.
    pub fn duration(&self) -> Duration {
        match self {
            Expiry::AfterWrite(ttl) | Expiry::AfterAccess(ttl) => *ttl,
        }
    }
}

/// Store configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Cache backend type
    pub backend: CacheBackend,

    /// Connection URL (empty for the memory backend)
    pub url: String,

    /// Key prefix for all cache keys
    pub key_prefix: Option<String>,

    /// Expiration policy, `None` keeps entries until deleted
    pub expiry: Option<Expiry>,

    /// Connection timeout
    pub connection_timeout: Duration,

    /// Operation timeout
    pub operation_timeout: Duration,
}

impl CacheConfig {
    /// Create an in-memory cache configuration.
    pub fn memory() -> Self {
        Self {
            backend: CacheBackend::Memory,
            url: String::new(),
            key_prefix: None,
            expiry: None,
            connection_timeout: Duration::from_secs(5),
            operation_timeout: Duration::from_secs(3),
        }
    }

    /// Create a new Redis cache configuration.
    ///
    /// # Arguments
    ///
    /// * `url` - Redis connection URL (e.g., "redis://localhost:6379")
    ///
    /// # Examples
    ///
    /// ```
    /// use armature_batchcache::CacheConfig;
    ///
    /// let config = CacheConfig::redis("redis://localhost:6379").unwrap();
    /// ```
    pub fn redis(url: impl Into<String>) -> CacheResult<Self> {
        let url = url.into();
        if !(url.starts_with("redis://")
            || url.starts_with("rediss://")
            || url.starts_with("redis+unix://"))
        {
            return Err(CacheError::Configuration(format!(
                "Invalid Redis URL: '{}'",
                url
            )));
        }

        Ok(Self {
            backend: CacheBackend::Redis,
            url,
            ..Self::memory()
        })
    }

    /// Set the key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Expire entries a fixed time after they were written.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.expiry = Some(Expiry::AfterWrite(ttl));
        self
    }

    /// Expire entries a fixed time after their last access.
    pub fn with_expire_after_access(mut self, ttl: Duration) -> Self {
        self.expiry = Some(Expiry::AfterAccess(ttl));
        self
    }

    /// Set the connection timeout.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the operation timeout.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Build the final key with prefix if configured.
    pub fn build_key(&self, key: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{}:{}", prefix, key),
            None => key.to_string(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::memory()
    }
}

fn default_field() -> String {
    "id".to_string()
}

/// Cache declaration for one wrapped operation.
///
/// `namespace` is required; read bindings use it verbatim while evict
/// bindings accept a comma-separated list. `field` names the identifier
/// field of composite arguments and defaults to `"id"`.
///
/// ```
/// use armature_batchcache::CacheBinding;
///
/// let binding: CacheBinding = serde_json::from_str(r#"{"namespace":"company"}"#).unwrap();
/// assert_eq!(binding.field, "id");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheBinding {
    /// Key namespace (comma-separated for eviction)
    pub namespace: String,

    /// Identifier field of composite arguments
    #[serde(default = "default_field")]
    pub field: String,
}

impl CacheBinding {
    /// Create a binding with the default `id` field.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            field: default_field(),
        }
    }

    /// Set the identifier field.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    /// Validate the binding as a read binding.
    pub fn read_namespace(&self) -> CacheResult<Namespace> {
        Namespace::new(self.namespace.clone())
    }

    /// Validate the binding as an evict binding.
    pub fn evict_namespaces(&self) -> CacheResult<Vec<Namespace>> {
        Namespace::parse_list(&self.namespace)
    }

    /// Check that a field selector reads the declared identifier field.
    ///
    /// Identity selectors always pass since scalar arguments have no field.
    pub fn check_selector<T: ?Sized>(&self, selector: &FieldSelector<T>) -> CacheResult<()> {
        match selector.field_name() {
            Some(name) if name != self.field => Err(CacheError::Configuration(format!(
                "binding for '{}' declares field '{}' but the selector reads '{}'",
                self.namespace, self.field, name
            ))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_config() {
        let config = CacheConfig::memory();
        assert_eq!(config.backend, CacheBackend::Memory);
        assert!(config.expiry.is_none());
    }

    #[test]
    fn test_redis_config() {
        let config = CacheConfig::redis("redis://localhost:6379").unwrap();
        assert_eq!(config.backend, CacheBackend::Redis);
        assert_eq!(config.url, "redis://localhost:6379");
    }

    #[test]
    fn test_redis_config_rejects_other_schemes() {
        assert!(matches!(
            CacheConfig::redis("memcache://localhost:11211"),
            Err(CacheError::Configuration(_))
        ));
    }

    #[test]
    fn test_config_builder() {
        let config = CacheConfig::memory()
            .with_key_prefix("app")
            .with_expire_after_access(Duration::from_secs(86_400))
            .with_operation_timeout(Duration::from_millis(500));

        assert_eq!(config.key_prefix, Some("app".to_string()));
        assert_eq!(
            config.expiry,
            Some(Expiry::AfterAccess(Duration::from_secs(86_400)))
        );
        assert_eq!(config.operation_timeout, Duration::from_millis(500));

        let config = config.with_default_ttl(Duration::from_secs(60));
        assert_eq!(config.expiry.map(|e| e.duration()), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_build_key() {
        let config = CacheConfig::memory().with_key_prefix("myapp");
        assert_eq!(config.build_key("company-1"), "myapp:company-1");
        assert_eq!(CacheConfig::memory().build_key("company-1"), "company-1");
    }

    #[test]
    fn test_binding_deserialize() {
        let binding: CacheBinding =
            serde_json::from_str(r#"{"namespace":"transform","field":"someId"}"#).unwrap();
        assert_eq!(binding, CacheBinding::new("transform").with_field("someId"));
    }

    #[test]
    fn test_binding_validation() {
        assert!(CacheBinding::new("").read_namespace().is_err());
        assert_eq!(
            CacheBinding::new("company").read_namespace().unwrap().as_str(),
            "company"
        );

        let namespaces = CacheBinding::new("company, company-list")
            .evict_namespaces()
            .unwrap();
        assert_eq!(namespaces.len(), 2);
        assert!(CacheBinding::new(",").evict_namespaces().is_err());
    }

    #[test]
    fn test_binding_field_must_match_selector() {
        struct TestObject {
            some_id: i64,
        }

        let binding = CacheBinding::new("testobject").with_field("someId");
        let matching = FieldSelector::field("someId", |o: &TestObject| o.some_id);
        let other = FieldSelector::field("id", |o: &TestObject| o.some_id);

        assert!(matching.select(&TestObject { some_id: 4 }).is_some());
        assert!(binding.check_selector(&matching).is_ok());
        assert!(binding.check_selector(&FieldSelector::<i64>::identity()).is_ok());
        assert!(matches!(
            binding.check_selector(&other),
            Err(CacheError::Configuration(_))
        ));
    }
}
