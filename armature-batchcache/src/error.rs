//! Error types for batch cache operations.

use thiserror::Error;

/// Result type for batch cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors raised by the cache layer itself.
///
/// Failures of the wrapped loader or mutating operation are never converted
/// into this type; they are handed back to the caller untouched.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Redis-specific error
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Missing or invalid binding, raised before the store is touched
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No cache key could be produced for an identifier
    #[error(
        "Could not generate cache key (namespace: {namespace}, field: {}, type: {type_name}): {reason}",
        .field.as_deref().unwrap_or("<none>")
    )]
    KeyDerivation {
        /// Namespace the key was derived for
        namespace: String,
        /// Field selector in use, if any
        field: Option<String>,
        /// Rust type of the value the key was derived from
        type_name: &'static str,
        /// What went wrong
        reason: String,
    },

    /// Argument or result shape the reconciler cannot handle
    #[error("Unsupported shape: {0}")]
    UnsupportedShape(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Store operation timed out
    #[error("Operation timeout")]
    Timeout,

    /// Generic error
    #[error("Cache error: {0}")]
    Other(String),
}

impl CacheError {
    /// Whether this error was raised while deriving a key.
    pub fn is_key_derivation(&self) -> bool {
        matches!(self, CacheError::KeyDerivation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_derivation_display() {
        let err = CacheError::KeyDerivation {
            namespace: "company".to_string(),
            field: Some("id".to_string()),
            type_name: "Company",
            reason: "identifier is absent".to_string(),
        };

        let display = err.to_string();
        assert!(display.contains("namespace: company"));
        assert!(display.contains("field: id"));
        assert!(display.contains("identifier is absent"));
        assert!(err.is_key_derivation());
    }

    #[test]
    fn test_key_derivation_without_field() {
        let err = CacheError::KeyDerivation {
            namespace: "company".to_string(),
            field: None,
            type_name: "i32",
            reason: "identifier is absent".to_string(),
        };

        assert!(err.to_string().contains("field: <none>"));
    }

    #[test]
    fn test_configuration_display() {
        let err = CacheError::Configuration("Valid namespace required for caching".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: Valid namespace required for caching"
        );
        assert!(!err.is_key_derivation());
    }
}
