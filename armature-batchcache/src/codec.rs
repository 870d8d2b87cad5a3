//! JSON encoding of cached values.
//!
//! Stores only ever see JSON strings. A stored JSON `null` is reported as
//! `None` by [`decode`], which the reconcilers treat the same as a missing
//! entry: null results are never served from the cache.

use crate::error::{CacheError, CacheResult};
use crate::traits::CacheStore;
use serde::{Serialize, de::DeserializeOwned};

/// Encode a value for storage.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> CacheResult<String> {
    serde_json::to_string(value).map_err(|e| CacheError::Serialization(e.to_string()))
}

/// Decode a stored value, returning `None` for a stored null.
pub fn decode<T: DeserializeOwned>(json: &str) -> CacheResult<Option<T>> {
    if is_null(json) {
        return Ok(None);
    }
    serde_json::from_str(json)
        .map(Some)
        .map_err(|e| CacheError::Deserialization(e.to_string()))
}

/// Whether a stored value is the JSON null literal.
pub fn is_null(json: &str) -> bool {
    json.trim() == "null"
}

/// Get a typed, non-null value from the cache.
pub async fn get<S, T>(store: &S, key: &str) -> CacheResult<Option<T>>
where
    S: CacheStore + ?Sized,
    T: DeserializeOwned,
{
    match store.get_json(key).await? {
        Some(json) => decode(&json),
        None => Ok(None),
    }
}

/// Set a typed value in the cache.
pub async fn set<S, T>(store: &S, key: &str, value: &T) -> CacheResult<()>
where
    S: CacheStore + ?Sized,
    T: Serialize + ?Sized,
{
    let json = encode(value)?;
    store.set_json(key, json).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Company {
        id: i32,
        name: String,
    }

    #[test]
    fn test_encode_decode() {
        let company = Company {
            id: 1,
            name: "Acme".to_string(),
        };
        let json = encode(&company).unwrap();
        let decoded: Option<Company> = decode(&json).unwrap();
        assert_eq!(decoded, Some(company));
    }

    #[test]
    fn test_null_decodes_to_none() {
        let json = encode(&Option::<Company>::None).unwrap();
        assert!(is_null(&json));

        let decoded: Option<Company> = decode(&json).unwrap();
        assert_eq!(decoded, None);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result: CacheResult<Option<Company>> = decode("{not json");
        assert!(matches!(result, Err(CacheError::Deserialization(_))));
    }
}
