//! Cache key derivation.
//!
//! Every cache entry managed by this crate lives under a key of the form
//! `<namespace>-<identifier>`. The identifier is rendered as a decimal number,
//! the string itself, or epoch milliseconds for timestamps, so logically equal
//! identifiers of different integer types (or their string form) share a key:
//!
//! ```
//! use armature_batchcache::key::{derive_key, FieldSelector, Namespace};
//!
//! let ns = Namespace::new("company").unwrap();
//! let a = derive_key(&ns, &FieldSelector::<i32>::identity(), &1).unwrap();
//! let b = derive_key(&ns, &FieldSelector::<i64>::identity(), &1).unwrap();
//! let c = derive_key(&ns, &FieldSelector::<str>::identity(), "1").unwrap();
//!
//! assert_eq!(a, "company-1");
//! assert_eq!(a, b);
//! assert_eq!(b, c);
//! ```

use crate::error::{CacheError, CacheResult};
use chrono::{DateTime, NaiveDateTime, TimeZone};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Logical identifier of a cached object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    /// 32-bit (or narrower) integer
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// Unsigned integer too wide for `Long`
    Unsigned(u64),
    /// String identifier, used verbatim
    Text(String),
    /// Point in time, in milliseconds since the Unix epoch
    Timestamp(i64),
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Int(v) => write!(f, "{}", v),
            Identifier::Long(v) => write!(f, "{}", v),
            Identifier::Unsigned(v) => write!(f, "{}", v),
            Identifier::Text(v) => f.write_str(v),
            Identifier::Timestamp(millis) => write!(f, "{}", millis),
        }
    }
}

/// Types that can act as a cache identifier.
///
/// Returning `None` means the identifier is absent, which fails key
/// derivation.
pub trait CacheIdentifier {
    /// Get the identifier of this value.
    fn cache_identifier(&self) -> Option<Identifier>;
}

macro_rules! impl_identifier {
    ($variant:ident: $($ty:ty),+) => {
        $(
            impl CacheIdentifier for $ty {
                fn cache_identifier(&self) -> Option<Identifier> {
                    Some(Identifier::$variant((*self).into()))
                }
            }
        )+
    };
}

impl_identifier!(Int: i8, i16, i32, u8, u16);
impl_identifier!(Long: i64, u32);
impl_identifier!(Unsigned: u64);

impl CacheIdentifier for isize {
    fn cache_identifier(&self) -> Option<Identifier> {
        Some(Identifier::Long(*self as i64))
    }
}

impl CacheIdentifier for usize {
    fn cache_identifier(&self) -> Option<Identifier> {
        Some(Identifier::Unsigned(*self as u64))
    }
}

impl CacheIdentifier for str {
    fn cache_identifier(&self) -> Option<Identifier> {
        Some(Identifier::Text(self.to_string()))
    }
}

impl CacheIdentifier for String {
    fn cache_identifier(&self) -> Option<Identifier> {
        self.as_str().cache_identifier()
    }
}

impl CacheIdentifier for Cow<'_, str> {
    fn cache_identifier(&self) -> Option<Identifier> {
        self.as_ref().cache_identifier()
    }
}

impl CacheIdentifier for Box<str> {
    fn cache_identifier(&self) -> Option<Identifier> {
        self.as_ref().cache_identifier()
    }
}

impl CacheIdentifier for Arc<str> {
    fn cache_identifier(&self) -> Option<Identifier> {
        self.as_ref().cache_identifier()
    }
}

impl<Tz: TimeZone> CacheIdentifier for DateTime<Tz> {
    fn cache_identifier(&self) -> Option<Identifier> {
        Some(Identifier::Timestamp(self.timestamp_millis()))
    }
}

impl CacheIdentifier for NaiveDateTime {
    fn cache_identifier(&self) -> Option<Identifier> {
        Some(Identifier::Timestamp(self.and_utc().timestamp_millis()))
    }
}

impl CacheIdentifier for SystemTime {
    fn cache_identifier(&self) -> Option<Identifier> {
        let millis = match self.duration_since(UNIX_EPOCH) {
            Ok(since) => i64::try_from(since.as_millis()).ok()?,
            Err(before) => -i64::try_from(before.duration().as_millis()).ok()?,
        };
        Some(Identifier::Timestamp(millis))
    }
}

impl CacheIdentifier for Identifier {
    fn cache_identifier(&self) -> Option<Identifier> {
        Some(self.clone())
    }
}

impl<T: CacheIdentifier + ?Sized> CacheIdentifier for &T {
    fn cache_identifier(&self) -> Option<Identifier> {
        (**self).cache_identifier()
    }
}

impl<T: CacheIdentifier> CacheIdentifier for Option<T> {
    fn cache_identifier(&self) -> Option<Identifier> {
        self.as_ref().and_then(CacheIdentifier::cache_identifier)
    }
}

/// A validated cache key namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    /// Create a namespace, rejecting empty or blank names.
    pub fn new(namespace: impl Into<String>) -> CacheResult<Self> {
        let namespace = namespace.into();
        if namespace.trim().is_empty() {
            return Err(CacheError::Configuration(
                "Valid namespace required for caching".to_string(),
            ));
        }
        Ok(Self(namespace))
    }

    /// Parse a comma-separated list of namespaces.
    ///
    /// All whitespace is removed and empty segments are skipped, so
    /// `"company, company-list"` yields two namespaces. Duplicates are
    /// dropped; at least one namespace must remain.
    pub fn parse_list(list: &str) -> CacheResult<Vec<Namespace>> {
        let compact: String = list.chars().filter(|c| !c.is_whitespace()).collect();

        let mut namespaces: Vec<Namespace> = Vec::new();
        for segment in compact.split(',').filter(|s| !s.is_empty()) {
            if !namespaces.iter().any(|ns| ns.0 == segment) {
                namespaces.push(Namespace(segment.to_string()));
            }
        }

        if namespaces.is_empty() {
            return Err(CacheError::Configuration(format!(
                "Valid namespace required for caching, got '{}'",
                list
            )));
        }
        Ok(namespaces)
    }

    /// Get the namespace as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build the key for an identifier in this namespace.
    pub fn key(&self, identifier: &Identifier) -> String {
        format!("{}-{}", self.0, identifier)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Namespace {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Static accessor that extracts an identifier from a value.
///
/// The accessor is supplied when a reader or evictor is bound, in place of a
/// lookup by field name at call time. The field name is kept for error
/// messages only.
pub struct FieldSelector<T: ?Sized> {
    field: Option<Cow<'static, str>>,
    accessor: Arc<dyn Fn(&T) -> Option<Identifier> + Send + Sync>,
}

impl<T: CacheIdentifier + ?Sized + 'static> FieldSelector<T> {
    /// Use the value itself as the identifier.
    pub fn identity() -> Self {
        Self {
            field: None,
            accessor: Arc::new(|value: &T| value.cache_identifier()),
        }
    }
}

impl<T: ?Sized + 'static> FieldSelector<T> {
    /// Extract the identifier through a named field accessor.
    ///
    /// ```
    /// use armature_batchcache::key::FieldSelector;
    ///
    /// struct Company { id: i64 }
    ///
    /// let selector = FieldSelector::field("id", |c: &Company| c.id);
    /// assert_eq!(selector.field_name(), Some("id"));
    /// ```
    pub fn field<I, F>(name: impl Into<Cow<'static, str>>, accessor: F) -> Self
    where
        I: CacheIdentifier,
        F: Fn(&T) -> I + Send + Sync + 'static,
    {
        Self {
            field: Some(name.into()),
            accessor: Arc::new(move |value: &T| accessor(value).cache_identifier()),
        }
    }
}

impl<T: ?Sized> FieldSelector<T> {
    /// Name of the field this selector reads, if any.
    pub fn field_name(&self) -> Option<&str> {
        self.field.as_deref()
    }

    /// Extract the identifier from a value.
    pub fn select(&self, value: &T) -> Option<Identifier> {
        (self.accessor)(value)
    }

    fn missing(&self, namespace: &str) -> CacheError {
        let reason = match self.field_name() {
            Some(field) => format!("field '{}' yielded no identifier", field),
            None => "identifier is absent".to_string(),
        };
        CacheError::KeyDerivation {
            namespace: namespace.to_string(),
            field: self.field_name().map(str::to_string),
            type_name: std::any::type_name::<T>(),
            reason,
        }
    }
}

impl<T: ?Sized> Clone for FieldSelector<T> {
    fn clone(&self) -> Self {
        Self {
            field: self.field.clone(),
            accessor: self.accessor.clone(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for FieldSelector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSelector")
            .field("field", &self.field)
            .finish_non_exhaustive()
    }
}

/// Derive the cache key for a value.
pub fn derive_key<T: ?Sized>(
    namespace: &Namespace,
    selector: &FieldSelector<T>,
    value: &T,
) -> CacheResult<String> {
    let identifier = selector
        .select(value)
        .ok_or_else(|| selector.missing(namespace.as_str()))?;
    Ok(namespace.key(&identifier))
}

/// Derive one cache key per namespace for a value.
pub fn derive_keys<T: ?Sized>(
    namespaces: &[Namespace],
    selector: &FieldSelector<T>,
    value: &T,
) -> CacheResult<Vec<String>> {
    let identifier = selector.select(value).ok_or_else(|| {
        let joined: Vec<&str> = namespaces.iter().map(Namespace::as_str).collect();
        selector.missing(&joined.join(","))
    })?;
    Ok(namespaces.iter().map(|ns| ns.key(&identifier)).collect())
}
