//! Argument and result shapes understood by the reconcilers.
//!
//! The identifier-bearing argument of a loader implements [`IdBatch`], which
//! flattens it into an ordered list of identifiers and rebuilds a value of the
//! same concrete type from the missing subset. The loader's return type
//! implements [`BatchOutput`], which splits freshly loaded values out for
//! caching and rebuilds the result from hits and loaded values. Both are resolved from the types at bind
//! time; nothing is inspected at runtime.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::{BuildHasher, Hash};

/// Shape of the identifier-bearing argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgShape {
    /// The operation takes no arguments; the namespace is the whole key
    None,
    /// A single identifier-bearing value
    Scalar,
    /// Fixed sequence such as `Box<[T]>`
    Array,
    /// Ordered sequence such as `Vec<T>`
    List,
    /// Unordered collection such as `HashSet<T>`
    Set,
}

/// Map flavour of a map-shaped result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapKind {
    /// `HashMap`
    Hash,
    /// `BTreeMap`
    Sorted,
}

/// Shape of the value a loader returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultShape {
    /// One value
    Single,
    /// `Vec<V>`
    List,
    /// `HashSet<V>` or `BTreeSet<V>`
    Set,
    /// Map keyed by the requested identifier
    Map(MapKind),
}

impl ResultShape {
    /// Whether loaded values have to carry their own identifier.
    ///
    /// List and set results lose the association between identifier and
    /// value, so each value needs a selector to be cached.
    pub fn needs_value_selector(&self) -> bool {
        matches!(self, ResultShape::List | ResultShape::Set)
    }
}

impl fmt::Display for ArgShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArgShape::None => "none",
            ArgShape::Scalar => "scalar",
            ArgShape::Array => "array",
            ArgShape::List => "list",
            ArgShape::Set => "set",
        };
        f.write_str(name)
    }
}

impl fmt::Display for ResultShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultShape::Single => f.write_str("single"),
            ResultShape::List => f.write_str("list"),
            ResultShape::Set => f.write_str("set"),
            ResultShape::Map(MapKind::Hash) => f.write_str("hash map"),
            ResultShape::Map(MapKind::Sorted) => f.write_str("sorted map"),
        }
    }
}

/// A batch of identifiers passed as a loader's first argument.
pub trait IdBatch: Sized {
    /// Element type carrying the identifier.
    type Id;

    /// Shape reported for diagnostics.
    const SHAPE: ArgShape;

    /// Identifiers in iteration order, duplicates included.
    ///
    /// `None` means the argument is absent and the cache must be bypassed.
    fn identifiers(&self) -> Option<Vec<&Self::Id>>;

    /// Build an argument of the same concrete type holding only `missing`.
    fn rebuild(&self, missing: Vec<Self::Id>) -> Self;
}

impl<T> IdBatch for Vec<T> {
    type Id = T;
    const SHAPE: ArgShape = ArgShape::List;

    fn identifiers(&self) -> Option<Vec<&T>> {
        Some(self.iter().collect())
    }

    fn rebuild(&self, missing: Vec<T>) -> Self {
        missing
    }
}

impl<T> IdBatch for VecDeque<T> {
    type Id = T;
    const SHAPE: ArgShape = ArgShape::List;

    fn identifiers(&self) -> Option<Vec<&T>> {
        Some(self.iter().collect())
    }

    fn rebuild(&self, missing: Vec<T>) -> Self {
        missing.into()
    }
}

impl<T> IdBatch for Box<[T]> {
    type Id = T;
    const SHAPE: ArgShape = ArgShape::Array;

    fn identifiers(&self) -> Option<Vec<&T>> {
        Some(self.iter().collect())
    }

    fn rebuild(&self, missing: Vec<T>) -> Self {
        missing.into_boxed_slice()
    }
}

impl<T, S> IdBatch for HashSet<T, S>
where
    T: Eq + Hash,
    S: BuildHasher + Default,
{
    type Id = T;
    const SHAPE: ArgShape = ArgShape::Set;

    fn identifiers(&self) -> Option<Vec<&T>> {
        Some(self.iter().collect())
    }

    fn rebuild(&self, missing: Vec<T>) -> Self {
        missing.into_iter().collect()
    }
}

impl<T: Ord> IdBatch for BTreeSet<T> {
    type Id = T;
    const SHAPE: ArgShape = ArgShape::Set;

    fn identifiers(&self) -> Option<Vec<&T>> {
        Some(self.iter().collect())
    }

    fn rebuild(&self, missing: Vec<T>) -> Self {
        missing.into_iter().collect()
    }
}

impl<B: IdBatch> IdBatch for Option<B> {
    type Id = B::Id;
    const SHAPE: ArgShape = B::SHAPE;

    fn identifiers(&self) -> Option<Vec<&B::Id>> {
        self.as_ref().and_then(IdBatch::identifiers)
    }

    fn rebuild(&self, missing: Vec<B::Id>) -> Self {
        self.as_ref().map(|batch| batch.rebuild(missing))
    }
}

/// The value returned by a batched loader.
pub trait BatchOutput<K>: Sized {
    /// Cached value type.
    type Value;

    /// Shape reported for diagnostics and validation.
    const SHAPE: ResultShape;

    /// Split the loader's output into its values, paired with their
    /// identifier when the shape keeps it.
    fn into_entries(self) -> Vec<(Option<K>, Self::Value)>;

    /// Build the result from one entry per requested occurrence, in request
    /// order.
    fn from_entries(entries: Vec<(K, Self::Value)>) -> Self;
}

impl<K, V> BatchOutput<K> for Vec<V> {
    type Value = V;
    const SHAPE: ResultShape = ResultShape::List;

    fn into_entries(self) -> Vec<(Option<K>, V)> {
        self.into_iter().map(|value| (None, value)).collect()
    }

    fn from_entries(entries: Vec<(K, V)>) -> Self {
        entries.into_iter().map(|(_, value)| value).collect()
    }
}

impl<K, V, S> BatchOutput<K> for HashSet<V, S>
where
    V: Eq + Hash,
    S: BuildHasher + Default,
{
    type Value = V;
    const SHAPE: ResultShape = ResultShape::Set;

    fn into_entries(self) -> Vec<(Option<K>, V)> {
        self.into_iter().map(|value| (None, value)).collect()
    }

    fn from_entries(entries: Vec<(K, V)>) -> Self {
        entries.into_iter().map(|(_, value)| value).collect()
    }
}

impl<K, V: Ord> BatchOutput<K> for BTreeSet<V> {
    type Value = V;
    const SHAPE: ResultShape = ResultShape::Set;

    fn into_entries(self) -> Vec<(Option<K>, V)> {
        self.into_iter().map(|value| (None, value)).collect()
    }

    fn from_entries(entries: Vec<(K, V)>) -> Self {
        entries.into_iter().map(|(_, value)| value).collect()
    }
}

impl<K, V, S> BatchOutput<K> for HashMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher + Default,
{
    type Value = V;
    const SHAPE: ResultShape = ResultShape::Map(MapKind::Hash);

    fn into_entries(self) -> Vec<(Option<K>, V)> {
        self.into_iter().map(|(id, value)| (Some(id), value)).collect()
    }

    fn from_entries(entries: Vec<(K, V)>) -> Self {
        entries.into_iter().collect()
    }
}

impl<K: Ord, V> BatchOutput<K> for BTreeMap<K, V> {
    type Value = V;
    const SHAPE: ResultShape = ResultShape::Map(MapKind::Sorted);

    fn into_entries(self) -> Vec<(Option<K>, V)> {
        self.into_iter().map(|(id, value)| (Some(id), value)).collect()
    }

    fn from_entries(entries: Vec<(K, V)>) -> Self {
        entries.into_iter().collect()
    }
}
