//! Integration tests for batched eviction

use armature_batchcache::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Company {
    id: i64,
    name: String,
}

#[derive(Debug, Clone)]
struct TestObject {
    some_id: i64,
}

#[derive(Debug)]
enum DaoError {
    Conflict,
    Cache(CacheError),
}

impl From<CacheError> for DaoError {
    fn from(err: CacheError) -> Self {
        DaoError::Cache(err)
    }
}

/// Mutable company table standing in for a database.
#[derive(Default)]
struct CompanyTable {
    rows: Mutex<BTreeMap<i64, Company>>,
}

impl CompanyTable {
    fn with_rows(ids: &[i64]) -> Arc<Self> {
        let table = Self::default();
        {
            let mut rows = table.rows.lock().unwrap();
            for id in ids {
                rows.insert(
                    *id,
                    Company {
                        id: *id,
                        name: format!("Super Company {id}"),
                    },
                );
            }
        }
        Arc::new(table)
    }

    fn get(&self, id: i64) -> Option<Company> {
        self.rows.lock().unwrap().get(&id).cloned()
    }

    fn rename(&self, id: i64, name: &str) -> Result<(), DaoError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(&id).ok_or(DaoError::Conflict)?;
        row.name = name.to_string();
        Ok(())
    }
}

async fn seed(store: &InMemoryCache, keys: &[&str]) {
    for key in keys {
        store.set_json(key, r#"{"seeded":true}"#.to_string()).await.unwrap();
    }
}

#[tokio::test]
async fn test_eviction_happens_after_mutation() {
    let cache = BatchCache::new(InMemoryCache::new());
    let table = CompanyTable::with_rows(&[1]);
    let binding = CacheBinding::new("company");

    let reader = cache
        .reader::<i64, Option<Company>>(&binding, FieldSelector::identity())
        .unwrap();
    let evictor = cache.evictor(&binding, FieldSelector::<i64>::identity()).unwrap();

    let read = |table: Arc<CompanyTable>| async move { Ok::<_, DaoError>(table.get(1)) };

    let before = reader.load_one(Some(&1), || read(table.clone())).await.unwrap();
    assert_eq!(before.unwrap().name, "Super Company 1");

    let store = cache.store().clone();
    let observed_during_update = Arc::new(Mutex::new(None));
    let observed = observed_during_update.clone();
    evictor
        .evict_one(Some(&1), || {
            let table = table.clone();
            async move {
                table.rename(1, "Renamed")?;
                // Entry is still cached while the mutation runs
                let cached = store.exists("company-1").await?;
                *observed.lock().unwrap() = Some(cached);
                Ok::<_, DaoError>(())
            }
        })
        .await
        .unwrap();

    assert_eq!(*observed_during_update.lock().unwrap(), Some(true));
    assert_eq!(table.get(1).unwrap().name, "Renamed");
    assert!(!cache.store().exists("company-1").await.unwrap());

    let after = reader.load_one(Some(&1), || read(table.clone())).await.unwrap();
    assert_eq!(after.unwrap().name, "Renamed");
}

#[tokio::test]
async fn test_multi_namespace_scalar_eviction() {
    let store = InMemoryCache::new();
    seed(&store, &["a-7", "b-7"]).await;
    let evictor =
        BatchEvictor::new(store.clone(), "a,b", FieldSelector::<i32>::identity()).unwrap();

    evictor
        .evict_one(Some(&7), || async { Ok::<_, CacheError>(()) })
        .await
        .unwrap();

    assert!(!store.exists("a-7").await.unwrap());
    assert!(!store.exists("b-7").await.unwrap());
}

#[tokio::test]
async fn test_multi_namespace_batch_eviction_with_field_selector() {
    let store = InMemoryCache::new();
    seed(
        &store,
        &["testobject-a-13", "testobject-b-14", "testobject-a-15"],
    )
    .await;

    let binding: CacheBinding =
        serde_json::from_str(r#"{"namespace":"testobject-a, testobject-b","field":"someId"}"#)
            .unwrap();
    let operation = BatchEvictor::from_binding(
        store.clone(),
        &binding,
        FieldSelector::field("someId", |o: &TestObject| o.some_id),
    )
    .unwrap()
    .wrap(|objects: Vec<TestObject>| async move { Ok::<_, CacheError>(objects.len()) });

    let updated = operation
        .call(vec![TestObject { some_id: 13 }, TestObject { some_id: 14 }])
        .await
        .unwrap();

    assert_eq!(updated, 2);
    for key in ["testobject-a-13", "testobject-a-14", "testobject-b-13", "testobject-b-14"] {
        assert!(!store.exists(key).await.unwrap(), "{key} should be evicted");
    }
    assert!(store.exists("testobject-a-15").await.unwrap());
}

#[tokio::test]
async fn test_binding_field_mismatch_is_rejected() {
    let store = InMemoryCache::new();
    let binding = CacheBinding::new("testobject").with_field("someId");

    let result = BatchEvictor::from_binding(
        store.clone(),
        &binding,
        FieldSelector::field("id", |o: &TestObject| o.some_id),
    );

    assert!(matches!(result, Err(CacheError::Configuration(_))));
}

#[tokio::test]
async fn test_set_argument_eviction() {
    let store = InMemoryCache::new();
    seed(&store, &["company-1", "company-9"]).await;
    let evictor =
        BatchEvictor::new(store.clone(), "company", FieldSelector::<i64>::identity()).unwrap();

    evictor
        .evict_many(HashSet::from([1_i64]), |_| async { Ok::<_, CacheError>(()) })
        .await
        .unwrap();

    assert!(!store.exists("company-1").await.unwrap());
    assert!(store.exists("company-9").await.unwrap());
}

#[tokio::test]
async fn test_whole_entry_eviction() {
    let cache = BatchCache::new(InMemoryCache::new());
    let all: Vec<i64> = cache
        .get_all("all-companies", || async { Ok::<_, CacheError>(vec![1, 2, 3]) })
        .await
        .unwrap();
    assert_eq!(all.len(), 3);
    assert!(cache.store().exists("all-companies").await.unwrap());

    cache
        .evict_all("all-companies", || async { Ok::<_, CacheError>(()) })
        .await
        .unwrap();

    assert!(!cache.store().exists("all-companies").await.unwrap());
}

#[tokio::test]
async fn test_failed_mutation_still_evicts() {
    let store = InMemoryCache::new();
    seed(&store, &["company-2"]).await;
    let table = CompanyTable::with_rows(&[1]);
    let evictor =
        BatchEvictor::new(store.clone(), "company", FieldSelector::<i64>::identity()).unwrap();

    let result = evictor
        .evict_one(Some(&2), || async move { table.rename(2, "Missing") })
        .await;

    assert!(matches!(result, Err(DaoError::Conflict)));
    assert!(!store.exists("company-2").await.unwrap());
}

#[tokio::test]
async fn test_absent_identifier_skips_eviction() {
    let store = InMemoryCache::new();
    seed(&store, &["company-1"]).await;
    let evictor =
        BatchEvictor::new(store.clone(), "company", FieldSelector::<i64>::identity()).unwrap();

    let ran = evictor
        .evict_one(None, || async { Ok::<_, CacheError>(true) })
        .await
        .unwrap();

    assert!(ran);
    assert!(store.exists("company-1").await.unwrap());
}

#[tokio::test]
async fn test_invalid_namespace_fails_before_cache_access() {
    let store = InMemoryCache::new();

    let result = BatchEvictor::new(store.clone(), " , ", FieldSelector::<i64>::identity());
    assert!(matches!(result, Err(CacheError::Configuration(_))));

    let cache = BatchCache::new(store.clone());
    let result: Result<(), CacheError> = cache.evict_all("", || async { Ok(()) }).await;
    assert!(matches!(result, Err(CacheError::Configuration(_))));
    assert_eq!(store.stats(), CacheStats::default());
}
