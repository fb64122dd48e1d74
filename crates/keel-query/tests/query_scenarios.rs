//! End-to-end query scenarios: the index path must agree with a full scan.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

use keel_common::{FieldValue, StoreConfig};
use keel_index::{FieldIndex, IndexCatalog};
use keel_query::{MemoryRecordStore, Predicate, QueryEngine, Record, RecordStore};

fn ages(records: &[Record]) -> Vec<i64> {
    records
        .iter()
        .map(|r| match r.get("age") {
            Some(FieldValue::Int(age)) => *age,
            other => panic!("unexpected age field: {other:?}"),
        })
        .collect()
}

#[tokio::test]
async fn test_between_over_thousand_records_matches_full_scan() {
    let dir = tempdir().unwrap();
    let records = Arc::new(MemoryRecordStore::new());
    let index = FieldIndex::open_int(
        "age",
        StoreConfig {
            path: dir.path().join("age.idx"),
            block_size: 4096,
            degree: 3,
            fsync_enabled: false,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let mut rng = StdRng::seed_from_u64(0xA9E5);
    for i in 0..1000 {
        let age = rng.gen_range(0..80);
        let record = Record::new()
            .with_field("age", FieldValue::Int(age))
            .with_field("seq", FieldValue::Int(i));
        let id = records.insert(record).unwrap();
        index.insert(&FieldValue::Int(age), id).await.unwrap();
    }

    let predicate = Predicate::between("age", 18, 30);
    assert_eq!(predicate.to_string(), "age BETWEEN 18 AND 30");

    // Index-driven execution.
    let mut catalog = IndexCatalog::new();
    catalog.register(index);
    let indexed_engine = QueryEngine::new(
        Arc::clone(&records) as Arc<dyn RecordStore>,
        Arc::new(catalog),
    );
    let indexed = indexed_engine
        .execute(&predicate)
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();

    // Scan execution: same records, no index registered.
    let scan_engine = QueryEngine::new(
        Arc::clone(&records) as Arc<dyn RecordStore>,
        Arc::new(IndexCatalog::new()),
    );
    let scanned = scan_engine
        .execute(&predicate)
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();

    assert!(!indexed.is_empty());
    assert_eq!(indexed.len(), scanned.len());

    let mut indexed_ages = ages(&indexed);
    let mut scanned_ages = ages(&scanned);
    assert!(indexed_ages.iter().all(|age| (18..=30).contains(age)));
    indexed_ages.sort_unstable();
    scanned_ages.sort_unstable();
    assert_eq!(indexed_ages, scanned_ages);
}

#[tokio::test]
async fn test_index_results_come_out_key_ordered() {
    let dir = tempdir().unwrap();
    let records = Arc::new(MemoryRecordStore::new());
    let index = FieldIndex::open_int(
        "age",
        StoreConfig {
            path: dir.path().join("age.idx"),
            block_size: 4096,
            degree: 3,
            fsync_enabled: false,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    for age in [40, 10, 30, 20, 50] {
        let id = records
            .insert(Record::new().with_field("age", FieldValue::Int(age)))
            .unwrap();
        index.insert(&FieldValue::Int(age), id).await.unwrap();
    }

    let mut catalog = IndexCatalog::new();
    catalog.register(index);
    let engine = QueryEngine::new(
        Arc::clone(&records) as Arc<dyn RecordStore>,
        Arc::new(catalog),
    );

    let results = engine
        .execute(&Predicate::between("age", 15, 45))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(ages(&results), vec![20, 30, 40]);
}

#[tokio::test]
async fn test_string_index_equality() {
    let dir = tempdir().unwrap();
    let records = Arc::new(MemoryRecordStore::new());
    let index = FieldIndex::open_str(
        "name",
        StoreConfig {
            path: dir.path().join("name.idx"),
            block_size: 4096,
            fsync_enabled: false,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    for name in ["ada", "bob", "cyd"] {
        let id = records
            .insert(Record::new().with_field("name", FieldValue::Str(name.into())))
            .unwrap();
        index
            .insert(&FieldValue::Str(name.into()), id)
            .await
            .unwrap();
    }

    let mut catalog = IndexCatalog::new();
    catalog.register(index);
    let engine = QueryEngine::new(
        Arc::clone(&records) as Arc<dyn RecordStore>,
        Arc::new(catalog),
    );

    let results = engine
        .execute(&Predicate::binary(
            "name",
            keel_query::CompareOp::Eq,
            "bob",
        ))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(
        results[0].get("name"),
        Some(&FieldValue::Str("bob".into()))
    );
}
