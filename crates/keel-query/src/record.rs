//! Materialized records and the record-storage interface the core consumes.

use parking_lot::Mutex;
use std::collections::BTreeMap;

use keel_common::{FieldValue, RecordId, Result};

/// A materialized record: named, typed fields.
///
/// The indexing core treats stored payloads as opaque; this is the shape a
/// record takes once decoded for predicate evaluation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Sets a field value.
    pub fn set(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    /// Field access by name.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Iterates the record's fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Record storage consumed by the query engine.
///
/// Implementations own the raw payloads; the core only needs stable ids,
/// point resolution, and a scan.
pub trait RecordStore: Send + Sync {
    /// Stores a record and returns its id.
    fn insert(&self, record: Record) -> Result<RecordId>;

    /// Resolves an id to its record, or `None` when absent.
    fn get(&self, id: RecordId) -> Result<Option<Record>>;

    /// Replaces the record under `id`. Returns false when absent.
    fn update(&self, id: RecordId, record: Record) -> Result<bool>;

    /// Removes the record under `id`. Returns false when absent.
    fn delete(&self, id: RecordId) -> Result<bool>;

    /// Snapshot of all live records in insertion order.
    fn scan(&self) -> Result<Vec<(RecordId, Record)>>;
}

/// In-memory record storage.
///
/// Ids are slot positions; deleted slots stay tombstoned so ids remain
/// stable.
#[derive(Default)]
pub struct MemoryRecordStore {
    rows: Mutex<Vec<Option<Record>>>,
}

impl MemoryRecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.rows.lock().iter().flatten().count()
    }

    /// True when no live records remain.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordStore for MemoryRecordStore {
    fn insert(&self, record: Record) -> Result<RecordId> {
        let mut rows = self.rows.lock();
        rows.push(Some(record));
        Ok(RecordId::new(rows.len() as i64 - 1))
    }

    fn get(&self, id: RecordId) -> Result<Option<Record>> {
        if id.is_empty() {
            return Ok(None);
        }
        let rows = self.rows.lock();
        Ok(rows.get(id.raw() as usize).and_then(Clone::clone))
    }

    fn update(&self, id: RecordId, record: Record) -> Result<bool> {
        if id.is_empty() {
            return Ok(false);
        }
        let mut rows = self.rows.lock();
        match rows.get_mut(id.raw() as usize) {
            Some(slot @ Some(_)) => {
                *slot = Some(record);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn delete(&self, id: RecordId) -> Result<bool> {
        if id.is_empty() {
            return Ok(false);
        }
        let mut rows = self.rows.lock();
        match rows.get_mut(id.raw() as usize) {
            Some(slot @ Some(_)) => {
                *slot = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn scan(&self) -> Result<Vec<(RecordId, Record)>> {
        let rows = self.rows.lock();
        Ok(rows
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| {
                slot.as_ref()
                    .map(|record| (RecordId::new(i as i64), record.clone()))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(age: i64) -> Record {
        Record::new().with_field("age", FieldValue::Int(age))
    }

    #[test]
    fn test_record_field_access() {
        let record = sample(33).with_field("name", FieldValue::Str("ada".into()));
        assert_eq!(record.get("age"), Some(&FieldValue::Int(33)));
        assert_eq!(record.get("name"), Some(&FieldValue::Str("ada".into())));
        assert_eq!(record.get("height"), None);
        assert_eq!(record.fields().count(), 2);
    }

    #[test]
    fn test_insert_and_get() {
        let store = MemoryRecordStore::new();
        let id = store.insert(sample(20)).unwrap();
        assert_eq!(store.get(id).unwrap(), Some(sample(20)));
    }

    #[test]
    fn test_get_empty_sentinel_is_absent() {
        let store = MemoryRecordStore::new();
        store.insert(sample(20)).unwrap();
        assert_eq!(store.get(RecordId::EMPTY).unwrap(), None);
    }

    #[test]
    fn test_update_replaces_record() {
        let store = MemoryRecordStore::new();
        let id = store.insert(sample(20)).unwrap();

        assert!(store.update(id, sample(21)).unwrap());
        assert_eq!(store.get(id).unwrap(), Some(sample(21)));
        assert!(!store.update(RecordId::new(99), sample(1)).unwrap());
    }

    #[test]
    fn test_delete_keeps_other_ids_stable() {
        let store = MemoryRecordStore::new();
        let a = store.insert(sample(1)).unwrap();
        let b = store.insert(sample(2)).unwrap();

        assert!(store.delete(a).unwrap());
        assert!(!store.delete(a).unwrap());
        assert_eq!(store.get(a).unwrap(), None);
        assert_eq!(store.get(b).unwrap(), Some(sample(2)));
    }

    #[test]
    fn test_scan_skips_deleted() {
        let store = MemoryRecordStore::new();
        let a = store.insert(sample(1)).unwrap();
        let b = store.insert(sample(2)).unwrap();
        let c = store.insert(sample(3)).unwrap();
        store.delete(b).unwrap();

        let scanned = store.scan().unwrap();
        assert_eq!(
            scanned.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
            vec![a, c]
        );
        assert_eq!(store.len(), 2);
    }
}
