//! Typed field indexes and their catalog.
//!
//! The query engine works with [`FieldValue`]s, while each B-tree is generic
//! over one concrete key type. [`FieldIndex`] closes that gap with a tagged
//! variant per key domain, exposing the narrow lookup capability the engine
//! needs; [`IndexCatalog`] resolves indexes by field name.

use std::collections::HashMap;
use std::sync::Arc;

use crate::btree::BTree;
use keel_common::{Codec, FieldValue, KeelError, RecordId, Result, StoreConfig};
use keel_store::BlockStore;

/// A persistent index from one field's keys to record ids.
pub struct Index<K> {
    field: String,
    tree: BTree<K, RecordId>,
    store: Arc<BlockStore>,
}

impl<K> Index<K>
where
    K: Codec + Ord + Clone + Send + Sync,
{
    /// Opens the index backed by the configured store file, creating the
    /// file if it does not exist yet.
    pub async fn open(field: impl Into<String>, config: StoreConfig) -> Result<Self> {
        let degree = config.degree;
        let cache_capacity = config.cache_capacity;
        let store = Arc::new(BlockStore::open_or_create(config).await?);
        let tree = BTree::new(Arc::clone(&store), degree, cache_capacity)?;
        Ok(Self {
            field: field.into(),
            tree,
            store,
        })
    }

    /// Name of the indexed field.
    pub fn field_name(&self) -> &str {
        &self.field
    }

    /// The underlying tree.
    pub fn tree(&self) -> &BTree<K, RecordId> {
        &self.tree
    }

    /// Associates `key` with a record id.
    pub async fn insert(&self, key: K, id: RecordId) -> Result<()> {
        self.tree.insert(key, id).await
    }

    /// Removes one `(key, id)` association; false when absent.
    pub async fn delete(&self, key: &K, id: RecordId) -> Result<bool> {
        self.tree.delete(key.clone(), id).await
    }

    /// Record ids stored under `key`.
    pub async fn find(&self, key: &K) -> Result<Vec<RecordId>> {
        self.tree.find(key).await
    }

    /// Record ids for keys within the given bounds, ascending by key.
    pub async fn find_range(
        &self,
        min: Option<&K>,
        max: Option<&K>,
        incl_min: bool,
        incl_max: bool,
    ) -> Result<Vec<RecordId>> {
        let pairs = self.tree.find_range(min, max, incl_min, incl_max).await?;
        Ok(pairs.into_iter().map(|(_, id)| id).collect())
    }

    /// Smallest indexed key.
    pub async fn min_key(&self) -> Result<K> {
        self.tree.min_key().await
    }

    /// Largest indexed key.
    pub async fn max_key(&self) -> Result<K> {
        self.tree.max_key().await
    }

    /// Tears down the backing store.
    pub async fn close(&self) -> Result<()> {
        self.store.close().await
    }
}

/// An index dispatched over the closed set of key domains.
pub enum FieldIndex {
    /// Index over 64-bit integer keys.
    Int(Index<i64>),
    /// Index over string keys.
    Str(Index<String>),
}

impl FieldIndex {
    /// Opens an integer index for `field`.
    pub async fn open_int(field: impl Into<String>, config: StoreConfig) -> Result<Self> {
        Ok(FieldIndex::Int(Index::open(field, config).await?))
    }

    /// Opens a string index for `field`.
    pub async fn open_str(field: impl Into<String>, config: StoreConfig) -> Result<Self> {
        Ok(FieldIndex::Str(Index::open(field, config).await?))
    }

    /// Name of the indexed field.
    pub fn field_name(&self) -> &str {
        match self {
            FieldIndex::Int(index) => index.field_name(),
            FieldIndex::Str(index) => index.field_name(),
        }
    }

    /// Name of the key domain, for error messages.
    pub fn key_type(&self) -> &'static str {
        match self {
            FieldIndex::Int(_) => "int",
            FieldIndex::Str(_) => "string",
        }
    }

    fn type_mismatch(&self, value: &FieldValue) -> KeelError {
        KeelError::PredicateTypeMismatch {
            field: self.field_name().to_string(),
            field_type: self.key_type().to_string(),
            value_type: value.type_name().to_string(),
        }
    }

    /// Associates a typed key with a record id.
    pub async fn insert(&self, value: &FieldValue, id: RecordId) -> Result<()> {
        match (self, value) {
            (FieldIndex::Int(index), FieldValue::Int(key)) => index.insert(*key, id).await,
            (FieldIndex::Str(index), FieldValue::Str(key)) => index.insert(key.clone(), id).await,
            _ => Err(self.type_mismatch(value)),
        }
    }

    /// Removes one association; false when absent.
    pub async fn delete(&self, value: &FieldValue, id: RecordId) -> Result<bool> {
        match (self, value) {
            (FieldIndex::Int(index), FieldValue::Int(key)) => index.delete(key, id).await,
            (FieldIndex::Str(index), FieldValue::Str(key)) => index.delete(key, id).await,
            _ => Err(self.type_mismatch(value)),
        }
    }

    /// Record ids whose key equals `value`.
    pub async fn find_equal(&self, value: &FieldValue) -> Result<Vec<RecordId>> {
        match (self, value) {
            (FieldIndex::Int(index), FieldValue::Int(key)) => index.find(key).await,
            (FieldIndex::Str(index), FieldValue::Str(key)) => index.find(key).await,
            _ => Err(self.type_mismatch(value)),
        }
    }

    /// Record ids whose key falls inside the given bounds.
    pub async fn find_range(
        &self,
        min: Option<&FieldValue>,
        max: Option<&FieldValue>,
        incl_min: bool,
        incl_max: bool,
    ) -> Result<Vec<RecordId>> {
        match self {
            FieldIndex::Int(index) => {
                let min = self.int_bound(min)?;
                let max = self.int_bound(max)?;
                index
                    .find_range(min.as_ref(), max.as_ref(), incl_min, incl_max)
                    .await
            }
            FieldIndex::Str(index) => {
                let min = self.str_bound(min)?;
                let max = self.str_bound(max)?;
                index
                    .find_range(min.as_ref(), max.as_ref(), incl_min, incl_max)
                    .await
            }
        }
    }

    fn int_bound(&self, bound: Option<&FieldValue>) -> Result<Option<i64>> {
        match bound {
            None => Ok(None),
            Some(FieldValue::Int(v)) => Ok(Some(*v)),
            Some(other) => Err(self.type_mismatch(other)),
        }
    }

    fn str_bound(&self, bound: Option<&FieldValue>) -> Result<Option<String>> {
        match bound {
            None => Ok(None),
            Some(FieldValue::Str(v)) => Ok(Some(v.clone())),
            Some(other) => Err(self.type_mismatch(other)),
        }
    }

    /// Tears down the backing store.
    pub async fn close(&self) -> Result<()> {
        match self {
            FieldIndex::Int(index) => index.close().await,
            FieldIndex::Str(index) => index.close().await,
        }
    }
}

/// Indexes available to the query engine, keyed by field name.
#[derive(Default)]
pub struct IndexCatalog {
    indexes: HashMap<String, FieldIndex>,
}

impl IndexCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an index under its field name, replacing any previous one.
    pub fn register(&mut self, index: FieldIndex) {
        self.indexes.insert(index.field_name().to_string(), index);
    }

    /// Looks up the index for a field, if one exists.
    pub fn get(&self, field: &str) -> Option<&FieldIndex> {
        self.indexes.get(field)
    }

    /// Field names with a registered index.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.indexes.keys().map(String::as_str)
    }

    /// Tears down every registered index.
    pub async fn close_all(&self) -> Result<()> {
        for index in self.indexes.values() {
            index.close().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_config(dir: &tempfile::TempDir, name: &str) -> StoreConfig {
        StoreConfig {
            path: dir.path().join(name),
            block_size: 512,
            fsync_enabled: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_typed_index_roundtrip() {
        let dir = tempdir().unwrap();
        let index: Index<i64> = Index::open("age", test_config(&dir, "age.idx")).await.unwrap();

        index.insert(30, RecordId::new(1)).await.unwrap();
        index.insert(25, RecordId::new(2)).await.unwrap();

        assert_eq!(index.field_name(), "age");
        assert_eq!(index.find(&30).await.unwrap(), vec![RecordId::new(1)]);
        assert_eq!(index.min_key().await.unwrap(), 25);
        assert_eq!(index.max_key().await.unwrap(), 30);
    }

    #[tokio::test]
    async fn test_field_index_dispatches_int() {
        let dir = tempdir().unwrap();
        let index = FieldIndex::open_int("age", test_config(&dir, "age.idx"))
            .await
            .unwrap();

        index.insert(&FieldValue::Int(42), RecordId::new(7)).await.unwrap();
        assert_eq!(
            index.find_equal(&FieldValue::Int(42)).await.unwrap(),
            vec![RecordId::new(7)]
        );
        assert!(index
            .find_equal(&FieldValue::Int(43))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_field_index_dispatches_str() {
        let dir = tempdir().unwrap();
        let index = FieldIndex::open_str("name", test_config(&dir, "name.idx"))
            .await
            .unwrap();

        index
            .insert(&FieldValue::Str("ada".into()), RecordId::new(1))
            .await
            .unwrap();
        index
            .insert(&FieldValue::Str("bo".into()), RecordId::new(2))
            .await
            .unwrap();

        let ids = index
            .find_range(
                Some(&FieldValue::Str("a".into())),
                Some(&FieldValue::Str("b".into())),
                true,
                true,
            )
            .await
            .unwrap();
        assert_eq!(ids, vec![RecordId::new(1)]);
    }

    #[tokio::test]
    async fn test_field_index_rejects_mismatched_type() {
        let dir = tempdir().unwrap();
        let index = FieldIndex::open_int("age", test_config(&dir, "age.idx"))
            .await
            .unwrap();

        let result = index.find_equal(&FieldValue::Str("old".into())).await;
        assert!(matches!(
            result,
            Err(KeelError::PredicateTypeMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_catalog_resolves_by_field_name() {
        let dir = tempdir().unwrap();
        let mut catalog = IndexCatalog::new();
        catalog.register(
            FieldIndex::open_int("age", test_config(&dir, "age.idx"))
                .await
                .unwrap(),
        );
        catalog.register(
            FieldIndex::open_str("name", test_config(&dir, "name.idx"))
                .await
                .unwrap(),
        );

        assert!(catalog.get("age").is_some());
        assert!(catalog.get("name").is_some());
        assert!(catalog.get("height").is_none());
        assert_eq!(catalog.fields().count(), 2);
    }

    #[tokio::test]
    async fn test_index_delete_specific_association() {
        let dir = tempdir().unwrap();
        let index = FieldIndex::open_int("age", test_config(&dir, "age.idx"))
            .await
            .unwrap();

        index.insert(&FieldValue::Int(30), RecordId::new(1)).await.unwrap();
        index.insert(&FieldValue::Int(30), RecordId::new(2)).await.unwrap();

        assert!(index.delete(&FieldValue::Int(30), RecordId::new(1)).await.unwrap());
        assert_eq!(
            index.find_equal(&FieldValue::Int(30)).await.unwrap(),
            vec![RecordId::new(2)]
        );
    }
}
