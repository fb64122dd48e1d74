//! End-to-end index scenarios: persistence, rebalancing, and randomized
//! invariant checks against an in-memory model.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

use keel_common::{KeelError, RecordId, StoreConfig};
use keel_index::BTree;
use keel_store::BlockStore;

fn scenario_config(dir: &tempfile::TempDir, name: &str) -> StoreConfig {
    StoreConfig {
        path: dir.path().join(name),
        block_size: 4096,
        degree: 3,
        fsync_enabled: false,
        ..Default::default()
    }
}

async fn create_tree(config: StoreConfig) -> BTree<i64, RecordId> {
    let degree = config.degree;
    let cache = config.cache_capacity;
    let store = Arc::new(BlockStore::open_or_create(config).await.unwrap());
    BTree::new(store, degree, cache).unwrap()
}

fn rid(v: i64) -> RecordId {
    RecordId::new(v)
}

/// Height of the tree: number of node levels from root to leaf.
async fn tree_height(tree: &BTree<i64, RecordId>) -> usize {
    let mut height = 1;
    let mut node = tree.manager().maybe_root().await.unwrap().unwrap();
    while !node.is_leaf {
        node = tree.manager().get(node.children[0]).await.unwrap();
        height += 1;
    }
    height
}

#[tokio::test]
async fn test_small_tree_range_and_extremes() {
    let dir = tempdir().unwrap();
    let tree = create_tree(scenario_config(&dir, "small.idx")).await;

    for (k, v) in [(1, 100), (3, 300), (5, 500), (2, 200), (4, 400)] {
        tree.insert(k, rid(v)).await.unwrap();
    }

    let values: Vec<RecordId> = tree
        .find_range(Some(&2), Some(&4), true, true)
        .await
        .unwrap()
        .into_iter()
        .map(|(_, v)| v)
        .collect();
    assert_eq!(values, vec![rid(200), rid(300), rid(400)]);

    assert_eq!(tree.min_key().await.unwrap(), 1);
    assert_eq!(tree.max_key().await.unwrap(), 5);
}

#[tokio::test]
async fn test_ascending_inserts_leave_leaves_two_edges_deep() {
    let dir = tempdir().unwrap();
    let tree = create_tree(scenario_config(&dir, "ascending.idx")).await;

    for k in 1..=20 {
        tree.insert(k, rid(k * 10)).await.unwrap();
    }

    // Insert 18 fills the root to five keys; insert 19 grows a new root
    // above it, so the leaves sit two edges below the root: three node
    // levels.
    assert_eq!(tree_height(&tree).await, 3);
    assert_eq!(tree.find(&13).await.unwrap(), vec![rid(130)]);

    let values: Vec<RecordId> = tree
        .find_range(Some(&8), Some(&15), true, false)
        .await
        .unwrap()
        .into_iter()
        .map(|(_, v)| v)
        .collect();
    assert_eq!(
        values,
        vec![rid(80), rid(90), rid(100), rid(110), rid(120), rid(130), rid(140)]
    );
}

#[tokio::test]
async fn test_deletes_rebalance_and_keep_order() {
    let dir = tempdir().unwrap();
    let tree = create_tree(scenario_config(&dir, "deletes.idx")).await;

    for k in [5, 2, 8, 1, 3, 7, 9, 4, 6] {
        tree.insert(k, rid(k * 10)).await.unwrap();
    }
    for k in [5, 8, 1] {
        assert!(tree.delete(k, rid(k * 10)).await.unwrap());
    }

    let keys: Vec<i64> = tree.scan().await.unwrap().into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec![2, 3, 4, 6, 7, 9]);
    tree.verify_integrity().await.unwrap();
}

#[tokio::test]
async fn test_duplicate_key_associations() {
    let dir = tempdir().unwrap();
    let tree = create_tree(scenario_config(&dir, "dups.idx")).await;

    tree.insert(1, rid(10)).await.unwrap();
    tree.insert(1, rid(11)).await.unwrap();
    tree.insert(1, rid(12)).await.unwrap();

    // Insertion places each duplicate at the first position where the key
    // fits, so the latest insert leads.
    assert_eq!(tree.find(&1).await.unwrap(), vec![rid(12), rid(11), rid(10)]);

    assert!(tree.delete(1, rid(11)).await.unwrap());
    assert_eq!(tree.find(&1).await.unwrap(), vec![rid(12), rid(10)]);
    assert!(!tree.delete(1, rid(11)).await.unwrap());
}

#[tokio::test]
async fn test_contents_survive_close_and_reopen() {
    let dir = tempdir().unwrap();
    let config = scenario_config(&dir, "persist.idx");

    let mut expected: Vec<(i64, RecordId)> = Vec::new();
    {
        let tree = create_tree(config.clone()).await;
        for (k, v) in [(1, 100), (3, 300), (5, 500), (2, 200), (4, 400)] {
            tree.insert(k, rid(v)).await.unwrap();
            expected.push((k, rid(v)));
        }
        for k in [10, 12, 14] {
            tree.insert(k, rid(k * 10)).await.unwrap();
            expected.push((k, rid(k * 10)));
        }
        tree.delete(3, rid(300)).await.unwrap();
        expected.retain(|&(k, _)| k != 3);

        tree.manager().store().close().await.unwrap();
    }

    let tree = create_tree(config).await;
    let mut scanned = tree.scan().await.unwrap();
    scanned.sort();
    expected.sort();
    assert_eq!(scanned, expected);
    tree.verify_integrity().await.unwrap();
}

#[tokio::test]
async fn test_operations_fail_after_store_teardown() {
    let dir = tempdir().unwrap();
    let tree = create_tree(scenario_config(&dir, "teardown.idx")).await;

    tree.insert(1, rid(10)).await.unwrap();
    tree.manager().store().close().await.unwrap();

    assert!(matches!(
        tree.insert(2, rid(20)).await,
        Err(KeelError::StoreDisposed)
    ));
    assert!(matches!(
        tree.find(&1).await,
        Err(KeelError::StoreDisposed)
    ));
}

/// Reference model: a multiset of `(key, value)` pairs.
struct Model {
    pairs: Vec<(i64, i64)>,
}

impl Model {
    fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    fn insert(&mut self, k: i64, v: i64) {
        self.pairs.push((k, v));
    }

    fn delete(&mut self, k: i64, v: i64) -> bool {
        match self.pairs.iter().position(|&p| p == (k, v)) {
            Some(i) => {
                self.pairs.remove(i);
                true
            }
            None => false,
        }
    }

    fn find(&self, k: i64) -> Vec<i64> {
        let mut out: Vec<i64> = self
            .pairs
            .iter()
            .filter(|&&(key, _)| key == k)
            .map(|&(_, v)| v)
            .collect();
        out.sort_unstable();
        out
    }

    fn range(&self, min: i64, max: i64, incl_min: bool, incl_max: bool) -> Vec<(i64, i64)> {
        let mut out: Vec<(i64, i64)> = self
            .pairs
            .iter()
            .filter(|&&(k, _)| {
                let above = if incl_min { k >= min } else { k > min };
                let below = if incl_max { k <= max } else { k < max };
                above && below
            })
            .copied()
            .collect();
        out.sort_unstable();
        out
    }
}

#[tokio::test]
async fn test_randomized_mutations_hold_invariants() {
    let dir = tempdir().unwrap();
    let tree = create_tree(scenario_config(&dir, "random.idx")).await;
    let mut model = Model::new();
    let mut rng = StdRng::seed_from_u64(0xB7EE);

    for round in 0..400 {
        let key = rng.gen_range(0..60);
        if rng.gen_bool(0.65) || model.pairs.is_empty() {
            let value = rng.gen_range(0..1_000_000);
            tree.insert(key, rid(value)).await.unwrap();
            model.insert(key, value);
        } else {
            // Delete a pair that exists half the time, a random miss otherwise.
            let (k, v) = if rng.gen_bool(0.5) {
                model.pairs[rng.gen_range(0..model.pairs.len())]
            } else {
                (key, rng.gen_range(0..1_000_000))
            };
            let expected = model.delete(k, v);
            assert_eq!(tree.delete(k, rid(v)).await.unwrap(), expected);
        }

        if round % 25 == 0 {
            tree.verify_integrity().await.unwrap();
        }
    }
    tree.verify_integrity().await.unwrap();

    // Insert/find law: every key yields exactly the model's multiset.
    for key in 0..60 {
        let mut found: Vec<i64> = tree
            .find(&key)
            .await
            .unwrap()
            .into_iter()
            .map(|id| id.raw())
            .collect();
        found.sort_unstable();
        assert_eq!(found, model.find(key), "key {key}");
    }
}

#[tokio::test]
async fn test_randomized_ranges_are_complete_and_ordered() {
    let dir = tempdir().unwrap();
    let tree = create_tree(scenario_config(&dir, "ranges.idx")).await;
    let mut model = Model::new();
    let mut rng = StdRng::seed_from_u64(0x5EED);

    for _ in 0..300 {
        let key = rng.gen_range(0..100);
        let value = rng.gen_range(0..1_000_000);
        tree.insert(key, rid(value)).await.unwrap();
        model.insert(key, value);
    }

    for _ in 0..50 {
        let a = rng.gen_range(0..100);
        let b = rng.gen_range(0..100);
        let (min, max) = (a.min(b), a.max(b));
        let incl_min = rng.gen_bool(0.5);
        let incl_max = rng.gen_bool(0.5);

        let emitted = tree
            .find_range(Some(&min), Some(&max), incl_min, incl_max)
            .await
            .unwrap();

        // Ascending by key.
        for pair in emitted.windows(2) {
            assert!(pair[0].0 <= pair[1].0);
        }

        let mut got: Vec<(i64, i64)> = emitted.into_iter().map(|(k, v)| (k, v.raw())).collect();
        got.sort_unstable();
        assert_eq!(got, model.range(min, max, incl_min, incl_max));
    }
}

#[tokio::test]
async fn test_degree_two_tree_rebalances() {
    let dir = tempdir().unwrap();
    let config = StoreConfig {
        path: dir.path().join("deg2.idx"),
        block_size: 4096,
        degree: 2,
        fsync_enabled: false,
        ..Default::default()
    };
    let tree = create_tree(config).await;

    let keys: Vec<i64> = (0..50).map(|i| (i * 13) % 50).collect();
    for &k in &keys {
        tree.insert(k, rid(k)).await.unwrap();
    }
    tree.verify_integrity().await.unwrap();

    for &k in &keys {
        assert!(tree.delete(k, rid(k)).await.unwrap(), "key {k}");
    }
    tree.verify_integrity().await.unwrap();
    assert!(tree.scan().await.unwrap().is_empty());
}
