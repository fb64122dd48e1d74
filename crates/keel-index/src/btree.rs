//! Generic disk-backed B-tree of minimum degree `t`.
//!
//! Every non-root node holds between `t - 1` and `2t - 1` keys; all leaves
//! sit at the same depth. Duplicate keys are permitted, and deletion matches
//! the full `(key, value)` pair, so one key can map to several values.
//!
//! Mutations hold the tree's single exclusive permit for their entire run.
//! Lookups do not take the permit and may run concurrently with each other
//! and with a mutator; they observe a pre- or post-mutation tree, never a
//! torn node.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::manager::NodeManager;
use crate::node::Node;
use keel_common::{Codec, KeelError, Result};
use keel_store::BlockStore;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// First index whose key is not less than `key`.
fn lower_bound<K: Ord>(keys: &[K], key: &K) -> usize {
    keys.partition_point(|k| k < key)
}

/// Ordered key/value index persisted through a [`NodeManager`].
pub struct BTree<K, V> {
    manager: NodeManager<K, V>,
    degree: usize,
    /// Exclusive mutation permit; held for whole insert/delete operations.
    permit: Mutex<()>,
    /// Set when a mutation failed after its first save. The tree must then
    /// be considered corrupt and refuses further mutation.
    poisoned: AtomicBool,
}

impl<K, V> BTree<K, V>
where
    K: Codec + Ord + Clone + Send + Sync,
    V: Codec + Clone + PartialEq + Send + Sync,
{
    /// Creates a tree over the given store.
    pub fn new(store: Arc<BlockStore>, degree: usize, cache_capacity: usize) -> Result<Self> {
        if degree < 2 {
            return Err(KeelError::BadDegree(degree));
        }
        Ok(Self {
            manager: NodeManager::new(store, cache_capacity),
            degree,
            permit: Mutex::new(()),
            poisoned: AtomicBool::new(false),
        })
    }

    /// Minimum degree `t` of the tree.
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Returns the node manager backing this tree.
    pub fn manager(&self) -> &NodeManager<K, V> {
        &self.manager
    }

    fn max_keys(&self) -> usize {
        2 * self.degree - 1
    }

    fn min_keys(&self) -> usize {
        self.degree - 1
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.poisoned.load(Ordering::SeqCst) {
            Err(KeelError::Corrupted(
                "index poisoned by an interrupted mutation".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn poison_on_failure<T>(&self, result: &Result<T>, dirty: bool) {
        if result.is_err() && dirty {
            self.poisoned.store(true, Ordering::SeqCst);
            tracing::error!("mutation failed after its first save; index marked corrupt");
        }
    }

    // ------------------------------------------------------------------
    // Insert
    // ------------------------------------------------------------------

    /// Inserts one key/value pair. Duplicate keys are permitted.
    pub async fn insert(&self, key: K, value: V) -> Result<()> {
        let _permit = self.permit.lock().await;
        self.ensure_mutable()?;

        let mut dirty = false;
        let result = self.insert_inner(key, value, &mut dirty).await;
        self.poison_on_failure(&result, dirty);
        result
    }

    async fn insert_inner(&self, key: K, value: V, dirty: &mut bool) -> Result<()> {
        let root = self.manager.get_root().await?;
        let start = if root.keys.len() == self.max_keys() {
            // Grow upward: the old root becomes the sole child of a new one.
            let mut new_root = self.manager.create(false).await?;
            new_root.children.push(root.id);
            self.split_child(&mut new_root, 0, dirty).await?;
            self.manager.make_root(&new_root)?;
            new_root
        } else {
            root
        };
        self.insert_non_full(start, key, value, dirty).await
    }

    /// Inserts into a subtree whose root is known not to be full.
    async fn insert_non_full(
        &self,
        mut node: Node<K, V>,
        key: K,
        value: V,
        dirty: &mut bool,
    ) -> Result<()> {
        loop {
            if node.is_leaf {
                // First position where the new key is not greater.
                let idx = lower_bound(&node.keys, &key);
                node.keys.insert(idx, key);
                node.values.insert(idx, value);
                *dirty = true;
                return self.manager.save(&node).await;
            }

            // Descend left on key equality.
            let mut idx = lower_bound(&node.keys, &key);
            let child = self.manager.get(node.children[idx]).await?;
            if child.keys.len() == self.max_keys() {
                self.split_child(&mut node, idx, dirty).await?;
                // Re-select the descent side against the promoted median.
                if key > node.keys[idx] {
                    idx += 1;
                }
                node = self.manager.get(node.children[idx]).await?;
            } else {
                node = child;
            }
        }
    }

    /// Splits the full child at `parent.children[i]`.
    ///
    /// The sibling takes the last `t - 1` keys/values (and last `t` children
    /// when internal); the median at index `t - 1` is promoted into the
    /// parent. All three nodes are saved before returning.
    async fn split_child(
        &self,
        parent: &mut Node<K, V>,
        i: usize,
        dirty: &mut bool,
    ) -> Result<()> {
        let t = self.degree;
        let mut child = self.manager.get(parent.children[i]).await?;
        let mut sibling = self.manager.create(child.is_leaf).await?;

        sibling.keys = child.keys.split_off(t);
        sibling.values = child.values.split_off(t);
        if !child.is_leaf {
            sibling.children = child.children.split_off(t);
        }
        let (median_key, median_value) = match (child.keys.pop(), child.values.pop()) {
            (Some(k), Some(v)) => (k, v),
            _ => return Err(KeelError::Corrupted("split of an underfull node".to_string())),
        };

        parent.keys.insert(i, median_key);
        parent.values.insert(i, median_value);
        parent.children.insert(i + 1, sibling.id);

        *dirty = true;
        self.manager.save(&child).await?;
        self.manager.save(&sibling).await?;
        self.manager.save(parent).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Deletes one `(key, value)` association.
    ///
    /// Returns false when the pair is not present. Other values stored under
    /// the same key are untouched.
    pub async fn delete(&self, key: K, value: V) -> Result<bool> {
        let _permit = self.permit.lock().await;
        self.ensure_mutable()?;

        let mut dirty = false;
        let result = self.delete_inner(key, value, &mut dirty).await;
        self.poison_on_failure(&result, dirty);
        result
    }

    async fn delete_inner(&self, key: K, value: V, dirty: &mut bool) -> Result<bool> {
        let root = match self.manager.maybe_root().await? {
            Some(root) => root,
            None => return Ok(false),
        };
        if root.is_leaf && root.keys.is_empty() {
            return Ok(false);
        }

        let removed = self.delete_from(root, key, value, dirty).await?;

        // Collapse the root when a merge emptied it.
        let root = self.manager.get_root().await?;
        if root.keys.is_empty() && !root.is_leaf {
            let child = self.manager.get(root.children[0]).await?;
            *dirty = true;
            self.manager.make_root(&child)?;
            self.manager.delete(&root).await?;
        }
        Ok(removed)
    }

    /// Position of the exact `(key, value)` pair within the node, if any.
    fn position_of_pair(node: &Node<K, V>, key: &K, value: &V) -> Option<usize> {
        let mut i = lower_bound(&node.keys, key);
        while i < node.keys.len() && node.keys[i] == *key {
            if node.values[i] == *value {
                return Some(i);
            }
            i += 1;
        }
        None
    }

    /// Recursive delete. Before descending, the target child is topped up to
    /// at least `t` keys by borrow or merge.
    fn delete_from<'a>(
        &'a self,
        mut node: Node<K, V>,
        key: K,
        value: V,
        dirty: &'a mut bool,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            loop {
                if let Some(idx) = Self::position_of_pair(&node, &key, &value) {
                    if node.is_leaf {
                        node.keys.remove(idx);
                        node.values.remove(idx);
                        *dirty = true;
                        self.manager.save(&node).await?;
                        return Ok(true);
                    }
                    return self.delete_internal_entry(node, idx, key, value, dirty).await;
                }

                if node.is_leaf {
                    return Ok(false);
                }

                // Start at the largest i with keys[i] < key, plus one. With
                // duplicate separators the pair can live in any child
                // flanking the equal run, so probe them left to right before
                // committing to a descent.
                let mut idx = lower_bound(&node.keys, &key);
                let child = loop {
                    let probe = self.manager.get(node.children[idx]).await?;
                    if self.contains_pair(probe.clone(), &key, &value).await? {
                        break probe;
                    }
                    if idx < node.keys.len() && node.keys[idx] == key {
                        idx += 1;
                    } else {
                        return Ok(false);
                    }
                };
                if child.keys.len() < self.degree {
                    self.fill_child(&mut node, idx, dirty).await?;
                    // The fill may have rotated the target pair into this
                    // node or shifted the child boundaries; re-evaluate.
                    continue;
                }
                return self.delete_from(child, key, value, dirty).await;
            }
        })
    }

    /// True when the subtree rooted at `node` holds the exact pair.
    fn contains_pair<'a>(
        &'a self,
        node: Node<K, V>,
        key: &'a K,
        value: &'a V,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            if Self::position_of_pair(&node, key, value).is_some() {
                return Ok(true);
            }
            if node.is_leaf {
                return Ok(false);
            }
            let mut i = lower_bound(&node.keys, key);
            loop {
                let child = self.manager.get(node.children[i]).await?;
                if self.contains_pair(child, key, value).await? {
                    return Ok(true);
                }
                if i < node.keys.len() && node.keys[i] == *key {
                    i += 1;
                } else {
                    return Ok(false);
                }
            }
        })
    }

    /// Removes the entry at `idx` of an internal node.
    async fn delete_internal_entry(
        &self,
        mut node: Node<K, V>,
        idx: usize,
        key: K,
        value: V,
        dirty: &mut bool,
    ) -> Result<bool> {
        let left = self.manager.get(node.children[idx]).await?;
        if left.keys.len() >= self.degree {
            // Replace with the in-order predecessor, then delete it below.
            let (pk, pv) = self.rightmost_pair(left.clone()).await?;
            node.keys[idx] = pk.clone();
            node.values[idx] = pv.clone();
            *dirty = true;
            self.manager.save(&node).await?;
            let removed = self.delete_from(left, pk, pv, dirty).await?;
            if !removed {
                return Err(KeelError::Corrupted(
                    "predecessor vanished during delete".to_string(),
                ));
            }
            return Ok(true);
        }

        let right = self.manager.get(node.children[idx + 1]).await?;
        if right.keys.len() >= self.degree {
            let (sk, sv) = self.leftmost_pair(right.clone()).await?;
            node.keys[idx] = sk.clone();
            node.values[idx] = sv.clone();
            *dirty = true;
            self.manager.save(&node).await?;
            let removed = self.delete_from(right, sk, sv, dirty).await?;
            if !removed {
                return Err(KeelError::Corrupted(
                    "successor vanished during delete".to_string(),
                ));
            }
            return Ok(true);
        }

        // Both neighbours minimal: merge them around the separator and
        // delete from the merged child.
        let merged = self.merge_children(&mut node, idx, dirty).await?;
        self.delete_from(merged, key, value, dirty).await
    }

    /// Tops up `parent.children[i]` to at least `t` keys.
    async fn fill_child(
        &self,
        parent: &mut Node<K, V>,
        i: usize,
        dirty: &mut bool,
    ) -> Result<()> {
        if i > 0 {
            let left = self.manager.get(parent.children[i - 1]).await?;
            if left.keys.len() >= self.degree {
                return self.borrow_from_left(parent, i, left, dirty).await;
            }
        }
        if i + 1 < parent.children.len() {
            let right = self.manager.get(parent.children[i + 1]).await?;
            if right.keys.len() >= self.degree {
                return self.borrow_from_right(parent, i, right, dirty).await;
            }
        }

        // Merge, preferring the left sibling when one exists.
        let sep = if i > 0 { i - 1 } else { i };
        self.merge_children(parent, sep, dirty).await?;
        Ok(())
    }

    /// Rotates the parent separator into the child's front and the left
    /// sibling's last entry into the separator slot.
    async fn borrow_from_left(
        &self,
        parent: &mut Node<K, V>,
        i: usize,
        mut left: Node<K, V>,
        dirty: &mut bool,
    ) -> Result<()> {
        let mut child = self.manager.get(parent.children[i]).await?;
        let (lk, lv) = match (left.keys.pop(), left.values.pop()) {
            (Some(k), Some(v)) => (k, v),
            _ => return Err(KeelError::Corrupted("borrow from an empty sibling".to_string())),
        };
        let sep_key = std::mem::replace(&mut parent.keys[i - 1], lk);
        let sep_value = std::mem::replace(&mut parent.values[i - 1], lv);
        child.keys.insert(0, sep_key);
        child.values.insert(0, sep_value);
        if !child.is_leaf {
            let moved = left.children.pop().ok_or_else(|| {
                KeelError::Corrupted("internal sibling without children".to_string())
            })?;
            child.children.insert(0, moved);
        }

        *dirty = true;
        self.manager.save(&left).await?;
        self.manager.save(&child).await?;
        self.manager.save(parent).await?;
        Ok(())
    }

    /// Mirror of `borrow_from_left`.
    async fn borrow_from_right(
        &self,
        parent: &mut Node<K, V>,
        i: usize,
        mut right: Node<K, V>,
        dirty: &mut bool,
    ) -> Result<()> {
        let mut child = self.manager.get(parent.children[i]).await?;
        let rk = right.keys.remove(0);
        let rv = right.values.remove(0);
        let sep_key = std::mem::replace(&mut parent.keys[i], rk);
        let sep_value = std::mem::replace(&mut parent.values[i], rv);
        child.keys.push(sep_key);
        child.values.push(sep_value);
        if !child.is_leaf {
            child.children.push(right.children.remove(0));
        }

        *dirty = true;
        self.manager.save(&right).await?;
        self.manager.save(&child).await?;
        self.manager.save(parent).await?;
        Ok(())
    }

    /// Merges `children[sep]` and `children[sep + 1]` around separator `sep`,
    /// pulling the separator down into the merged node. The emptied right
    /// sibling's block is freed. Returns the merged node.
    async fn merge_children(
        &self,
        parent: &mut Node<K, V>,
        sep: usize,
        dirty: &mut bool,
    ) -> Result<Node<K, V>> {
        let mut left = self.manager.get(parent.children[sep]).await?;
        let mut right = self.manager.get(parent.children[sep + 1]).await?;

        left.keys.push(parent.keys.remove(sep));
        left.values.push(parent.values.remove(sep));
        left.keys.append(&mut right.keys);
        left.values.append(&mut right.values);
        left.children.append(&mut right.children);
        parent.children.remove(sep + 1);

        *dirty = true;
        self.manager.save(&left).await?;
        self.manager.save(parent).await?;
        self.manager.delete(&right).await?;
        Ok(left)
    }

    /// Largest pair of the subtree rooted at `node`.
    async fn rightmost_pair(&self, mut node: Node<K, V>) -> Result<(K, V)> {
        loop {
            if node.is_leaf {
                return match (node.keys.last(), node.values.last()) {
                    (Some(k), Some(v)) => Ok((k.clone(), v.clone())),
                    _ => Err(KeelError::Corrupted("empty leaf on rightmost path".to_string())),
                };
            }
            let next = *node.children.last().ok_or_else(|| {
                KeelError::Corrupted("internal node without children".to_string())
            })?;
            node = self.manager.get(next).await?;
        }
    }

    /// Smallest pair of the subtree rooted at `node`.
    async fn leftmost_pair(&self, mut node: Node<K, V>) -> Result<(K, V)> {
        loop {
            if node.is_leaf {
                return match (node.keys.first(), node.values.first()) {
                    (Some(k), Some(v)) => Ok((k.clone(), v.clone())),
                    _ => Err(KeelError::Corrupted("empty leaf on leftmost path".to_string())),
                };
            }
            node = self.manager.get(node.children[0]).await?;
        }
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    /// Returns every value stored under `key`.
    ///
    /// For duplicate keys, a matching entry is emitted before the subtree at
    /// its index is searched, and values within one node come out in node
    /// order.
    pub async fn find(&self, key: &K) -> Result<Vec<V>> {
        let mut out = Vec::new();
        if let Some(root) = self.manager.maybe_root().await? {
            self.find_in(root, key, &mut out).await?;
        }
        Ok(out)
    }

    fn find_in<'a>(
        &'a self,
        node: Node<K, V>,
        key: &'a K,
        out: &'a mut Vec<V>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut i = lower_bound(&node.keys, key);
            if node.is_leaf {
                while i < node.keys.len() && node.keys[i] == *key {
                    out.push(node.values[i].clone());
                    i += 1;
                }
                return Ok(());
            }

            loop {
                let matched = i < node.keys.len() && node.keys[i] == *key;
                if matched {
                    out.push(node.values[i].clone());
                }
                let child = self.manager.get(node.children[i]).await?;
                self.find_in(child, key, out).await?;
                if !matched {
                    return Ok(());
                }
                i += 1;
            }
        })
    }

    /// In-order scan of the keys inside the given bounds.
    ///
    /// `None` bounds are unbounded. Output is ascending by key; values
    /// sharing a key keep their node order.
    pub async fn find_range(
        &self,
        min: Option<&K>,
        max: Option<&K>,
        incl_min: bool,
        incl_max: bool,
    ) -> Result<Vec<(K, V)>> {
        let mut out = Vec::new();
        if let Some(root) = self.manager.maybe_root().await? {
            self.range_in(root, min, max, incl_min, incl_max, &mut out)
                .await?;
        }
        Ok(out)
    }

    /// Full in-order scan of the tree.
    pub async fn scan(&self) -> Result<Vec<(K, V)>> {
        self.find_range(None, None, true, true).await
    }

    fn below_lower(key: &K, min: Option<&K>, incl_min: bool) -> bool {
        match min {
            None => false,
            Some(m) => {
                if incl_min {
                    key < m
                } else {
                    key <= m
                }
            }
        }
    }

    fn above_upper(key: &K, max: Option<&K>, incl_max: bool) -> bool {
        match max {
            None => false,
            Some(m) => {
                if incl_max {
                    key > m
                } else {
                    key >= m
                }
            }
        }
    }

    fn range_in<'a>(
        &'a self,
        node: Node<K, V>,
        min: Option<&'a K>,
        max: Option<&'a K>,
        incl_min: bool,
        incl_max: bool,
        out: &'a mut Vec<(K, V)>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let qualifies = |key: &K| {
                !Self::below_lower(key, min, incl_min) && !Self::above_upper(key, max, incl_max)
            };

            if node.is_leaf {
                for (key, value) in node.keys.iter().zip(&node.values) {
                    if qualifies(key) {
                        out.push((key.clone(), value.clone()));
                    }
                }
                return Ok(());
            }

            let len = node.keys.len();
            for i in 0..=len {
                // Subtree i spans [keys[i-1], keys[i]] inclusive on both
                // sides; skip it when that interval cannot intersect the
                // query range.
                let may_intersect = (i == 0
                    || !Self::above_upper(&node.keys[i - 1], max, incl_max))
                    && (i == len || !Self::below_lower(&node.keys[i], min, incl_min));
                if may_intersect {
                    let child = self.manager.get(node.children[i]).await?;
                    self.range_in(child, min, max, incl_min, incl_max, out)
                        .await?;
                }
                if i < len && qualifies(&node.keys[i]) {
                    out.push((node.keys[i].clone(), node.values[i].clone()));
                }
            }
            Ok(())
        })
    }

    /// Smallest key in the tree. Fails with `EmptyIndex` on an empty tree.
    pub async fn min_key(&self) -> Result<K> {
        let mut node = self
            .manager
            .maybe_root()
            .await?
            .ok_or(KeelError::EmptyIndex)?;
        if node.is_leaf && node.keys.is_empty() {
            return Err(KeelError::EmptyIndex);
        }
        loop {
            if node.is_leaf {
                return node
                    .keys
                    .first()
                    .cloned()
                    .ok_or_else(|| KeelError::Corrupted("empty leaf on leftmost path".to_string()));
            }
            node = self.manager.get(node.children[0]).await?;
        }
    }

    /// Largest key in the tree. Fails with `EmptyIndex` on an empty tree.
    pub async fn max_key(&self) -> Result<K> {
        let mut node = self
            .manager
            .maybe_root()
            .await?
            .ok_or(KeelError::EmptyIndex)?;
        if node.is_leaf && node.keys.is_empty() {
            return Err(KeelError::EmptyIndex);
        }
        loop {
            if node.is_leaf {
                return node
                    .keys
                    .last()
                    .cloned()
                    .ok_or_else(|| KeelError::Corrupted("empty leaf on rightmost path".to_string()));
            }
            let next = *node.children.last().ok_or_else(|| {
                KeelError::Corrupted("internal node without children".to_string())
            })?;
            node = self.manager.get(next).await?;
        }
    }

    // ------------------------------------------------------------------
    // Structural validation
    // ------------------------------------------------------------------

    /// Walks the whole tree and checks its structural invariants: key count
    /// bounds, uniform leaf depth, ordered keys, key/value alignment, and
    /// subtree key bounds. Intended for tests and diagnostics.
    pub async fn verify_integrity(&self) -> Result<()> {
        let root = match self.manager.maybe_root().await? {
            Some(root) => root,
            None => return Ok(()),
        };
        if root.keys.len() > self.max_keys() {
            return Err(KeelError::Corrupted(format!(
                "root holds {} keys, maximum is {}",
                root.keys.len(),
                self.max_keys()
            )));
        }
        if root.keys.is_empty() {
            if !root.is_leaf {
                return Err(KeelError::Corrupted(
                    "empty root with children survived a mutation".to_string(),
                ));
            }
            return Ok(());
        }

        let mut leaf_depth = None;
        self.verify_node(root, 0, None, None, true, &mut leaf_depth)
            .await
    }

    fn verify_node<'a>(
        &'a self,
        node: Node<K, V>,
        depth: usize,
        lower: Option<K>,
        upper: Option<K>,
        is_root: bool,
        leaf_depth: &'a mut Option<usize>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let id = node.id;
            let corrupt = |reason: String| KeelError::Corrupted(format!("node {id}: {reason}"));

            if node.keys.len() != node.values.len() {
                return Err(corrupt(format!(
                    "{} keys but {} values",
                    node.keys.len(),
                    node.values.len()
                )));
            }
            if !is_root
                && (node.keys.len() < self.min_keys() || node.keys.len() > self.max_keys())
            {
                return Err(corrupt(format!(
                    "{} keys outside [{}, {}]",
                    node.keys.len(),
                    self.min_keys(),
                    self.max_keys()
                )));
            }
            // Ascending; equal neighbours are allowed because duplicate
            // keys may share a node.
            for pair in node.keys.windows(2) {
                if pair[0] > pair[1] {
                    return Err(corrupt("keys out of order".to_string()));
                }
            }
            if let Some(lower) = &lower {
                if node.keys.iter().any(|k| k < lower) {
                    return Err(corrupt("key below the subtree bound".to_string()));
                }
            }
            if let Some(upper) = &upper {
                if node.keys.iter().any(|k| k > upper) {
                    return Err(corrupt("key above the subtree bound".to_string()));
                }
            }

            if node.is_leaf {
                if !node.children.is_empty() {
                    return Err(corrupt("leaf with children".to_string()));
                }
                match *leaf_depth {
                    None => *leaf_depth = Some(depth),
                    Some(expected) if expected != depth => {
                        return Err(corrupt(format!(
                            "leaf at depth {depth}, expected {expected}"
                        )));
                    }
                    Some(_) => {}
                }
                return Ok(());
            }

            if node.children.len() != node.keys.len() + 1 {
                return Err(corrupt(format!(
                    "{} children for {} keys",
                    node.children.len(),
                    node.keys.len()
                )));
            }
            for i in 0..node.children.len() {
                let child_lower = if i == 0 {
                    lower.clone()
                } else {
                    Some(node.keys[i - 1].clone())
                };
                let child_upper = if i == node.keys.len() {
                    upper.clone()
                } else {
                    Some(node.keys[i].clone())
                };
                let child = self.manager.get(node.children[i]).await?;
                self.verify_node(child, depth + 1, child_lower, child_upper, false, leaf_depth)
                    .await?;
            }
            Ok(())
        })
    }
}
