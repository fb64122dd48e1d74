//! Node manager: maps tree nodes onto blocks with a small bounded cache.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::node::Node;
use keel_common::{BlockId, Codec, Result};
use keel_store::BlockStore;

/// Snapshot of cache hit/miss counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Node fetches served from the cache.
    pub hits: u64,
    /// Node fetches that went to the block store.
    pub misses: u64,
}

/// Bounded node cache with insertion-order eviction.
struct NodeCache<K, V> {
    capacity: usize,
    nodes: HashMap<u32, Node<K, V>>,
    order: VecDeque<u32>,
    stats: CacheStats,
}

impl<K: Clone, V: Clone> NodeCache<K, V> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            nodes: HashMap::new(),
            order: VecDeque::new(),
            stats: CacheStats::default(),
        }
    }

    fn get(&mut self, id: BlockId) -> Option<Node<K, V>> {
        match self.nodes.get(&id.0) {
            Some(node) => {
                self.stats.hits += 1;
                Some(node.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    fn insert(&mut self, node: Node<K, V>) {
        let id = node.id.0;
        if self.nodes.insert(id, node).is_none() {
            self.order.push_back(id);
            while self.nodes.len() > self.capacity {
                // Entries removed out of band leave stale ids in the queue.
                match self.order.pop_front() {
                    Some(victim) if victim != id => {
                        self.nodes.remove(&victim);
                    }
                    Some(victim) => self.order.push_back(victim),
                    None => break,
                }
            }
        }
    }

    fn remove(&mut self, id: BlockId) {
        self.nodes.remove(&id.0);
    }
}

/// Routes every node read and mutation onto the block store.
///
/// Saves update the cache before the block write is enqueued, and reads
/// consult the cache first. This is what hides the store's asynchronous
/// write pipeline from the tree: a node saved a moment ago is observable
/// here even while its block write is still queued.
pub struct NodeManager<K, V> {
    store: Arc<BlockStore>,
    cache: Mutex<NodeCache<K, V>>,
}

impl<K, V> NodeManager<K, V>
where
    K: Codec + Clone,
    V: Codec + Clone,
{
    /// Creates a manager over the given store.
    pub fn new(store: Arc<BlockStore>, cache_capacity: usize) -> Self {
        Self {
            store,
            cache: Mutex::new(NodeCache::new(cache_capacity)),
        }
    }

    /// Returns the underlying block store.
    pub fn store(&self) -> &Arc<BlockStore> {
        &self.store
    }

    /// Returns a snapshot of the cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().stats
    }

    /// Returns the root node, creating an empty leaf root on first use.
    pub async fn get_root(&self) -> Result<Node<K, V>> {
        match self.maybe_root().await? {
            Some(root) => Ok(root),
            None => {
                let root = self.create(true).await?;
                self.store.set_root(root.id)?;
                Ok(root)
            }
        }
    }

    /// Returns the root node, or `None` while the store has no root yet.
    ///
    /// Read paths use this so a lookup against an empty store performs no
    /// writes.
    pub async fn maybe_root(&self) -> Result<Option<Node<K, V>>> {
        let root_id = self.store.root()?;
        if root_id.is_valid() {
            Ok(Some(self.get(root_id).await?))
        } else {
            Ok(None)
        }
    }

    /// Makes the given node the tree root. Persisted synchronously.
    pub fn make_root(&self, node: &Node<K, V>) -> Result<()> {
        self.store.set_root(node.id)
    }

    /// Allocates a block and returns a fresh empty node backed by it.
    ///
    /// The empty node is saved immediately so a cache eviction can never
    /// expose stale block contents under this id.
    pub async fn create(&self, is_leaf: bool) -> Result<Node<K, V>> {
        let id = self.store.allocate()?;
        let node = if is_leaf {
            Node::new_leaf(id)
        } else {
            Node::new_internal(id)
        };
        self.save(&node).await?;
        Ok(node)
    }

    /// Fetches a node, consulting the cache before the block store.
    ///
    /// On a cache miss the write queue is drained first: a save of this node
    /// may still be queued after an eviction, and reads bypass the queue.
    pub async fn get(&self, id: BlockId) -> Result<Node<K, V>> {
        if let Some(node) = self.cache.lock().get(id) {
            return Ok(node);
        }
        self.store.flush().await?;
        let data = self.store.read(id).await?;
        let node = Node::from_block(id, &data)?;
        self.cache.lock().insert(node.clone());
        Ok(node)
    }

    /// Persists a node: cache first, then the write is enqueued.
    pub async fn save(&self, node: &Node<K, V>) -> Result<()> {
        let block = node.to_block(self.store.block_size())?;
        self.cache.lock().insert(node.clone());
        self.store.write(node.id, block).await
    }

    /// Destroys a node, returning its block to the free list.
    pub async fn delete(&self, node: &Node<K, V>) -> Result<()> {
        self.cache.lock().remove(node.id);
        self.store.free(node.id).await
    }
}
