//! Persistent B-tree indexing for KeelDB.
//!
//! A tree of minimum degree `t` stores ordered keys with opaque values,
//! one node per block. All node traffic goes through the [`NodeManager`],
//! which caches recently used nodes and maps them onto the block store, so
//! the tree itself is storage-agnostic.

pub mod btree;
pub mod index;
pub mod manager;
pub mod node;

pub use btree::BTree;
pub use index::{FieldIndex, Index, IndexCatalog};
pub use manager::{CacheStats, NodeManager};
pub use node::Node;
