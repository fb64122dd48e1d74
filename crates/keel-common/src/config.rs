//! Configuration for a KeelDB store.

use crate::error::{KeelError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default block size in bytes (8 KiB).
pub const DEFAULT_BLOCK_SIZE: usize = 8192;

/// Default minimum degree of the B-tree.
pub const DEFAULT_DEGREE: usize = 3;

/// Default capacity of the write pipeline queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Default capacity of the node cache, in nodes.
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Smallest block size that can hold the store header and a useful node.
const MIN_BLOCK_SIZE: usize = 512;

/// Configuration for a single store file and the index it backs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the backing file.
    pub path: PathBuf,
    /// Block size in bytes. Fixed at store creation.
    pub block_size: usize,
    /// Minimum degree of the B-tree (must be >= 2).
    pub degree: usize,
    /// Capacity of the write pipeline queue.
    pub queue_capacity: usize,
    /// Capacity of the node cache, in nodes.
    pub cache_capacity: usize,
    /// Enable fsync after drained writes.
    pub fsync_enabled: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./keel.db"),
            block_size: DEFAULT_BLOCK_SIZE,
            degree: DEFAULT_DEGREE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            fsync_enabled: true,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration for the given path with defaults elsewhere.
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.degree < 2 {
            return Err(KeelError::BadDegree(self.degree));
        }
        if self.block_size < MIN_BLOCK_SIZE {
            return Err(KeelError::Config(format!(
                "block_size {} is below the minimum of {MIN_BLOCK_SIZE}",
                self.block_size
            )));
        }
        if self.queue_capacity == 0 {
            return Err(KeelError::Config(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
