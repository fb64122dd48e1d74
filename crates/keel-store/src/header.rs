//! Store header occupying block 0.

use bytes::Bytes;
use keel_common::{BlockId, KeelError, Result};

/// Magic number identifying a KeelDB store file ("BDN1").
pub const MAGIC: u32 = 0x42444E31;

/// Current file format version.
pub const VERSION: u16 = 1;

/// Header stored in block 0 of every store file.
///
/// Layout (little-endian, 18 bytes, rest of the block reserved zero):
/// - magic: 4 bytes
/// - version: 2 bytes
/// - block_size: 4 bytes
/// - root_block_id: 4 bytes (0xFFFFFFFF = no root)
/// - free_list_head: 4 bytes (0xFFFFFFFF = empty)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreHeader {
    /// Block size the file was created with.
    pub block_size: u32,
    /// Block id of the tree root, or `BlockId::INVALID` for an empty store.
    pub root: BlockId,
    /// Head of the free-list chain, or `BlockId::INVALID` when empty.
    pub free_head: BlockId,
}

impl StoreHeader {
    /// Serialized size of the header fields in bytes.
    pub const SIZE: usize = 18;

    /// Creates a fresh header with no root and an empty free list.
    pub fn new(block_size: u32) -> Self {
        Self {
            block_size,
            root: BlockId::INVALID,
            free_head: BlockId::INVALID,
        }
    }

    /// Serializes the header into a full zero-padded block.
    pub fn to_block(&self, block_size: usize) -> Bytes {
        let mut buf = vec![0u8; block_size];
        buf[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        buf[4..6].copy_from_slice(&VERSION.to_le_bytes());
        buf[6..10].copy_from_slice(&self.block_size.to_le_bytes());
        buf[10..14].copy_from_slice(&self.root.0.to_le_bytes());
        buf[14..18].copy_from_slice(&self.free_head.0.to_le_bytes());
        Bytes::from(buf)
    }

    /// Deserializes and validates a header from the start of block 0.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(KeelError::InvalidHeader(format!(
                "header needs {} bytes, got {}",
                Self::SIZE,
                buf.len()
            )));
        }

        let magic = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if magic != MAGIC {
            return Err(KeelError::InvalidHeader(format!(
                "bad magic {magic:#010x}, expected {MAGIC:#010x}"
            )));
        }

        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version != VERSION {
            return Err(KeelError::InvalidHeader(format!(
                "unsupported version {version}, expected {VERSION}"
            )));
        }

        let block_size = u32::from_le_bytes([buf[6], buf[7], buf[8], buf[9]]);
        let root = BlockId(u32::from_le_bytes([buf[10], buf[11], buf[12], buf[13]]));
        let free_head = BlockId(u32::from_le_bytes([buf[14], buf[15], buf[16], buf[17]]));

        Ok(Self {
            block_size,
            root,
            free_head,
        })
    }
}
