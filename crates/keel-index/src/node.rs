//! Tree node model and its one-block encoding.

use bytes::Bytes;
use keel_common::{BlockId, Codec, KeelError, Result};

/// One vertex of the B-tree, persisted as exactly one block.
///
/// `keys` and `values` are positionally aligned. Internal nodes carry
/// `keys.len() + 1` child block ids; leaves carry none.
#[derive(Debug, Clone, PartialEq)]
pub struct Node<K, V> {
    /// Block id backing this node. Stable for the node's lifetime.
    pub id: BlockId,
    /// True if this node has no children.
    pub is_leaf: bool,
    /// Keys in ascending order.
    pub keys: Vec<K>,
    /// Values aligned with `keys`.
    pub values: Vec<V>,
    /// Child block ids (empty for leaves).
    pub children: Vec<BlockId>,
}

/// Fixed node header: is_leaf (1) + key_count (4) + value_bytes (4) +
/// children_count (4).
const HEADER_SIZE: usize = 13;

impl<K: Codec, V: Codec> Node<K, V> {
    /// Creates an empty leaf node.
    pub fn new_leaf(id: BlockId) -> Self {
        Self {
            id,
            is_leaf: true,
            keys: Vec::new(),
            values: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Creates an empty internal node.
    pub fn new_internal(id: BlockId) -> Self {
        Self {
            id,
            is_leaf: false,
            keys: Vec::new(),
            values: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Number of bytes the encoded node occupies before padding.
    pub fn encoded_size(&self) -> usize {
        HEADER_SIZE
            + self.keys.iter().map(Codec::encoded_size).sum::<usize>()
            + self.value_bytes()
            + self.children.len() * 4
    }

    fn value_bytes(&self) -> usize {
        self.values.iter().map(Codec::encoded_size).sum()
    }

    /// Serializes the node into one zero-padded block.
    ///
    /// Fails with `NodeOverflow` when the encoding does not fit; that is a
    /// configuration error (degree too large for the block size).
    pub fn to_block(&self, block_size: usize) -> Result<Bytes> {
        let needed = self.encoded_size();
        if needed > block_size {
            return Err(KeelError::NodeOverflow {
                needed,
                block_size,
            });
        }

        let mut buf = Vec::with_capacity(block_size);
        buf.push(self.is_leaf as u8);
        buf.extend_from_slice(&(self.keys.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(self.value_bytes() as u32).to_le_bytes());
        buf.extend_from_slice(&(self.children.len() as u32).to_le_bytes());

        for key in &self.keys {
            key.encode(&mut buf);
        }
        for value in &self.values {
            value.encode(&mut buf);
        }
        for child in &self.children {
            buf.extend_from_slice(&child.0.to_le_bytes());
        }

        buf.resize(block_size, 0);
        Ok(Bytes::from(buf))
    }

    /// Deserializes a node from its block.
    pub fn from_block(id: BlockId, data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(KeelError::Corrupted(format!(
                "node block {id} smaller than the node header"
            )));
        }

        let is_leaf = match data[0] {
            0 => false,
            1 => true,
            other => {
                return Err(KeelError::Corrupted(format!(
                    "node block {id} has invalid leaf flag {other}"
                )))
            }
        };
        let key_count = u32::from_le_bytes([data[1], data[2], data[3], data[4]]) as usize;
        let value_bytes = u32::from_le_bytes([data[5], data[6], data[7], data[8]]) as usize;
        let children_count = u32::from_le_bytes([data[9], data[10], data[11], data[12]]) as usize;

        if is_leaf && children_count != 0 {
            return Err(KeelError::Corrupted(format!(
                "leaf node {id} claims {children_count} children"
            )));
        }

        let mut offset = HEADER_SIZE;
        let mut keys = Vec::with_capacity(key_count);
        for _ in 0..key_count {
            let (key, consumed) = K::decode(&data[offset..])?;
            offset += consumed;
            keys.push(key);
        }

        let values_end = offset + value_bytes;
        let mut values = Vec::with_capacity(key_count);
        for _ in 0..key_count {
            let (value, consumed) = V::decode(&data[offset..])?;
            offset += consumed;
            values.push(value);
        }
        if offset != values_end {
            return Err(KeelError::Corrupted(format!(
                "node block {id} value section is {} bytes, header says {value_bytes}",
                offset + value_bytes - values_end
            )));
        }

        let mut children = Vec::with_capacity(children_count);
        for _ in 0..children_count {
            if data.len() < offset + 4 {
                return Err(KeelError::Corrupted(format!(
                    "node block {id} truncated in child list"
                )));
            }
            children.push(BlockId(u32::from_le_bytes([
                data[offset],
                data[offset + 1],
                data[offset + 2],
                data[offset + 3],
            ])));
            offset += 4;
        }

        Ok(Self {
            id,
            is_leaf,
            keys,
            values,
            children,
        })
    }
}
