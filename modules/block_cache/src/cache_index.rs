//! Hash → node index shared between the tree and lock-free readers
// Sharded DashMap locks let lookups run while the tree is being read,
// but every write happens under the tree's write lock

use crate::cache_node::NodeId;
use blockcache_common::{Block, BlockHash};
use dashmap::DashMap;
use std::sync::Arc;

/// What a lookup by hash sees
#[derive(Debug, Clone)]
pub struct IndexEntry {
    /// Arena id of the node
    pub node: NodeId,

    /// The block, or `None` while the node is a placeholder
    pub block: Option<Arc<Block>>,
}

#[derive(Debug, Default)]
pub struct TreeIndex {
    entries: DashMap<BlockHash, IndexEntry>,
}

impl TreeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arena id of whatever is indexed under `hash`, placeholders included
    pub fn node_id(&self, hash: &BlockHash) -> Option<NodeId> {
        self.entries.get(hash).map(|entry| entry.node)
    }

    /// The real block under `hash`; `None` for unknown hashes and placeholders
    pub fn block(&self, hash: &BlockHash) -> Option<Arc<Block>> {
        self.entries.get(hash).and_then(|entry| entry.block.clone())
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.entries.contains_key(hash)
    }

    /// Number of indexed nodes, placeholders included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn insert(&self, hash: BlockHash, node: NodeId, block: Option<Arc<Block>>) {
        self.entries.insert(hash, IndexEntry { node, block });
    }

    /// Forget `hash` if it still points at node `node`
    pub(crate) fn remove_node(&self, hash: &BlockHash, node: NodeId) {
        self.entries.remove_if(hash, |_, entry| entry.node == node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockcache_common::BlockHeader;

    fn hash(n: u8) -> BlockHash {
        let mut bytes = [0u8; 32];
        bytes[0] = n;
        BlockHash::from(bytes)
    }

    #[test]
    fn placeholder_has_no_block() {
        let index = TreeIndex::new();
        index.insert(hash(1), 7, None);

        assert_eq!(index.node_id(&hash(1)), Some(7));
        assert!(index.block(&hash(1)).is_none());
        assert!(index.contains(&hash(1)));
    }

    #[test]
    fn insert_replaces_and_remove_forgets() {
        let index = TreeIndex::new();
        let block = Arc::new(Block::new(hash(1), BlockHeader::default()));
        index.insert(hash(1), 7, None);
        index.insert(hash(1), 7, Some(block.clone()));

        assert_eq!(index.len(), 1);
        assert_eq!(index.block(&hash(1)), Some(block));

        index.remove_node(&hash(1), 8);
        assert_eq!(index.len(), 1);

        index.remove_node(&hash(1), 7);
        assert!(index.is_empty());
        assert!(index.node_id(&hash(1)).is_none());
    }
}
