//! Node representation within the block cache tree.

use crate::witness::WitnessList;
use blockcache_common::{Block, BlockHash};
use std::sync::Arc;

/// Arena identifier of a node. Never reused after deletion.
pub type NodeId = u64;

/// Where a node is in the placeholder → validated lifecycle.
///
/// Nodes only ever move forward: `Virtual → Single → Linked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Ancestry reaches the linked root and has passed validation.
    Linked,
    /// Real block, not yet promoted to linked.
    Single,
    /// Placeholder for a parent that hasn't arrived; no block.
    Virtual,
}

/// A vertex of the fork tree, owned by the tree's arena.
#[derive(Debug, Clone)]
pub struct CacheNode {
    /// Hash the node is indexed under. For a placeholder this is the
    /// hash of the block it is waiting for.
    pub hash: BlockHash,
    /// Payload; `None` for placeholders.
    pub block: Option<Arc<Block>>,
    /// Back-reference to the parent; `None` for the root and placeholders.
    pub parent: Option<NodeId>,
    /// Children in insertion order.
    pub children: Vec<NodeId>,
    pub kind: NodeKind,
    /// Block height; for a placeholder, the waiting child's height minus one.
    pub number: u64,
    /// Proposer of the block.
    pub witness: String,
    /// Height up to which consensus treats this branch as confirmed.
    pub confirm_until: u64,
    /// Opaque consensus annotation.
    pub extension: Vec<u8>,
    pub witness_list: WitnessList,
}

impl CacheNode {
    /// Create a node for a real block, not yet attached to any parent.
    pub fn new(block: Arc<Block>, kind: NodeKind) -> Self {
        Self {
            hash: block.hash,
            number: block.number(),
            witness: block.witness().to_string(),
            block: Some(block),
            parent: None,
            children: Vec::new(),
            kind,
            confirm_until: 0,
            extension: Vec::new(),
            witness_list: WitnessList::default(),
        }
    }

    /// Create a placeholder for the parent of `child`.
    pub fn new_virtual(child: &Block) -> Self {
        Self {
            hash: *child.parent_hash(),
            block: None,
            parent: None,
            children: Vec::new(),
            kind: NodeKind::Virtual,
            number: child.number().saturating_sub(1),
            witness: String::new(),
            confirm_until: 0,
            extension: Vec::new(),
            witness_list: WitnessList::default(),
        }
    }

    /// Fill a placeholder with the block it was waiting for.
    pub fn resolve(&mut self, block: Arc<Block>) {
        self.number = block.number();
        self.witness = block.witness().to_string();
        self.block = Some(block);
        self.kind = NodeKind::Single;
    }

    pub fn is_virtual(&self) -> bool {
        self.kind == NodeKind::Virtual
    }

    pub fn is_linked(&self) -> bool {
        self.kind == NodeKind::Linked
    }
}

/// Point-in-time copy of a node, handed out to callers.
#[derive(Debug, Clone)]
pub struct CacheNodeView {
    pub hash: BlockHash,
    pub block: Arc<Block>,
    pub kind: NodeKind,
    pub number: u64,
    pub witness: String,
    pub parent: Option<BlockHash>,
    pub children: Vec<BlockHash>,
    pub confirm_until: u64,
    pub extension: Vec<u8>,
    pub witness_list: WitnessList,
}
