//! Lazy walks over the cache tree.
//!
//! Each step takes the tree's read lock just long enough to look at one
//! node, so an iterator never holds the lock between calls. A node removed
//! while a walk is in flight ends that part of the walk.

use std::sync::{Arc, PoisonError, RwLock};

use blockcache_common::Block;

use crate::cache_node::NodeId;
use crate::cache_tree::CacheTree;

/// Pre-order walk over a block and all its descendants
pub struct DescendantIter {
    tree: Arc<RwLock<CacheTree>>,
    stack: Vec<NodeId>,
}

impl DescendantIter {
    pub(crate) fn new(tree: Arc<RwLock<CacheTree>>, start: NodeId) -> Self {
        Self {
            tree,
            stack: vec![start],
        }
    }
}

impl Iterator for DescendantIter {
    type Item = Arc<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let tree = self.tree.read().unwrap_or_else(PoisonError::into_inner);
        while let Some(id) = self.stack.pop() {
            let Some(node) = tree.node(id) else {
                continue;
            };
            self.stack.extend(node.children.iter().rev());
            if let Some(block) = &node.block {
                return Some(block.clone());
            }
        }
        None
    }
}

/// Walk from a block up through its ancestors to the linked root
pub struct AncestorIter {
    tree: Arc<RwLock<CacheTree>>,
    next: Option<NodeId>,
}

impl AncestorIter {
    pub(crate) fn new(tree: Arc<RwLock<CacheTree>>, start: NodeId) -> Self {
        Self {
            tree,
            next: Some(start),
        }
    }
}

impl Iterator for AncestorIter {
    type Item = Arc<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next.take()?;
        let tree = self.tree.read().unwrap_or_else(PoisonError::into_inner);
        let node = tree.node(id)?;
        // placeholders end the chain
        let block = node.block.clone()?;
        self.next = node.parent;
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_index::TreeIndex;
    use crate::configuration::BlockCacheConfig;
    use crate::witness::{PENDING_PRODUCER_KEY, VOTE_PRODUCER_TABLE};
    use blockcache_common::BlockHash;
    use blockcache_test_utils::{
        block_hash, make_block, make_child, make_genesis, MemoryChainStore, MemoryStateStore,
    };

    /// Helper: shared tree rooted at genesis with the given extra blocks
    /// added (and linked where the parent allows it).
    fn make_shared_tree(blocks: &[&Block]) -> (Arc<RwLock<CacheTree>>, Block) {
        let genesis = make_genesis("g");
        let state = MemoryStateStore::new();
        state.put_version(
            genesis.hash,
            &[(VOTE_PRODUCER_TABLE, PENDING_PRODUCER_KEY, r#"["w0"]"#)],
        );
        let mut tree = CacheTree::new(
            BlockCacheConfig::default(),
            Box::new(MemoryChainStore::with_top(genesis.clone())),
            Box::new(state),
            Arc::new(TreeIndex::new()),
        )
        .unwrap();
        for block in blocks {
            if tree.add((*block).clone()) {
                tree.link(&block.hash).unwrap();
            }
        }
        (Arc::new(RwLock::new(tree)), genesis)
    }

    fn id_of(tree: &Arc<RwLock<CacheTree>>, hash: &BlockHash) -> NodeId {
        tree.read().unwrap().index.node_id(hash).unwrap()
    }

    fn hashes(iter: impl Iterator<Item = Arc<Block>>) -> Vec<BlockHash> {
        iter.map(|block| block.hash).collect()
    }

    #[test]
    fn descendants_in_pre_order() {
        let genesis = make_genesis("g");
        let a = make_child("a", &genesis);
        let a1 = make_child("a1", &a);
        let a2 = make_child("a2", &a);
        let b = make_child("b", &genesis);
        let (tree, genesis) = make_shared_tree(&[&a, &a1, &a2, &b]);

        let walk = hashes(DescendantIter::new(tree.clone(), id_of(&tree, &genesis.hash)));
        assert_eq!(walk, vec![genesis.hash, a.hash, a1.hash, a2.hash, b.hash]);

        let sub = hashes(DescendantIter::new(tree.clone(), id_of(&tree, &a.hash)));
        assert_eq!(sub, vec![a.hash, a1.hash, a2.hash]);
    }

    #[test]
    fn descendants_skip_nodes_deleted_mid_walk() {
        let genesis = make_genesis("g");
        let a = make_child("a", &genesis);
        let b = make_child("b", &genesis);
        let b1 = make_child("b1", &b);
        let (tree, genesis) = make_shared_tree(&[&a, &b, &b1]);

        let mut iter = DescendantIter::new(tree.clone(), id_of(&tree, &genesis.hash));
        assert_eq!(iter.next().map(|blk| blk.hash), Some(genesis.hash));
        tree.write().unwrap().del(&b.hash).unwrap();

        assert_eq!(hashes(iter), vec![a.hash]);
    }

    #[test]
    fn ancestors_up_to_root() {
        let genesis = make_genesis("g");
        let a = make_child("a", &genesis);
        let b = make_child("b", &a);
        let (tree, genesis) = make_shared_tree(&[&a, &b]);

        let walk = hashes(AncestorIter::new(tree.clone(), id_of(&tree, &b.hash)));
        assert_eq!(walk, vec![b.hash, a.hash, genesis.hash]);
    }

    #[test]
    fn ancestors_stop_at_placeholder() {
        let orphan = make_block("o", 5, block_hash("missing"));
        let child = make_child("oc", &orphan);
        let (tree, _) = make_shared_tree(&[&orphan, &child]);

        let walk = hashes(AncestorIter::new(tree.clone(), id_of(&tree, &child.hash)));
        assert_eq!(walk, vec![child.hash, orphan.hash]);
    }

    #[test]
    fn ancestors_end_when_start_is_deleted() {
        let genesis = make_genesis("g");
        let a = make_child("a", &genesis);
        let (tree, _) = make_shared_tree(&[&a]);
        let start = id_of(&tree, &a.hash);

        tree.write().unwrap().del(&a.hash).unwrap();
        assert_eq!(AncestorIter::new(tree, start).count(), 0);
    }
}
