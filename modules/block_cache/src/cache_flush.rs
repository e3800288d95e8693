//! Committing the linked root forward.
//!
//! Flushing a linked block makes every block between the current root and
//! it irreversible, one height at a time: competing forks are dropped, the
//! block is pushed to the chain store and its state version is committed.

use tracing::{debug, error, info};

use blockcache_common::BlockHash;

use crate::cache_error::BlockCacheError;
use crate::cache_node::NodeId;
use crate::cache_tree::CacheTree;

impl CacheTree {
    /// Advance the linked root to the block `hash`.
    ///
    /// Flushing the current root is a no-op. On a store failure the root
    /// stays at the last block committed successfully.
    pub fn flush(&mut self, hash: &BlockHash) -> Result<(), BlockCacheError> {
        let target = self.real_node_id(hash)?;
        if self.root == Some(target) {
            return Ok(());
        }
        if !self.nodes.get(&target).is_some_and(|node| node.is_linked()) {
            return Err(BlockCacheError::NotLinked { hash: *hash });
        }

        let mut path = Vec::new();
        let mut current = Some(target);
        while let Some(id) = current.filter(|id| Some(*id) != self.root) {
            path.push(id);
            current = self.nodes.get(&id).and_then(|node| node.parent);
        }

        let result = path.into_iter().rev().try_for_each(|id| self.commit_node(id));
        if result.is_ok() {
            self.prune_orphans_on_cadence();
        }
        self.update_longest();
        result
    }

    /// Make `id`, a child of the root, the new root.
    fn commit_node(&mut self, id: NodeId) -> Result<(), BlockCacheError> {
        let Some(old_root) = self.root else {
            return Ok(());
        };
        let Some(block) = self.nodes.get(&id).and_then(|node| node.block.clone()) else {
            return Ok(());
        };
        let number = block.number();

        let siblings: Vec<NodeId> = self
            .nodes
            .get(&old_root)
            .map(|root| root.children.iter().copied().filter(|child| *child != id).collect())
            .unwrap_or_default();
        for sibling in siblings {
            self.remove_subtree(sibling);
        }

        // a flush that failed after the push leaves the block on top
        let top = self.chain.top().map_err(|e| BlockCacheError::ChainTop {
            reason: format!("{e:#}"),
        })?;
        if top.is_some_and(|top| top.hash == block.hash) {
            debug!(number, hash = %block.hash, "Block already in chain store");
        } else {
            self.chain.push(&block).map_err(|e| {
                error!("Failed to push block {number} to chain store: {e:#}");
                BlockCacheError::ChainPush {
                    number,
                    reason: format!("{e:#}"),
                }
            })?;
            info!(number, hash = %block.hash, "Block confirmed");
        }

        self.state.flush(&block.hash).map_err(|e| {
            error!("Failed to flush state at block {number}: {e:#}");
            BlockCacheError::StateFlush {
                number,
                reason: format!("{e:#}"),
            }
        })?;

        self.remove_node(old_root);
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = None;
            node.witness_list.promote_pending();
        }
        self.root = Some(id);
        Ok(())
    }
}
