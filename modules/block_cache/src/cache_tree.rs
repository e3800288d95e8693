//! Fork tree holding every cached block between the linked root and the
//! chain tips.
//!
//! Implements the longest-chain rule over linked blocks. Blocks may arrive
//! before their parents: the missing parent is represented by a `Virtual`
//! placeholder anchored in the orphan set until it turns up.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use blockcache_common::{Block, BlockHash, ChainStore, StateStore};
use tracing::{debug, error, info, warn};

use crate::cache_error::BlockCacheError;
use crate::cache_index::TreeIndex;
use crate::cache_node::{CacheNode, CacheNodeView, NodeId, NodeKind};
use crate::configuration::BlockCacheConfig;
use crate::witness::WitnessList;

/// The tree and its bookkeeping. Not thread-safe on its own; the
/// [`BlockCache`](crate::BlockCache) handle serialises access.
pub struct CacheTree {
    /// Arena owning every node, placeholders included.
    pub(crate) nodes: HashMap<NodeId, CacheNode>,
    next_id: NodeId,
    /// Most recent committed block; `None` until seeded.
    pub(crate) root: Option<NodeId>,
    /// Deepest linked node.
    pub(crate) head: Option<NodeId>,
    /// Placeholder anchors of not-yet-connected branches.
    pub(crate) orphans: Vec<NodeId>,
    /// Linked nodes with no linked children, with their heights.
    pub(crate) leaves: HashMap<NodeId, u64>,
    pub(crate) index: Arc<TreeIndex>,
    pub(crate) config: BlockCacheConfig,
    pub(crate) chain: Box<dyn ChainStore>,
    /// Base state store, committed to on flush.
    pub(crate) state: Box<dyn StateStore>,
    /// Forked handle used for witness checkouts.
    checkout: Box<dyn StateStore>,
}

impl CacheTree {
    /// Create a tree rooted at the chain store's top block, or an empty
    /// tree waiting for genesis if the chain is empty.
    pub fn new(
        config: BlockCacheConfig,
        chain: Box<dyn ChainStore>,
        state: Box<dyn StateStore>,
        index: Arc<TreeIndex>,
    ) -> Result<Self, BlockCacheError> {
        let checkout = state.fork();
        let top = chain.top().map_err(|e| BlockCacheError::ChainTop {
            reason: format!("{e:#}"),
        })?;

        let mut tree = Self {
            nodes: HashMap::new(),
            next_id: 0,
            root: None,
            head: None,
            orphans: Vec::new(),
            leaves: HashMap::new(),
            index,
            config: config.checked(),
            chain,
            state,
            checkout,
        };

        match top {
            Some(block) => tree.seed_root(block)?,
            None => info!("Chain store is empty, waiting for genesis"),
        }
        Ok(tree)
    }

    /// Seed an empty tree with the genesis block.
    pub fn add_genesis(&mut self, block: Block) -> Result<(), BlockCacheError> {
        if self.root.is_some() {
            return Err(BlockCacheError::AlreadySeeded);
        }
        self.seed_root(block)
    }

    fn seed_root(&mut self, block: Block) -> Result<(), BlockCacheError> {
        let block = Arc::new(block);
        let mut node = CacheNode::new(block.clone(), NodeKind::Linked);
        self.refresh_pending(&mut node.witness_list, &block)?;
        node.witness_list.promote_pending();

        info!(number = block.number(), hash = %block.hash, "Linked root seeded");
        for witness in node.witness_list.active() {
            info!("Active witness: {witness}");
        }
        for witness in node.witness_list.pending() {
            info!("Pending witness: {witness}");
        }

        let id = self.insert_node(node);
        self.root = Some(id);
        self.head = Some(id);
        self.leaves.insert(id, block.number());
        Ok(())
    }

    /// Check out the state after `block` and re-derive pending witnesses.
    fn refresh_pending(
        &mut self,
        list: &mut WitnessList,
        block: &Block,
    ) -> Result<(), BlockCacheError> {
        if !self.checkout.checkout(&block.hash) {
            error!(number = block.number(), hash = %block.hash, "State checkout failed");
            return Err(BlockCacheError::StateCheckout { hash: block.hash });
        }
        let witness_error = |e: anyhow::Error| {
            error!("Failed to update witnesses at {}: {e:#}", block.number());
            BlockCacheError::WitnessState {
                hash: block.hash,
                reason: format!("{e:#}"),
            }
        };
        list.update_pending(self.checkout.as_ref(), block.number()).map_err(witness_error)?;
        list.update_info(self.checkout.as_ref()).map_err(witness_error)?;
        Ok(())
    }

    // ── Arena helpers ─────────────────────────────────────────────

    fn insert_node(&mut self, node: CacheNode) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        self.index.insert(node.hash, id, node.block.clone());
        self.nodes.insert(id, node);
        id
    }

    fn attach(&mut self, parent: NodeId, child: NodeId) {
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.push(child);
        }
    }

    pub(crate) fn node(&self, id: NodeId) -> Option<&CacheNode> {
        self.nodes.get(&id)
    }

    /// Arena id of the real (non-placeholder) block under `hash`.
    pub(crate) fn real_node_id(&self, hash: &BlockHash) -> Result<NodeId, BlockCacheError> {
        self.index
            .node_id(hash)
            .filter(|id| self.nodes.get(id).is_some_and(|node| !node.is_virtual()))
            .ok_or(BlockCacheError::NotFound { hash: *hash })
    }

    fn root_number(&self) -> Option<u64> {
        self.root.and_then(|id| self.nodes.get(&id)).map(|node| node.number)
    }

    /// True if `ancestor` is on the parent chain of `id` (or is `id`).
    fn has_ancestor(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.nodes.get(&n).and_then(|node| node.parent);
        }
        false
    }

    // ── Insertion ─────────────────────────────────────────────────

    /// Insert a candidate block.
    ///
    /// Creates a placeholder for an unknown parent, or fills in an
    /// existing placeholder for this block. Returns whether the block's
    /// parent is linked, i.e. whether it can be validated and linked now.
    pub fn add(&mut self, block: Block) -> bool {
        let hash = block.hash;
        let parent_hash = *block.parent_hash();

        if hash == parent_hash {
            warn!(%hash, "Ignoring block that is its own parent");
            return false;
        }

        let existing = self.index.node_id(&hash);
        if let Some(node) = existing.and_then(|id| self.nodes.get(&id)) {
            if !node.is_virtual() {
                return match node.parent.and_then(|p| self.nodes.get(&p)) {
                    Some(parent) => parent.is_linked(),
                    None => node.is_linked(),
                };
            }
        }

        let parent_id = match self.index.node_id(&parent_hash) {
            Some(id) => id,
            None => {
                let id = self.insert_node(CacheNode::new_virtual(&block));
                self.orphans.push(id);
                debug!(
                    number = block.number().saturating_sub(1),
                    hash = %parent_hash,
                    "Placeholder for missing parent"
                );
                id
            }
        };

        let block = Arc::new(block);
        let id = match existing {
            Some(id) => {
                if self.has_ancestor(parent_id, id) {
                    warn!(%hash, parent = %parent_hash, "Ignoring block that would close a cycle");
                    return false;
                }
                self.orphans.retain(|orphan| *orphan != id);
                if let Some(node) = self.nodes.get_mut(&id) {
                    node.resolve(block.clone());
                }
                self.index.insert(hash, id, Some(block.clone()));
                debug!(number = block.number(), %hash, "Placeholder resolved");
                id
            }
            None => self.insert_node(CacheNode::new(block.clone(), NodeKind::Single)),
        };
        self.attach(parent_id, id);

        self.nodes.get(&parent_id).is_some_and(CacheNode::is_linked)
    }

    /// Promote a validated block whose parent is linked.
    ///
    /// Unknown blocks, placeholders, already-linked blocks and blocks
    /// whose parent isn't linked are left alone. At vote checkpoints the
    /// pending witness set is re-read from state; if that fails the block
    /// stays unlinked and the error is returned.
    pub fn link(&mut self, hash: &BlockHash) -> Result<(), BlockCacheError> {
        let Some(id) = self.index.node_id(hash) else {
            return Ok(());
        };
        let Some(node) = self.nodes.get(&id) else {
            return Ok(());
        };
        if node.kind != NodeKind::Single {
            return Ok(());
        }
        let (Some(parent_id), Some(block)) = (node.parent, node.block.clone()) else {
            return Ok(());
        };
        let Some(parent) = self.nodes.get(&parent_id).filter(|p| p.is_linked()) else {
            debug!(number = block.number(), %hash, "Parent not linked yet");
            return Ok(());
        };

        let mut witness_list = parent.witness_list.clone();
        let number = block.number();
        if number % self.config.vote_interval == 0 {
            self.refresh_pending(&mut witness_list, &block)?;
        }

        if let Some(node) = self.nodes.get_mut(&id) {
            node.witness_list = witness_list;
            node.kind = NodeKind::Linked;
        }
        self.leaves.remove(&parent_id);
        self.leaves.insert(id, number);

        let head_number = self.head.and_then(|h| self.nodes.get(&h)).map(|h| h.number);
        if head_number.map_or(true, |head| number > head) {
            debug!(number, %hash, "New head");
            self.head = Some(id);
        }
        Ok(())
    }

    // ── Deletion ──────────────────────────────────────────────────

    /// Remove a block and all its descendants.
    pub fn del(&mut self, hash: &BlockHash) -> Result<(), BlockCacheError> {
        let id = self.real_node_id(hash)?;
        if self.root == Some(id) {
            return Err(BlockCacheError::RootDeletion { hash: *hash });
        }
        let removed = self.remove_subtree(id);
        debug!(%hash, removed, "Deleted subtree");
        self.update_longest();
        Ok(())
    }

    /// Remove `top` and every descendant from arena, index and leaves.
    /// Returns the number of nodes removed.
    pub(crate) fn remove_subtree(&mut self, top: NodeId) -> usize {
        let parent = self.nodes.get(&top).and_then(|node| node.parent);
        match parent.and_then(|p| self.nodes.get_mut(&p)) {
            Some(parent) => parent.children.retain(|child| *child != top),
            None => self.orphans.retain(|orphan| *orphan != top),
        }

        let mut removed = 0;
        let mut stack = vec![top];
        while let Some(id) = stack.pop() {
            let Some(node) = self.remove_node(id) else {
                continue;
            };
            removed += 1;
            stack.extend(node.children);
        }

        if let Some(parent) = parent {
            // a placeholder with nothing waiting on it goes too
            let abandoned = self
                .nodes
                .get(&parent)
                .is_some_and(|node| node.is_virtual() && node.children.is_empty());
            if abandoned {
                self.orphans.retain(|orphan| *orphan != parent);
                self.remove_node(parent);
                removed += 1;
            } else {
                self.refresh_leaf(parent);
            }
        }
        removed
    }

    /// Remove a single node without touching its parent or children.
    pub(crate) fn remove_node(&mut self, id: NodeId) -> Option<CacheNode> {
        let node = self.nodes.remove(&id)?;
        self.index.remove_node(&node.hash, id);
        self.leaves.remove(&id);
        Some(node)
    }

    /// A linked node with no linked children is a leaf.
    fn refresh_leaf(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get(&id).filter(|node| node.is_linked()) else {
            return;
        };
        let has_linked_child = node
            .children
            .iter()
            .any(|child| self.nodes.get(child).is_some_and(CacheNode::is_linked));
        if !has_linked_child {
            self.leaves.insert(id, node.number);
        }
    }

    // ── Head selection and pruning ────────────────────────────────

    /// Re-pick the head if the current one has been removed.
    ///
    /// Scans the leaves for the deepest one, starting from the root.
    /// Among equal heights the first one seen wins.
    pub(crate) fn update_longest(&mut self) {
        if self.head.is_some_and(|head| self.nodes.contains_key(&head)) {
            return;
        }
        let Some((root, root_number)) = self.root.zip(self.root_number()) else {
            self.head = None;
            return;
        };

        let mut best = (root, root_number);
        for (&id, &number) in &self.leaves {
            if number > best.1 {
                best = (id, number);
            }
        }
        debug!(number = best.1, "Head recomputed");
        self.head = Some(best.0);
    }

    /// Delete every orphan branch anchored at or below the root height.
    /// Such branches can no longer connect to the linked tree.
    pub fn prune_orphans(&mut self) -> usize {
        let Some(root_number) = self.root_number() else {
            return 0;
        };
        let stale: Vec<NodeId> = self
            .orphans
            .iter()
            .copied()
            .filter(|id| self.nodes.get(id).is_some_and(|node| node.number <= root_number))
            .collect();

        let removed: usize = stale.into_iter().map(|id| self.remove_subtree(id)).sum();
        if removed > 0 {
            debug!(root_number, removed, "Pruned stale orphans");
        }
        removed
    }

    /// Orphan pruning on the configured root-height cadence.
    pub(crate) fn prune_orphans_on_cadence(&mut self) {
        if self.root_number().is_some_and(|n| n % self.config.prune_interval == 0) {
            self.prune_orphans();
        }
    }

    // ── Accessors ─────────────────────────────────────────────────

    pub fn linked_root(&self) -> Option<Arc<Block>> {
        self.root.and_then(|id| self.nodes.get(&id)).and_then(|node| node.block.clone())
    }

    pub fn head(&self) -> Option<Arc<Block>> {
        self.head.and_then(|id| self.nodes.get(&id)).and_then(|node| node.block.clone())
    }

    pub fn find_node(&self, hash: &BlockHash) -> Result<CacheNodeView, BlockCacheError> {
        let id = self.real_node_id(hash)?;
        let node = self.nodes.get(&id).ok_or(BlockCacheError::NotFound { hash: *hash })?;
        let block = node.block.clone().ok_or(BlockCacheError::NotFound { hash: *hash })?;
        Ok(CacheNodeView {
            hash: node.hash,
            block,
            kind: node.kind,
            number: node.number,
            witness: node.witness.clone(),
            parent: node.parent.and_then(|p| self.nodes.get(&p)).map(|p| p.hash),
            children: node
                .children
                .iter()
                .filter_map(|child| self.nodes.get(child))
                .map(|child| child.hash)
                .collect(),
            confirm_until: node.confirm_until,
            extension: node.extension.clone(),
            witness_list: node.witness_list.clone(),
        })
    }

    pub fn get_type(&self, hash: &BlockHash) -> Result<NodeKind, BlockCacheError> {
        let id = self.real_node_id(hash)?;
        self.nodes.get(&id).map(|node| node.kind).ok_or(BlockCacheError::NotFound { hash: *hash })
    }

    /// Block at `number` on the chain ending at the head.
    pub fn get_block_by_number(&self, number: u64) -> Result<Arc<Block>, BlockCacheError> {
        let mut current = self.head;
        while let Some(node) = current.and_then(|id| self.nodes.get(&id)) {
            if node.number == number {
                return node.block.clone().ok_or(BlockCacheError::NumberNotFound { number });
            }
            if node.number < number {
                break;
            }
            current = node.parent;
        }
        Err(BlockCacheError::NumberNotFound { number })
    }

    pub fn set_confirm_until(
        &mut self,
        hash: &BlockHash,
        confirm_until: u64,
    ) -> Result<(), BlockCacheError> {
        let id = self.real_node_id(hash)?;
        if let Some(node) = self.nodes.get_mut(&id) {
            node.confirm_until = confirm_until;
        }
        Ok(())
    }

    pub fn set_extension(
        &mut self,
        hash: &BlockHash,
        extension: Vec<u8>,
    ) -> Result<(), BlockCacheError> {
        let id = self.real_node_id(hash)?;
        if let Some(node) = self.nodes.get_mut(&id) {
            node.extension = extension;
        }
        Ok(())
    }

    /// Number of nodes in the arena, placeholders included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Render the linked tree followed by each orphan branch.
    pub fn draw(&self) -> String {
        let mut out = String::new();
        let tops = self.root.into_iter().chain(self.orphans.iter().copied());
        for top in tops {
            // (node, prefix, last sibling, subtree top)
            let mut stack = vec![(top, String::new(), true, true)];
            while let Some((id, prefix, last, is_top)) = stack.pop() {
                let Some(node) = self.nodes.get(&id) else {
                    continue;
                };
                let (branch, indent) = match (is_top, last) {
                    (true, _) => ("", ""),
                    (false, true) => ("└── ", "    "),
                    (false, false) => ("├── ", "│   "),
                };
                let hash = node.hash.to_string();
                let _ = writeln!(
                    out,
                    "{prefix}{branch}{} {} {:?}",
                    node.number,
                    &hash[..8],
                    node.kind
                );

                let child_prefix = format!("{prefix}{indent}");
                let count = node.children.len();
                for (i, child) in node.children.iter().enumerate().rev() {
                    stack.push((*child, child_prefix.clone(), i + 1 == count, false));
                }
            }
        }
        out
    }
}
