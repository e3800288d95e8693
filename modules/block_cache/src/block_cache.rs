//! In-memory fork-choice block cache
//! Holds the tree of candidate blocks above the last committed block and
//! picks the longest linked chain as head

pub mod cache_error;
mod cache_flush;
pub mod cache_index;
pub mod cache_iter;
pub mod cache_node;
pub mod cache_tree;
pub mod configuration;
pub mod witness;

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use blockcache_common::{Block, BlockHash, ChainStore, StateStore};
use config::Config;
use tracing::info;

pub use cache_error::BlockCacheError;
pub use cache_index::TreeIndex;
pub use cache_iter::{AncestorIter, DescendantIter};
pub use cache_node::{CacheNodeView, NodeKind};
pub use cache_tree::CacheTree;
pub use configuration::BlockCacheConfig;
pub use witness::{WitnessInfo, WitnessList};

/// Shared handle on the block cache.
///
/// Clones see the same tree. Mutations are serialised by a write lock;
/// lookups by hash go straight to the index.
#[derive(Clone)]
pub struct BlockCache {
    tree: Arc<RwLock<CacheTree>>,
    index: Arc<TreeIndex>,
}

impl BlockCache {
    /// Build the cache on top of the chain store's current top block
    pub fn new(
        config: BlockCacheConfig,
        chain: Box<dyn ChainStore>,
        state: Box<dyn StateStore>,
    ) -> Result<Self, BlockCacheError> {
        let index = Arc::new(TreeIndex::new());
        let tree = CacheTree::new(config, chain, state, index.clone())?;
        info!(
            root = tree.linked_root().map(|block| block.number()),
            "Block cache ready"
        );
        Ok(Self {
            tree: Arc::new(RwLock::new(tree)),
            index,
        })
    }

    /// Same as [`BlockCache::new`] with tunables read from `config`
    pub fn from_config(
        config: &Config,
        chain: Box<dyn ChainStore>,
        state: Box<dyn StateStore>,
    ) -> Result<Self, BlockCacheError> {
        Self::new(BlockCacheConfig::from_config(config), chain, state)
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheTree> {
        self.tree.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheTree> {
        self.tree.write().unwrap_or_else(PoisonError::into_inner)
    }

    // Mutations

    /// Insert a block; returns whether its parent is linked
    pub fn add(&self, block: Block) -> bool {
        self.write().add(block)
    }

    pub fn add_genesis(&self, block: Block) -> Result<(), BlockCacheError> {
        self.write().add_genesis(block)
    }

    pub fn link(&self, hash: &BlockHash) -> Result<(), BlockCacheError> {
        self.write().link(hash)
    }

    pub fn del(&self, hash: &BlockHash) -> Result<(), BlockCacheError> {
        self.write().del(hash)
    }

    pub fn flush(&self, hash: &BlockHash) -> Result<(), BlockCacheError> {
        self.write().flush(hash)
    }

    /// Drop orphan branches that can no longer connect; returns how many
    /// nodes went
    pub fn prune_orphans(&self) -> usize {
        self.write().prune_orphans()
    }

    pub fn set_confirm_until(&self, hash: &BlockHash, number: u64) -> Result<(), BlockCacheError> {
        self.write().set_confirm_until(hash, number)
    }

    pub fn set_extension(&self, hash: &BlockHash, extension: Vec<u8>) -> Result<(), BlockCacheError> {
        self.write().set_extension(hash, extension)
    }

    // Lookups

    /// Cached block by hash, without touching the tree lock
    pub fn find(&self, hash: &BlockHash) -> Result<Arc<Block>, BlockCacheError> {
        self.index.block(hash).ok_or(BlockCacheError::NotFound { hash: *hash })
    }

    pub fn get_block_by_hash(&self, hash: &BlockHash) -> Result<Arc<Block>, BlockCacheError> {
        self.find(hash)
    }

    pub fn find_node(&self, hash: &BlockHash) -> Result<CacheNodeView, BlockCacheError> {
        self.read().find_node(hash)
    }

    pub fn get_block_by_number(&self, number: u64) -> Result<Arc<Block>, BlockCacheError> {
        self.read().get_block_by_number(number)
    }

    pub fn get_type(&self, hash: &BlockHash) -> Result<NodeKind, BlockCacheError> {
        self.read().get_type(hash)
    }

    pub fn linked_root(&self) -> Option<Arc<Block>> {
        self.read().linked_root()
    }

    pub fn head(&self) -> Option<Arc<Block>> {
        self.read().head()
    }

    /// Pre-order walk over `hash` and its descendants
    pub fn iter(&self, hash: &BlockHash) -> Result<DescendantIter, BlockCacheError> {
        let start = self.read().real_node_id(hash)?;
        Ok(DescendantIter::new(self.tree.clone(), start))
    }

    /// Walk from `hash` back to the linked root
    pub fn iter_parent(&self, hash: &BlockHash) -> Result<AncestorIter, BlockCacheError> {
        let start = self.read().real_node_id(hash)?;
        Ok(AncestorIter::new(self.tree.clone(), start))
    }

    pub fn draw(&self) -> String {
        self.read().draw()
    }

    /// Nodes held, placeholders included
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
