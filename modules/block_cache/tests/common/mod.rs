//! Shared fixture for block cache integration tests.
#![allow(dead_code)]

use blockcache_common::{Block, BlockHash};
use blockcache_module_block_cache::witness::{PENDING_PRODUCER_KEY, VOTE_PRODUCER_TABLE};
use blockcache_module_block_cache::{BlockCache, BlockCacheConfig, NodeKind};
use blockcache_test_utils::{init_logging, make_child, make_genesis, MemoryChainStore, MemoryStateStore};

pub const WITNESSES: &str = r#"["w0","w1","w2"]"#;

/// Cache seeded from a chain holding only genesis, plus handles on its stores
pub struct Fixture {
    pub cache: BlockCache,
    pub genesis: Block,
    pub chain: MemoryChainStore,
    pub state: MemoryStateStore,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(BlockCacheConfig::default())
    }

    pub fn with_config(config: BlockCacheConfig) -> Self {
        init_logging();
        let genesis = make_genesis("genesis");
        let chain = MemoryChainStore::with_top(genesis.clone());
        let state = MemoryStateStore::new();
        give_state(&state, &genesis);
        let cache =
            BlockCache::new(config, Box::new(chain.clone()), Box::new(state.clone())).unwrap();
        Self {
            cache,
            genesis,
            chain,
            state,
        }
    }

    /// Add `block` with a state version and link it if its parent allows
    pub fn offer(&self, block: &Block) -> bool {
        give_state(&self.state, block);
        let ready = self.cache.add(block.clone());
        if ready {
            self.cache.link(&block.hash).unwrap();
        }
        ready
    }

    /// Linked chain of `len` blocks named `{prefix}{i}` on top of `parent`
    pub fn extend(&self, prefix: &str, parent: &Block, len: usize) -> Vec<Block> {
        let mut blocks: Vec<Block> = Vec::with_capacity(len);
        for i in 0..len {
            let parent = blocks.last().unwrap_or(parent);
            let block = make_child(&format!("{prefix}{i}"), parent);
            assert!(self.offer(&block));
            blocks.push(block);
        }
        blocks
    }

    pub fn head_hash(&self) -> Option<BlockHash> {
        self.cache.head().map(|block| block.hash)
    }

    pub fn root_hash(&self) -> Option<BlockHash> {
        self.cache.linked_root().map(|block| block.hash)
    }

    /// Every cached block reachable from the root, with its kind
    pub fn linked_tree(&self) -> Vec<(BlockHash, NodeKind)> {
        let root = self.root_hash().unwrap();
        self.cache
            .iter(&root)
            .unwrap()
            .map(|block| (block.hash, self.cache.get_type(&block.hash).unwrap()))
            .collect()
    }
}

/// Register a state version for `block` carrying the default witness list
pub fn give_state(state: &MemoryStateStore, block: &Block) {
    state.put_version(block.hash, &[(VOTE_PRODUCER_TABLE, PENDING_PRODUCER_KEY, WITNESSES)]);
}
