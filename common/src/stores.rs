//! Contracts of the stores the block cache commits to.
//!
//! The real stores live outside this workspace. The cache only needs the
//! calls below; `blockcache_test_utils` has in-memory versions for tests.

use crate::{Block, BlockHash};
use anyhow::Result;

/// Append-only durable chain of committed blocks.
pub trait ChainStore: Send + Sync {
    /// Latest committed block, or `None` for an empty chain.
    fn top(&self) -> Result<Option<Block>>;

    /// Append a block on top of the current top.
    fn push(&self, block: &Block) -> Result<()>;
}

/// Multi-version key-value state, one version per block hash.
pub trait StateStore: Send + Sync {
    /// A new handle over the same versions with its own checkout cursor.
    fn fork(&self) -> Box<dyn StateStore>;

    /// Point this handle at the state after `version`.
    /// Returns false if no such version exists.
    fn checkout(&mut self, version: &BlockHash) -> bool;

    /// Make `version` permanent, discarding versions that don't descend from it.
    fn flush(&self, version: &BlockHash) -> Result<()>;

    /// Read `key` in `table` at the checked-out version.
    fn get(&self, table: &str, key: &str) -> Result<Option<String>>;
}
