//! Error types for block cache operations.

use blockcache_common::BlockHash;

/// Errors returned by [`BlockCache`](crate::BlockCache) operations.
#[derive(Debug, thiserror::Error)]
pub enum BlockCacheError {
    /// No real block is cached under this hash (unknown or placeholder).
    #[error("block not found: {hash}")]
    NotFound { hash: BlockHash },

    /// No block at this height on the head chain.
    #[error("block not found at number {number}")]
    NumberNotFound { number: u64 },

    /// The block is cached but has not been linked to the root yet.
    #[error("block not linked: {hash}")]
    NotLinked { hash: BlockHash },

    /// The linked root can only be replaced by a flush.
    #[error("cannot delete the linked root {hash}")]
    RootDeletion { hash: BlockHash },

    /// Genesis was added to a cache that already has a root.
    #[error("block cache already has a linked root")]
    AlreadySeeded,

    /// The state store has no version for this block.
    #[error("failed to check out state at block {hash}")]
    StateCheckout { hash: BlockHash },

    /// Witness lists could not be derived from the checked-out state.
    #[error("failed to read witness state at block {hash}: {reason}")]
    WitnessState { hash: BlockHash, reason: String },

    /// The chain store rejected a block during flush.
    #[error("failed to push block {number} to chain store: {reason}")]
    ChainPush { number: u64, reason: String },

    /// The state store failed to commit a version during flush.
    #[error("failed to flush state at block {number}: {reason}")]
    StateFlush { number: u64, reason: String },

    /// The chain store could not report its top block.
    #[error("failed to read chain top: {reason}")]
    ChainTop { reason: String },
}
