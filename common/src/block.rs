//! Block types shared between the cache and its collaborators
//!
//! Encoding and hashing of blocks happen upstream; a `Block` arrives here
//! with its identifier already computed.

use crate::hash::BlockHash;
use serde::{Deserialize, Serialize};

/// Block header fields the fork-choice cache cares about
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block height
    pub number: u64,

    /// Hash of the parent block
    pub parent_hash: BlockHash,

    /// Proposer identity
    pub witness: String,

    /// Production time, nanoseconds since the epoch
    pub time: i64,
}

/// A candidate or committed block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block identifier (hash of the header)
    pub hash: BlockHash,

    /// Header
    pub header: BlockHeader,

    /// Raw transactions, opaque to the cache
    #[serde(default)]
    pub txs: Vec<Vec<u8>>,
}

impl Block {
    pub fn new(hash: BlockHash, header: BlockHeader) -> Self {
        Self {
            hash,
            header,
            txs: Vec::new(),
        }
    }

    /// Block height
    pub fn number(&self) -> u64 {
        self.header.number
    }

    /// Hash of the parent block
    pub fn parent_hash(&self) -> &BlockHash {
        &self.header.parent_hash
    }

    /// Proposer identity
    pub fn witness(&self) -> &str {
        &self.header.witness
    }
}
