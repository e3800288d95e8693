//! Test helpers for block cache modules
//!
//! In-memory chain and state stores that share their contents between
//! clones, so a test can hand one clone to the cache and inspect or
//! sabotage the other.

use anyhow::{anyhow, bail, Result};
use blake2::{digest::consts::U32, Blake2b, Digest};
use blockcache_common::{Block, BlockHash, BlockHeader, ChainStore, StateStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing_subscriber::EnvFilter;

type Blake2b256 = Blake2b<U32>;

/// Install a test-friendly tracing subscriber, filtered by RUST_LOG.
/// Safe to call from every test.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Deterministic block hash from a label
pub fn block_hash(label: &str) -> BlockHash {
    let digest = Blake2b256::digest(label.as_bytes());
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    BlockHash::new(bytes)
}

/// Block `label` at `number` on top of `parent`
pub fn make_block(label: &str, number: u64, parent: BlockHash) -> Block {
    Block::new(
        block_hash(label),
        BlockHeader {
            number,
            parent_hash: parent,
            witness: format!("witness-{label}"),
            time: number as i64 * 3_000_000_000,
        },
    )
}

/// Block `label` directly on top of `parent`
pub fn make_child(label: &str, parent: &Block) -> Block {
    make_block(label, parent.number() + 1, parent.hash)
}

/// Height-zero block with an all-zero parent hash
pub fn make_genesis(label: &str) -> Block {
    make_block(label, 0, BlockHash::default())
}

/// Chain store backed by a vector
#[derive(Clone, Default)]
pub struct MemoryChainStore {
    blocks: Arc<RwLock<Vec<Block>>>,
    fail_push: Arc<AtomicBool>,
}

impl MemoryChainStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose chain already ends at `top`
    pub fn with_top(top: Block) -> Self {
        let store = Self::default();
        store.blocks.write().unwrap().push(top);
        store
    }

    /// Make every following push fail (or succeed again)
    pub fn fail_push(&self, fail: bool) {
        self.fail_push.store(fail, Ordering::SeqCst);
    }

    pub fn numbers(&self) -> Vec<u64> {
        self.blocks.read().unwrap().iter().map(Block::number).collect()
    }
}

impl ChainStore for MemoryChainStore {
    fn top(&self) -> Result<Option<Block>> {
        Ok(self.blocks.read().unwrap().last().cloned())
    }

    fn push(&self, block: &Block) -> Result<()> {
        if self.fail_push.load(Ordering::SeqCst) {
            bail!("chain store unavailable");
        }
        let mut blocks = self.blocks.write().unwrap();
        if let Some(top) = blocks.last() {
            if block.parent_hash() != &top.hash {
                bail!("block {} does not extend chain top {}", block.hash, top.hash);
            }
        }
        blocks.push(block.clone());
        Ok(())
    }
}

type Entries = HashMap<(String, String), String>;

#[derive(Default)]
struct Versions {
    versions: HashMap<BlockHash, Entries>,
    flushed: Vec<BlockHash>,
    fail_flush: bool,
}

/// Versioned key-value state; every fork shares the versions but has its
/// own checkout cursor
#[derive(Clone, Default)]
pub struct MemoryStateStore {
    shared: Arc<Mutex<Versions>>,
    current: Option<BlockHash>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace the state after `version` from (table, key, value) triples
    pub fn put_version(&self, version: BlockHash, entries: &[(&str, &str, &str)]) {
        let entries = entries
            .iter()
            .map(|(table, key, value)| ((table.to_string(), key.to_string()), value.to_string()))
            .collect();
        self.shared.lock().unwrap().versions.insert(version, entries);
    }

    /// Make every following flush fail (or succeed again)
    pub fn fail_flush(&self, fail: bool) {
        self.shared.lock().unwrap().fail_flush = fail;
    }

    /// Versions committed so far, oldest first
    pub fn flushed(&self) -> Vec<BlockHash> {
        self.shared.lock().unwrap().flushed.clone()
    }
}

impl StateStore for MemoryStateStore {
    fn fork(&self) -> Box<dyn StateStore> {
        Box::new(Self {
            shared: self.shared.clone(),
            current: None,
        })
    }

    fn checkout(&mut self, version: &BlockHash) -> bool {
        let known = self.shared.lock().unwrap().versions.contains_key(version);
        if known {
            self.current = Some(*version);
        }
        known
    }

    fn flush(&self, version: &BlockHash) -> Result<()> {
        let mut shared = self.shared.lock().unwrap();
        if shared.fail_flush {
            bail!("state store unavailable");
        }
        if !shared.versions.contains_key(version) {
            bail!("unknown state version {version}");
        }
        shared.flushed.push(*version);
        Ok(())
    }

    fn get(&self, table: &str, key: &str) -> Result<Option<String>> {
        let version = self.current.ok_or_else(|| anyhow!("no state version checked out"))?;
        let shared = self.shared.lock().unwrap();
        let entries =
            shared.versions.get(&version).ok_or_else(|| anyhow!("state version {version} vanished"))?;
        Ok(entries.get(&(table.to_string(), key.to_string())).cloned())
    }
}
