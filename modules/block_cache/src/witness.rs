//! Per-node witness bookkeeping
//!
//! Each linked node carries the active and pending witness sets as seen on
//! its branch. A child inherits its parent's lists when it is linked; at
//! vote checkpoints the pending set is re-read from the state store, and
//! when a node becomes the linked root its pending set becomes active.

use anyhow::{anyhow, Context, Result};
use blockcache_common::StateStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// State table holding the producer vote results
pub const VOTE_PRODUCER_TABLE: &str = "vote_producer";

/// Key of the JSON array of pending witness ids
pub const PENDING_PRODUCER_KEY: &str = "pendingProducerList";

/// Prefix of per-producer registration entries, followed by the witness id
pub const PRODUCER_ENTRY_PREFIX: &str = "producerTable.";

/// Registration details of one witness
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WitnessInfo {
    /// Network identity the witness produces from
    pub net_id: String,

    /// Whether the witness is currently marked online
    #[serde(default)]
    pub online: bool,
}

/// Active and pending witness sets on one branch
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WitnessList {
    active: Vec<String>,
    pending: Vec<String>,
    /// Height the pending set was read at
    pending_number: u64,
    info: BTreeMap<String, WitnessInfo>,
}

impl WitnessList {
    pub fn active(&self) -> &[String] {
        &self.active
    }

    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    pub fn pending_number(&self) -> u64 {
        self.pending_number
    }

    /// Registration details of a pending witness, if it has any
    pub fn info(&self, witness: &str) -> Option<&WitnessInfo> {
        self.info.get(witness)
    }

    pub fn set_active(&mut self, active: Vec<String>) {
        self.active = active;
    }

    pub fn set_pending(&mut self, pending: Vec<String>, number: u64) {
        self.pending = pending;
        self.pending_number = number;
    }

    /// The pending set takes effect once its block is irreversible
    pub fn promote_pending(&mut self) {
        self.active.clone_from(&self.pending);
    }

    /// Re-read the pending witness set from a checked-out state
    pub fn update_pending(&mut self, state: &dyn StateStore, number: u64) -> Result<()> {
        let raw = state
            .get(VOTE_PRODUCER_TABLE, PENDING_PRODUCER_KEY)?
            .ok_or_else(|| anyhow!("no {PENDING_PRODUCER_KEY} in {VOTE_PRODUCER_TABLE}"))?;
        let pending: Vec<String> =
            serde_json::from_str(&raw).context("malformed pending producer list")?;
        self.set_pending(pending, number);
        Ok(())
    }

    /// Refresh registration details for every pending witness
    pub fn update_info(&mut self, state: &dyn StateStore) -> Result<()> {
        let mut info = BTreeMap::new();
        for witness in &self.pending {
            let key = format!("{PRODUCER_ENTRY_PREFIX}{witness}");
            match state.get(VOTE_PRODUCER_TABLE, &key)? {
                Some(raw) => {
                    let entry: WitnessInfo = serde_json::from_str(&raw)
                        .with_context(|| format!("malformed producer entry for {witness}"))?;
                    info.insert(witness.clone(), entry);
                }
                None => warn!("No producer entry for pending witness {witness}"),
            }
        }
        self.info = info;
        Ok(())
    }
}
