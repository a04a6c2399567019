//! A `HashMap`-backed implementation of the [`Store`] trait used by the
//! component and property tests in place of a live Postgres instance.
//!
//! A transaction clones the shared state into a private scratch copy;
//! `commit` swaps it back in, `rollback` (or a drop without commit) just
//! discards the copy. This gives the same all-or-nothing externally visible
//! behaviour as a real database transaction without needing one.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use super::{Block, RolloutEntry, SpenderUpdate, Store, StoreTx, Transaction, TxInput, TxOutput, VMetaOut};
use crate::error::Result;

#[derive(Default, Clone)]
struct State {
    blocks_by_height: HashMap<i32, Block>,
    blocks_by_hash: HashMap<[u8; 32], Block>,
    transactions: HashMap<([u8; 32], [u8; 32]), Transaction>, // (block_hash, txid)
    inputs: HashMap<([u8; 32], [u8; 32]), Vec<TxInput>>,
    outputs: HashMap<([u8; 32], [u8; 32]), Vec<TxOutput>>,
    vmetaouts: Vec<VMetaOut>,
    rollouts: Vec<RolloutEntry>,
}

pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { state: Arc::new(Mutex::new(State::default())) }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let snapshot = self.state.lock().unwrap().clone();
        Ok(Box::new(MemoryTx {
            shared: self.state.clone(),
            scratch: Some(snapshot),
        }))
    }

    async fn get_blocks_max_height(&self) -> Result<Option<i32>> {
        let state = self.state.lock().unwrap();
        Ok(state.blocks_by_height.keys().copied().filter(|h| *h >= 0).max())
    }

    async fn get_block_hash_by_height(&self, height: i32) -> Result<Option<[u8; 32]>> {
        let state = self.state.lock().unwrap();
        Ok(state.blocks_by_height.get(&height).map(|b| b.hash))
    }

    async fn get_block_by_height(&self, height: i32) -> Result<Option<Block>> {
        let state = self.state.lock().unwrap();
        Ok(state.blocks_by_height.get(&height).cloned())
    }

    async fn get_mempool_txids(&self) -> Result<HashSet<[u8; 32]>> {
        let state = self.state.lock().unwrap();
        let sentinel = super::model::MEMPOOL_BLOCK_HASH;
        Ok(state
            .transactions
            .keys()
            .filter(|(block_hash, _)| *block_hash == sentinel)
            .map(|(_, txid)| *txid)
            .collect())
    }
}

struct MemoryTx {
    shared: Arc<Mutex<State>>,
    scratch: Option<State>,
}

impl MemoryTx {
    fn state_mut(&mut self) -> &mut State {
        self.scratch.as_mut().expect("operation on a committed/rolled-back transaction")
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn commit(&mut self) -> Result<()> {
        if let Some(scratch) = self.scratch.take() {
            *self.shared.lock().unwrap() = scratch;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.scratch = None;
        Ok(())
    }

    async fn upsert_block(&mut self, block: &Block) -> Result<bool> {
        let state = self.state_mut();
        let inserted = !state.blocks_by_hash.contains_key(&block.hash);
        state.blocks_by_height.insert(block.height, block.clone());
        state.blocks_by_hash.insert(block.hash, block.clone());
        Ok(inserted)
    }

    async fn insert_transaction(&mut self, tx: &Transaction) -> Result<()> {
        self.state_mut().transactions.insert((tx.block_hash, tx.txid), tx.clone());
        Ok(())
    }

    async fn insert_batch_inputs(&mut self, inputs: &[TxInput]) -> Result<()> {
        for input in inputs {
            self.state_mut()
                .inputs
                .entry((input.block_hash, input.txid))
                .or_default()
                .push(input.clone());
        }
        Ok(())
    }

    async fn insert_batch_outputs(&mut self, outputs: &[TxOutput]) -> Result<()> {
        for output in outputs {
            self.state_mut()
                .outputs
                .entry((output.block_hash, output.txid))
                .or_default()
                .push(output.clone());
        }
        Ok(())
    }

    async fn insert_vmetaout(&mut self, row: &VMetaOut) -> Result<()> {
        self.state_mut().vmetaouts.push(row.clone());
        Ok(())
    }

    async fn set_spender_batch(&mut self, spends: &[SpenderUpdate]) -> Result<()> {
        let state = self.state_mut();
        for spend in spends {
            for outputs in state.outputs.values_mut() {
                for output in outputs.iter_mut() {
                    if output.txid == spend.prevout_txid && output.index == spend.prevout_index {
                        output.spender_txid = Some(spend.spender_txid);
                        output.spender_index = Some(spend.spender_index);
                        output.spender_block_hash = Some(spend.spender_block_hash);
                    }
                }
            }
        }
        Ok(())
    }

    async fn insert_mempool_transaction(
        &mut self,
        tx: &Transaction,
        inputs: &[TxInput],
        outputs: &[TxOutput],
    ) -> Result<()> {
        self.insert_transaction(tx).await?;
        self.insert_batch_inputs(inputs).await?;
        self.insert_batch_outputs(outputs).await?;
        Ok(())
    }

    async fn delete_mempool_tx_by_txid(&mut self, txid: &[u8; 32]) -> Result<()> {
        let sentinel = super::model::MEMPOOL_BLOCK_HASH;
        self.state_mut().transactions.remove(&(sentinel, *txid));
        Ok(())
    }

    async fn delete_mempool_inputs_by_txid(&mut self, txid: &[u8; 32]) -> Result<()> {
        let sentinel = super::model::MEMPOOL_BLOCK_HASH;
        self.state_mut().inputs.remove(&(sentinel, *txid));
        Ok(())
    }

    async fn delete_mempool_outputs_by_txid(&mut self, txid: &[u8; 32]) -> Result<()> {
        let sentinel = super::model::MEMPOOL_BLOCK_HASH;
        self.state_mut().outputs.remove(&(sentinel, *txid));
        Ok(())
    }

    async fn delete_mempool_vmetaouts(&mut self, txid: &[u8; 32]) -> Result<()> {
        let state = self.state_mut();
        state.vmetaouts.retain(|row| row.txid != *txid || row.block_hash != super::model::MEMPOOL_BLOCK_HASH);
        Ok(())
    }

    async fn insert_rollout(&mut self, entry: &RolloutEntry) -> Result<()> {
        self.state_mut().rollouts.push(entry.clone());
        Ok(())
    }

    async fn delete_rollouts(&mut self) -> Result<()> {
        self.state_mut().rollouts.clear();
        Ok(())
    }

    async fn set_orphan_after_height(&mut self, height: i32) -> Result<()> {
        let state = self.state_mut();
        let to_orphan: Vec<i32> = state
            .blocks_by_height
            .keys()
            .copied()
            .filter(|h| *h > height)
            .collect();
        for h in to_orphan {
            if let Some(mut block) = state.blocks_by_height.remove(&h) {
                block.height = -block.height - 1;
                state.blocks_by_hash.insert(block.hash, block.clone());
                state.blocks_by_height.insert(block.height, block);
            }
        }
        Ok(())
    }

    async fn set_negative_height_to_orphans(&mut self) -> Result<()> {
        // The in-memory model has no separate `orphan` boolean; height sign
        // is the single source of truth, so this is a no-op by construction.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::model::Block;

    fn sample_block(height: i32, hash: u8) -> Block {
        Block {
            hash: [hash; 32],
            height,
            prev_hash: [0u8; 32],
            merkle_root: [0u8; 32],
            time: 0,
            median_time: 0,
            nonce: 0,
            bits: String::new(),
            difficulty: 0.0,
            chainwork: String::new(),
            size: 0,
            stripped_size: 0,
            weight: 0,
            version: 1,
        }
    }

    #[tokio::test]
    async fn rollback_discards_uncommitted_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.upsert_block(&sample_block(0, 1)).await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(store.get_blocks_max_height().await.unwrap(), None);
    }

    #[tokio::test]
    async fn commit_makes_writes_visible() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.upsert_block(&sample_block(0, 1)).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.get_blocks_max_height().await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn upsert_block_reports_whether_it_was_new() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        assert!(tx.upsert_block(&sample_block(0, 1)).await.unwrap());
        assert!(!tx.upsert_block(&sample_block(0, 1)).await.unwrap());
    }

    #[tokio::test]
    async fn set_orphan_after_height_negates_height() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.upsert_block(&sample_block(0, 1)).await.unwrap();
        tx.upsert_block(&sample_block(1, 2)).await.unwrap();
        tx.upsert_block(&sample_block(2, 3)).await.unwrap();
        tx.set_orphan_after_height(0).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.get_blocks_max_height().await.unwrap(), Some(0));
        assert_eq!(store.get_block_hash_by_height(-2).await.unwrap(), Some([2u8; 32]));
        assert_eq!(store.get_block_hash_by_height(-3).await.unwrap(), Some([3u8; 32]));
    }
}
