pub mod memory;
pub mod model;
pub mod postgres;

use async_trait::async_trait;
use std::collections::HashSet;

pub use model::*;

use crate::error::Result;

/// One spender back-link update: input `(spender_txid, spender_index)` in
/// `spender_block_hash` spends the output identified by `(prevout_txid, prevout_index)`.
#[derive(Debug, Clone)]
pub struct SpenderUpdate {
    pub prevout_txid: [u8; 32],
    pub prevout_index: i32,
    pub spender_txid: [u8; 32],
    pub spender_index: i32,
    pub spender_block_hash: [u8; 32],
}

/// Typed operations that don't need an open transaction: read paths used by
/// the reorg resolver, the backfill gap scanner and the mempool differ.
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;

    async fn get_blocks_max_height(&self) -> Result<Option<i32>>;
    async fn get_block_hash_by_height(&self, height: i32) -> Result<Option<[u8; 32]>>;
    async fn get_block_by_height(&self, height: i32) -> Result<Option<Block>>;
    async fn get_mempool_txids(&self) -> Result<HashSet<[u8; 32]>>;
}

/// All mutating operations. Every method runs inside the transaction opened
/// by `Store::begin`; nothing commits until `commit` is called, and
/// `rollback`/drop-without-commit undoes the lot.
#[async_trait]
pub trait StoreTx: Send {
    async fn commit(&mut self) -> Result<()>;
    async fn rollback(&mut self) -> Result<()>;

    /// Returns true iff the row was newly inserted (false: already present,
    /// caller should skip re-writing the body — this is what makes C4
    /// idempotent across retries).
    async fn upsert_block(&mut self, block: &Block) -> Result<bool>;

    async fn insert_transaction(&mut self, tx: &Transaction) -> Result<()>;
    async fn insert_batch_inputs(&mut self, inputs: &[TxInput]) -> Result<()>;
    async fn insert_batch_outputs(&mut self, outputs: &[TxOutput]) -> Result<()>;
    async fn insert_vmetaout(&mut self, row: &VMetaOut) -> Result<()>;
    async fn set_spender_batch(&mut self, spends: &[SpenderUpdate]) -> Result<()>;

    async fn insert_mempool_transaction(
        &mut self,
        tx: &Transaction,
        inputs: &[TxInput],
        outputs: &[TxOutput],
    ) -> Result<()>;
    async fn delete_mempool_tx_by_txid(&mut self, txid: &[u8; 32]) -> Result<()>;
    async fn delete_mempool_inputs_by_txid(&mut self, txid: &[u8; 32]) -> Result<()>;
    async fn delete_mempool_outputs_by_txid(&mut self, txid: &[u8; 32]) -> Result<()>;
    async fn delete_mempool_vmetaouts(&mut self, txid: &[u8; 32]) -> Result<()>;

    async fn insert_rollout(&mut self, entry: &RolloutEntry) -> Result<()>;
    async fn delete_rollouts(&mut self) -> Result<()>;

    /// `height ← -height - 1` for every non-orphan row above `height`.
    async fn set_orphan_after_height(&mut self, height: i32) -> Result<()>;
    /// Writes a boolean `orphan` flag consistent with the height's sign.
    /// Idempotent: safe to call on a store that's already consistent.
    async fn set_negative_height_to_orphans(&mut self) -> Result<()>;
}
