//! Production [`Store`] backed by a pooled Postgres connection.
//!
//! SQL lives entirely in this file; every other component sees only the
//! typed [`StoreTx`] surface. Queries are built with `sqlx::query`/`query_as`
//! against runtime binds rather than the `query!` macros, since those need a
//! live database reachable at build time.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row, Transaction};
use std::collections::HashSet;

use super::{Block, RolloutEntry, SpenderUpdate, Store, StoreTx, Transaction as TxRow, TxInput, TxOutput, VMetaOut};
use crate::error::{IndexerError, Result};

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(uri: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(uri)
            .await?;
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| IndexerError::Config { reason: e.to_string() })
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTx { tx: Some(tx) }))
    }

    async fn get_blocks_max_height(&self) -> Result<Option<i32>> {
        let row = sqlx::query("SELECT MAX(height) AS h FROM blocks WHERE height >= 0")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<Option<i32>, _>("h")?)
    }

    async fn get_block_hash_by_height(&self, height: i32) -> Result<Option<[u8; 32]>> {
        let row = sqlx::query("SELECT hash FROM blocks WHERE height = $1")
            .bind(height)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| to_array32(r.get::<Vec<u8>, _>("hash"))))
    }

    async fn get_block_by_height(&self, height: i32) -> Result<Option<Block>> {
        let row = sqlx::query(
            "SELECT hash, height, prev_hash, merkle_root, time, median_time, nonce, bits, \
             difficulty, chainwork, size, stripped_size, weight, version \
             FROM blocks WHERE height = $1",
        )
        .bind(height)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Block {
            hash: to_array32(r.get("hash")),
            height: r.get("height"),
            prev_hash: to_array32(r.get("prev_hash")),
            merkle_root: to_array32(r.get("merkle_root")),
            time: r.get("time"),
            median_time: r.get("median_time"),
            nonce: r.get::<i64, _>("nonce") as u32,
            bits: r.get("bits"),
            difficulty: r.get("difficulty"),
            chainwork: r.get("chainwork"),
            size: r.get("size"),
            stripped_size: r.get("stripped_size"),
            weight: r.get("weight"),
            version: r.get("version"),
        }))
    }

    async fn get_mempool_txids(&self) -> Result<HashSet<[u8; 32]>> {
        let sentinel = super::model::MEMPOOL_BLOCK_HASH.to_vec();
        let rows = sqlx::query("SELECT txid FROM transactions WHERE block_hash = $1")
            .bind(&sentinel)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| to_array32(r.get("txid"))).collect())
    }
}

struct PostgresTx {
    tx: Option<Transaction<'static, sqlx::Postgres>>,
}

impl PostgresTx {
    fn conn(&mut self) -> &mut Transaction<'static, sqlx::Postgres> {
        self.tx.as_mut().expect("operation on a committed/rolled-back transaction")
    }
}

fn to_array32(v: Vec<u8>) -> [u8; 32] {
    let mut out = [0u8; 32];
    let n = v.len().min(32);
    out[..n].copy_from_slice(&v[..n]);
    out
}

#[async_trait]
impl StoreTx for PostgresTx {
    async fn commit(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }

    async fn upsert_block(&mut self, block: &Block) -> Result<bool> {
        let row = sqlx::query(
            "INSERT INTO blocks \
             (hash, height, prev_hash, merkle_root, time, median_time, nonce, bits, \
              difficulty, chainwork, size, stripped_size, weight, version, orphan) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15) \
             ON CONFLICT (hash) DO UPDATE SET height = EXCLUDED.height \
             RETURNING (xmax = 0) AS inserted",
        )
        .bind(block.hash.to_vec())
        .bind(block.height)
        .bind(block.prev_hash.to_vec())
        .bind(block.merkle_root.to_vec())
        .bind(block.time)
        .bind(block.median_time)
        .bind(block.nonce as i64)
        .bind(&block.bits)
        .bind(block.difficulty)
        .bind(&block.chainwork)
        .bind(block.size)
        .bind(block.stripped_size)
        .bind(block.weight)
        .bind(block.version)
        .bind(block.height < 0)
        .fetch_one(self.conn())
        .await?;

        Ok(row.get::<bool, _>("inserted"))
    }

    async fn insert_transaction(&mut self, tx: &TxRow) -> Result<()> {
        sqlx::query(
            "INSERT INTO transactions (block_hash, txid, hash, index, version, size, vsize, weight, locktime, fee_sat) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10) \
             ON CONFLICT (block_hash, txid) DO NOTHING",
        )
        .bind(tx.block_hash.to_vec())
        .bind(tx.txid.to_vec())
        .bind(tx.hash.to_vec())
        .bind(tx.index)
        .bind(tx.version)
        .bind(tx.size)
        .bind(tx.vsize)
        .bind(tx.weight)
        .bind(tx.locktime as i64)
        .bind(tx.fee_sat)
        .execute(self.conn())
        .await?;
        Ok(())
    }

    async fn insert_batch_inputs(&mut self, inputs: &[TxInput]) -> Result<()> {
        for input in inputs {
            sqlx::query(
                "INSERT INTO tx_inputs \
                 (block_hash, txid, index, hash_prevout, index_prevout, sequence, coinbase, witness, script_sig) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9) \
                 ON CONFLICT (block_hash, txid, index) DO NOTHING",
            )
            .bind(input.block_hash.to_vec())
            .bind(input.txid.to_vec())
            .bind(input.index)
            .bind(input.hash_prevout.map(|h| h.to_vec()))
            .bind(input.index_prevout)
            .bind(input.sequence as i64)
            .bind(input.coinbase.clone())
            .bind(&input.witness)
            .bind(&input.script_sig)
            .execute(self.conn())
            .await?;
        }
        Ok(())
    }

    async fn insert_batch_outputs(&mut self, outputs: &[TxOutput]) -> Result<()> {
        for output in outputs {
            sqlx::query(
                "INSERT INTO tx_outputs (block_hash, txid, index, value_sat, script_pubkey) \
                 VALUES ($1,$2,$3,$4,$5) \
                 ON CONFLICT (block_hash, txid, index) DO NOTHING",
            )
            .bind(output.block_hash.to_vec())
            .bind(output.txid.to_vec())
            .bind(output.index)
            .bind(output.value_sat)
            .bind(&output.script_pubkey)
            .execute(self.conn())
            .await?;
        }
        Ok(())
    }

    async fn insert_vmetaout(&mut self, row: &VMetaOut) -> Result<()> {
        sqlx::query(
            "INSERT INTO vmeta_outs \
             (block_hash, txid, action, name, outpoint_txid, outpoint_index, value_sat, script_pubkey, \
              burn_increment, total_burned, claim_height, expire_height, signature, priority, reason, script_error) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16)",
        )
        .bind(row.block_hash.to_vec())
        .bind(row.txid.to_vec())
        .bind(row.action.as_str())
        .bind(&row.name)
        .bind(row.outpoint_txid.map(|h| h.to_vec()))
        .bind(row.outpoint_index)
        .bind(row.value_sat)
        .bind(row.script_pubkey.clone())
        .bind(row.burn_increment)
        .bind(row.total_burned)
        .bind(row.claim_height)
        .bind(row.expire_height)
        .bind(row.signature.clone())
        .bind(row.priority)
        .bind(&row.reason)
        .bind(&row.script_error)
        .execute(self.conn())
        .await?;
        Ok(())
    }

    async fn set_spender_batch(&mut self, spends: &[SpenderUpdate]) -> Result<()> {
        for spend in spends {
            sqlx::query(
                "UPDATE tx_outputs SET spender_txid = $1, spender_index = $2, spender_block_hash = $3 \
                 WHERE txid = $4 AND index = $5",
            )
            .bind(spend.spender_txid.to_vec())
            .bind(spend.spender_index)
            .bind(spend.spender_block_hash.to_vec())
            .bind(spend.prevout_txid.to_vec())
            .bind(spend.prevout_index)
            .execute(self.conn())
            .await?;
        }
        Ok(())
    }

    async fn insert_mempool_transaction(
        &mut self,
        tx: &TxRow,
        inputs: &[TxInput],
        outputs: &[TxOutput],
    ) -> Result<()> {
        self.insert_transaction(tx).await?;
        self.insert_batch_inputs(inputs).await?;
        self.insert_batch_outputs(outputs).await?;
        Ok(())
    }

    async fn delete_mempool_tx_by_txid(&mut self, txid: &[u8; 32]) -> Result<()> {
        let sentinel = super::model::MEMPOOL_BLOCK_HASH.to_vec();
        sqlx::query("DELETE FROM transactions WHERE block_hash = $1 AND txid = $2")
            .bind(&sentinel)
            .bind(txid.to_vec())
            .execute(self.conn())
            .await?;
        Ok(())
    }

    async fn delete_mempool_inputs_by_txid(&mut self, txid: &[u8; 32]) -> Result<()> {
        let sentinel = super::model::MEMPOOL_BLOCK_HASH.to_vec();
        sqlx::query("DELETE FROM tx_inputs WHERE block_hash = $1 AND txid = $2")
            .bind(&sentinel)
            .bind(txid.to_vec())
            .execute(self.conn())
            .await?;
        Ok(())
    }

    async fn delete_mempool_outputs_by_txid(&mut self, txid: &[u8; 32]) -> Result<()> {
        let sentinel = super::model::MEMPOOL_BLOCK_HASH.to_vec();
        sqlx::query("DELETE FROM tx_outputs WHERE block_hash = $1 AND txid = $2")
            .bind(&sentinel)
            .bind(txid.to_vec())
            .execute(self.conn())
            .await?;
        Ok(())
    }

    async fn delete_mempool_vmetaouts(&mut self, txid: &[u8; 32]) -> Result<()> {
        let sentinel = super::model::MEMPOOL_BLOCK_HASH.to_vec();
        sqlx::query("DELETE FROM vmeta_outs WHERE block_hash = $1 AND txid = $2")
            .bind(&sentinel)
            .bind(txid.to_vec())
            .execute(self.conn())
            .await?;
        Ok(())
    }

    async fn insert_rollout(&mut self, entry: &RolloutEntry) -> Result<()> {
        sqlx::query("INSERT INTO rollouts (name, bid, target) VALUES ($1,$2,$3)")
            .bind(&entry.name)
            .bind(entry.bid)
            .bind(entry.target)
            .execute(self.conn())
            .await?;
        Ok(())
    }

    async fn delete_rollouts(&mut self) -> Result<()> {
        sqlx::query("DELETE FROM rollouts").execute(self.conn()).await?;
        Ok(())
    }

    async fn set_orphan_after_height(&mut self, height: i32) -> Result<()> {
        sqlx::query("UPDATE blocks SET height = -height - 1 WHERE height > $1")
            .bind(height)
            .execute(self.conn())
            .await?;
        Ok(())
    }

    async fn set_negative_height_to_orphans(&mut self) -> Result<()> {
        sqlx::query("UPDATE blocks SET orphan = (height < 0) WHERE orphan != (height < 0)")
            .execute(self.conn())
            .await?;
        Ok(())
    }
}
