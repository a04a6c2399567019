/// Atomic block ingestion (header, transactions, inputs, outputs, spender
/// back-links and, past the activation height, Spaces covenant records).
use tracing::{debug, info};

use crate::error::{IndexerError, Result};
use crate::rpc::spaces::SpacesClient;
use crate::rpc::types::{MetaTransaction, RawBlock, RawTransaction};
use crate::store::model::{strip_sigil, to_satoshis, VMetaAction};
use crate::store::{Block, SpenderUpdate, Store, Transaction, TxInput, TxOutput, VMetaOut};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Regime {
    /// Write header, body and spender back-links.
    Full,
    /// Write only the header and the spender back-link graph edges; the
    /// body for this period is assumed to have been bulk-loaded already.
    FastSyncSpenderOnly,
}

pub async fn store_block(
    store: &dyn Store,
    spaces: &SpacesClient,
    block: &RawBlock,
    activation_height: i32,
    fast_sync_height: i32,
) -> Result<()> {
    let regime = if block.height < fast_sync_height {
        Regime::FastSyncSpenderOnly
    } else {
        Regime::Full
    };

    let mut tx = store.begin().await?;

    let model_block = Block {
        hash: block.hash,
        height: block.height,
        prev_hash: block.previousblockhash,
        merkle_root: block.merkleroot,
        time: block.time,
        median_time: block.mediantime,
        nonce: block.nonce,
        bits: block.bits.clone(),
        difficulty: block.difficulty,
        chainwork: block.chainwork.clone(),
        size: block.size,
        stripped_size: block.strippedsize,
        weight: block.weight,
        version: block.version,
    };

    let inserted = tx.upsert_block(&model_block).await?;
    if !inserted {
        debug!(height = block.height, "block already present, skipping body (idempotent re-entry)");
        tx.rollback().await?;
        return Ok(());
    }

    let mut spender_updates = Vec::new();

    for (index, raw_tx) in block.tx.iter().enumerate() {
        let (model_tx, inputs, outputs) = convert_transaction(raw_tx, block.hash, Some(index as i32))?;

        for input in &inputs {
            if let (Some(prevout_txid), Some(prevout_index)) = (input.hash_prevout, input.index_prevout) {
                spender_updates.push(SpenderUpdate {
                    prevout_txid,
                    prevout_index,
                    spender_txid: input.txid,
                    spender_index: input.index,
                    spender_block_hash: block.hash,
                });
            }
        }

        if regime == Regime::Full {
            tx.insert_transaction(&model_tx).await?;
            tx.insert_batch_inputs(&inputs).await?;
            tx.insert_batch_outputs(&outputs).await?;
        }
    }

    if !spender_updates.is_empty() {
        tx.set_spender_batch(&spender_updates).await?;
    }

    if regime == Regime::Full && block.height >= activation_height {
        let hash_hex = hex::encode(block.hash);
        let meta = spaces.get_block_meta(&hash_hex).await?;
        for meta_tx in &meta.tx_meta {
            for row in map_meta_transaction(meta_tx, block.hash)? {
                tx.insert_vmetaout(&row).await?;
            }
        }
    }

    tx.commit().await?;
    info!(height = block.height, tx_count = block.tx.len(), regime = ?regime, "block ingested");
    Ok(())
}

fn convert_transaction(
    raw: &RawTransaction,
    block_hash: [u8; 32],
    index: Option<i32>,
) -> Result<(Transaction, Vec<TxInput>, Vec<TxOutput>)> {
    let model_tx = Transaction {
        txid: raw.txid,
        hash: raw.hash,
        block_hash,
        index,
        version: raw.version,
        size: raw.size,
        vsize: raw.vsize,
        weight: raw.weight,
        locktime: raw.locktime,
        fee_sat: raw.fee.map(to_satoshis),
    };

    let mut inputs = Vec::with_capacity(raw.vin.len());
    for (i, vin) in raw.vin.iter().enumerate() {
        let coinbase = vin
            .coinbase
            .as_deref()
            .map(hex::decode)
            .transpose()
            .map_err(|e| IndexerError::decode(e.to_string()))?;

        let hash_prevout = vin
            .txid
            .as_deref()
            .map(|s| hex::decode(s).map_err(|e| IndexerError::decode(e.to_string())))
            .transpose()?
            .map(|b| b.try_into().map_err(|_| IndexerError::decode("prevout txid is not 32 bytes")))
            .transpose()?;

        let witness = vin
            .txinwitness
            .iter()
            .map(|s| hex::decode(s).map_err(|e| IndexerError::decode(e.to_string())))
            .collect::<Result<Vec<_>>>()?;

        let script_sig = vin
            .script_sig
            .as_ref()
            .map(|s| hex::decode(&s.hex))
            .transpose()
            .map_err(|e| IndexerError::decode(e.to_string()))?
            .unwrap_or_default();

        inputs.push(TxInput {
            block_hash,
            txid: raw.txid,
            index: i as i32,
            hash_prevout,
            index_prevout: vin.vout,
            sequence: vin.sequence,
            coinbase,
            witness,
            script_sig,
        });
    }

    let mut outputs = Vec::with_capacity(raw.vout.len());
    for vout in &raw.vout {
        outputs.push(TxOutput {
            block_hash,
            txid: raw.txid,
            index: vout.n,
            value_sat: to_satoshis(vout.value),
            script_pubkey: hex::decode(&vout.script_pubkey.hex).map_err(|e| IndexerError::decode(e.to_string()))?,
            spender_txid: None,
            spender_index: None,
            spender_block_hash: None,
        });
    }

    Ok((model_tx, inputs, outputs))
}

/// Converts a mempool-resident transaction (fetched individually via
/// `getrawtransaction`, with no block position) for storage under the
/// mempool sentinel block-hash.
pub(crate) fn convert_mempool_transaction(
    raw: &RawTransaction,
    sentinel_block_hash: [u8; 32],
) -> Result<(Transaction, Vec<TxInput>, Vec<TxOutput>)> {
    convert_transaction(raw, sentinel_block_hash, None)
}

/// Maps one Spaces `MetaTransaction` to the VMetaOut rows it produces, per
/// the create/update/spend mapping table.
pub(crate) fn map_meta_transaction(meta: &MetaTransaction, block_hash: [u8; 32]) -> Result<Vec<VMetaOut>> {
    let mut rows = Vec::new();

    for create in &meta.create {
        let action = VMetaAction::parse(&create.covenant_type)
            .ok_or_else(|| IndexerError::protocol(format!("unknown covenant action {}", create.covenant_type)))?;

        rows.push(VMetaOut {
            block_hash,
            txid: meta.txid,
            action,
            name: create.name.as_deref().map(strip_sigil),
            outpoint_txid: Some(meta.txid),
            outpoint_index: Some(create.n),
            value_sat: Some(to_satoshis(create.value)),
            script_pubkey: Some(create.script_pubkey.clone()),
            burn_increment: create.covenant.burn_increment.map(to_satoshis),
            total_burned: create.covenant.total_burned.map(to_satoshis),
            claim_height: create.covenant.claim_height,
            expire_height: create.covenant.expire_height,
            signature: create.covenant.signature.clone(),
            priority: None,
            reason: None,
            script_error: None,
        });
    }

    for update in &meta.update {
        let action = VMetaAction::parse(&update.output.covenant_type)
            .ok_or_else(|| IndexerError::protocol(format!("unknown covenant action {}", update.output.covenant_type)))?;

        let outpoint_txid = hex::decode(&update.output.txid)
            .map_err(|e| IndexerError::decode(e.to_string()))?
            .try_into()
            .map_err(|_| IndexerError::decode("update output txid is not 32 bytes"))?;

        let covenant = update.output.covenant.clone().unwrap_or_default();

        rows.push(VMetaOut {
            block_hash,
            txid: meta.txid,
            action,
            name: update.output.name.as_deref().map(strip_sigil),
            outpoint_txid: Some(outpoint_txid),
            outpoint_index: Some(update.output.n),
            value_sat: Some(to_satoshis(update.output.value)),
            script_pubkey: Some(update.output.script_pubkey.clone()),
            burn_increment: covenant.burn_increment.map(to_satoshis),
            total_burned: covenant.total_burned.map(to_satoshis),
            claim_height: covenant.claim_height,
            expire_height: covenant.expire_height,
            signature: covenant.signature,
            priority: (update.priority != 0).then_some(update.priority),
            reason: (!update.reason.is_empty()).then(|| update.reason.clone()),
            script_error: None,
        });
    }

    for spend in &meta.spend {
        let Some(script_error) = &spend.script_error else { continue };

        let reason = if script_error.error_type != "REJECT" {
            format!("{}: {}", script_error.error_type, script_error.reason)
        } else {
            script_error.reason.clone()
        };

        rows.push(VMetaOut {
            block_hash,
            txid: meta.txid,
            action: VMetaAction::Reject,
            name: script_error.name.as_deref().map(strip_sigil),
            outpoint_txid: Some(meta.txid),
            outpoint_index: Some(spend.n),
            value_sat: None,
            script_pubkey: None,
            burn_increment: None,
            total_burned: None,
            claim_height: None,
            expire_height: None,
            signature: None,
            priority: None,
            reason: None,
            script_error: Some(reason),
        });
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::types::{MetaCreate, MetaSpend, RawScript, RawVin, RawVout, ScriptError};

    fn meta_with_create(covenant_type: &str, name: &str) -> MetaTransaction {
        MetaTransaction {
            txid: [7u8; 32],
            create: vec![MetaCreate {
                covenant_type: covenant_type.to_string(),
                n: 0,
                name: Some(name.to_string()),
                value: 1.0,
                script_pubkey: vec![0xab],
                covenant: Default::default(),
            }],
            update: vec![],
            spend: vec![],
        }
    }

    #[test]
    fn create_record_strips_sigil_and_converts_value() {
        let rows = map_meta_transaction(&meta_with_create("bid", "@alice"), [1u8; 32]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name.as_deref(), Some("alice"));
        assert_eq!(rows[0].value_sat, Some(100_000_000));
        assert_eq!(rows[0].action, VMetaAction::Bid);
    }

    #[test]
    fn unknown_covenant_action_is_a_protocol_violation() {
        let err = map_meta_transaction(&meta_with_create("not-a-real-action", "@alice"), [1u8; 32]).unwrap_err();
        assert!(matches!(err, IndexerError::Protocol { .. }));
    }

    #[test]
    fn rejected_spend_maps_to_reject_row_with_stripped_name() {
        let meta = MetaTransaction {
            txid: [9u8; 32],
            create: vec![],
            update: vec![],
            spend: vec![MetaSpend {
                n: 0,
                script_error: Some(ScriptError {
                    error_type: "REJECT".to_string(),
                    name: Some("@alice".to_string()),
                    reason: "expired".to_string(),
                }),
            }],
        };

        let rows = map_meta_transaction(&meta, [1u8; 32]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].action, VMetaAction::Reject);
        assert_eq!(rows[0].name.as_deref(), Some("alice"));
        assert_eq!(rows[0].script_error.as_deref(), Some("expired"));
    }

    #[test]
    fn coinbase_input_has_no_prevout() {
        let raw = RawTransaction {
            txid: [2u8; 32],
            hash: [2u8; 32],
            version: 1,
            size: 100,
            vsize: 100,
            weight: 400,
            locktime: 0,
            fee: None,
            vin: vec![RawVin {
                coinbase: Some("00".to_string()),
                txid: None,
                vout: None,
                sequence: 0xffffffff,
                txinwitness: vec![],
                script_sig: None,
            }],
            vout: vec![RawVout {
                value: 50.0,
                n: 0,
                script_pubkey: RawScript { hex: "ab".to_string() },
            }],
            hex: "00".to_string(),
        };

        let (_, inputs, outputs) = convert_transaction(&raw, [0u8; 32], Some(0)).unwrap();
        assert!(inputs[0].hash_prevout.is_none());
        assert!(inputs[0].coinbase.is_some());
        assert_eq!(outputs[0].value_sat, 5_000_000_000);
    }
}
