/// Chain-head reconciliation.
///
/// Walks the store and the node backward in lockstep from the store's tip
/// looking for the deepest height at which both agree on the block hash.
/// Reorgs in practice are shallow, so walking down from the tip rather than
/// scanning forward from genesis keeps the common case O(reorg depth).
use tracing::{info, warn};

use crate::error::Result;
use crate::rpc::bitcoin::BitcoinClient;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommonAncestor {
    pub height: i32,
    pub hash: [u8; 32],
}

/// Returns `None` when the store is empty or no common ancestor exists at
/// or above height 0 (the caller then resyncs from genesis).
pub async fn resolve(store: &dyn Store, node: &BitcoinClient) -> Result<Option<CommonAncestor>> {
    let original_tip = match store.get_blocks_max_height().await? {
        Some(h) => h,
        None => return Ok(None),
    };
    let mut height = original_tip;

    while height >= 0 {
        let db_hash = store.get_block_hash_by_height(height).await?;
        let node_hash_hex = node.get_block_hash(height).await?;
        let node_hash = hex_to_array32(&node_hash_hex)?;

        if db_hash == Some(node_hash) {
            let depth = original_tip - height;
            if depth > 0 {
                warn!(fork_height = height, depth, "reorg detected, orphaning diverged suffix");
                crate::metrics::record_reorg(depth);
            }

            let mut tx = store.begin().await?;
            tx.set_orphan_after_height(height).await?;
            tx.set_negative_height_to_orphans().await?;
            tx.commit().await?;

            info!(common_height = height, "chain-head reconciliation complete");
            return Ok(Some(CommonAncestor { height, hash: node_hash }));
        }

        height -= 1;
    }

    Ok(None)
}

fn hex_to_array32(s: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(s).map_err(|e| crate::error::IndexerError::decode(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| crate::error::IndexerError::decode("expected 32-byte hex hash"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::model::Block;
    use crate::store::memory::MemoryStore;

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
    async fn empty_store_has_no_ancestor() {
        let store = MemoryStore::new();
        // No node calls should happen: construct a client pointed at an
        // address that would fail fast if ever dialed.
        let node = BitcoinClient::new(crate::rpc::RpcClient::new("http://127.0.0.1:1", "u", "p"));
        assert_eq!(resolve(&store, &node).await.unwrap(), None);
    }

    #[tokio::test]
    async fn orphans_diverged_suffix_in_memory_store() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.upsert_block(&sample_block(0, 1)).await.unwrap();
        tx.upsert_block(&sample_block(1, 2)).await.unwrap();
        tx.upsert_block(&sample_block(2, 3)).await.unwrap();
        tx.commit().await.unwrap();

        // Directly exercise the orphaning half of the algorithm (the RPC
        // half requires a live node and is covered by the Sync Loop tests
        // against a fake Bitcoin client).
        let mut tx = store.begin().await.unwrap();
        tx.set_orphan_after_height(0).await.unwrap();
        tx.set_negative_height_to_orphans().await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.get_blocks_max_height().await.unwrap(), Some(0));
    }
}
