/// Gap-filling backfill loop (C8): scans downward from the store's tip for
/// missing heights, fills the first contiguous gap found in ascending
/// order, and exits once no gap remains.
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::ingest;
use crate::rpc::bitcoin::BitcoinClient;
use crate::rpc::spaces::SpacesClient;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub start: i32,
    pub end: i32,
}

/// Scans downward from the store's current tip looking for the first
/// height with no row. Returns the contiguous gap `[start, end]` (both
/// missing) immediately below the first present row encountered, or `None`
/// if the stored heights are already gapless down to 0.
pub async fn find_gap(store: &dyn Store) -> Result<Option<Gap>> {
    let Some(tip) = store.get_blocks_max_height().await? else {
        return Ok(None);
    };

    let mut height = tip;
    while height >= 0 {
        if store.get_block_by_height(height).await?.is_none() {
            let gap_end = height;
            let mut gap_start = height;
            while gap_start > 0 && store.get_block_by_height(gap_start - 1).await?.is_none() {
                gap_start -= 1;
            }
            return Ok(Some(Gap { start: gap_start, end: gap_end }));
        }
        height -= 1;
    }

    Ok(None)
}

/// Runs until no gap remains. Heights at or below the gap's start height
/// run in fast-sync spender-only regime; everything above runs full, per
/// the backfill policy (a gap's lower edge is assumed pre-populated by an
/// earlier bulk load, its upper edge is not).
pub async fn run_until_gapless(
    store: &dyn Store,
    bitcoin: &BitcoinClient,
    spaces: &SpacesClient,
    config: &Config,
) -> Result<()> {
    while let Some(gap) = find_gap(store).await? {
        info!(start = gap.start, end = gap.end, "backfilling gap");
        for height in gap.start..=gap.end {
            let fast_sync_height = if height <= gap.start { height + 1 } else { config.fast_sync_height };
            let hash = bitcoin.get_block_hash(height).await?;
            let block = bitcoin.get_block(&hash).await?;
            ingest::store_block(store, spaces, &block, config.activation_height, fast_sync_height).await?;
        }
    }

    info!("no backfill gap remains");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::model::Block;

    fn sample_block(height: i32) -> Block {
        Block {
            hash: [height as u8; 32],
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
    async fn no_gap_in_a_contiguous_store() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        for h in 0..3 {
            tx.upsert_block(&sample_block(h)).await.unwrap();
        }
        tx.commit().await.unwrap();

        assert_eq!(find_gap(&store).await.unwrap(), None);
    }

    #[tokio::test]
    async fn finds_a_single_missing_height() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.upsert_block(&sample_block(0)).await.unwrap();
        tx.upsert_block(&sample_block(2)).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(find_gap(&store).await.unwrap(), Some(Gap { start: 1, end: 1 }));
    }
}
