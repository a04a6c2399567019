/// The outermost sync controller (C7): reorg-resolve, rollout-snapshot,
/// forward ingestion to the chain tip, mempool differential sync, sleep.
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::ingest;
use crate::mempool;
use crate::metrics;
use crate::reorg;
use crate::rollout;
use crate::rpc::bitcoin::BitcoinClient;
use crate::rpc::spaces::SpacesClient;
use crate::store::Store;

pub async fn run_forever(store: &dyn Store, bitcoin: &BitcoinClient, spaces: &SpacesClient, config: &Config) -> ! {
    loop {
        if let Err(e) = run_cycle(store, bitcoin, spaces, config).await {
            error!(error = %e, "sync cycle failed, retrying after the configured interval");
        }
        tokio::time::sleep(Duration::from_secs(config.update_db_interval)).await;
    }
}

/// One full cycle. Exposed separately from [`run_forever`] so tests can
/// drive exactly one iteration against a fake store/RPC pair.
pub async fn run_cycle(
    store: &dyn Store,
    bitcoin: &BitcoinClient,
    spaces: &SpacesClient,
    config: &Config,
) -> Result<()> {
    let common = reorg::resolve(store, bitcoin).await?;
    let mut next_height = common
        .map(|c| c.height)
        .unwrap_or(-1)
        .max(config.fast_sync_height)
        + 1;

    let node_tip_hash = bitcoin.get_best_block_hash().await?;
    let node_tip_block = bitcoin.get_block(&node_tip_hash).await?;
    metrics::NODE_TIP_HEIGHT.set(node_tip_block.height as i64);

    // Snapshot once per cycle, not once per block ingested: re-running all
    // ten rollout queries per block during catch-up would be wasteful, and
    // a cycle that ingests nothing still needs to refresh the table.
    if node_tip_block.height >= config.activation_height {
        rollout::snapshot(store, spaces).await?;
    }

    loop {
        let hash = match bitcoin.get_block_hash(next_height).await {
            Ok(hash) => hash,
            Err(e) if e.is_height_out_of_range() => break,
            Err(e) => return Err(e),
        };

        let block = bitcoin.get_block(&hash).await?;
        ingest::store_block(store, spaces, &block, config.activation_height, config.fast_sync_height).await?;
        metrics::BLOCKS_INGESTED_TOTAL.inc();
        metrics::STORE_TIP_HEIGHT.set(next_height as i64);

        info!(height = next_height, "tip advanced");
        next_height += 1;

        if config.sync_end_height >= 0 && next_height > config.sync_end_height {
            warn!(sync_end_height = config.sync_end_height, "reached configured sync end height");
            break;
        }
    }

    mempool::sync_mempool(store, bitcoin, spaces).await?;
    Ok(())
}
