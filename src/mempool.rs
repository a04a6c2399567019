/// Mempool differential synchronisation.
///
/// Diffs the node's reported mempool against the store, deletes evicted
/// transactions, and processes the remainder as dependency-ordered ancestor
/// chains: each chain is submitted to the Spaces node's package-check RPC
/// as a single unit so covenant evaluation sees the ancestors it needs.
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{IndexerError, Result};
use crate::ingest::convert_mempool_transaction;
use crate::rpc::bitcoin::BitcoinClient;
use crate::rpc::spaces::SpacesClient;
use crate::rpc::types::MempoolEntry;
use crate::store::model::MEMPOOL_BLOCK_HASH;
use crate::store::Store;

const DEFAULT_CYCLE_DEADLINE: Duration = Duration::from_secs(60);

/// One dependency-ordered run of txids: every predecessor of the final
/// (dependent) element either appears earlier in the same chain or is
/// already confirmed history.
pub type Chain = Vec<String>;

/// Builds ancestor chains from the node's `getrawmempool(true)` map.
///
/// Reference construction: edges `a -> b` for every `a` in `b.depends`,
/// topologically ordered, dependents DFS-visited in ascending `time` with
/// txid as a tiebreaker. A cycle (malformed node state) is emitted as a
/// single chain in whatever order `HashMap` iteration gives us; it's logged,
/// not treated as fatal.
pub fn build_chains(mempool: &HashMap<String, MempoolEntry>) -> Vec<Chain> {
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    for (txid, entry) in mempool {
        for dep in &entry.depends {
            children.entry(dep.as_str()).or_default().push(txid.as_str());
        }
    }
    for deps in children.values_mut() {
        deps.sort_by_key(|txid| (mempool[*txid].time, txid.to_string()));
    }

    let roots: Vec<&str> = mempool
        .iter()
        .filter(|(_, entry)| entry.depends.is_empty())
        .map(|(txid, _)| txid.as_str())
        .collect();

    let mut visited: HashSet<String> = HashSet::new();
    let mut chains = Vec::new();

    let mut sorted_roots = roots;
    sorted_roots.sort_by_key(|txid| (mempool[*txid].time, txid.to_string()));

    for root in sorted_roots {
        visit(root, &children, mempool, &mut visited, &mut Vec::new(), &mut chains);
    }

    // Anything left unvisited belongs to a dependency cycle: no root, so
    // the DFS above never reaches it. Emit the remainder as one chain.
    let remainder: Chain = mempool
        .keys()
        .filter(|txid| !visited.contains(*txid))
        .cloned()
        .collect();
    if !remainder.is_empty() {
        warn!(count = remainder.len(), "mempool dependency cycle detected, emitting as a single chain");
        chains.push(remainder);
    }

    chains
}

fn visit<'a>(
    txid: &'a str,
    children: &HashMap<&'a str, Vec<&'a str>>,
    mempool: &HashMap<String, MempoolEntry>,
    visited: &mut HashSet<String>,
    path: &mut Chain,
    chains: &mut Vec<Chain>,
) {
    if visited.contains(txid) {
        return;
    }
    visited.insert(txid.to_string());
    path.push(txid.to_string());
    chains.push(path.clone());

    if let Some(kids) = children.get(txid) {
        for child in kids {
            visit(child, children, mempool, visited, path, chains);
        }
    }
    path.pop();
}

pub async fn sync_mempool(
    store: &dyn Store,
    bitcoin: &BitcoinClient,
    spaces: &SpacesClient,
) -> Result<()> {
    sync_mempool_with_deadline(store, bitcoin, spaces, DEFAULT_CYCLE_DEADLINE).await
}

pub async fn sync_mempool_with_deadline(
    store: &dyn Store,
    bitcoin: &BitcoinClient,
    spaces: &SpacesClient,
    deadline: Duration,
) -> Result<()> {
    let started = Instant::now();
    let node_mempool = bitcoin.get_raw_mempool().await?;
    let node_set: HashSet<String> = node_mempool.keys().cloned().collect();
    let db_txids = store.get_mempool_txids().await?;

    let to_delete: Vec<[u8; 32]> = db_txids
        .into_iter()
        .filter(|txid| !node_set.contains(&hex::encode(txid)))
        .collect();

    if !to_delete.is_empty() {
        let mut tx = store.begin().await?;
        for txid in &to_delete {
            tx.delete_mempool_inputs_by_txid(txid).await?;
            tx.delete_mempool_outputs_by_txid(txid).await?;
            tx.delete_mempool_vmetaouts(txid).await?;
            tx.delete_mempool_tx_by_txid(txid).await?;
        }
        tx.commit().await?;
        debug!(count = to_delete.len(), "evicted mempool transactions removed from store");
    }

    let db_txids_after_delete = store.get_mempool_txids().await?;
    let chains = build_chains(&node_mempool);

    for chain in chains {
        if started.elapsed() >= deadline {
            crate::metrics::record_mempool_chain_outcome("deadline_expired");
            return Err(IndexerError::DeadlineExpired);
        }

        let Some(dependent_hex) = chain.last() else { continue };
        let dependent_bytes = hex_to_array32(dependent_hex)?;
        if db_txids_after_delete.contains(&dependent_bytes) {
            crate::metrics::record_mempool_chain_outcome("skipped");
            continue;
        }

        process_chain(store, bitcoin, spaces, &chain).await?;
        crate::metrics::record_mempool_chain_outcome("processed");
    }

    Ok(())
}

async fn process_chain(
    store: &dyn Store,
    bitcoin: &BitcoinClient,
    spaces: &SpacesClient,
    chain: &[String],
) -> Result<()> {
    let dependent_txid = chain.last();
    let mut hexes = Vec::with_capacity(chain.len());
    let mut dependent_raw = None;

    for txid in chain {
        match bitcoin.get_raw_transaction(txid).await {
            Ok(raw) => {
                hexes.push(raw.hex.clone());
                if Some(txid) == dependent_txid {
                    dependent_raw = Some(raw);
                }
            }
            Err(e) => {
                warn!(txid = %txid, error = %e, "mempool tx fetch failed, omitting from package");
            }
        }
    }

    let mut tx = store.begin().await?;

    // Only the dependent (final) transaction is stored under the sentinel;
    // if its own fetch failed, `checkpackage` still runs on whatever
    // ancestor hexes were retrieved, but nothing is persisted this cycle.
    if let Some(dependent) = dependent_raw {
        let (model_tx, inputs, outputs) = convert_mempool_transaction(&dependent, MEMPOOL_BLOCK_HASH)?;
        tx.insert_mempool_transaction(&model_tx, &inputs, &outputs).await?;
    }

    if !hexes.is_empty() {
        let results = spaces.check_package(&hexes).await?;
        if let Some(Some(meta)) = results.last() {
            for row in crate::ingest::map_meta_transaction(meta, MEMPOOL_BLOCK_HASH)? {
                tx.insert_vmetaout(&row).await?;
            }
        }
    }

    tx.commit().await?;
    Ok(())
}

fn hex_to_array32(s: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(s).map_err(|e| IndexerError::decode(e.to_string()))?;
    bytes.try_into().map_err(|_| IndexerError::decode("expected 32-byte hex txid"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(time: i64, depends: &[&str]) -> MempoolEntry {
        MempoolEntry { time, depends: depends.iter().map(|s| s.to_string()).collect() }
    }

    #[test]
    fn independent_transactions_form_their_own_chains() {
        let mut mempool = HashMap::new();
        mempool.insert("a".to_string(), entry(1, &[]));
        mempool.insert("b".to_string(), entry(2, &[]));

        let chains = build_chains(&mempool);
        assert_eq!(chains.len(), 2);
        assert!(chains.contains(&vec!["a".to_string()]));
        assert!(chains.contains(&vec!["b".to_string()]));
    }

    #[test]
    fn dependent_chain_ends_with_the_dependent() {
        let mut mempool = HashMap::new();
        mempool.insert("a".to_string(), entry(1, &[]));
        mempool.insert("b".to_string(), entry(2, &["a"]));

        let chains = build_chains(&mempool);
        assert!(chains.iter().any(|c| c == &vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn cycle_is_emitted_as_a_single_chain_without_panicking() {
        let mut mempool = HashMap::new();
        mempool.insert("a".to_string(), entry(1, &["b"]));
        mempool.insert("b".to_string(), entry(2, &["a"]));

        let chains = build_chains(&mempool);
        let total: usize = chains.iter().map(|c| c.len()).sum();
        assert_eq!(total, 2);
    }
}
