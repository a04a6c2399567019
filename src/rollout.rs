/// Atomic replacement of the current auction rollout snapshot, read from
/// ten consecutive `getrollout(i)` queries (one per target bucket).
use tracing::info;

use crate::error::{IndexerError, Result};
use crate::rpc::spaces::SpacesClient;
use crate::store::{RolloutEntry, Store};

const ROLLOUT_BUCKETS: i32 = 10;

pub async fn snapshot(store: &dyn Store, spaces: &SpacesClient) -> Result<()> {
    let mut tx = store.begin().await?;
    tx.delete_rollouts().await?;

    let mut total = 0usize;
    for target in 0..ROLLOUT_BUCKETS {
        let rows = spaces.get_rollout(target).await?;
        for row in rows {
            let name = row.name.strip_prefix('@').ok_or_else(|| {
                IndexerError::protocol(format!("rollout name missing '@' sigil: {}", row.name))
            })?;

            tx.insert_rollout(&RolloutEntry {
                name: name.to_string(),
                bid: row.value,
                target,
            })
            .await?;
            total += 1;
        }
    }

    tx.commit().await?;
    info!(entries = total, "rollout snapshot replaced");
    Ok(())
}
