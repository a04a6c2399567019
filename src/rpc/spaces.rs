use serde_json::json;

use super::types::{MetaTransaction, RolloutRow, SpacesBlockMeta};
use super::RpcClient;
use crate::error::Result;

/// Typed wrapper over the Spaces node's JSON-RPC surface.
#[derive(Clone)]
pub struct SpacesClient {
    rpc: RpcClient,
}

impl SpacesClient {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }

    pub async fn get_block_meta(&self, hash: &str) -> Result<SpacesBlockMeta> {
        self.rpc.call_typed("getblockmeta", json!([hash])).await
    }

    pub async fn get_tx_meta(&self, txid: &str) -> Result<Option<MetaTransaction>> {
        self.rpc.call_typed("gettxmeta", json!([txid])).await
    }

    pub async fn get_rollout(&self, i: i32) -> Result<Vec<RolloutRow>> {
        self.rpc.call_typed("getrollout", json!([i])).await
    }

    /// Submits a dependency-ordered chain of raw transaction hexes for
    /// evaluation as a package; the response is 1:1 aligned with `hexes`.
    pub async fn check_package(&self, hexes: &[String]) -> Result<Vec<Option<MetaTransaction>>> {
        self.rpc.call_typed("checkpackage", json!([hexes])).await
    }
}
