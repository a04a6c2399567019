use serde_json::json;
use std::collections::HashMap;

use super::types::{MempoolEntry, RawBlock, RawTransaction};
use super::RpcClient;
use crate::error::Result;

/// Typed wrapper over the Bitcoin node's JSON-RPC surface this indexer uses.
#[derive(Clone)]
pub struct BitcoinClient {
    rpc: RpcClient,
}

impl BitcoinClient {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }

    pub async fn get_block(&self, hash: &str) -> Result<RawBlock> {
        self.rpc.call_typed("getblock", json!([hash, 2])).await
    }

    pub async fn get_block_hash(&self, height: i32) -> Result<String> {
        self.rpc.call_typed("getblockhash", json!([height])).await
    }

    pub async fn get_best_block_hash(&self) -> Result<String> {
        self.rpc.call_typed("getbestblockhash", json!([])).await
    }

    pub async fn get_raw_transaction(&self, txid: &str) -> Result<RawTransaction> {
        self.rpc.call_typed("getrawtransaction", json!([txid, 2])).await
    }

    pub async fn get_raw_mempool(&self) -> Result<HashMap<String, MempoolEntry>> {
        self.rpc.call_typed("getrawmempool", json!([true])).await
    }
}
