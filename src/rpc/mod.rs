pub mod bitcoin;
pub mod spaces;
pub mod types;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::instrument;

use crate::error::{IndexerError, Result};

/// Raw JSON-RPC 2.0 transport shared by the Bitcoin and Spaces node clients.
///
/// A typed RPC crate looked appealing early on, but real node responses mix
/// types within the same array field often enough (e.g. verbose
/// transaction vin entries) that a generic typed binding fights the wire
/// format more than it helps; calling with `serde_json::Value` and letting
/// each typed wrapper deserialize only the shape it expects is the more
/// robust approach in practice.
#[derive(Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    base_url: String,
    user: String,
    password: String,
}

impl RpcClient {
    pub fn new(base_url: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(60))
            .build()
            .expect("reqwest client builder should not fail on static config");

        Self {
            http,
            base_url: base_url.into(),
            user: user.into(),
            password: password.into(),
        }
    }

    #[instrument(skip(self, params), fields(rpc.method = method))]
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let started = std::time::Instant::now();
        let result = self.call_inner(method, params).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(IndexerError::Rpc(e)) if e.is_timeout() => "timeout",
            Err(IndexerError::Rpc(_)) => "connection",
            Err(IndexerError::RpcSemantic { .. }) => "remote",
            Err(_) => "decode",
        };
        crate::metrics::record_rpc_call(method, outcome, started.elapsed());

        result
    }

    async fn call_inner(&self, method: &str, params: Value) -> Result<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": "spaces-indexer",
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(&self.base_url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&body)
            .send()
            .await?;

        let envelope: Value = response.json().await?;

        if let Some(error) = envelope.get("error").filter(|e| !e.is_null()) {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown rpc error")
                .to_string();
            return Err(IndexerError::rpc_semantic(message));
        }

        Ok(envelope.get("result").cloned().unwrap_or(Value::Null))
    }

    pub async fn call_typed<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let result = self.call(method, params).await?;
        serde_json::from_value(result).map_err(|e| IndexerError::decode(e.to_string()))
    }
}
