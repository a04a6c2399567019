/// Prometheus metrics catalog.
///
/// Trimmed to what a sync operator actually watches: ingestion throughput,
/// chain-tip height (store vs. node), reorg events, mempool chain outcomes
/// and RPC call health. Registered once via `lazy_static` the same way the
/// rest of this codebase wires up process-wide singletons (`config`).
use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref BLOCKS_INGESTED_TOTAL: IntCounter = IntCounter::new(
        "indexer_blocks_ingested_total",
        "Number of blocks written by the block ingestor"
    )
    .unwrap();

    pub static ref STORE_TIP_HEIGHT: IntGauge = IntGauge::new(
        "indexer_store_tip_height",
        "Highest non-orphan block height in the store"
    )
    .unwrap();

    pub static ref NODE_TIP_HEIGHT: IntGauge = IntGauge::new(
        "indexer_node_tip_height",
        "Highest block height reported by the Bitcoin node"
    )
    .unwrap();

    pub static ref REORGS_TOTAL: IntCounter = IntCounter::new(
        "indexer_reorgs_total",
        "Number of reorganisations detected and resolved"
    )
    .unwrap();

    pub static ref REORG_DEPTH: Histogram = Histogram::with_opts(HistogramOpts::new(
        "indexer_reorg_depth_blocks",
        "Depth, in blocks, of resolved reorganisations"
    ))
    .unwrap();

    pub static ref MEMPOOL_CHAINS_PROCESSED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "indexer_mempool_chains_total",
            "Mempool ancestor chains processed, by outcome"
        ),
        &["outcome"]
    )
    .unwrap();

    pub static ref RPC_CALLS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("indexer_rpc_calls_total", "RPC calls, by method and outcome"),
        &["method", "outcome"]
    )
    .unwrap();

    pub static ref RPC_CALL_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("indexer_rpc_call_duration_seconds", "RPC call latency by method"),
        &["method"]
    )
    .unwrap();
}

/// Registers every metric above with [`REGISTRY`]; call once at startup.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    REGISTRY.register(Box::new(BLOCKS_INGESTED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STORE_TIP_HEIGHT.clone()))?;
    REGISTRY.register(Box::new(NODE_TIP_HEIGHT.clone()))?;
    REGISTRY.register(Box::new(REORGS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REORG_DEPTH.clone()))?;
    REGISTRY.register(Box::new(MEMPOOL_CHAINS_PROCESSED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RPC_CALLS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RPC_CALL_DURATION_SECONDS.clone()))?;
    Ok(())
}

/// Renders the registry in Prometheus text exposition format, for the
/// optional `/metrics` endpoint bound when `METRICS_ADDR` is set.
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).expect("encoding to an in-memory buffer cannot fail");
    String::from_utf8(buffer).expect("prometheus text format is always valid utf-8")
}

pub fn record_reorg(depth: i32) {
    REORGS_TOTAL.inc();
    REORG_DEPTH.observe(depth as f64);
}

pub fn record_mempool_chain_outcome(outcome: &str) {
    MEMPOOL_CHAINS_PROCESSED_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_rpc_call(method: &str, outcome: &str, duration: std::time::Duration) {
    RPC_CALLS_TOTAL.with_label_values(&[method, outcome]).inc();
    RPC_CALL_DURATION_SECONDS.with_label_values(&[method]).observe(duration.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gather_metrics_renders_without_panicking() {
        let _ = init_metrics();
        BLOCKS_INGESTED_TOTAL.inc();
        let text = gather_metrics();
        assert!(text.contains("indexer_blocks_ingested_total"));
    }
}
