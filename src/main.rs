use std::sync::Arc;

use axum::{routing::get, Router};
use tracing::info;

use spaces_indexer::config::{get_global_config, init_global_config};
use spaces_indexer::rpc::bitcoin::BitcoinClient;
use spaces_indexer::rpc::spaces::SpacesClient;
use spaces_indexer::rpc::RpcClient;
use spaces_indexer::store::postgres::PostgresStore;
use spaces_indexer::store::Store;
use spaces_indexer::sync_loop::run_forever;
use spaces_indexer::telemetry::{init_tracing, TelemetryConfig};
use spaces_indexer::metrics;

async fn serve_metrics(addr: std::net::SocketAddr) {
    let app = Router::new().route("/metrics", get(|| async { metrics::gather_metrics() }));
    let listener = tokio::net::TcpListener::bind(addr).await.expect("failed to bind metrics listener");
    info!(%addr, "metrics endpoint listening");
    axum::serve(listener, app).await.expect("metrics server failed");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(TelemetryConfig::default())?;
    init_global_config()?;
    metrics::init_metrics().ok();

    let config = get_global_config();

    let store = PostgresStore::connect(&config.postgres_uri).await?;
    store.run_migrations().await?;
    let store: Arc<dyn Store> = Arc::new(store);

    let bitcoin = BitcoinClient::new(RpcClient::new(
        config.bitcoin_node_uri.clone(),
        config.bitcoin_node_user.clone(),
        config.bitcoin_node_password.clone(),
    ));
    let spaces = SpacesClient::new(RpcClient::new(config.spaces_node_uri.clone(), "test", "test"));

    if let Ok(addr) = std::env::var("METRICS_ADDR") {
        let addr: std::net::SocketAddr = addr.parse()?;
        tokio::spawn(serve_metrics(addr));
    }

    info!("starting sync loop");
    run_forever(store.as_ref(), &bitcoin, &spaces, config).await;
}
