use spaces_indexer::backfill::run_until_gapless;
use spaces_indexer::config::{get_global_config, init_global_config};
use spaces_indexer::rpc::bitcoin::BitcoinClient;
use spaces_indexer::rpc::spaces::SpacesClient;
use spaces_indexer::rpc::RpcClient;
use spaces_indexer::store::postgres::PostgresStore;
use spaces_indexer::telemetry::{init_tracing, TelemetryConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(TelemetryConfig::default())?;
    init_global_config()?;
    let config = get_global_config();

    let store = PostgresStore::connect(&config.postgres_uri).await?;
    store.run_migrations().await?;

    let bitcoin = BitcoinClient::new(RpcClient::new(
        config.bitcoin_node_uri.clone(),
        config.bitcoin_node_user.clone(),
        config.bitcoin_node_password.clone(),
    ));
    let spaces = SpacesClient::new(RpcClient::new(config.spaces_node_uri.clone(), "test", "test"));

    run_until_gapless(&store, &bitcoin, &spaces, config).await?;
    Ok(())
}
