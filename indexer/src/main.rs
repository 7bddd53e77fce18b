//! Indexer binary: wires the production collaborators and runs the loop
//! until ctrl-c.

use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use allo_indexer::config::IndexerConfig;
use allo_indexer::events::GraphqlEventsFetcher;
use allo_indexer::loader::DataLoader;
use allo_indexer::orchestrator::Orchestrator;
use allo_indexer::ports::{IpfsMetadataSource, RpcChainClient, ZeroPriceSource};
use allo_indexer::processor::EventProcessor;
use allo_indexer::registry::InMemoryStrategyRegistry;
use allo_indexer::repository::{PgEventsRegistry, PgRepository, Repository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = IndexerConfig::from_env().context("loading configuration")?;
    info!(chain_id = config.chain_id, "starting allo indexer");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("connecting to postgres")?;

    let repository: Arc<dyn Repository> = Arc::new(PgRepository::new(pool.clone()));
    let processor = EventProcessor::new(
        Arc::clone(&repository),
        Arc::new(IpfsMetadataSource::new(config.ipfs_gateway.clone())),
        Arc::new(ZeroPriceSource),
    );
    let loader = DataLoader::new(Arc::clone(&repository));

    let mut orchestrator = Orchestrator::new(
        config.chain_id,
        Arc::new(GraphqlEventsFetcher::new(config.graphql_endpoint.clone())),
        Arc::new(RpcChainClient::new(config.rpc_endpoint.clone())),
        Box::new(InMemoryStrategyRegistry::new()),
        Box::new(PgEventsRegistry::new(pool, config.chain_id)),
        processor,
        loader,
    )
    .with_fetch_limit(config.fetch_limit)
    .with_fetch_delay(config.fetch_delay());

    let shutdown = orchestrator.shutdown_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            shutdown.cancel();
        }
    });

    orchestrator.run().await;
    Ok(())
}
