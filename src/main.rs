use std::sync::Arc;

use saga_engine::SagaEngine;
use tracing::info;

use shardledger::activities::{ShardedUserService, UserActivities};
use shardledger::config::Config;
use shardledger::saga;
use shardledger::shard::ShardRouter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();
    run().await
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load("config.yaml")?;

    let router = Arc::new(ShardRouter::connect(&config.db).await?);
    let topology = router.topology();
    info!(
        user_shards = topology.user_shards,
        email_shards = topology.email_shards,
        "shards connected and migrated"
    );

    let engine = Arc::new(SagaEngine::new());
    let activities: Arc<dyn UserActivities> = Arc::new(ShardedUserService::new(Arc::clone(&router)));
    let workers = saga::start_workers(&engine, activities, saga::default_activity_options()).await;

    info!("shardledger running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    info!("shutting down");
    workers.shutdown().await;
    router.close().await;

    Ok(())
}
