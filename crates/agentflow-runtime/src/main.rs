//! Agentflow service binary
//!
//! Loads the agent network from configuration, runs the dispatcher and the
//! scheduler, and stops on Ctrl+C.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use agentflow_agents::AgentFactory;
use agentflow_common::VERSION;
use agentflow_runtime::{
    AgentflowConfig, DirectoryFeed, InMemoryStore, JsonFileStore, MemoryStore, MessageBus,
    Runtime, Scheduler, StorageBackend,
};

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AgentflowConfig::load()?;
    init_tracing(config.log.json);

    info!("Starting Agentflow v{}", VERSION);
    info!(
        agents = config.agents.len(),
        storage = ?config.storage.backend,
        dedup_window_secs = config.bus.dedup_window_secs,
        "Loaded configuration"
    );

    let store: Arc<dyn MemoryStore> = match config.storage.backend {
        StorageBackend::Memory => Arc::new(InMemoryStore::new()),
        StorageBackend::File => Arc::new(JsonFileStore::open(&config.storage.path).await?),
    };

    let mut factory = AgentFactory::new();
    if let Some(directory) = &config.feeds.directory {
        info!(directory = %directory.display(), "Serving feeds from directory");
        factory = factory.with_feeds(Arc::new(DirectoryFeed::new(directory.clone())));
    }

    let (bus, deliveries) = MessageBus::new(config.bus.clone());
    let runtime = Arc::new(Runtime::new(store, Arc::new(bus)));
    for spec in config.agents {
        runtime.register_spec(spec, &factory)?;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher = tokio::spawn(runtime.clone().dispatch(deliveries, shutdown_rx.clone()));
    let schedules = Scheduler::new(runtime.clone()).spawn(shutdown_rx);
    info!(scheduled = schedules.len(), "Agent network running");

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    let _ = shutdown_tx.send(true);
    futures::future::join_all(schedules).await;
    dispatcher.await?;

    for health in runtime.health(Utc::now()) {
        info!(
            agent_id = %health.id,
            working = health.working,
            last_error = ?health.status.last_error,
            "Agent health"
        );
    }
    info!(metrics = ?runtime.metrics(), "Shutting down Agentflow");
    Ok(())
}
