//! whc-daemon entry point.
//!
//! This file is intentionally thin: it loads configuration, sets up
//! tracing, opens the store, connects the broker, and runs the three intake
//! consumers until a shutdown signal arrives. All business logic lives in
//! `whc-coordinator`; all broker plumbing lives in `whc-broker`.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{info, Level};

use whc_broker::{run_client_intake, run_delivery_intake, run_robot_intake, AmqpPublisher, BrokerHandle};
use whc_config::Cli;
use whc_coordinator::Coordinator;
use whc_store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = whc_config::load(&cli).context("failed to load configuration")?;

    init_tracing(&config.log_filter);

    info!(broker_url = %config.broker_url, db_path = %config.db_path, group_id = %config.group_id, "starting whc-daemon");

    let store = Store::connect(&config.db_path).await.context("failed to open store")?;
    let broker = BrokerHandle::connect(&config.broker_url, &config.group_id)
        .await
        .context("failed to connect to broker")?;
    let publisher = AmqpPublisher::new(&broker);
    let coordinator = Arc::new(Coordinator::new(store, publisher));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let group_id = config.group_id.clone();

    let client_task = tokio::spawn({
        let channel = broker.new_consumer_channel().await.context("failed to open client channel")?;
        let group_id = group_id.clone();
        let coordinator = Arc::clone(&coordinator);
        let rx = shutdown_tx.subscribe();
        async move {
            run_client_intake(channel, &group_id, coordinator, rx).await?;
            anyhow::Ok(())
        }
    });

    let robot_task = tokio::spawn({
        let channel = broker.new_consumer_channel().await.context("failed to open robot channel")?;
        let group_id = group_id.clone();
        let coordinator = Arc::clone(&coordinator);
        let rx = shutdown_tx.subscribe();
        async move {
            run_robot_intake(channel, &group_id, coordinator, rx).await?;
            anyhow::Ok(())
        }
    });

    let delivery_task = tokio::spawn({
        let channel = broker.new_consumer_channel().await.context("failed to open delivery channel")?;
        let group_id = group_id.clone();
        let coordinator = Arc::clone(&coordinator);
        let rx = shutdown_tx.subscribe();
        async move {
            run_delivery_intake(channel, &group_id, coordinator, rx).await?;
            anyhow::Ok(())
        }
    });

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    info!("shutdown signal received, stopping intake consumers");
    let _ = shutdown_tx.send(());

    for (name, task) in [("client", client_task), ("robot", robot_task), ("delivery", delivery_task)] {
        match task.await {
            Ok(Ok(())) => info!(name, "intake consumer stopped cleanly"),
            Ok(Err(e)) => tracing::error!(name, error = %e, "intake consumer exited with error"),
            Err(e) => tracing::error!(name, error = %e, "intake consumer task panicked"),
        }
    }

    drop(broker);
    let coordinator = Arc::try_unwrap(coordinator)
        .unwrap_or_else(|_| panic!("coordinator still has outstanding references at shutdown"));
    coordinator.into_store().close().await;

    info!("whc-daemon shut down");
    Ok(())
}

fn init_tracing(filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.to_string().into()),
        )
        .with_max_level(Level::TRACE)
        .init();
}
