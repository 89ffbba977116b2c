//! Donor re-activation daemon
//!
//! Runs the durable re-activation scheduler against the registry's job
//! queue until interrupted.

use matching::{Config, ReactivationScheduler};
use registry_core::Registry;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting VitaGrid re-activation daemon");

    // Load configuration (file takes precedence over env)
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    // Open registry
    let registry_config = registry_core::Config {
        data_dir: config.registry_data_dir.clone(),
        ..Default::default()
    };
    let registry = Arc::new(Registry::open(registry_config)?);
    tracing::info!("Registry opened successfully");

    // Run scheduler until ctrl-c
    let scheduler = Arc::new(ReactivationScheduler::new(
        registry,
        config.scheduler.clone(),
    ));
    let handle = tokio::spawn(scheduler.run());

    tokio::signal::ctrl_c().await?;
    handle.abort();

    tracing::info!("Shutting down re-activation daemon");
    Ok(())
}
