use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;

use config::{Bus, Config};
use dbus_interface::{LookalikeService, BUS_NAME, OBJECT_PATH};
use lookalike_core::PredictionService;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("lookaliked starting");

    let config = Config::load().context("loading configuration")?;
    tracing::info!(
        model_dir = %config.pipeline.model_dir.display(),
        workers = config.workers,
        bus = ?config.bus,
        "configuration loaded"
    );

    // All artifacts load and agree before the bus name is claimed.
    let service = Arc::new(
        PredictionService::load(&config.pipeline).context("loading model artifacts")?,
    );
    let engine = engine::spawn_engine(Arc::clone(&service), config.workers, config.queue_depth)?;

    let iface = LookalikeService::new(engine, service, config.max_image_bytes);
    let builder = match config.bus {
        Bus::Session => zbus::connection::Builder::session()?,
        Bus::System => zbus::connection::Builder::system()?,
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, iface)?
        .build()
        .await
        .context("registering on D-Bus")?;

    tracing::info!(name = BUS_NAME, path = OBJECT_PATH, "lookaliked ready");

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("lookaliked shutting down");

    Ok(())
}
