//! Headless Meridian runner.
//!
//! Usage: `meridian [CONFIG_PATH]`. Runs the configured number of frames
//! against a recording surface and logs a summary.

use anyhow::Result;
use meridian_core::RecordingSurface;
use meridian_engine::{Engine, EngineConfig, CONFIG_FILE};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Surface size used for headless runs.
const SURFACE_SIZE: (u32, u32) = (1280, 720);

/// Main entry point.
fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("meridian=info".parse()?))
        .init();

    info!("Meridian starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from(CONFIG_FILE), PathBuf::from);
    let config = EngineConfig::load_from(&config_path);

    let mut engine = Engine::new(config).with_config_path(config_path);
    let mut surface = RecordingSurface::new(SURFACE_SIZE.0, SURFACE_SIZE.1);
    let frames = engine.run(&mut surface);

    info!(
        frames,
        time = %engine.clock().time(),
        events = engine.bus().history_len(),
        "Meridian shutdown complete"
    );
    Ok(())
}
