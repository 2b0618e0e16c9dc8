//! # Auralis
//!
//! Spatial audio rendering server. Usage: `auralis-server [config.toml]`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

use std::sync::Arc;

use anyhow::{Context, Result};
use auralis_server::{build_handler, Server, ServerConfig};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, trace, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Main entry point.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("auralis=info".parse()?))
        .init();

    info!("Auralis starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::load_from(path),
        None => ServerConfig::load(),
    };
    config.validate();

    std::fs::create_dir_all(&config.cache_directory).with_context(|| {
        format!(
            "creating cache directory {}",
            config.cache_directory.display()
        )
    })?;

    let handler = Arc::new(build_handler(&config)?);
    info!("Rendering on {} engine", handler.engine_name());

    let server = Server::bind(config, handler).await?;

    let mut observer = server.subscribe();
    tokio::spawn(async move {
        loop {
            match observer.recv().await {
                Ok(snapshot) => trace!("Updated {}", snapshot.describe()),
                Err(RecvError::Lagged(skipped)) => warn!("Observer skipped {skipped} updates"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for ctrl-c: {e}");
            }
        })
        .await?;

    info!("Auralis shutdown complete");
    Ok(())
}
