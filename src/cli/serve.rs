// ABOUTME: CLI serve command
// Wires the Docker runtime, the tutorial catalog and the session multiplexer behind the WebSocket server

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::AppConfig;
use crate::docker::{ContainerStateCache, DockerRuntime};
use crate::server;
use crate::session::{Multiplexer, SessionServices};
use crate::tutorial::FsTutorialCatalog;

pub async fn execute(config: AppConfig) -> Result<()> {
    let catalog = FsTutorialCatalog::load(&config.tutorials.directories)
        .context("Failed to load tutorials")?;

    let cache = Arc::new(ContainerStateCache::new());
    let runtime = DockerRuntime::connect(&config, Arc::clone(&cache))
        .await
        .context("Failed to connect to Docker")?;

    let multiplexer = Arc::new(Multiplexer::new(SessionServices::new(
        Arc::new(runtime),
        Arc::new(catalog),
    )));
    let watcher = multiplexer.watch(cache.subscribe());

    info!("Serving tutorial sessions on {}", config.server.bind);
    let result = server::serve(&config.server, multiplexer).await;
    watcher.abort();
    result
}
