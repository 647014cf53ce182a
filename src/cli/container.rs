// ABOUTME: CLI container commands: run, destroy, status and write
//
// run: build the tutorial image and start a fresh container
// destroy: stop and remove the container (no-op when there is none)
// status: report the cached or discovered container state
// write: upload stdin or a file into a started container

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::sync::Arc;
use tokio::io::AsyncRead;

use super::{OutputFormat, TutorialArgs, WriteArgs};
use crate::config::AppConfig;
use crate::docker::{ContainerRuntime, ContainerState, ContainerStateCache, DockerRuntime};

/// JSON output structure for status command
#[derive(Debug, Serialize)]
pub struct StatusOutput {
    pub tutorial: String,
    pub state: Option<ContainerState>,
    pub container_id: Option<String>,
    pub ready: bool,
}

async fn connect(config: &AppConfig) -> Result<DockerRuntime> {
    DockerRuntime::connect(config, Arc::new(ContainerStateCache::new()))
        .await
        .context("Failed to connect to Docker")
}

pub async fn run(args: TutorialArgs, config: &AppConfig) -> Result<()> {
    let runtime = connect(config).await?;
    println!("Building and starting '{}'...", args.slug);
    let handle = runtime
        .run(&args.slug)
        .await
        .with_context(|| format!("Failed to run tutorial '{}'", args.slug))?;
    println!("Container {} started for '{}'", handle, args.slug);
    Ok(())
}

pub async fn destroy(args: TutorialArgs, config: &AppConfig) -> Result<()> {
    let runtime = connect(config).await?;
    runtime
        .destroy(&args.slug)
        .await
        .with_context(|| format!("Failed to destroy tutorial '{}'", args.slug))?;
    println!("Container of '{}' removed.", args.slug);
    Ok(())
}

pub async fn status(args: TutorialArgs, config: &AppConfig, format: OutputFormat) -> Result<()> {
    let runtime = connect(config).await?;
    let output = status_of(&runtime, &args.slug).await?;

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&output).context("Failed to serialize status")?
            );
        }
        OutputFormat::Text => {
            let state = output.state.map_or("no container", ContainerState::label);
            println!("Tutorial:     {}", output.tutorial);
            println!("State:        {state}");
            if let Some(id) = &output.container_id {
                println!("Container:    {id}");
            }
            println!("Ready:        {}", if output.ready { "yes" } else { "no" });
        }
    }
    Ok(())
}

pub async fn status_of(runtime: &dyn ContainerRuntime, slug: &str) -> Result<StatusOutput> {
    let handle = runtime
        .find_container(slug)
        .await
        .with_context(|| format!("Failed to look up container of '{}'", slug))?;

    Ok(StatusOutput {
        tutorial: slug.to_string(),
        state: runtime.state(slug),
        container_id: handle.map(|h| h.id().to_string()),
        ready: runtime.is_container_ready(slug),
    })
}

pub async fn write(args: WriteArgs, config: &AppConfig) -> Result<()> {
    let runtime = connect(config).await?;

    let content: Box<dyn AsyncRead + Send + Unpin> = match &args.file {
        Some(path) => Box::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdin()),
    };

    write_to(&runtime, &args.slug, &args.path, content).await?;
    println!("Wrote {} in '{}'", args.path, args.slug);
    Ok(())
}

/// Upload `content` to `path`, refusing unless the container is started.
pub async fn write_to(
    runtime: &dyn ContainerRuntime,
    slug: &str,
    path: &str,
    content: Box<dyn AsyncRead + Send + Unpin>,
) -> Result<()> {
    runtime
        .find_container(slug)
        .await
        .with_context(|| format!("Failed to look up container of '{}'", slug))?;
    if !runtime.is_container_ready(slug) {
        bail!(
            "Container of '{}' is not started ({})",
            slug,
            runtime.state(slug).map_or("no container", ContainerState::label)
        );
    }

    runtime
        .write_file(slug, path, content)
        .await
        .with_context(|| format!("Failed to write {} in '{}'", path, slug))
}
