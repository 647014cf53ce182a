// ABOUTME: Main entry point for dev-tutorial
//
// Binary: dev-tutorial
// Usage: dev-tutorial <COMMAND>
// - serve: WebSocket server for tutorial sessions
// - run / destroy / status / write: manage a tutorial container
// - check: validate tutorial descriptors

#![allow(missing_docs)]

use anyhow::Result;
use clap::Parser;
use dev_tutorial::cli::Cli;
use dev_tutorial::config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let config = args.load_config()?;

    setup_logging(&config);
    setup_panic_handler();

    args.execute(config).await
}

fn setup_logging(config: &AppConfig) {
    use std::fs::OpenOptions;
    use tracing_subscriber::prelude::*;

    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            config
                .logging
                .filter
                .as_deref()
                .unwrap_or("dev_tutorial=info")
                .into()
        })
    };

    // JSONL file next to the stderr output; without a writable log directory only stderr remains
    let log_dir = config.log_directory();
    let file = std::fs::create_dir_all(&log_dir).ok().and_then(|()| {
        let log_file = log_dir.join(format!(
            "dev-tutorial-{}.jsonl",
            chrono::Local::now().format("%Y%m%d-%H%M%S")
        ));
        OpenOptions::new().create(true).append(true).open(log_file).ok()
    });

    let file_layer = file.map(|file| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(file)
            .with_ansi(false)
            .with_filter(filter())
    });

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(filter()),
        )
        .init();
}

fn setup_panic_handler() {
    use tracing::error;

    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        error!("Application panicked: {}", panic_info);
        default_hook(panic_info);
    }));
}
