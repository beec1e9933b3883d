//! Logwarden
//!
//! Run with: cargo run -- payments.toml checkout.toml
//!
//! Each argument is one rule-set config file (default: config.toml); every
//! rule-set runs as its own job on its own interval.
//!
//! Environment variables:
//! - RUST_LOG: Log level (default: logwarden=info)

use std::sync::Arc;
use std::time::Duration;

use logwarden::alerts::Notifier;
use logwarden::config::AppConfig;
use logwarden::monitor::{run_reporters, shutdown_signal, Reporter};
use logwarden::rules::PatternEngine;
use logwarden::search::ElasticClient;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "logwarden=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        paths.push("config.toml".to_string());
    }

    let mut reporters = Vec::with_capacity(paths.len());
    for path in &paths {
        let config = AppConfig::load(path)
            .map_err(|e| format!("Failed to load {}: {}", path, e))?;

        tracing::info!("Job {} ({}):", config.name, path);
        tracing::info!("  Index: {}", config.es.index);
        tracing::info!("  Nodes: {}", config.es.address.join(", "));
        tracing::info!("  Rules: {}", config.rules.len());
        for target in config.targets() {
            tracing::info!("  Notify: {}", target.kind());
        }

        let client = ElasticClient::new(
            config.es.address.clone(),
            config.es.username.clone(),
            config.es.password.clone(),
            Duration::from_secs(config.es.timeout_secs),
        )?;
        let engine = PatternEngine::new(config.time_key.clone());
        let notifier = Notifier::new(config.targets())?;

        reporters.push(Reporter::new(Arc::new(config), client, engine, notifier));
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    run_reporters(reporters, shutdown_rx).await;

    tracing::info!("Logwarden stopped");
    Ok(())
}
