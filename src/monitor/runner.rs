//! Runs every configured job side by side until shutdown

use futures::future::join_all;
use tokio::sync::watch;

use super::cycle::Reporter;
use crate::alerts::Dispatcher;
use crate::rules::RuleEngine;
use crate::search::SearchBackend;

/// Spawn one task per reporter and wait for all of them.
///
/// A reporter that panics is logged; the others keep running.
pub async fn run_reporters<B, E, D>(reporters: Vec<Reporter<B, E, D>>, shutdown: watch::Receiver<bool>)
where
    B: SearchBackend + 'static,
    E: RuleEngine + 'static,
    D: Dispatcher + 'static,
{
    let handles: Vec<_> = reporters
        .into_iter()
        .map(|reporter| {
            let name = reporter.name().to_string();
            let handle = tokio::spawn(reporter.run(shutdown.clone()));
            (name, handle)
        })
        .collect();

    tracing::info!(jobs = handles.len(), "All reporters started");

    let (names, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
    for (name, result) in names.iter().zip(join_all(handles).await) {
        if let Err(e) = result {
            tracing::error!(job = %name, error = %e, "Reporter task failed");
        }
    }
}

/// Resolve on SIGINT, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
