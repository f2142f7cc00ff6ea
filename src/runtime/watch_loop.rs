//! # Watch Loop
//!
//! Controller watch loop that monitors ServiceAccount resources and triggers
//! reconciliation when changes are detected.

use crate::config::ControllerConfig;
use crate::controller::reconciler::{reconcile, Reconciler};
use crate::controller::server::ServerState;
use crate::crd::ServiceAccount;
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use futures::StreamExt;
use kube::api::Api;
use kube::Client;
use kube_runtime::{controller, watcher, Controller};
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// ServiceAccount API scoped to `WATCH_NAMESPACE`, or to all namespaces
#[must_use]
pub fn service_account_api(client: Client, config: &ControllerConfig) -> Api<ServiceAccount> {
    match config.watch_namespace.as_deref() {
        Some(namespace) => Api::namespaced(client, namespace),
        None => Api::all(client),
    }
}

/// Run the controller watch loop
///
/// Reconciles ServiceAccounts on every change until a shutdown signal is
/// received. A watch stream that ends for any other reason is restarted after
/// `WATCH_RESTART_DELAY_SECS`.
pub async fn run_watch_loop(
    service_accounts: Api<ServiceAccount>,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
    config: ControllerConfig,
) -> Result<(), anyhow::Error> {
    let restart_delay = config.watch_restart_delay_duration();

    // Mark the server as not ready once a shutdown signal is received
    let shutdown_server_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal, initiating graceful shutdown...");
        shutdown_server_state.set_ready(false);
    });

    server_state.set_ready(true);

    loop {
        if !server_state.ready() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            operation = "watch_loop"
        );

        info!(
            parent: &watch_span,
            concurrency = config.max_concurrent_reconciliations,
            namespace = config.watch_namespace.as_deref().unwrap_or("*"),
            "Starting controller watch loop..."
        );
        Controller::new(service_accounts.clone(), watcher::Config::default())
            .with_config(
                controller::Config::default().concurrency(config.max_concurrent_reconciliations),
            )
            .shutdown_on_signal()
            .run(reconcile, handle_reconciliation_error, Arc::clone(&reconciler))
            .filter_map(|x| async move {
                match &x {
                    Ok((object, _)) => {
                        debug!(resource.name = %object.name, "watch.event.success");
                        Some(x)
                    }
                    Err(e) => handle_watch_stream_error(&format!("{e:?}"), restart_delay)
                        .await
                        .map(|()| x),
                }
            })
            .for_each(|_| futures::future::ready(()))
            .instrument(watch_span)
            .await;

        if !server_state.ready() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        warn!(
            "Controller watch stream ended, restarting in {} seconds...",
            restart_delay.as_secs()
        );
        tokio::time::sleep(restart_delay).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}

/// Resolve on SIGINT, or on SIGTERM where available
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
