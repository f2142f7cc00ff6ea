//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! server startup, and Kubernetes client setup.

use crate::config::{ControllerConfig, LogFormat};
use crate::constants::{CONTROLLER_NAME, DEFAULT_LOG_FILTER};
use crate::controller::client::KubeObjectClient;
use crate::controller::events::KubeEventPublisher;
use crate::controller::reconciler::Reconciler;
use crate::controller::server::{bind, serve, ServerState};
use crate::observability;
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Everything the watch loop needs
pub struct InitializationResult {
    pub client: Client,
    pub reconciler: Arc<Reconciler>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    pub config: ControllerConfig,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.ready())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Reconciler setup
pub async fn initialize() -> Result<InitializationResult> {
    // Must run before anything opens a TLS connection
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    let config = ControllerConfig::from_env();
    init_tracing(config.log_format)?;

    info!(
        "Starting {} controller v{}",
        CONTROLLER_NAME,
        env!("CARGO_PKG_VERSION")
    );
    debug_config(&config);

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let listener = bind(config.metrics_port)
        .await
        .with_context(|| format!("Failed to bind HTTP server on port {}", config.metrics_port))?;
    let server_state_clone = Arc::clone(&server_state);
    tokio::spawn(async move {
        if let Err(e) = serve(listener, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let reconciler = Arc::new(
        Reconciler::new(
            Arc::new(KubeObjectClient::new(client.clone())),
            Arc::new(KubeEventPublisher::new(client.clone(), CONTROLLER_NAME)),
        )
        .with_backoff(config.backoff_min_minutes, config.backoff_max_minutes)
        .with_error_requeue_secs(config.reconciliation_error_requeue_secs),
    );

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        reconciler,
        server_state,
        config,
    })
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the default filter.
fn init_tracing(format: LogFormat) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let result = match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {e}"))
}

fn debug_config(config: &ControllerConfig) {
    info!(
        max_concurrent_reconciliations = config.max_concurrent_reconciliations,
        metrics_port = config.metrics_port,
        backoff_min_minutes = config.backoff_min_minutes,
        backoff_max_minutes = config.backoff_max_minutes,
        watch_namespace = config.watch_namespace.as_deref().unwrap_or("*"),
        "Loaded controller configuration"
    );
}
