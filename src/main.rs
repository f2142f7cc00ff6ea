//! # KubeSphere ServiceAccount Controller
//!
//! Keeps KubeSphere `ServiceAccount` resources supplied with token secrets.
//!
//! ## Overview
//!
//! For every `ServiceAccount` (group `kubesphere.io`) the controller:
//!
//! 1. **Attaches a finalizer** and provisions a `kubesphere.io/service-account-token`
//!    secret when the account has none
//! 2. **Cleans up** the account's own token secrets when it is deleted
//! 3. **Validates** every referenced secret and reports invalid ones as events
//! 4. **Restarts workloads** whose pods still mount a stale token
//!
//! Metrics and probes are served on `METRICS_PORT` (`/metrics`, `/healthz`, `/readyz`).

use anyhow::{Context, Result};
use ks_serviceaccount_controller::runtime::{initialize, run_watch_loop, watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize()
        .await
        .context("Failed to initialize controller")?;

    let service_accounts = watch_loop::service_account_api(init.client, &init.config);
    run_watch_loop(
        service_accounts,
        init.reconciler,
        init.server_state,
        init.config,
    )
    .await
}
