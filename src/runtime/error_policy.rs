//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loop.
//! Handles reconciliation errors and watch stream errors.

use crate::controller::backoff::BackoffState;
use crate::controller::reconciler::{resource_key, Reconciler, ReconcilerError};
use crate::crd::ServiceAccount;
use crate::observability;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Instrument};

/// Handle reconciliation errors with per-resource Fibonacci backoff
///
/// Each ServiceAccount keeps its own error count, so one failing account
/// does not slow down the others. The count is reset by the next successful
/// reconcile.
pub fn handle_reconciliation_error(
    obj: Arc<ServiceAccount>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = obj.metadata.name.as_deref().unwrap_or("unknown");
    let namespace = obj.metadata.namespace.as_deref().unwrap_or("default");

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = name,
        resource.namespace = namespace,
        error = %error
    );
    let _error_guard = error_span.enter();

    observability::metrics::increment_reconciliation_errors();

    let (backoff_seconds, error_count) = next_backoff(&ctx, &resource_key(namespace, name));

    info!(
        "Retrying with Fibonacci backoff: {}s (error count: {})",
        backoff_seconds, error_count
    );
    Action::requeue(Duration::from_secs(backoff_seconds))
}

/// Advance the backoff of `key` and return `(seconds, error_count)`
pub fn next_backoff(ctx: &Reconciler, key: &str) -> (u64, u32) {
    match ctx.backoff_states.lock() {
        Ok(mut states) => {
            let state = states.entry(key.to_string()).or_insert_with(|| {
                BackoffState::new(ctx.backoff_min_minutes, ctx.backoff_max_minutes)
            });
            state.increment_error();
            (state.backoff.next_backoff_seconds(), state.error_count)
        }
        Err(e) => {
            warn!(
                "Failed to lock backoff_states: {}, using default backoff",
                e
            );
            (ctx.error_requeue_secs, 0)
        }
    }
}

/// Classification of an error reported by the watch stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    NotFound,
    Unauthorized,
    Expired,
    TooManyRequests,
    Other,
}

impl WatchErrorKind {
    /// Classify the debug rendering of a controller stream error
    #[must_use]
    pub fn classify(error: &str) -> Self {
        // 404 first: a plain-text 404 body surfaces as a serde error mentioning WatchFailed
        if error.contains("ObjectNotFound") || error.contains("404") || error.contains("not found")
        {
            Self::NotFound
        } else if error.contains("401") || error.contains("Unauthorized") {
            Self::Unauthorized
        } else if error.contains("410")
            || error.contains("too old resource version")
            || error.contains("Expired")
            || error.contains("Gone")
        {
            Self::Expired
        } else if error.contains("429") || error.contains("TooManyRequests") {
            Self::TooManyRequests
        } else {
            Self::Other
        }
    }
}

/// Handle a watch stream error
///
/// Returns `Some(())` to keep the item in the stream, or `None` to drop it.
/// Errors that need a pause before the watcher retries sleep for
/// `watch_restart_delay` first.
pub async fn handle_watch_stream_error(error: &str, watch_restart_delay: Duration) -> Option<()> {
    let error_span = tracing::span!(tracing::Level::WARN, "controller.watch.error", error = %error);

    async move {
        match WatchErrorKind::classify(error) {
            WatchErrorKind::NotFound => {
                warn!(
                    "ServiceAccount not found (404), it may have been deleted or the CRD is missing: {}",
                    error
                );
                Some(())
            }
            WatchErrorKind::Unauthorized => {
                error!(
                    "Watch authentication failed (401 Unauthorized), RBAC may have been revoked or the token expired"
                );
                tokio::time::sleep(watch_restart_delay).await;
                None
            }
            WatchErrorKind::Expired => {
                warn!("Watch resource version expired (410), watch will restart");
                None
            }
            WatchErrorKind::TooManyRequests => {
                warn!(
                    "API server is throttling (429), backing off for {}s",
                    watch_restart_delay.as_secs()
                );
                tokio::time::sleep(watch_restart_delay).await;
                None
            }
            WatchErrorKind::Other => {
                error!("Controller stream error: {}", error);
                tokio::time::sleep(watch_restart_delay).await;
                None
            }
        }
    }
    .instrument(error_span)
    .await
}
