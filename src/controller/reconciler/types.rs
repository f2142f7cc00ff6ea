//! # Types
//!
//! Reconciler context and error type.

use crate::controller::backoff::BackoffState;
use crate::controller::client::{ObjectClient, StoreError};
use crate::controller::events::EventPublisher;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("object store request failed: {0}")]
    Store(#[from] StoreError),
    #[error("ServiceAccount is missing {0}")]
    MissingMetadata(&'static str),
}

impl ReconcilerError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_not_found())
    }
}

/// Shared state handed to every reconcile
#[derive(Clone)]
pub struct Reconciler {
    pub client: Arc<dyn ObjectClient>,
    pub events: Arc<dyn EventPublisher>,
    /// Error backoff per ServiceAccount, keyed by `namespace/name`.
    /// Only touched by the error policy and on success.
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
    pub backoff_min_minutes: u64,
    pub backoff_max_minutes: u64,
    pub error_requeue_secs: u64,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("backoff_min_minutes", &self.backoff_min_minutes)
            .field("backoff_max_minutes", &self.backoff_max_minutes)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(client: Arc<dyn ObjectClient>, events: Arc<dyn EventPublisher>) -> Self {
        use crate::constants::{
            DEFAULT_BACKOFF_MAX_MINUTES, DEFAULT_BACKOFF_MIN_MINUTES,
            DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS,
        };
        Self {
            client,
            events,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
            backoff_min_minutes: DEFAULT_BACKOFF_MIN_MINUTES,
            backoff_max_minutes: DEFAULT_BACKOFF_MAX_MINUTES,
            error_requeue_secs: DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS,
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, min_minutes: u64, max_minutes: u64) -> Self {
        self.backoff_min_minutes = min_minutes;
        self.backoff_max_minutes = max_minutes;
        self
    }

    #[must_use]
    pub fn with_error_requeue_secs(mut self, secs: u64) -> Self {
        self.error_requeue_secs = secs;
        self
    }

    /// Forget the error history of `resource_key`. Returns true if it had failed before.
    pub fn reset_backoff(&self, resource_key: &str) -> bool {
        let Ok(mut states) = self.backoff_states.lock() else {
            return false;
        };
        states
            .remove(resource_key)
            .is_some_and(|state| state.error_count > 0)
    }
}

/// `namespace/name` key used for logging and the backoff table
#[must_use]
pub fn resource_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}
