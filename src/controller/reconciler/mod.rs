//! # Reconciler
//!
//! Core reconciliation logic for KubeSphere `ServiceAccount` resources.
//!
//! ## Reconciliation Flow
//!
//! 1. Fetch the current `ServiceAccount`
//! 2. Run the finalizer state machine:
//!    - **Attach**: add the finalizer and provision a token secret when the
//!      account has none
//!    - **Release**: delete the account's own token secrets and remove the
//!      finalizer once the account is being deleted
//! 3. Validate every referenced secret and report invalid ones as events
//! 4. Restart workloads whose pods still mount a stale token

pub mod drift;
pub mod reconcile;
pub mod rollout;
pub mod secrets;
pub mod types;
pub mod validation;

pub use reconcile::{reconcile, reconcile_service_account, LifecycleState};
pub use rollout::{OwnerKind, RestartTarget};
pub use types::{resource_key, Reconciler, ReconcilerError};
pub use validation::{check_secret_token, is_valid_token, InvalidToken};
