//! # Prelude
//!
//! Re-exports commonly used types and traits.
//!
//! ```rust
//! use ks_serviceaccount_controller::prelude::*;
//! ```

pub use crate::crd::ServiceAccount;

pub use crate::controller::client::{KubeObjectClient, ObjectClient, StoreError};
pub use crate::controller::events::{EventPublisher, KubeEventPublisher};

pub use crate::controller::reconciler::{
    reconcile, reconcile_service_account, LifecycleState, OwnerKind, Reconciler, ReconcilerError,
    RestartTarget,
};

pub use crate::config::{ControllerConfig, LogFormat};
