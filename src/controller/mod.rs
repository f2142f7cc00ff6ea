//! # Controller
//!
//! Core controller modules for the ServiceAccount controller.
//!
//! - `backoff`: Fibonacci backoff for failed reconciliations
//! - `client`: Kubernetes object access behind the `ObjectClient` trait
//! - `events`: Kubernetes event publishing
//! - `reconciler`: Core reconciliation logic
//! - `server`: HTTP server for metrics and health checks

pub mod backoff;
pub mod client;
pub mod events;
pub mod reconciler;
pub mod server;
