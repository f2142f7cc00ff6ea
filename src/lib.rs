//! KubeSphere ServiceAccount Controller Library
//!
//! Provisions token secrets for KubeSphere `ServiceAccount` resources, cleans
//! them up on deletion and restarts workloads that mount a stale token.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
