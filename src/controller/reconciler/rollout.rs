//! # Rollout Trigger
//!
//! Restarts the workload that owns a pod by stamping
//! `kubesphere.io/restartedAt` on its pod template. The workload's own
//! controller then replaces the pods.
//!
//! Only the pod's first owner reference is consulted. ReplicaSet-owned pods
//! are restarted through the ReplicaSet's Deployment.

use crate::constants::RESTARTED_AT_ANNOTATION;
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::observability::metrics;
use k8s_openapi::api::core::v1::{Pod, PodTemplateSpec};
use std::collections::HashSet;
use std::fmt;
use tracing::{info, warn};

/// Kind of the object that owns a pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerKind {
    ReplicaSet,
    StatefulSet,
    DaemonSet,
    Other(String),
}

impl OwnerKind {
    #[must_use]
    pub fn from_kind(kind: &str) -> Self {
        match kind {
            "ReplicaSet" => Self::ReplicaSet,
            "StatefulSet" => Self::StatefulSet,
            "DaemonSet" => Self::DaemonSet,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReplicaSet => f.write_str("ReplicaSet"),
            Self::StatefulSet => f.write_str("StatefulSet"),
            Self::DaemonSet => f.write_str("DaemonSet"),
            Self::Other(kind) => f.write_str(kind),
        }
    }
}

/// A workload whose pod template gets stamped
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RestartTarget {
    Deployment { namespace: String, name: String },
    StatefulSet { namespace: String, name: String },
    DaemonSet { namespace: String, name: String },
}

impl RestartTarget {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Deployment { .. } => "Deployment",
            Self::StatefulSet { .. } => "StatefulSet",
            Self::DaemonSet { .. } => "DaemonSet",
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Deployment { name, .. }
            | Self::StatefulSet { name, .. }
            | Self::DaemonSet { name, .. } => name,
        }
    }
}

impl fmt::Display for RestartTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deployment { namespace, name }
            | Self::StatefulSet { namespace, name }
            | Self::DaemonSet { namespace, name } => {
                write!(f, "{} {namespace}/{name}", self.kind())
            }
        }
    }
}

/// Set the restart annotation on a pod template
pub fn stamp_restarted_at(template: &mut PodTemplateSpec, timestamp: &str) {
    template
        .metadata
        .get_or_insert_with(Default::default)
        .annotations
        .get_or_insert_with(Default::default)
        .insert(RESTARTED_AT_ANNOTATION.to_string(), timestamp.to_string());
}

/// Resolve the workload owning `pod` and restart it
///
/// Returns the restarted workload, or `None` when there is nothing to restart:
/// the pod has no owner, the owner kind is unsupported, the ReplicaSet has no
/// Deployment, the workload is gone, or it was already restarted during this
/// pass (tracked in `restarted`).
pub async fn rollout_restart_pod(
    ctx: &Reconciler,
    pod: &Pod,
    restarted: &mut HashSet<RestartTarget>,
) -> Result<Option<RestartTarget>, ReconcilerError> {
    let Some(owner) = pod
        .metadata
        .owner_references
        .as_ref()
        .and_then(|owners| owners.first())
    else {
        info!("Pod has no owner references");
        return Ok(None);
    };
    let namespace = pod.metadata.namespace.clone().unwrap_or_default();

    let target = match OwnerKind::from_kind(&owner.kind) {
        OwnerKind::ReplicaSet => {
            match resolve_deployment(ctx, &namespace, &owner.name).await? {
                Some(name) => RestartTarget::Deployment { namespace, name },
                None => return Ok(None),
            }
        }
        OwnerKind::StatefulSet => RestartTarget::StatefulSet {
            namespace,
            name: owner.name.clone(),
        },
        OwnerKind::DaemonSet => RestartTarget::DaemonSet {
            namespace,
            name: owner.name.clone(),
        },
        OwnerKind::Other(kind) => {
            warn!("Unsupported owner kind {}", kind);
            return Ok(None);
        }
    };

    if restarted.contains(&target) {
        return Ok(None);
    }

    let timestamp = chrono::Utc::now().to_rfc3339();
    match restart(ctx, &target, &timestamp).await {
        Ok(true) => {}
        Ok(false) => {
            warn!("{} has no pod template, skipping restart", target);
            return Ok(None);
        }
        Err(e) if e.is_not_found() => {
            warn!("{} no longer exists, skipping restart", target);
            return Ok(None);
        }
        Err(e) => return Err(e),
    }

    metrics::increment_workload_restarts(target.kind());
    info!(workload = %target, restarted_at = %timestamp, "rollout restart triggered");
    restarted.insert(target.clone());
    Ok(Some(target))
}

/// Name of the Deployment owning ReplicaSet `replica_set`, if any
async fn resolve_deployment(
    ctx: &Reconciler,
    namespace: &str,
    replica_set: &str,
) -> Result<Option<String>, ReconcilerError> {
    let rs = match ctx.client.get_replica_set(namespace, replica_set).await {
        Ok(rs) => rs,
        Err(e) if e.is_not_found() => {
            warn!("ReplicaSet {}/{} no longer exists", namespace, replica_set);
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    Ok(rs
        .metadata
        .owner_references
        .as_ref()
        .and_then(|owners| owners.first())
        .filter(|owner| owner.kind == "Deployment")
        .map(|owner| owner.name.clone()))
}

/// Stamp and persist the pod template of `target`. Returns false when the
/// workload has no spec, in which case nothing is written.
async fn restart(
    ctx: &Reconciler,
    target: &RestartTarget,
    timestamp: &str,
) -> Result<bool, ReconcilerError> {
    match target {
        RestartTarget::Deployment { namespace, name } => {
            let mut deployment = ctx.client.get_deployment(namespace, name).await?;
            let Some(spec) = deployment.spec.as_mut() else {
                return Ok(false);
            };
            stamp_restarted_at(&mut spec.template, timestamp);
            ctx.client.replace_deployment(&deployment).await?;
        }
        RestartTarget::StatefulSet { namespace, name } => {
            let mut stateful_set = ctx.client.get_stateful_set(namespace, name).await?;
            let Some(spec) = stateful_set.spec.as_mut() else {
                return Ok(false);
            };
            stamp_restarted_at(&mut spec.template, timestamp);
            ctx.client.replace_stateful_set(&stateful_set).await?;
        }
        RestartTarget::DaemonSet { namespace, name } => {
            let mut daemon_set = ctx.client.get_daemon_set(namespace, name).await?;
            let Some(spec) = daemon_set.spec.as_mut() else {
                return Ok(false);
            };
            stamp_restarted_at(&mut spec.template, timestamp);
            ctx.client.replace_daemon_set(&daemon_set).await?;
        }
    }
    Ok(true)
}
