//! # Drift Detection
//!
//! Finds pods that consume a ServiceAccount but still mount a token other than
//! the account's current one, and asks the rollout trigger to restart their
//! workloads.
//!
//! A pod is stale only when the pod injector's projected volume is present and
//! its first source names a different secret. Pods already mounting the
//! current token, and pods without the projected volume, are left running.

use crate::constants::{POD_SERVICE_ACCOUNT_NAME_ANNOTATION, SERVICE_ACCOUNT_VOLUME_NAME};
use crate::controller::reconciler::rollout::{rollout_restart_pod, RestartTarget};
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::ServiceAccount;
use k8s_openapi::api::core::v1::{Pod, Volume};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// True if `pod` declares that it consumes the ServiceAccount `service_account_name`
#[must_use]
pub fn is_service_account_consumer(pod: &Pod, service_account_name: &str) -> bool {
    pod.metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(POD_SERVICE_ACCOUNT_NAME_ANNOTATION))
        .is_some_and(|name| name == service_account_name)
}

/// Name of the secret behind the first source of a projected volume
fn first_projected_secret_name(volume: &Volume) -> Option<String> {
    let source = volume.projected.as_ref()?.sources.as_ref()?.first()?;
    source.secret.as_ref()?.name.clone().into()
}

/// Secret the pod mounts through the service account volume, if it has one
#[must_use]
pub fn mounted_token_secret(pod: &Pod) -> Option<String> {
    pod.spec
        .as_ref()?
        .volumes
        .as_ref()?
        .iter()
        .filter(|volume| volume.name == SERVICE_ACCOUNT_VOLUME_NAME)
        .find_map(first_projected_secret_name)
}

/// True if `pod` consumes `service_account_name` but mounts a secret other than `current_secret`
#[must_use]
pub fn is_stale(pod: &Pod, service_account_name: &str, current_secret: &str) -> bool {
    if !is_service_account_consumer(pod, service_account_name) {
        return false;
    }
    mounted_token_secret(pod).is_some_and(|mounted| mounted != current_secret)
}

/// Restart the workloads of every stale pod in the ServiceAccount's namespace
///
/// Each workload is restarted at most once per call. Returns the workloads
/// that were restarted.
pub async fn check_service_account_ref_pods(
    ctx: &Reconciler,
    service_account: &ServiceAccount,
) -> Result<Vec<RestartTarget>, ReconcilerError> {
    let Some(current_secret) = service_account.current_secret_name() else {
        warn!(
            "service account {} has no secrets",
            service_account.name()
        );
        return Ok(Vec::new());
    };

    let pods = ctx.client.list_pods(service_account.namespace()).await?;
    let mut seen = HashSet::new();
    let mut restarted = Vec::new();

    for pod in pods
        .iter()
        .filter(|pod| is_stale(pod, service_account.name(), current_secret))
    {
        let pod_name = pod.metadata.name.as_deref().unwrap_or("unknown");
        info!(
            pod.name = pod_name,
            current_secret, "pod mounts a stale service account token"
        );
        match rollout_restart_pod(ctx, pod, &mut seen).await? {
            Some(target) => restarted.push(target),
            None => debug!(pod.name = pod_name, "no workload restarted for pod"),
        }
    }

    Ok(restarted)
}
