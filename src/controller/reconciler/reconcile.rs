//! # Reconcile
//!
//! Finalizer state machine for a ServiceAccount, followed by the two health
//! passes (secret validation and drift detection).
//!
//! | state       | finalizer | deletion timestamp | action                                |
//! |-------------|-----------|--------------------|---------------------------------------|
//! | Unfinalized | no        | no                 | attach finalizer, provision if needed |
//! | Finalized   | yes       | no                 | none                                  |
//! | Terminating | yes       | yes                | delete owned tokens, drop finalizer   |
//! | Released    | no        | yes                | none                                  |
//!
//! The ServiceAccount is read once, mutated on a clone and written back with a
//! single `replace`, so the resource version of the read guards the write.

use crate::constants::{
    ACTION_RECONCILE, FINALIZER, MESSAGE_CREATE_SECRET_SUCCESSFULLY, REASON_SYNCED,
};
use crate::controller::reconciler::drift::check_service_account_ref_pods;
use crate::controller::reconciler::secrets::{
    check_all_secrets, create_token_secret, delete_token_secrets,
};
use crate::controller::reconciler::types::{resource_key, Reconciler, ReconcilerError};
use crate::crd::ServiceAccount;
use crate::observability::metrics;
use kube::Resource;
use kube_runtime::controller::Action;
use kube_runtime::events::EventType;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, Instrument};

/// Where a ServiceAccount stands with respect to the finalizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unfinalized,
    Finalized,
    Terminating,
    Released,
}

impl LifecycleState {
    #[must_use]
    pub fn of(service_account: &ServiceAccount) -> Self {
        match (
            service_account.has_finalizer(FINALIZER),
            service_account.is_terminating(),
        ) {
            (false, false) => Self::Unfinalized,
            (true, false) => Self::Finalized,
            (true, true) => Self::Terminating,
            (false, true) => Self::Released,
        }
    }
}

/// Controller entry point
///
/// The object handed over by the watch is only used for its key; the current
/// state is fetched again from the API server.
pub async fn reconcile(
    service_account: Arc<ServiceAccount>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let name = service_account
        .meta()
        .name
        .clone()
        .ok_or(ReconcilerError::MissingMetadata("metadata.name"))?;
    let namespace = service_account
        .meta()
        .namespace
        .clone()
        .ok_or(ReconcilerError::MissingMetadata("metadata.namespace"))?;

    let span = tracing::info_span!(
        "reconcile",
        resource.name = name.as_str(),
        resource.namespace = namespace.as_str()
    );

    async move {
        let start = Instant::now();
        metrics::increment_reconciliations();

        let result = reconcile_service_account(&ctx, &namespace, &name).await;
        metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                if ctx.reset_backoff(&resource_key(&namespace, &name)) {
                    info!("Backoff reset after successful reconciliation");
                }
                debug!(
                    duration_secs = start.elapsed().as_secs_f64(),
                    "reconciliation complete"
                );
                Ok(Action::await_change())
            }
            Err(e) => {
                error!("reconcile service account {}/{} failed: {}", namespace, name, e);
                Err(e)
            }
        }
    }
    .instrument(span)
    .await
}

/// Reconcile the ServiceAccount `namespace/name` as currently stored
///
/// An absent ServiceAccount is not an error: there is nothing left to do.
pub async fn reconcile_service_account(
    ctx: &Reconciler,
    namespace: &str,
    name: &str,
) -> Result<(), ReconcilerError> {
    let snapshot = match ctx.client.get_service_account(namespace, name).await {
        Ok(service_account) => service_account,
        Err(e) if e.is_not_found() => {
            debug!("service account no longer exists");
            ctx.reset_backoff(&resource_key(namespace, name));
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let current = match LifecycleState::of(&snapshot) {
        LifecycleState::Unfinalized => attach_finalizer(ctx, &snapshot).await?,
        LifecycleState::Terminating => release_finalizer(ctx, &snapshot).await?,
        LifecycleState::Finalized | LifecycleState::Released => snapshot,
    };

    check_all_secrets(ctx, &current).await?;
    check_service_account_ref_pods(ctx, &current).await?;
    Ok(())
}

/// Add the finalizer, provisioning a token first when the account has none
async fn attach_finalizer(
    ctx: &Reconciler,
    snapshot: &ServiceAccount,
) -> Result<ServiceAccount, ReconcilerError> {
    let mut updated = snapshot.clone();
    updated.add_finalizer(FINALIZER);

    if updated.secrets.is_empty() {
        let reference = create_token_secret(ctx, &updated).await?;
        info!(
            secret.name = reference.name.as_deref().unwrap_or_default(),
            "provisioned token secret"
        );
        updated.secrets.push(reference);
        ctx.events
            .publish(
                &snapshot.object_ref(&()),
                EventType::Normal,
                REASON_SYNCED,
                ACTION_RECONCILE,
                Some(MESSAGE_CREATE_SECRET_SUCCESSFULLY.to_string()),
            )
            .await;
    }

    let persisted = ctx.client.replace_service_account(&updated).await?;
    debug!("finalizer attached");
    Ok(persisted)
}

/// Delete the account's own tokens, then let the API server remove the object
async fn release_finalizer(
    ctx: &Reconciler,
    snapshot: &ServiceAccount,
) -> Result<ServiceAccount, ReconcilerError> {
    delete_token_secrets(ctx, snapshot).await?;

    let mut updated = snapshot.clone();
    updated.remove_finalizer(FINALIZER);
    let persisted = ctx.client.replace_service_account(&updated).await?;
    info!("finalizer removed");
    Ok(persisted)
}
