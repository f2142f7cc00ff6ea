//! # Token Secrets
//!
//! Provisioning, cleanup and validation of the token secrets referenced by a
//! ServiceAccount.

use crate::constants::{
    ACTION_RECONCILE, REASON_INVALID_SECRET, SECRET_SERVICE_ACCOUNT_NAME_ANNOTATION,
    SECRET_TYPE_SERVICE_ACCOUNT_TOKEN,
};
use crate::controller::client::StoreError;
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::controller::reconciler::validation::check_secret_token;
use crate::crd::ServiceAccount;
use crate::observability::metrics;
use k8s_openapi::api::core::v1::{ObjectReference, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use kube_runtime::events::EventType;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Token secret for `service_account`, not yet created.
/// The API server appends a random suffix to `<name>-`.
#[must_use]
pub fn build_token_secret(service_account: &ServiceAccount) -> Secret {
    Secret {
        metadata: ObjectMeta {
            generate_name: Some(format!("{}-", service_account.name())),
            namespace: Some(service_account.namespace().to_string()),
            annotations: Some(BTreeMap::from([(
                SECRET_SERVICE_ACCOUNT_NAME_ANNOTATION.to_string(),
                service_account.name().to_string(),
            )])),
            ..ObjectMeta::default()
        },
        type_: Some(SECRET_TYPE_SERVICE_ACCOUNT_TOKEN.to_string()),
        ..Secret::default()
    }
}

/// Create a token secret for `service_account` and return a reference to it
pub async fn create_token_secret(
    ctx: &Reconciler,
    service_account: &ServiceAccount,
) -> Result<ObjectReference, ReconcilerError> {
    let created = ctx
        .client
        .create_secret(&build_token_secret(service_account))
        .await?;
    metrics::increment_secrets_created();

    let name = created
        .metadata
        .name
        .ok_or(StoreError::MissingName("Secret"))?;
    let namespace = created
        .metadata
        .namespace
        .unwrap_or_else(|| service_account.namespace().to_string());
    debug!(secret.name = %name, secret.namespace = %namespace, "secret created successfully");

    Ok(ObjectReference {
        namespace: Some(namespace),
        name: Some(name),
        ..ObjectReference::default()
    })
}

/// Delete every referenced secret that is a valid token for `service_account`
///
/// Missing secrets are skipped. Secrets that are not tokens of this account
/// are left alone. Any other error stops the pass and leaves the remaining
/// references untouched.
pub async fn delete_token_secrets(
    ctx: &Reconciler,
    service_account: &ServiceAccount,
) -> Result<(), ReconcilerError> {
    for reference in &service_account.secrets {
        let Some(name) = reference.name.as_deref() else {
            warn!("skipping secret reference without a name");
            continue;
        };
        let namespace = reference
            .namespace
            .as_deref()
            .unwrap_or(service_account.namespace());

        let secret = match ctx.client.get_secret(namespace, name).await {
            Ok(secret) => secret,
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e.into()),
        };

        if let Err(reason) = check_secret_token(&secret, service_account.name()) {
            debug!(
                secret.name = name,
                %reason,
                "leaving secret that does not belong to this service account"
            );
            continue;
        }

        match ctx.client.delete_secret(namespace, name).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e.into()),
        }
        metrics::increment_secrets_deleted();
        info!(secret.name = name, secret.namespace = namespace, "delete secret successfully");
    }
    Ok(())
}

/// Report every referenced secret that is missing or not a valid token
///
/// Problems are published as `InvalidSecret` warnings on the ServiceAccount.
/// Nothing is repaired.
pub async fn check_all_secrets(
    ctx: &Reconciler,
    service_account: &ServiceAccount,
) -> Result<(), ReconcilerError> {
    let object_ref = service_account.object_ref(&());

    for reference in &service_account.secrets {
        let name = reference.name.as_deref().unwrap_or_default();
        let note = if name.is_empty() {
            "secret reference has no name".to_string()
        } else {
            match ctx.client.get_secret(service_account.namespace(), name).await {
                Ok(secret) => match check_secret_token(&secret, service_account.name()) {
                    Ok(()) => continue,
                    Err(reason) => reason.to_string(),
                },
                Err(e) if e.is_not_found() => e.to_string(),
                Err(e) => return Err(e.into()),
            }
        };

        warn!(secret.name = name, reason = %note, "invalid secret referenced by service account");
        metrics::increment_invalid_secrets();
        ctx.events
            .publish(
                &object_ref,
                EventType::Warning,
                REASON_INVALID_SECRET,
                ACTION_RECONCILE,
                Some(note),
            )
            .await;
    }
    Ok(())
}
