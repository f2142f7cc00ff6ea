//! # Token Validation
//!
//! Decides whether a secret is a token that belongs to a given ServiceAccount.
//! Used both to attribute secrets before deleting them and by the validation
//! pass that runs on every reconcile.

use crate::constants::{SECRET_SERVICE_ACCOUNT_NAME_ANNOTATION, SECRET_TYPE_SERVICE_ACCOUNT_TOKEN};
use k8s_openapi::api::core::v1::Secret;
use thiserror::Error;

/// Why a secret is not a valid token for a ServiceAccount
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidToken {
    #[error("unsupported secret {secret} type: {secret_type}")]
    UnsupportedType { secret: String, secret_type: String },
    #[error("incorrect subject name {found}")]
    SubjectMismatch { found: String },
}

/// Check that `secret` is a service account token bound to `subject_name`
///
/// The type is checked first, so a secret that fails both checks reports
/// `UnsupportedType`.
pub fn check_secret_token(secret: &Secret, subject_name: &str) -> Result<(), InvalidToken> {
    let secret_type = secret.type_.as_deref().unwrap_or_default();
    if secret_type != SECRET_TYPE_SERVICE_ACCOUNT_TOKEN {
        return Err(InvalidToken::UnsupportedType {
            secret: secret.metadata.name.clone().unwrap_or_default(),
            secret_type: secret_type.to_string(),
        });
    }

    let bound_to = secret
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(SECRET_SERVICE_ACCOUNT_NAME_ANNOTATION))
        .map(String::as_str)
        .unwrap_or_default();
    if bound_to != subject_name {
        return Err(InvalidToken::SubjectMismatch {
            found: bound_to.to_string(),
        });
    }

    Ok(())
}

#[must_use]
pub fn is_valid_token(secret: &Secret, subject_name: &str) -> bool {
    check_secret_token(secret, subject_name).is_ok()
}
