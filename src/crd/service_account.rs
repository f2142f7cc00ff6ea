//! # ServiceAccount
//!
//! KubeSphere's ServiceAccount keeps its token references at the top level of
//! the object (next to `metadata`), the same way the core v1 ServiceAccount
//! does, so it cannot be expressed with `#[derive(CustomResource)]` (which
//! always nests user fields under `spec`). `kube::Resource` is implemented by
//! hand instead, following `kube::core::DynamicObject`.

use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::NamespaceResourceScope;
use kube::core::TypeMeta;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

pub const GROUP: &str = "kubesphere.io";
pub const VERSION: &str = "v1alpha1";
pub const API_VERSION: &str = "kubesphere.io/v1alpha1";
pub const KIND: &str = "ServiceAccount";
pub const PLURAL: &str = "serviceaccounts";

/// KubeSphere ServiceAccount
///
/// ```yaml
/// apiVersion: kubesphere.io/v1alpha1
/// kind: ServiceAccount
/// metadata:
///   name: sa1
///   namespace: ns1
///   finalizers:
///     - finalizers.kubesphere.io/serviceaccount
/// secrets:
///   - namespace: ns1
///     name: sa1-x7k2p
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccount {
    /// apiVersion and kind, absent on objects built in memory
    #[serde(flatten, default)]
    pub types: Option<TypeMeta>,
    pub metadata: ObjectMeta,
    /// Token secrets bound to this account. The first entry is the current one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<ObjectReference>,
}

impl kube::Resource for ServiceAccount {
    type DynamicType = ();
    type Scope = NamespaceResourceScope;

    fn kind(_: &()) -> Cow<'_, str> {
        Cow::Borrowed(KIND)
    }

    fn group(_: &()) -> Cow<'_, str> {
        Cow::Borrowed(GROUP)
    }

    fn version(_: &()) -> Cow<'_, str> {
        Cow::Borrowed(VERSION)
    }

    fn api_version(_: &()) -> Cow<'_, str> {
        Cow::Borrowed(API_VERSION)
    }

    fn plural(_: &()) -> Cow<'_, str> {
        Cow::Borrowed(PLURAL)
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl ServiceAccount {
    /// Build an empty ServiceAccount with apiVersion and kind filled in
    #[must_use]
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            types: Some(TypeMeta {
                api_version: API_VERSION.to_string(),
                kind: KIND.to_string(),
            }),
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..ObjectMeta::default()
            },
            secrets: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or_default()
    }

    /// True once the API server has recorded a deletion request
    #[must_use]
    pub fn is_terminating(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    #[must_use]
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|finalizers| finalizers.iter().any(|f| f == finalizer))
    }

    /// Append `finalizer` unless it is already present
    pub fn add_finalizer(&mut self, finalizer: &str) {
        if self.has_finalizer(finalizer) {
            return;
        }
        self.metadata
            .finalizers
            .get_or_insert_with(Vec::new)
            .push(finalizer.to_string());
    }

    /// Remove every occurrence of `finalizer`. Returns true if anything was removed.
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let Some(finalizers) = self.metadata.finalizers.as_mut() else {
            return false;
        };
        let before = finalizers.len();
        finalizers.retain(|f| f != finalizer);
        before != finalizers.len()
    }

    /// Name of the current token secret (the first reference), if any
    #[must_use]
    pub fn current_secret_name(&self) -> Option<&str> {
        self.secrets.first().and_then(|r| r.name.as_deref())
    }
}
