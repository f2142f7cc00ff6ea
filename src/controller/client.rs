//! # Object Client
//!
//! Typed access to the cluster's object store.
//!
//! The reconciler only talks to the API server through [`ObjectClient`], so
//! the whole state machine can be driven against an in-memory store in tests.
//! [`KubeObjectClient`] is the production implementation on top of
//! `kube::Api`.
//!
//! Writes use `replace`, which sends the `resourceVersion` of the object that
//! was read. A concurrent write elsewhere makes the API server answer 409 and
//! the error is surfaced unchanged; retrying is left to the controller's error
//! policy.

use crate::crd::ServiceAccount;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::core::v1::{Pod, Secret};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use thiserror::Error;

/// Errors returned by an [`ObjectClient`]
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },
    #[error("object {0} has no name")]
    MissingName(&'static str),
    #[error("Kubernetes API request failed: {0}")]
    Api(#[from] kube::Error),
}

impl StoreError {
    pub fn not_found(kind: &str, namespace: &str, name: &str) -> Self {
        Self::NotFound {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Object store operations needed by the reconciler
#[async_trait]
pub trait ObjectClient: Send + Sync {
    async fn get_service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ServiceAccount, StoreError>;

    /// Replace the whole object. Fails on a resourceVersion conflict.
    async fn replace_service_account(
        &self,
        service_account: &ServiceAccount,
    ) -> Result<ServiceAccount, StoreError>;

    /// Create a secret. The store resolves `metadata.generateName`.
    async fn create_secret(&self, secret: &Secret) -> Result<Secret, StoreError>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, StoreError>;

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), StoreError>;

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>, StoreError>;

    async fn get_replica_set(&self, namespace: &str, name: &str)
        -> Result<ReplicaSet, StoreError>;

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, StoreError>;

    async fn replace_deployment(&self, deployment: &Deployment) -> Result<Deployment, StoreError>;

    async fn get_stateful_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<StatefulSet, StoreError>;

    async fn replace_stateful_set(
        &self,
        stateful_set: &StatefulSet,
    ) -> Result<StatefulSet, StoreError>;

    async fn get_daemon_set(&self, namespace: &str, name: &str) -> Result<DaemonSet, StoreError>;

    async fn replace_daemon_set(&self, daemon_set: &DaemonSet) -> Result<DaemonSet, StoreError>;
}

/// [`ObjectClient`] backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeObjectClient {
    client: Client,
}

impl Debug for KubeObjectClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeObjectClient").finish_non_exhaustive()
    }
}

impl KubeObjectClient {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn get<K>(&self, namespace: &str, name: &str) -> Result<K, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        match self.api::<K>(namespace).get(name).await {
            Ok(obj) => Ok(obj),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
                Err(StoreError::not_found(&K::kind(&()), namespace, name))
            }
            Err(e) => Err(StoreError::Api(e)),
        }
    }

    async fn replace<K>(&self, obj: &K) -> Result<K, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Serialize
            + Debug,
    {
        let meta = obj.meta();
        let name = meta
            .name
            .as_deref()
            .ok_or(StoreError::MissingName(std::any::type_name::<K>()))?;
        let namespace = meta.namespace.as_deref().unwrap_or("default");
        match self
            .api::<K>(namespace)
            .replace(name, &PostParams::default(), obj)
            .await
        {
            Ok(updated) => Ok(updated),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
                Err(StoreError::not_found(&K::kind(&()), namespace, name))
            }
            Err(e) => Err(StoreError::Api(e)),
        }
    }
}

#[async_trait]
impl ObjectClient for KubeObjectClient {
    async fn get_service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ServiceAccount, StoreError> {
        self.get(namespace, name).await
    }

    async fn replace_service_account(
        &self,
        service_account: &ServiceAccount,
    ) -> Result<ServiceAccount, StoreError> {
        self.replace(service_account).await
    }

    async fn create_secret(&self, secret: &Secret) -> Result<Secret, StoreError> {
        let namespace = secret.metadata.namespace.as_deref().unwrap_or("default");
        let created = self
            .api::<Secret>(namespace)
            .create(&PostParams::default(), secret)
            .await?;
        Ok(created)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, StoreError> {
        self.get(namespace, name).await
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        match self
            .api::<Secret>(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
                Err(StoreError::not_found("Secret", namespace, name))
            }
            Err(e) => Err(StoreError::Api(e)),
        }
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>, StoreError> {
        let pods = self
            .api::<Pod>(namespace)
            .list(&ListParams::default())
            .await?;
        Ok(pods.items)
    }

    async fn get_replica_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ReplicaSet, StoreError> {
        self.get(namespace, name).await
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, StoreError> {
        self.get(namespace, name).await
    }

    async fn replace_deployment(&self, deployment: &Deployment) -> Result<Deployment, StoreError> {
        self.replace(deployment).await
    }

    async fn get_stateful_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<StatefulSet, StoreError> {
        self.get(namespace, name).await
    }

    async fn replace_stateful_set(
        &self,
        stateful_set: &StatefulSet,
    ) -> Result<StatefulSet, StoreError> {
        self.replace(stateful_set).await
    }

    async fn get_daemon_set(&self, namespace: &str, name: &str) -> Result<DaemonSet, StoreError> {
        self.get(namespace, name).await
    }

    async fn replace_daemon_set(&self, daemon_set: &DaemonSet) -> Result<DaemonSet, StoreError> {
        self.replace(daemon_set).await
    }
}
