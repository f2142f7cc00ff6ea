//! Common test utilities for reconciler integration tests
//!
//! Provides an in-memory [`ObjectClient`] with write counters and failure
//! injection, a recording [`EventPublisher`], and object fixtures.

#![allow(dead_code, reason = "Each test binary uses a different subset")]

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::core::v1::{ObjectReference, Pod, Secret};
use ks_serviceaccount_controller::constants::{FINALIZER, RESTARTED_AT_ANNOTATION};
use ks_serviceaccount_controller::controller::client::{ObjectClient, StoreError};
use ks_serviceaccount_controller::controller::events::EventPublisher;
use ks_serviceaccount_controller::controller::reconciler::Reconciler;
use ks_serviceaccount_controller::crd::ServiceAccount;
use kube::Resource;
use kube_runtime::events::EventType;
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

type Objects<K> = BTreeMap<(String, String), K>;

fn key(namespace: &str, name: &str) -> (String, String) {
    (namespace.to_string(), name.to_string())
}

fn key_of<K: Resource>(obj: &K) -> (String, String) {
    let meta = obj.meta();
    key(
        meta.namespace.as_deref().unwrap_or("default"),
        meta.name.as_deref().unwrap_or_default(),
    )
}

/// Error the real API server would return for a broken connection
pub fn transport_error(message: &str) -> StoreError {
    StoreError::Api(kube::Error::Service(message.to_string().into()))
}

#[derive(Default)]
struct State {
    service_accounts: Objects<ServiceAccount>,
    secrets: Objects<Secret>,
    pods: Vec<Pod>,
    replica_sets: Objects<ReplicaSet>,
    deployments: Objects<Deployment>,
    stateful_sets: Objects<StatefulSet>,
    daemon_sets: Objects<DaemonSet>,
    writes: usize,
    secrets_created: usize,
    next_resource_version: u64,
    failing_secret_gets: HashSet<String>,
    failing_workload_writes: bool,
    failing_secret_creates: bool,
    failing_service_account_replaces: bool,
    unnamed_created_secrets: bool,
}

impl State {
    fn bump<K: Resource>(&mut self, obj: &mut K) {
        self.next_resource_version += 1;
        obj.meta_mut().resource_version = Some(self.next_resource_version.to_string());
    }
}

/// In-memory object store
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert_service_account(&self, mut service_account: ServiceAccount) {
        let mut state = self.state.lock().unwrap();
        state.bump(&mut service_account);
        state
            .service_accounts
            .insert(key_of(&service_account), service_account);
    }

    pub fn insert_secret(&self, secret: Secret) {
        let mut state = self.state.lock().unwrap();
        state.secrets.insert(key_of(&secret), secret);
    }

    pub fn insert_pod(&self, pod: Pod) {
        self.state.lock().unwrap().pods.push(pod);
    }

    pub fn insert_replica_set(&self, replica_set: ReplicaSet) {
        let mut state = self.state.lock().unwrap();
        state.replica_sets.insert(key_of(&replica_set), replica_set);
    }

    pub fn insert_deployment(&self, deployment: Deployment) {
        let mut state = self.state.lock().unwrap();
        state.deployments.insert(key_of(&deployment), deployment);
    }

    pub fn insert_stateful_set(&self, stateful_set: StatefulSet) {
        let mut state = self.state.lock().unwrap();
        state.stateful_sets.insert(key_of(&stateful_set), stateful_set);
    }

    pub fn insert_daemon_set(&self, daemon_set: DaemonSet) {
        let mut state = self.state.lock().unwrap();
        state.daemon_sets.insert(key_of(&daemon_set), daemon_set);
    }

    /// Make `get_secret` fail with a transport error for `name`
    pub fn fail_secret_get(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_secret_gets
            .insert(name.to_string());
    }

    /// Make every Deployment, StatefulSet and DaemonSet write fail
    pub fn fail_workload_writes(&self) {
        self.state.lock().unwrap().failing_workload_writes = true;
    }

    /// Make every `create_secret` fail with a transport error
    pub fn fail_secret_create(&self) {
        self.state.lock().unwrap().failing_secret_creates = true;
    }

    /// Make every `replace_service_account` fail with a transport error
    pub fn fail_service_account_replace(&self) {
        self.state.lock().unwrap().failing_service_account_replaces = true;
    }

    /// Store created secrets but answer the create without a name
    pub fn return_unnamed_secrets(&self) {
        self.state.lock().unwrap().unnamed_created_secrets = true;
    }

    pub fn service_account(&self, namespace: &str, name: &str) -> Option<ServiceAccount> {
        let state = self.state.lock().unwrap();
        state.service_accounts.get(&key(namespace, name)).cloned()
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        let state = self.state.lock().unwrap();
        state.secrets.get(&key(namespace, name)).cloned()
    }

    pub fn secret_names(&self, namespace: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .secrets
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        let state = self.state.lock().unwrap();
        state.deployments.get(&key(namespace, name)).cloned()
    }

    pub fn stateful_set(&self, namespace: &str, name: &str) -> Option<StatefulSet> {
        let state = self.state.lock().unwrap();
        state.stateful_sets.get(&key(namespace, name)).cloned()
    }

    pub fn daemon_set(&self, namespace: &str, name: &str) -> Option<DaemonSet> {
        let state = self.state.lock().unwrap();
        state.daemon_sets.get(&key(namespace, name)).cloned()
    }

    /// Number of create, replace and delete calls that succeeded
    pub fn writes(&self) -> usize {
        self.state.lock().unwrap().writes
    }

    pub fn secrets_created(&self) -> usize {
        self.state.lock().unwrap().secrets_created
    }
}

fn get_from<K: Clone>(
    objects: &Objects<K>,
    kind: &str,
    namespace: &str,
    name: &str,
) -> Result<K, StoreError> {
    objects
        .get(&key(namespace, name))
        .cloned()
        .ok_or_else(|| StoreError::not_found(kind, namespace, name))
}

/// Store `obj` unless it is absent or stale, like an API server `replace`
fn replace_in<K: Resource + Clone>(
    state: &mut State,
    select: fn(&mut State) -> &mut Objects<K>,
    kind: &str,
    obj: &K,
) -> Result<K, StoreError> {
    let k = key_of(obj);
    let stored_version = select(state)
        .get(&k)
        .ok_or_else(|| StoreError::not_found(kind, &k.0, &k.1))?
        .meta()
        .resource_version
        .clone();
    if obj.meta().resource_version.is_some() && obj.meta().resource_version != stored_version {
        return Err(transport_error("409 Conflict: the object has been modified"));
    }

    let mut updated = obj.clone();
    state.bump(&mut updated);
    select(state).insert(k, updated.clone());
    state.writes += 1;
    Ok(updated)
}

#[async_trait]
impl ObjectClient for InMemoryStore {
    async fn get_service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ServiceAccount, StoreError> {
        let state = self.state.lock().unwrap();
        get_from(&state.service_accounts, "ServiceAccount", namespace, name)
    }

    async fn replace_service_account(
        &self,
        service_account: &ServiceAccount,
    ) -> Result<ServiceAccount, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_service_account_replaces {
            return Err(transport_error("connection reset"));
        }
        replace_in(
            &mut state,
            |s| &mut s.service_accounts,
            "ServiceAccount",
            service_account,
        )
    }

    async fn create_secret(&self, secret: &Secret) -> Result<Secret, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_secret_creates {
            return Err(transport_error("connection refused"));
        }
        let mut created = secret.clone();
        if created.metadata.name.is_none() {
            let prefix = created.metadata.generate_name.clone().unwrap_or_default();
            created.metadata.name = Some(format!("{prefix}{:05x}", state.secrets_created + 1));
        }
        let k = key_of(&created);
        if state.secrets.contains_key(&k) {
            return Err(transport_error("409 AlreadyExists"));
        }
        state.bump(&mut created);
        state.secrets.insert(k, created.clone());
        state.secrets_created += 1;
        state.writes += 1;
        if state.unnamed_created_secrets {
            created.metadata.name = None;
        }
        Ok(created)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, StoreError> {
        let state = self.state.lock().unwrap();
        if state.failing_secret_gets.contains(name) {
            return Err(transport_error("connection refused"));
        }
        get_from(&state.secrets, "Secret", namespace, name)
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state
            .secrets
            .remove(&key(namespace, name))
            .ok_or_else(|| StoreError::not_found("Secret", namespace, name))?;
        state.writes += 1;
        Ok(())
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .pods
            .iter()
            .filter(|pod| pod.metadata.namespace.as_deref() == Some(namespace))
            .cloned()
            .collect())
    }

    async fn get_replica_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ReplicaSet, StoreError> {
        let state = self.state.lock().unwrap();
        get_from(&state.replica_sets, "ReplicaSet", namespace, name)
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, StoreError> {
        let state = self.state.lock().unwrap();
        get_from(&state.deployments, "Deployment", namespace, name)
    }

    async fn replace_deployment(&self, deployment: &Deployment) -> Result<Deployment, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_workload_writes {
            return Err(transport_error("connection reset"));
        }
        replace_in(&mut state, |s| &mut s.deployments, "Deployment", deployment)
    }

    async fn get_stateful_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<StatefulSet, StoreError> {
        let state = self.state.lock().unwrap();
        get_from(&state.stateful_sets, "StatefulSet", namespace, name)
    }

    async fn replace_stateful_set(
        &self,
        stateful_set: &StatefulSet,
    ) -> Result<StatefulSet, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_workload_writes {
            return Err(transport_error("connection reset"));
        }
        replace_in(&mut state, |s| &mut s.stateful_sets, "StatefulSet", stateful_set)
    }

    async fn get_daemon_set(&self, namespace: &str, name: &str) -> Result<DaemonSet, StoreError> {
        let state = self.state.lock().unwrap();
        get_from(&state.daemon_sets, "DaemonSet", namespace, name)
    }

    async fn replace_daemon_set(&self, daemon_set: &DaemonSet) -> Result<DaemonSet, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_workload_writes {
            return Err(transport_error("connection reset"));
        }
        replace_in(&mut state, |s| &mut s.daemon_sets, "DaemonSet", daemon_set)
    }
}

/// An event captured by [`RecordingEvents`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub object: String,
    pub warning: bool,
    pub reason: String,
    pub action: String,
    pub note: Option<String>,
}

#[derive(Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingEvents {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn with_reason(&self, reason: &str) -> Vec<RecordedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.reason == reason)
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingEvents {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        self.events.lock().unwrap().push(RecordedEvent {
            object: format!(
                "{}/{}",
                resource_ref.namespace.as_deref().unwrap_or_default(),
                resource_ref.name.as_deref().unwrap_or_default()
            ),
            warning: matches!(type_, EventType::Warning),
            reason: reason.to_string(),
            action: action.to_string(),
            note,
        });
    }
}

/// Reconciler wired to a fresh store and event recorder
pub fn harness() -> (Arc<Reconciler>, Arc<InMemoryStore>, Arc<RecordingEvents>) {
    let store = InMemoryStore::new();
    let events = RecordingEvents::new();
    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&store) as Arc<dyn ObjectClient>,
        Arc::clone(&events) as Arc<dyn EventPublisher>,
    ));
    (reconciler, store, events)
}

pub fn service_account(namespace: &str, name: &str) -> ServiceAccount {
    ServiceAccount::new(namespace, name)
}

/// ServiceAccount carrying the finalizer and references to `secrets`
pub fn finalized_service_account(namespace: &str, name: &str, secrets: &[&str]) -> ServiceAccount {
    let mut sa = ServiceAccount::new(namespace, name);
    sa.add_finalizer(FINALIZER);
    sa.secrets = secrets
        .iter()
        .map(|secret| ObjectReference {
            name: Some((*secret).to_string()),
            namespace: Some(namespace.to_string()),
            ..ObjectReference::default()
        })
        .collect();
    sa
}

pub fn terminating(mut sa: ServiceAccount) -> ServiceAccount {
    sa.metadata.deletion_timestamp =
        Some(serde_json::from_value(json!("2024-01-01T00:00:00Z")).unwrap());
    sa
}

/// Token secret of `service_account`
pub fn token_secret(namespace: &str, name: &str, service_account: &str) -> Secret {
    serde_json::from_value(json!({
        "metadata": {
            "name": name,
            "namespace": namespace,
            "annotations": { "kubesphere.io/service-account.name": service_account }
        },
        "type": "kubesphere.io/service-account-token"
    }))
    .unwrap()
}

pub fn opaque_secret(namespace: &str, name: &str) -> Secret {
    serde_json::from_value(json!({
        "metadata": { "name": name, "namespace": namespace },
        "type": "Opaque"
    }))
    .unwrap()
}

/// Pod consuming `service_account` through a projected volume of `mounted_secret`
pub fn consumer_pod(
    namespace: &str,
    name: &str,
    service_account: &str,
    mounted_secret: &str,
    owner: Option<(&str, &str)>,
) -> Pod {
    let owner_references = owner
        .map(|(kind, owner_name)| {
            json!([{
                "apiVersion": "apps/v1",
                "kind": kind,
                "name": owner_name,
                "uid": format!("{owner_name}-uid")
            }])
        })
        .unwrap_or_else(|| json!([]));
    serde_json::from_value(json!({
        "metadata": {
            "name": name,
            "namespace": namespace,
            "annotations": { "kubesphere.io/serviceaccount-name": service_account },
            "ownerReferences": owner_references
        },
        "spec": {
            "containers": [{ "name": "app", "image": "busybox" }],
            "volumes": [{
                "name": "kubesphere-service-account",
                "projected": { "sources": [{ "secret": { "name": mounted_secret } }] }
            }]
        }
    }))
    .unwrap()
}

fn workload_json(namespace: &str, name: &str, extra_spec: serde_json::Value) -> serde_json::Value {
    let mut spec = json!({
        "selector": { "matchLabels": { "app": name } },
        "template": {
            "metadata": { "labels": { "app": name } },
            "spec": { "containers": [{ "name": "app", "image": "busybox" }] }
        }
    });
    if let (Some(spec), Some(extra)) = (spec.as_object_mut(), extra_spec.as_object()) {
        spec.extend(extra.clone());
    }
    json!({
        "metadata": { "name": name, "namespace": namespace },
        "spec": spec
    })
}

pub fn deployment(namespace: &str, name: &str) -> Deployment {
    serde_json::from_value(workload_json(namespace, name, json!({}))).unwrap()
}

pub fn stateful_set(namespace: &str, name: &str) -> StatefulSet {
    serde_json::from_value(workload_json(namespace, name, json!({ "serviceName": name }))).unwrap()
}

pub fn daemon_set(namespace: &str, name: &str) -> DaemonSet {
    serde_json::from_value(workload_json(namespace, name, json!({}))).unwrap()
}

/// ReplicaSet owned by `owner` as `(kind, name)`
pub fn replica_set(namespace: &str, name: &str, owner: Option<(&str, &str)>) -> ReplicaSet {
    let mut value = workload_json(namespace, name, json!({}));
    if let Some((kind, owner_name)) = owner {
        value["metadata"]["ownerReferences"] = json!([{
            "apiVersion": "apps/v1",
            "kind": kind,
            "name": owner_name,
            "uid": format!("{owner_name}-uid")
        }]);
    }
    serde_json::from_value(value).unwrap()
}

/// `kubesphere.io/restartedAt` on a pod template, if stamped
pub fn restarted_at(template: &k8s_openapi::api::core::v1::PodTemplateSpec) -> Option<String> {
    template
        .metadata
        .as_ref()?
        .annotations
        .as_ref()?
        .get(RESTARTED_AT_ANNOTATION)
        .cloned()
}
