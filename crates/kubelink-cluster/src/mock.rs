//! In-memory cluster for testing without a real API server.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec, PodStatus};
use kube::api::ObjectMeta;
use kubelink_core::{KubelinkError, ResourceDescriptor, Result};
use parking_lot::Mutex;
use serde_json::Value;

use crate::config::LoadedConfig;
use crate::ops::{ClusterHandles, Connector, GenericResourceOps, TypedResourceOps};
use crate::types::{DeleteOptions, ListOptions, LogOptions};

type DocumentKey = (String, String, String, String, String);

fn document_key(target: &ResourceDescriptor, name: &str) -> DocumentKey {
    (
        target.group.clone(),
        target.version.clone(),
        target.resource.clone(),
        target.namespace.clone(),
        name.to_string(),
    )
}

#[derive(Default)]
struct MockState {
    namespaces: BTreeSet<String>,
    pods: Vec<Pod>,
    deployments: Vec<Deployment>,
    documents: BTreeMap<DocumentKey, Value>,
    logs: HashMap<(String, String, String, bool), Vec<u8>>,
    failures: VecDeque<KubelinkError>,
    probe_error: Option<KubelinkError>,
    last_delete: Option<DeleteOptions>,
    last_log_options: Option<LogOptions>,
}

/// A mock cluster that stores objects in memory.
///
/// Each instance carries a label so tests can tell which cluster served a
/// call. Failures queued with [`MockCluster::fail_next`] are returned by the
/// next calls in FIFO order, before any state is consulted.
pub struct MockCluster {
    label: String,
    state: Mutex<MockState>,
    calls: AtomicUsize,
}

impl MockCluster {
    /// Create an empty cluster containing only the `default` namespace.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        let mut state = MockState::default();
        state.namespaces.insert("default".to_string());
        Self {
            label: label.into(),
            state: Mutex::new(state),
            calls: AtomicUsize::new(0),
        }
    }

    /// The label given at construction.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of calls served, including failed ones.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Add a namespace.
    pub fn add_namespace(&self, namespace: impl Into<String>) {
        self.state.lock().namespaces.insert(namespace.into());
    }

    /// Add a pod, creating its namespace if needed.
    pub fn add_pod(&self, pod: Pod) {
        let mut state = self.state.lock();
        if let Some(ns) = pod.metadata.namespace.clone() {
            state.namespaces.insert(ns);
        }
        state.pods.push(pod);
    }

    /// Add a deployment, creating its namespace if needed.
    pub fn add_deployment(&self, deployment: Deployment) {
        let mut state = self.state.lock();
        if let Some(ns) = deployment.metadata.namespace.clone() {
            state.namespaces.insert(ns);
        }
        state.deployments.push(deployment);
    }

    /// Store a generic document under `target`.
    pub fn add_document(&self, target: &ResourceDescriptor, document: Value) {
        let mut state = self.state.lock();
        if !target.namespace.is_empty() {
            state.namespaces.insert(target.namespace.clone());
        }
        state
            .documents
            .insert(document_key(target, &target.name), document);
    }

    /// Fetch a stored generic document.
    #[must_use]
    pub fn document(&self, target: &ResourceDescriptor) -> Option<Value> {
        self.state
            .lock()
            .documents
            .get(&document_key(target, &target.name))
            .cloned()
    }

    /// Set the log output of a container.
    pub fn set_logs(&self, namespace: &str, pod: &str, container: &str, previous: bool, logs: &[u8]) {
        self.state.lock().logs.insert(
            (
                namespace.to_string(),
                pod.to_string(),
                container.to_string(),
                previous,
            ),
            logs.to_vec(),
        );
    }

    /// Queue an error returned by the next call.
    pub fn fail_next(&self, error: KubelinkError) {
        self.state.lock().failures.push_back(error);
    }

    /// Make every probe fail with `error`.
    pub fn fail_probe(&self, error: KubelinkError) {
        self.state.lock().probe_error = Some(error);
    }

    /// Options of the most recent delete call.
    #[must_use]
    pub fn last_delete(&self) -> Option<DeleteOptions> {
        self.state.lock().last_delete
    }

    /// Options of the most recent log read.
    #[must_use]
    pub fn last_log_options(&self) -> Option<LogOptions> {
        self.state.lock().last_log_options.clone()
    }

    fn begin(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.state.lock().failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn in_namespace(meta: &ObjectMeta, namespace: &str) -> bool {
    namespace.is_empty() || meta.namespace.as_deref() == Some(namespace)
}

fn matches_labels(meta: &ObjectMeta, options: &ListOptions) -> bool {
    let Some(selector) = options.label_selector.as_deref().filter(|s| !s.is_empty()) else {
        return true;
    };
    let labels = meta.labels.clone().unwrap_or_default();
    selector.split(',').all(|term| match term.split_once('=') {
        Some((key, value)) => labels.get(key.trim()).map(String::as_str) == Some(value.trim()),
        None => labels.contains_key(term.trim()),
    })
}

fn apply_limit<T>(mut items: Vec<T>, options: &ListOptions) -> Vec<T> {
    if let Some(limit) = options.limit.filter(|l| *l > 0) {
        items.truncate(limit as usize);
    }
    items
}

fn document_meta(document: &Value) -> ObjectMeta {
    document
        .get("metadata")
        .cloned()
        .and_then(|m| serde_json::from_value(m).ok())
        .unwrap_or_default()
}

#[async_trait]
impl TypedResourceOps for MockCluster {
    async fn probe(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.state.lock().probe_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        self.begin()?;
        Ok(self.state.lock().namespaces.contains(namespace))
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        self.begin()?;
        self.state
            .lock()
            .pods
            .iter()
            .find(|p| in_namespace(&p.metadata, namespace) && p.metadata.name.as_deref() == Some(name))
            .cloned()
            .ok_or_else(|| {
                KubelinkError::not_found(format!(
                    "pod '{name}' in namespace '{namespace}' not found"
                ))
            })
    }

    async fn list_pods(&self, namespace: &str, options: &ListOptions) -> Result<Vec<Pod>> {
        self.begin()?;
        let pods = self
            .state
            .lock()
            .pods
            .iter()
            .filter(|p| in_namespace(&p.metadata, namespace) && matches_labels(&p.metadata, options))
            .cloned()
            .collect();
        Ok(apply_limit(pods, options))
    }

    async fn delete_pod(&self, namespace: &str, name: &str, options: DeleteOptions) -> Result<()> {
        self.begin()?;
        let mut state = self.state.lock();
        let before = state.pods.len();
        state.pods.retain(|p| {
            !(p.metadata.namespace.as_deref() == Some(namespace)
                && p.metadata.name.as_deref() == Some(name))
        });
        if state.pods.len() == before {
            return Err(KubelinkError::not_found(format!(
                "pod '{name}' in namespace '{namespace}' not found"
            )));
        }
        state.last_delete = Some(options);
        Ok(())
    }

    async fn read_pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        options: &LogOptions,
        max_bytes: usize,
    ) -> Result<Vec<u8>> {
        self.begin()?;
        let mut state = self.state.lock();
        state.last_log_options = Some(options.clone());
        let mut logs = state
            .logs
            .get(&(
                namespace.to_string(),
                pod.to_string(),
                options.container.clone(),
                options.previous,
            ))
            .cloned()
            .unwrap_or_default();
        logs.truncate(max_bytes);
        Ok(logs)
    }

    async fn list_deployments(
        &self,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<Vec<Deployment>> {
        self.begin()?;
        let deployments = self
            .state
            .lock()
            .deployments
            .iter()
            .filter(|d| in_namespace(&d.metadata, namespace) && matches_labels(&d.metadata, options))
            .cloned()
            .collect();
        Ok(apply_limit(deployments, options))
    }
}

#[async_trait]
impl GenericResourceOps for MockCluster {
    async fn get(&self, target: &ResourceDescriptor) -> Result<Value> {
        self.begin()?;
        self.state
            .lock()
            .documents
            .get(&document_key(target, &target.name))
            .cloned()
            .ok_or_else(|| {
                KubelinkError::not_found(format!(
                    "{} '{}' in namespace '{}' not found",
                    target.resource, target.name, target.namespace
                ))
            })
    }

    async fn list(&self, target: &ResourceDescriptor, options: &ListOptions) -> Result<Vec<Value>> {
        self.begin()?;
        let documents = self
            .state
            .lock()
            .documents
            .iter()
            .filter(|((group, version, resource, namespace, _), _)| {
                *group == target.group
                    && *version == target.version
                    && *resource == target.resource
                    && (target.namespace.is_empty() || *namespace == target.namespace)
            })
            .filter(|(_, doc)| matches_labels(&document_meta(doc), options))
            .map(|(_, doc)| doc.clone())
            .collect();
        Ok(apply_limit(documents, options))
    }

    async fn create(&self, target: &ResourceDescriptor, document: &Value) -> Result<Value> {
        self.begin()?;
        let name = document_meta(document)
            .name
            .unwrap_or_else(|| target.name.clone());
        if name.is_empty() {
            return Err(KubelinkError::validation("document has no metadata.name"));
        }

        let mut state = self.state.lock();
        if !target.namespace.is_empty() && !state.namespaces.contains(&target.namespace) {
            return Err(KubelinkError::not_found(format!(
                "namespace '{}' not found",
                target.namespace
            )));
        }

        let key = document_key(target, &name);
        if state.documents.contains_key(&key) {
            return Err(KubelinkError::validation(format!(
                "{} '{name}' already exists",
                target.resource
            )));
        }
        state.documents.insert(key, document.clone());
        Ok(document.clone())
    }

    async fn delete(&self, target: &ResourceDescriptor, options: DeleteOptions) -> Result<()> {
        self.begin()?;
        let mut state = self.state.lock();
        if state
            .documents
            .remove(&document_key(target, &target.name))
            .is_none()
        {
            return Err(KubelinkError::not_found(format!(
                "{} '{}' in namespace '{}' not found",
                target.resource, target.name, target.namespace
            )));
        }
        state.last_delete = Some(options);
        Ok(())
    }
}

/// A connector that hands out [`MockCluster`]s keyed by kubeconfig path.
///
/// Connecting with a path that has no registered cluster fails with a
/// connection error, mimicking an unreachable API server.
#[derive(Default)]
pub struct MockConnector {
    clusters: Mutex<HashMap<PathBuf, Arc<MockCluster>>>,
}

impl MockConnector {
    /// Create a connector with no reachable clusters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `cluster` for configs loaded from `path`.
    pub fn insert(&self, path: impl AsRef<Path>, cluster: Arc<MockCluster>) {
        self.clusters
            .lock()
            .insert(path.as_ref().to_path_buf(), cluster);
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, config: &LoadedConfig) -> Result<ClusterHandles> {
        let cluster = self
            .clusters
            .lock()
            .get(&config.source_path)
            .cloned()
            .ok_or_else(|| {
                KubelinkError::connection(format!(
                    "no API server reachable for {}",
                    config.source_path.display()
                ))
            })?;

        Ok(ClusterHandles {
            typed: cluster.clone(),
            generic: cluster,
            declared_context: config.current_context.clone(),
        })
    }
}

/// Build a pod with the given phase and container names.
#[must_use]
pub fn pod(namespace: &str, name: &str, phase: &str, containers: &[&str]) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: containers
                .iter()
                .map(|c| Container {
                    name: (*c).to_string(),
                    image: Some("busybox".to_string()),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }),
        status: Some(PodStatus {
            phase: Some(phase.to_string()),
            ..Default::default()
        }),
    }
}
