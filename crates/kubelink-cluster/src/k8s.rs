//! Kubernetes client implementation.
//!
//! This module provides [`KubeConnector`], which builds a `kube::Client` from a
//! loaded kubeconfig and wraps it in the typed and generic capability traits.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use futures::AsyncReadExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Pod};
use kube::api::{Api, ApiResource, DynamicObject, ListParams, PostParams};
use kube::config::KubeConfigOptions;
use kube::{Client, Config};
use kubelink_core::{KubelinkError, ResourceDescriptor, Result};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::LoadedConfig;
use crate::error::from_kube;
use crate::ops::{ClusterHandles, Connector, GenericResourceOps, TypedResourceOps};
use crate::types::{DeleteOptions, ListOptions, LogOptions};

/// Builds `kube` clients from loaded kubeconfig documents.
///
/// Each document connects through its declared current context.
#[derive(Debug, Clone, Copy, Default)]
pub struct KubeConnector;

impl KubeConnector {
    /// Create a connector.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for KubeConnector {
    async fn connect(&self, config: &LoadedConfig) -> Result<ClusterHandles> {
        let options = KubeConfigOptions {
            context: config.current_context.clone(),
            ..KubeConfigOptions::default()
        };

        let kube_config = Config::from_custom_kubeconfig(config.kubeconfig.clone(), &options)
            .await
            .map_err(|e| {
                KubelinkError::config(format!(
                    "kubeconfig {} does not describe a usable connection: {e}",
                    config.source_path.display()
                ))
            })?;

        let cluster_url = kube_config.cluster_url.to_string();
        let client = Client::try_from(kube_config).map_err(|e| {
            KubelinkError::config(format!("failed to create client for {cluster_url}: {e}"))
        })?;

        info!(
            cluster_url,
            path = %config.source_path.display(),
            "Created Kubernetes client"
        );

        Ok(ClusterHandles {
            typed: Arc::new(KubeTypedClient::new(client.clone())),
            generic: Arc::new(KubeGenericClient::new(client)),
            declared_context: config.current_context.clone(),
        })
    }
}

/// Typed access through `k8s-openapi` structs.
#[derive(Clone)]
pub struct KubeTypedClient {
    client: Client,
}

impl KubeTypedClient {
    /// Wrap an existing client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn pods_api(&self, namespace: &str) -> Api<Pod> {
        if namespace.is_empty() {
            Api::all(self.client.clone())
        } else {
            Api::namespaced(self.client.clone(), namespace)
        }
    }

    fn deployments_api(&self, namespace: &str) -> Api<Deployment> {
        if namespace.is_empty() {
            Api::all(self.client.clone())
        } else {
            Api::namespaced(self.client.clone(), namespace)
        }
    }

    fn namespaces_api(&self) -> Api<Namespace> {
        Api::all(self.client.clone())
    }
}

fn pod_target(namespace: &str, name: &str) -> String {
    format!("pod '{name}' in namespace '{namespace}'")
}

fn scope(namespace: &str) -> String {
    if namespace.is_empty() {
        "all namespaces".to_string()
    } else {
        format!("namespace '{namespace}'")
    }
}

#[async_trait]
impl TypedResourceOps for KubeTypedClient {
    async fn probe(&self) -> Result<()> {
        self.namespaces_api()
            .list(&ListParams::default().limit(1))
            .await
            .map_err(|e| from_kube(e, "namespace list"))?;
        Ok(())
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        let found = self
            .namespaces_api()
            .get_opt(namespace)
            .await
            .map_err(|e| from_kube(e, &format!("namespace '{namespace}'")))?;
        Ok(found.is_some())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        let target = pod_target(namespace, name);
        match self
            .pods_api(namespace)
            .get_opt(name)
            .await
            .map_err(|e| from_kube(e, &target))?
        {
            Some(pod) => Ok(pod),
            None => Err(KubelinkError::not_found(format!("{target} not found"))),
        }
    }

    async fn list_pods(&self, namespace: &str, options: &ListOptions) -> Result<Vec<Pod>> {
        let list = self
            .pods_api(namespace)
            .list(&options.to_list_params())
            .await
            .map_err(|e| from_kube(e, &format!("pods in {}", scope(namespace))))?;
        debug!(namespace, count = list.items.len(), "Listed pods");
        Ok(list.items)
    }

    async fn delete_pod(&self, namespace: &str, name: &str, options: DeleteOptions) -> Result<()> {
        self.pods_api(namespace)
            .delete(name, &options.to_delete_params())
            .await
            .map_err(|e| from_kube(e, &pod_target(namespace, name)))?;
        info!(namespace, pod = name, grace = ?options.grace_period_seconds, "Deleted pod");
        Ok(())
    }

    async fn read_pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        options: &LogOptions,
        max_bytes: usize,
    ) -> Result<Vec<u8>> {
        let target = format!(
            "logs of container '{}' in {}",
            options.container,
            pod_target(namespace, pod)
        );

        let stream = self
            .pods_api(namespace)
            .log_stream(pod, &options.to_log_params())
            .await
            .map_err(|e| from_kube(e, &target))?;
        futures::pin_mut!(stream);

        let mut buf = Vec::new();
        stream
            .take(max_bytes as u64)
            .read_to_end(&mut buf)
            .await
            .map_err(|e| KubelinkError::transient(format!("reading {target} failed: {e}")))?;

        debug!(namespace, pod, bytes = buf.len(), "Read container logs");
        Ok(buf)
    }

    async fn list_deployments(
        &self,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<Vec<Deployment>> {
        let list = self
            .deployments_api(namespace)
            .list(&options.to_list_params())
            .await
            .map_err(|e| from_kube(e, &format!("deployments in {}", scope(namespace))))?;
        Ok(list.items)
    }
}

/// Schema-less access through `DynamicObject`.
#[derive(Clone)]
pub struct KubeGenericClient {
    client: Client,
}

impl KubeGenericClient {
    /// Wrap an existing client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn dynamic_api(&self, target: &ResourceDescriptor) -> Api<DynamicObject> {
        let resource = api_resource(target);
        if target.namespace.is_empty() || target.is_cluster_scoped() {
            Api::all_with(self.client.clone(), &resource)
        } else {
            Api::namespaced_with(self.client.clone(), &target.namespace, &resource)
        }
    }
}

/// Build an `ApiResource` addressed by the descriptor's plural name.
fn api_resource(target: &ResourceDescriptor) -> ApiResource {
    ApiResource {
        group: target.group.clone(),
        version: target.version.clone(),
        api_version: target.api_version(),
        kind: target.kind_hint(),
        plural: target.resource.clone(),
    }
}

fn describe(target: &ResourceDescriptor) -> String {
    let mut out = format!("{} '{}'", target.resource, target.name);
    if !target.namespace.is_empty() && !target.is_cluster_scoped() {
        let _ = write!(out, " in namespace '{}'", target.namespace);
    }
    out
}

fn to_document(object: &DynamicObject, target: &str) -> Result<Value> {
    serde_json::to_value(object)
        .map_err(|e| KubelinkError::transient(format!("failed to encode {target}: {e}")))
}

#[async_trait]
impl GenericResourceOps for KubeGenericClient {
    async fn get(&self, target: &ResourceDescriptor) -> Result<Value> {
        let what = describe(target);
        let object = self
            .dynamic_api(target)
            .get_opt(&target.name)
            .await
            .map_err(|e| from_kube(e, &what))?
            .ok_or_else(|| KubelinkError::not_found(format!("{what} not found")))?;
        to_document(&object, &what)
    }

    async fn list(&self, target: &ResourceDescriptor, options: &ListOptions) -> Result<Vec<Value>> {
        let what = format!("{} in {}", target.resource, scope(&target.namespace));
        let list = self
            .dynamic_api(target)
            .list(&options.to_list_params())
            .await
            .map_err(|e| from_kube(e, &what))?;

        list.items
            .iter()
            .map(|object| to_document(object, &what))
            .collect()
    }

    async fn create(&self, target: &ResourceDescriptor, document: &Value) -> Result<Value> {
        let what = describe(target);
        let object: DynamicObject = serde_json::from_value(document.clone()).map_err(|e| {
            KubelinkError::validation(format!("document for {what} is not a valid object: {e}"))
        })?;

        let created = self
            .dynamic_api(target)
            .create(&PostParams::default(), &object)
            .await
            .map_err(|e| from_kube(e, &what))?;

        info!(
            resource = %target.resource,
            namespace = %target.namespace,
            name = %target.name,
            "Created resource"
        );
        to_document(&created, &what)
    }

    async fn delete(&self, target: &ResourceDescriptor, options: DeleteOptions) -> Result<()> {
        let what = describe(target);
        self.dynamic_api(target)
            .delete(&target.name, &options.to_delete_params())
            .await
            .map_err(|e| from_kube(e, &what))?;

        info!(
            resource = %target.resource,
            namespace = %target.namespace,
            name = %target.name,
            grace = ?options.grace_period_seconds,
            "Deleted resource"
        );
        Ok(())
    }
}
