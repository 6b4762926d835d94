//! The capability set consumed by the session manager.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kubelink_core::{ResourceDescriptor, Result};
use serde_json::Value;

use crate::config::LoadedConfig;
use crate::types::{DeleteOptions, ListOptions, LogOptions};

/// Strongly-shaped access to well-known kinds.
#[async_trait]
pub trait TypedResourceOps: Send + Sync {
    /// Cheap bounded call proving the API server is reachable and the
    /// credentials are accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the API server cannot be reached.
    async fn probe(&self) -> Result<()>;

    /// Check whether a namespace exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup itself fails.
    async fn namespace_exists(&self, namespace: &str) -> Result<bool>;

    /// Fetch a pod.
    ///
    /// # Errors
    ///
    /// Returns a not-found error naming the pod and namespace if it is absent.
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod>;

    /// List pods; an empty namespace lists across all namespaces.
    ///
    /// # Errors
    ///
    /// Returns an error if listing fails.
    async fn list_pods(&self, namespace: &str, options: &ListOptions) -> Result<Vec<Pod>>;

    /// Delete a pod.
    ///
    /// # Errors
    ///
    /// Returns an error if the pod is absent or deletion fails.
    async fn delete_pod(&self, namespace: &str, name: &str, options: DeleteOptions) -> Result<()>;

    /// Open a log stream for a container and read at most `max_bytes`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be opened or read.
    async fn read_pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        options: &LogOptions,
        max_bytes: usize,
    ) -> Result<Vec<u8>>;

    /// List deployments; an empty namespace lists across all namespaces.
    ///
    /// # Errors
    ///
    /// Returns an error if listing fails.
    async fn list_deployments(
        &self,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<Vec<Deployment>>;
}

/// Schema-less access addressed by group/version/resource.
#[async_trait]
pub trait GenericResourceOps: Send + Sync {
    /// Fetch one object.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if the object is absent.
    async fn get(&self, target: &ResourceDescriptor) -> Result<Value>;

    /// List objects; an empty namespace lists across all namespaces.
    ///
    /// # Errors
    ///
    /// Returns an error if listing fails.
    async fn list(&self, target: &ResourceDescriptor, options: &ListOptions) -> Result<Vec<Value>>;

    /// Create an object from a document and return the stored document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is rejected.
    async fn create(&self, target: &ResourceDescriptor, document: &Value) -> Result<Value>;

    /// Delete one object.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is absent or deletion fails.
    async fn delete(&self, target: &ResourceDescriptor, options: DeleteOptions) -> Result<()>;
}

/// Client handles produced for one cluster connection.
#[derive(Clone)]
pub struct ClusterHandles {
    /// Typed path.
    pub typed: Arc<dyn TypedResourceOps>,
    /// Generic path.
    pub generic: Arc<dyn GenericResourceOps>,
    /// The active context declared by the configuration, if any.
    pub declared_context: Option<String>,
}

impl std::fmt::Debug for ClusterHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterHandles")
            .field("declared_context", &self.declared_context)
            .finish_non_exhaustive()
    }
}

/// Builds client handles from a loaded configuration.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Build typed and generic handles. No remote call is required to
    /// succeed here; reachability is checked separately with
    /// [`TypedResourceOps::probe`].
    ///
    /// # Errors
    ///
    /// Returns a config error if the document does not describe a usable
    /// connection.
    async fn connect(&self, config: &LoadedConfig) -> Result<ClusterHandles>;
}
