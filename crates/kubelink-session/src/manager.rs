//! The façade called by the tool layer.
//!
//! Every operation returns the text shown to the caller, or a
//! [`KubelinkError`](kubelink_core::KubelinkError) describing the failed
//! precondition.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use kubelink_cluster::{Connector, ListOptions, LoadedConfig};
use kubelink_core::{ResourceDescriptor, Result};
use serde_json::Value;
use tracing::info;

use crate::cancel::CancelToken;
use crate::config::SessionConfig;
use crate::deployment::DeploymentParams;
use crate::format::{to_documents, Formatter, PlainFormatter};
use crate::logs::{LogReader, LogRequest};
use crate::registry::Registry;
use crate::retry::RetryPolicy;
use crate::translator::{ListRequest, ResourceTranslator};

/// Cluster sessions and resource operations behind one handle.
///
/// Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct ClusterManager {
    registry: Arc<Registry>,
    translator: ResourceTranslator,
    logs: LogReader,
    formatter: Arc<dyn Formatter>,
}

impl std::fmt::Debug for ClusterManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterManager")
            .field("registry", &self.registry)
            .field("translator", &self.translator)
            .finish_non_exhaustive()
    }
}

impl ClusterManager {
    /// Create a manager with no registered clusters.
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>, config: &SessionConfig) -> Self {
        Self::with_policy(connector, config, RetryPolicy::from_config(config))
    }

    /// Create a manager with a custom retry policy.
    #[must_use]
    pub fn with_policy(
        connector: Arc<dyn Connector>,
        config: &SessionConfig,
        retry: RetryPolicy,
    ) -> Self {
        let timeouts = config.timeouts();
        let registry = Arc::new(Registry::new(
            connector,
            timeouts.read,
            &config.default_namespace,
        ));
        let translator = ResourceTranslator::new(Arc::clone(&registry), retry, timeouts);
        Self {
            logs: LogReader::new(translator.clone()),
            registry,
            translator,
            formatter: Arc::new(PlainFormatter),
        }
    }

    /// Replace the result formatter.
    #[must_use]
    pub fn with_formatter(mut self, formatter: Arc<dyn Formatter>) -> Self {
        self.formatter = formatter;
        self
    }

    /// The underlying registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The underlying translator.
    #[must_use]
    pub fn translator(&self) -> &ResourceTranslator {
        &self.translator
    }

    /// Register the kubeconfig at `path` under `name`.
    ///
    /// # Errors
    ///
    /// See [`Registry::register`].
    pub async fn register_cluster(&self, name: &str, path: impl AsRef<Path>) -> Result<String> {
        self.registry.register(name, path).await?;
        Ok(self.registered_message(name))
    }

    /// Register a loaded kubeconfig under the name of its declared context,
    /// or `default` if it declares none.
    ///
    /// When the session becomes current and its context declares a
    /// namespace, that namespace becomes the current namespace.
    ///
    /// # Errors
    ///
    /// See [`Registry::register`].
    pub async fn register_declared(&self, config: &LoadedConfig) -> Result<String> {
        let name = config
            .current_context
            .clone()
            .unwrap_or_else(|| "default".to_string());
        self.registry.register_loaded(&name, config).await?;

        if self.registry.current_context_name() == name {
            if let Some(namespace) = config.declared_namespace() {
                self.registry.set_current_namespace(&namespace);
            }
        }
        Ok(self.registered_message(&name))
    }

    fn registered_message(&self, name: &str) -> String {
        format!(
            "Registered cluster '{name}' (current context: '{}')",
            self.registry.current_context_name()
        )
    }

    /// Remove a registered cluster.
    ///
    /// # Errors
    ///
    /// See [`Registry::unregister`].
    pub fn unregister_cluster(&self, name: &str) -> Result<String> {
        self.registry.unregister(name)?;
        Ok(format!("Unregistered cluster '{name}'"))
    }

    /// List registered clusters, marking the current one.
    #[must_use]
    pub fn list_clusters(&self) -> String {
        let names = self.registry.list_registered();
        if names.is_empty() {
            return "No clusters registered".to_string();
        }
        let current = self.registry.current().ok().map(|s| s.name.clone());

        let mut out = format!("{} clusters:", names.len());
        for name in names {
            let marker = if current.as_deref() == Some(name.as_str()) {
                '*'
            } else {
                '-'
            };
            let _ = write!(out, "\n{marker} {name}");
        }
        out
    }

    /// Make `name` the current cluster.
    ///
    /// # Errors
    ///
    /// See [`Registry::set_current_context`].
    pub fn switch_context(&self, name: &str) -> Result<String> {
        self.registry.set_current_context(name)?;
        Ok(format!("Switched to cluster '{name}'"))
    }

    /// Select the current namespace; empty selects `default`.
    pub fn set_namespace(&self, namespace: &str) -> String {
        let namespace = self.registry.set_current_namespace(namespace);
        format!("Switched to namespace '{namespace}'")
    }

    /// The current namespace.
    #[must_use]
    pub fn current_namespace(&self) -> String {
        self.registry.current_namespace()
    }

    /// Fetch one object.
    ///
    /// # Errors
    ///
    /// See [`ResourceTranslator::get`].
    pub async fn get_resource(
        &self,
        target: &ResourceDescriptor,
        cancel: &CancelToken,
    ) -> Result<String> {
        let document = self.translator.get(target, cancel).await?;
        Ok(self.formatter.object(&document))
    }

    /// List objects.
    ///
    /// # Errors
    ///
    /// See [`ResourceTranslator::list`].
    pub async fn list_resources(
        &self,
        request: &ListRequest,
        cancel: &CancelToken,
    ) -> Result<String> {
        let documents = self.translator.list(request, cancel).await?;
        Ok(self.formatter.list(&request.target.resource, &documents))
    }

    /// Create an object from a document.
    ///
    /// # Errors
    ///
    /// See [`ResourceTranslator::create`].
    pub async fn create_resource(
        &self,
        target: &ResourceDescriptor,
        document: &Value,
        cancel: &CancelToken,
    ) -> Result<String> {
        let created = self.translator.create(target, document, cancel).await?;
        Ok(self.formatter.object(&created))
    }

    /// Delete one object.
    ///
    /// # Errors
    ///
    /// See [`ResourceTranslator::delete`].
    pub async fn delete_resource(
        &self,
        target: &ResourceDescriptor,
        force: bool,
        cancel: &CancelToken,
    ) -> Result<String> {
        self.translator.delete(target, force, cancel).await?;
        let namespace = if target.is_cluster_scoped() {
            String::new()
        } else {
            self.translator.resolve_namespace(&target.namespace)
        };
        Ok(deleted_message(&target.resource, &target.name, &namespace))
    }

    /// Fetch a pod.
    ///
    /// # Errors
    ///
    /// See [`ResourceTranslator::get_pod`].
    pub async fn get_pod(
        &self,
        namespace: &str,
        name: &str,
        cancel: &CancelToken,
    ) -> Result<String> {
        let pod = self.translator.get_pod(namespace, name, cancel).await?;
        Ok(to_documents(&[pod])
            .first()
            .map(|doc| self.formatter.object(doc))
            .unwrap_or_default())
    }

    /// List pods; an empty namespace lists all namespaces.
    ///
    /// # Errors
    ///
    /// See [`ResourceTranslator::list_pods`].
    pub async fn list_pods(
        &self,
        namespace: &str,
        options: &ListOptions,
        cancel: &CancelToken,
    ) -> Result<String> {
        let pods = self.translator.list_pods(namespace, options, cancel).await?;
        Ok(self.formatter.list("pods", &to_documents(&pods)))
    }

    /// Delete a pod.
    ///
    /// # Errors
    ///
    /// See [`ResourceTranslator::delete_pod`].
    pub async fn delete_pod(
        &self,
        namespace: &str,
        name: &str,
        force: bool,
        cancel: &CancelToken,
    ) -> Result<String> {
        self.translator.delete_pod(namespace, name, force, cancel).await?;
        let namespace = self.translator.resolve_namespace(namespace);
        Ok(deleted_message("pods", name, &namespace))
    }

    /// List deployments; an empty namespace lists all namespaces.
    ///
    /// # Errors
    ///
    /// See [`ResourceTranslator::list_deployments`].
    pub async fn list_deployments(
        &self,
        namespace: &str,
        options: &ListOptions,
        cancel: &CancelToken,
    ) -> Result<String> {
        let deployments = self
            .translator
            .list_deployments(namespace, options, cancel)
            .await?;
        Ok(self.formatter.list("deployments", &to_documents(&deployments)))
    }

    /// Create a single-container deployment.
    ///
    /// # Errors
    ///
    /// See [`ResourceTranslator::create_deployment`].
    pub async fn create_deployment(
        &self,
        params: &DeploymentParams,
        cancel: &CancelToken,
    ) -> Result<String> {
        let namespace = self.translator.resolve_namespace(&params.namespace);
        self.translator.create_deployment(params, cancel).await?;

        info!(name = %params.name, namespace = %namespace, "Deployment created");
        Ok(format!(
            "Created deployment '{}' in namespace '{namespace}' ({} replicas of {})",
            params.name, params.replicas, params.image
        ))
    }

    /// Read container logs.
    ///
    /// # Errors
    ///
    /// See [`LogReader::read`].
    pub async fn stream_logs(&self, request: &LogRequest, cancel: &CancelToken) -> Result<String> {
        let output = self.logs.read(request, cancel).await?;
        Ok(output.render())
    }
}

fn deleted_message(resource: &str, name: &str, namespace: &str) -> String {
    if namespace.is_empty() {
        format!("Deleted {resource} '{name}'")
    } else {
        format!("Deleted {resource} '{name}' in namespace '{namespace}'")
    }
}
