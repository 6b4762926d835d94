//! Resource translator.
//!
//! Resolves the current session, applies the retry policy and runs one
//! create/get/list/delete against the typed or generic client path. Single
//! object operations on namespaced resources first check that the namespace
//! exists so the error can name it; the check is best effort and does not
//! make the following call atomic.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kubelink_cluster::{DeleteOptions, ListOptions, LogOptions};
use kubelink_core::{KubelinkError, ResourceDescriptor, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::config::Timeouts;
use crate::deployment::DeploymentParams;
use crate::registry::{ClusterSession, Registry};
use crate::retry::RetryPolicy;

/// A list call: which resources, and how to narrow them.
///
/// The descriptor's name is ignored. An empty namespace lists across all
/// namespaces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRequest {
    /// Resource type and namespace.
    #[serde(flatten)]
    pub target: ResourceDescriptor,
    /// Limit and selectors.
    #[serde(flatten)]
    pub options: ListOptions,
}

impl ListRequest {
    /// List every `target` resource without selectors.
    #[must_use]
    pub fn new(target: ResourceDescriptor) -> Self {
        Self {
            target,
            options: ListOptions::default(),
        }
    }

    /// Narrow the list with a label selector.
    #[must_use]
    pub fn with_labels(mut self, selector: impl Into<String>) -> Self {
        self.options.label_selector = Some(selector.into());
        self
    }

    /// Narrow the list with a field selector.
    #[must_use]
    pub fn with_fields(mut self, selector: impl Into<String>) -> Self {
        self.options.field_selector = Some(selector.into());
        self
    }

    /// Cap the number of returned items.
    #[must_use]
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.options.limit = Some(limit);
        self
    }
}

/// Executes resource operations against the current cluster session.
#[derive(Debug, Clone)]
pub struct ResourceTranslator {
    registry: Arc<Registry>,
    retry: RetryPolicy,
    timeouts: Timeouts,
}

impl ResourceTranslator {
    /// Create a translator over `registry`.
    #[must_use]
    pub fn new(registry: Arc<Registry>, retry: RetryPolicy, timeouts: Timeouts) -> Self {
        Self {
            registry,
            retry,
            timeouts,
        }
    }

    /// The registry sessions are resolved from.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Deadlines applied to each attempt.
    #[must_use]
    pub const fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    pub(crate) fn current_session(&self) -> Result<Arc<ClusterSession>> {
        self.registry.current()
    }

    /// Empty selects the current namespace.
    pub(crate) fn resolve_namespace(&self, namespace: &str) -> String {
        if namespace.is_empty() {
            self.registry.current_namespace()
        } else {
            namespace.to_string()
        }
    }

    /// Fill in the namespace of a single-object target.
    fn resolve_target(&self, target: &ResourceDescriptor) -> ResourceDescriptor {
        if target.is_cluster_scoped() {
            target.clone().in_namespace("")
        } else {
            let namespace = self.resolve_namespace(&target.namespace);
            target.clone().in_namespace(namespace)
        }
    }

    async fn ensure_namespace(
        &self,
        session: &ClusterSession,
        namespace: &str,
        object: &str,
        cancel: &CancelToken,
    ) -> Result<()> {
        let typed = &session.typed;
        let exists = self
            .retry
            .run(
                &format!("check namespace '{namespace}'"),
                self.timeouts.read,
                cancel,
                move || typed.namespace_exists(namespace),
            )
            .await?;

        if exists {
            Ok(())
        } else {
            Err(KubelinkError::not_found(format!(
                "{object} not found: namespace '{namespace}' does not exist"
            )))
        }
    }

    async fn ensure_target_namespace(
        &self,
        session: &ClusterSession,
        target: &ResourceDescriptor,
        cancel: &CancelToken,
    ) -> Result<()> {
        if target.is_cluster_scoped() {
            return Ok(());
        }
        let object = format!("{} '{}'", target.resource, target.name);
        self.ensure_namespace(session, &target.namespace, &object, cancel)
            .await
    }

    /// Fetch one object as a document.
    ///
    /// # Errors
    ///
    /// - [`KubelinkError::Connection`] if no cluster is registered
    /// - [`KubelinkError::NotFound`] naming the object and namespace if
    ///   either is absent
    /// - retry, deadline and cancellation errors from the policy
    pub async fn get(&self, target: &ResourceDescriptor, cancel: &CancelToken) -> Result<Value> {
        let session = self.current_session()?;
        let target = self.resolve_target(target);
        require_name(&target)?;
        self.ensure_target_namespace(&session, &target, cancel).await?;

        let generic = &session.generic;
        let target = &target;
        self.retry
            .run(
                &format!("get {} '{}'", target.resource, target.name),
                self.timeouts.read,
                cancel,
                move || generic.get(target),
            )
            .await
    }

    /// List documents.
    ///
    /// # Errors
    ///
    /// - [`KubelinkError::NotFound`] if nothing matched
    /// - the errors of [`ResourceTranslator::get`]
    pub async fn list(&self, request: &ListRequest, cancel: &CancelToken) -> Result<Vec<Value>> {
        let session = self.current_session()?;
        let target = &request.target;
        let options = &request.options;

        let generic = &session.generic;
        let items = self
            .retry
            .run(
                &format!("list {}", target.resource),
                self.timeouts.read,
                cancel,
                move || generic.list(target, options),
            )
            .await?;

        debug!(
            cluster = %session.name,
            resource = %target.resource,
            namespace = %target.namespace,
            count = items.len(),
            "Listed resources"
        );
        non_empty(items, &target.resource, &target.namespace, options)
    }

    /// Submit a document.
    ///
    /// The namespace comes from the document's metadata, then the target,
    /// then the current namespace. The name comes from the document's
    /// metadata, then the target.
    ///
    /// # Errors
    ///
    /// - [`KubelinkError::Validation`] if no name can be determined or the
    ///   server rejects the document
    /// - [`KubelinkError::NotFound`] if the namespace is absent
    /// - retry, deadline and cancellation errors from the policy
    pub async fn create(
        &self,
        target: &ResourceDescriptor,
        document: &Value,
        cancel: &CancelToken,
    ) -> Result<Value> {
        let session = self.current_session()?;

        let metadata = |field: &str| {
            document
                .pointer(&format!("/metadata/{field}"))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let mut target = target.clone();
        if let Some(name) = metadata("name") {
            target.name = name;
        }
        if let Some(namespace) = metadata("namespace") {
            target.namespace = namespace;
        }
        let target = self.resolve_target(&target);
        require_name(&target)?;

        let generic = &session.generic;
        let target = &target;
        let created = self
            .retry
            .run(
                &format!("create {} '{}'", target.resource, target.name),
                self.timeouts.write,
                cancel,
                move || generic.create(target, document),
            )
            .await?;

        info!(
            cluster = %session.name,
            resource = %target.resource,
            namespace = %target.namespace,
            name = %target.name,
            "Created resource"
        );
        Ok(created)
    }

    /// Delete one object after checking that it exists. `force` deletes
    /// with a zero grace period.
    ///
    /// # Errors
    ///
    /// Same as [`ResourceTranslator::get`].
    pub async fn delete(
        &self,
        target: &ResourceDescriptor,
        force: bool,
        cancel: &CancelToken,
    ) -> Result<()> {
        let session = self.current_session()?;
        let target = self.resolve_target(target);
        require_name(&target)?;
        self.ensure_target_namespace(&session, &target, cancel).await?;

        let generic = &session.generic;
        let target = &target;
        let what = format!("{} '{}'", target.resource, target.name);
        self.retry
            .run(
                &format!("get {what}"),
                self.timeouts.read,
                cancel,
                move || generic.get(target),
            )
            .await?;

        let options = delete_options(force);
        self.retry
            .run(
                &format!("delete {what}"),
                self.timeouts.write,
                cancel,
                move || generic.delete(target, options),
            )
            .await?;

        info!(
            cluster = %session.name,
            resource = %target.resource,
            namespace = %target.namespace,
            name = %target.name,
            force,
            "Deleted resource"
        );
        Ok(())
    }

    /// Fetch a pod; an empty namespace selects the current one.
    ///
    /// # Errors
    ///
    /// Same as [`ResourceTranslator::get`].
    pub async fn get_pod(&self, namespace: &str, name: &str, cancel: &CancelToken) -> Result<Pod> {
        let session = self.current_session()?;
        let namespace = self.resolve_namespace(namespace);
        self.get_pod_in(&session, &namespace, name, cancel).await
    }

    pub(crate) async fn get_pod_in(
        &self,
        session: &ClusterSession,
        namespace: &str,
        name: &str,
        cancel: &CancelToken,
    ) -> Result<Pod> {
        if name.is_empty() {
            return Err(KubelinkError::validation("pod name must not be empty"));
        }
        self.ensure_namespace(session, namespace, &format!("pod '{name}'"), cancel)
            .await?;

        let typed = &session.typed;
        self.retry
            .run(
                &format!("get pod '{name}'"),
                self.timeouts.read,
                cancel,
                move || typed.get_pod(namespace, name),
            )
            .await
    }

    /// List pods; an empty namespace lists across all namespaces.
    ///
    /// # Errors
    ///
    /// Same as [`ResourceTranslator::list`].
    pub async fn list_pods(
        &self,
        namespace: &str,
        options: &ListOptions,
        cancel: &CancelToken,
    ) -> Result<Vec<Pod>> {
        let session = self.current_session()?;
        let typed = &session.typed;
        let pods = self
            .retry
            .run("list pods", self.timeouts.read, cancel, move || {
                typed.list_pods(namespace, options)
            })
            .await?;
        non_empty(pods, "pods", namespace, options)
    }

    /// Delete a pod after checking that it exists.
    ///
    /// # Errors
    ///
    /// Same as [`ResourceTranslator::get`].
    pub async fn delete_pod(
        &self,
        namespace: &str,
        name: &str,
        force: bool,
        cancel: &CancelToken,
    ) -> Result<()> {
        let session = self.current_session()?;
        let namespace = self.resolve_namespace(namespace);
        self.get_pod_in(&session, &namespace, name, cancel).await?;

        let typed = &session.typed;
        let namespace = namespace.as_str();
        let options = delete_options(force);
        self.retry
            .run(
                &format!("delete pod '{name}'"),
                self.timeouts.write,
                cancel,
                move || typed.delete_pod(namespace, name, options),
            )
            .await?;

        info!(cluster = %session.name, namespace, pod = name, force, "Deleted pod");
        Ok(())
    }

    /// List deployments; an empty namespace lists across all namespaces.
    ///
    /// # Errors
    ///
    /// Same as [`ResourceTranslator::list`].
    pub async fn list_deployments(
        &self,
        namespace: &str,
        options: &ListOptions,
        cancel: &CancelToken,
    ) -> Result<Vec<Deployment>> {
        let session = self.current_session()?;
        let typed = &session.typed;
        let deployments = self
            .retry
            .run("list deployments", self.timeouts.read, cancel, move || {
                typed.list_deployments(namespace, options)
            })
            .await?;
        non_empty(deployments, "deployments", namespace, options)
    }

    /// Build a Deployment from `params` and submit it through the generic
    /// path. Returns the stored document.
    ///
    /// # Errors
    ///
    /// - [`KubelinkError::Validation`] for invalid parameters
    /// - the errors of [`ResourceTranslator::create`]
    pub async fn create_deployment(
        &self,
        params: &DeploymentParams,
        cancel: &CancelToken,
    ) -> Result<Value> {
        let namespace = self.resolve_namespace(&params.namespace);
        let plan = params.plan(&namespace)?;
        let document = plan.to_document()?;
        let target = ResourceDescriptor::deployments(namespace, plan.name.clone());

        debug!(
            name = %plan.name,
            namespace = %plan.namespace,
            replicas = plan.replicas,
            image = %plan.image,
            "Submitting deployment"
        );
        self.create(&target, &document, cancel).await
    }

    pub(crate) async fn read_logs_in(
        &self,
        session: &ClusterSession,
        namespace: &str,
        pod: &str,
        options: &LogOptions,
        max_bytes: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>> {
        let typed = &session.typed;
        self.retry
            .run(
                &format!("read logs of pod '{pod}'"),
                self.timeouts.write,
                cancel,
                move || typed.read_pod_logs(namespace, pod, options, max_bytes),
            )
            .await
    }
}

fn require_name(target: &ResourceDescriptor) -> Result<()> {
    if target.name.is_empty() {
        Err(KubelinkError::validation(format!(
            "a {} name is required",
            target.kind_hint().to_ascii_lowercase()
        )))
    } else {
        Ok(())
    }
}

fn delete_options(force: bool) -> DeleteOptions {
    if force {
        DeleteOptions::force()
    } else {
        DeleteOptions::default()
    }
}

fn non_empty<T>(
    items: Vec<T>,
    resource: &str,
    namespace: &str,
    options: &ListOptions,
) -> Result<Vec<T>> {
    if !items.is_empty() {
        return Ok(items);
    }

    let scope = if namespace.is_empty() {
        "all namespaces".to_string()
    } else {
        format!("namespace '{namespace}'")
    };

    if !options.has_selectors() {
        return Err(KubelinkError::not_found(format!("no {resource} found in {scope}")));
    }

    let mut selectors = Vec::new();
    if let Some(labels) = options.label_selector.as_deref().filter(|s| !s.is_empty()) {
        selectors.push(format!("labels '{labels}'"));
    }
    if let Some(fields) = options.field_selector.as_deref().filter(|s| !s.is_empty()) {
        selectors.push(format!("fields '{fields}'"));
    }
    Err(KubelinkError::not_found(format!(
        "no {resource} found in {scope} matching selectors {}",
        selectors.join(" and ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubelink_core::ErrorKind;

    #[test]
    fn empty_list_messages() {
        let err = non_empty::<()>(Vec::new(), "pods", "prod", &ListOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "no pods found in namespace 'prod'");

        let options = ListOptions {
            label_selector: Some("app=web".into()),
            field_selector: Some("status.phase=Running".into()),
            ..Default::default()
        };
        let err = non_empty::<()>(Vec::new(), "pods", "", &options).unwrap_err();
        assert_eq!(
            err.to_string(),
            "no pods found in all namespaces matching selectors labels 'app=web' and fields 'status.phase=Running'"
        );

        assert_eq!(non_empty(vec![1], "pods", "", &options).unwrap(), vec![1]);
    }

    #[test]
    fn list_request_from_flat_json() {
        let request: ListRequest = serde_json::from_str(
            r#"{"group": "apps", "version": "v1", "resource": "deployments",
                "namespace": "prod", "label_selector": "app=web", "limit": 5}"#,
        )
        .unwrap();
        assert_eq!(request.target.api_version(), "apps/v1");
        assert_eq!(request.target.namespace, "prod");
        assert_eq!(request.options.label_selector.as_deref(), Some("app=web"));
        assert_eq!(request.options.limit, Some(5));
    }

    #[test]
    fn name_is_required() {
        let err = require_name(&ResourceDescriptor::pods("prod", "")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("a pod name is required"));
    }
}
