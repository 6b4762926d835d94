//! Resource addressing for the generic client path.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Core-group resources that are not namespaced.
const CLUSTER_SCOPED: &[(&str, &str)] = &[
    ("", "namespaces"),
    ("", "nodes"),
    ("", "persistentvolumes"),
    ("storage.k8s.io", "storageclasses"),
    ("rbac.authorization.k8s.io", "clusterroles"),
    ("rbac.authorization.k8s.io", "clusterrolebindings"),
    ("apiextensions.k8s.io", "customresourcedefinitions"),
];

/// Address of a cluster object: `(group, version, resource, namespace, name)`.
///
/// `resource` is the plural resource name (e.g. `pods`), independent of
/// whether a typed representation exists. An empty `group` is the core API
/// group. An empty `namespace` means "all namespaces" for list operations and
/// "the current namespace" for single-object operations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// API group, empty for the core group.
    #[serde(default)]
    pub group: String,
    /// API version, e.g. `v1`.
    pub version: String,
    /// Plural resource name, e.g. `deployments`.
    pub resource: String,
    /// Target namespace.
    #[serde(default)]
    pub namespace: String,
    /// Object name.
    #[serde(default)]
    pub name: String,
}

impl ResourceDescriptor {
    /// Create a descriptor from its parts.
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        resource: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            resource: resource.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Descriptor for a core `v1` pod.
    pub fn pods(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new("", "v1", "pods", namespace, name)
    }

    /// Descriptor for an `apps/v1` deployment.
    pub fn deployments(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new("apps", "v1", "deployments", namespace, name)
    }

    /// Descriptor for a core `v1` service.
    pub fn services(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new("", "v1", "services", namespace, name)
    }

    /// Descriptor for a core `v1` namespace.
    pub fn namespaces(name: impl Into<String>) -> Self {
        Self::new("", "v1", "namespaces", "", name)
    }

    /// Return a copy targeting another namespace.
    #[must_use]
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Return a copy targeting another object name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The `apiVersion` string, e.g. `v1` or `apps/v1`.
    #[must_use]
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Returns true for well-known resources that live outside namespaces.
    #[must_use]
    pub fn is_cluster_scoped(&self) -> bool {
        CLUSTER_SCOPED
            .iter()
            .any(|(group, resource)| *group == self.group && *resource == self.resource)
    }

    /// Best-effort singular kind name derived from the plural resource name.
    ///
    /// Only used to label generic documents; addressing relies on the plural.
    #[must_use]
    pub fn kind_hint(&self) -> String {
        let singular = if let Some(stem) = self.resource.strip_suffix("ies") {
            format!("{stem}y")
        } else if let Some(stem) = self.resource.strip_suffix("sses") {
            format!("{stem}ss")
        } else if let Some(stem) = self.resource.strip_suffix('s') {
            stem.to_string()
        } else {
            self.resource.clone()
        };

        let mut chars = singular.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.api_version())?;
        if !self.namespace.is_empty() {
            write!(f, " {}", self.namespace)?;
        }
        if !self.name.is_empty() {
            write!(f, "/{}", self.name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_version_core_and_grouped() {
        assert_eq!(ResourceDescriptor::pods("default", "a").api_version(), "v1");
        assert_eq!(
            ResourceDescriptor::deployments("default", "a").api_version(),
            "apps/v1"
        );
    }

    #[test]
    fn cluster_scoped_resources() {
        assert!(ResourceDescriptor::namespaces("kube-system").is_cluster_scoped());
        assert!(ResourceDescriptor::new("", "v1", "nodes", "", "n1").is_cluster_scoped());
        assert!(!ResourceDescriptor::pods("default", "a").is_cluster_scoped());
        // same plural, different group
        assert!(!ResourceDescriptor::new("example.com", "v1", "nodes", "", "").is_cluster_scoped());
    }

    #[test]
    fn kind_hint_singularizes() {
        assert_eq!(ResourceDescriptor::pods("", "").kind_hint(), "Pod");
        assert_eq!(
            ResourceDescriptor::new("networking.k8s.io", "v1", "ingresses", "", "").kind_hint(),
            "Ingress"
        );
        assert_eq!(
            ResourceDescriptor::new("", "v1", "storageclasses", "", "").kind_hint(),
            "Storageclass"
        );
        assert_eq!(
            ResourceDescriptor::new("", "v1", "networkpolicies", "", "").kind_hint(),
            "Networkpolicy"
        );
    }

    #[test]
    fn display_includes_namespace_and_name() {
        let d = ResourceDescriptor::deployments("prod", "web");
        assert_eq!(d.to_string(), "deployments.apps/v1 prod/web");
        assert_eq!(
            ResourceDescriptor::namespaces("").to_string(),
            "namespaces.v1"
        );
    }

    #[test]
    fn deserializes_with_defaults() {
        let d: ResourceDescriptor =
            serde_json::from_str(r#"{"version":"v1","resource":"configmaps"}"#).unwrap();
        assert!(d.group.is_empty());
        assert!(d.namespace.is_empty());
        assert_eq!(d.resource, "configmaps");
    }
}
