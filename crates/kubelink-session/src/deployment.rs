//! Deployment builder.
//!
//! Caller parameters are first checked into a [`DeploymentPlan`], where every
//! enumerated value has been validated, and only then rendered as a typed
//! `k8s-openapi` Deployment. Submission is left to the translator.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, LocalObjectReference, PodSpec, PodTemplateSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kubelink_core::{KubelinkError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Label added to every deployment unless the caller sets it.
const APP_LABEL: &str = "app";

/// Parameters for creating a single-container deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentParams {
    /// Deployment and container name.
    pub name: String,
    /// Target namespace; empty selects the current namespace.
    #[serde(default)]
    pub namespace: String,
    /// Container image.
    pub image: String,
    /// Desired replica count.
    #[serde(default = "DeploymentParams::default_replicas")]
    pub replicas: u32,
    /// Extra labels, merged over `app: <name>`.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Port in `port[/protocol]` form, e.g. `8080/UDP`.
    #[serde(default)]
    pub container_port: Option<String>,
    /// One of `Always`, `IfNotPresent` or `Never`; anything else is ignored.
    #[serde(default)]
    pub image_pull_policy: Option<String>,
    /// Names of image pull secrets; empty entries are skipped.
    #[serde(default)]
    pub image_pull_secrets: Vec<String>,
    /// Container environment variables.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl DeploymentParams {
    const fn default_replicas() -> u32 {
        1
    }

    /// Parameters for `image` named `name` with every option at its default.
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: String::new(),
            image: image.into(),
            replicas: Self::default_replicas(),
            labels: BTreeMap::new(),
            container_port: None,
            image_pull_policy: None,
            image_pull_secrets: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    /// Validate the parameters into a plan targeting `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`KubelinkError::Validation`] if the name or image is empty or
    /// the replica count does not fit the API type.
    pub fn plan(&self, namespace: &str) -> Result<DeploymentPlan> {
        if self.name.trim().is_empty() {
            return Err(KubelinkError::validation("deployment name must not be empty"));
        }
        if self.image.trim().is_empty() {
            return Err(KubelinkError::validation(format!(
                "deployment '{}' needs a container image",
                self.name
            )));
        }
        let replicas = i32::try_from(self.replicas).map_err(|_| {
            KubelinkError::validation(format!("replica count {} is too large", self.replicas))
        })?;

        let mut labels = BTreeMap::from([(APP_LABEL.to_string(), self.name.clone())]);
        labels.extend(self.labels.clone());

        let port = match self.container_port.as_deref() {
            Some(spec) => parse_container_port(spec),
            None => None,
        };

        Ok(DeploymentPlan {
            name: self.name.clone(),
            namespace: namespace.to_string(),
            image: self.image.clone(),
            replicas,
            labels,
            port,
            pull_policy: self
                .image_pull_policy
                .as_deref()
                .and_then(PullPolicy::parse),
            pull_secrets: self
                .image_pull_secrets
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            env: self.env.clone(),
        })
    }
}

/// Image pull policy accepted by the API server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullPolicy {
    /// Always pull.
    Always,
    /// Pull only if absent on the node.
    IfNotPresent,
    /// Never pull.
    Never,
}

impl PullPolicy {
    /// Parse an exact policy name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Always" => Some(Self::Always),
            "IfNotPresent" => Some(Self::IfNotPresent),
            "Never" => Some(Self::Never),
            _ => None,
        }
    }
}

impl fmt::Display for PullPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Always => "Always",
            Self::IfNotPresent => "IfNotPresent",
            Self::Never => "Never",
        };
        f.write_str(name)
    }
}

/// Transport protocol of a container port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortProtocol {
    /// TCP.
    Tcp,
    /// UDP.
    Udp,
    /// SCTP.
    Sctp,
}

impl PortProtocol {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "TCP" => Some(Self::Tcp),
            "UDP" => Some(Self::Udp),
            "SCTP" => Some(Self::Sctp),
            _ => None,
        }
    }
}

impl fmt::Display for PortProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
            Self::Sctp => "SCTP",
        };
        f.write_str(name)
    }
}

/// A parsed container port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSpec {
    /// Port number, 1..=65535.
    pub port: u16,
    /// Protocol, only set when a recognised one was given.
    pub protocol: Option<PortProtocol>,
}

/// Parse `port[/protocol]`.
///
/// Returns `None` when the port number is not a number in 1..=65535, so the
/// container is created without ports. A protocol other than TCP, UDP or
/// SCTP is ignored and the port is kept.
#[must_use]
pub fn parse_container_port(spec: &str) -> Option<PortSpec> {
    let (port, protocol) = match spec.split_once('/') {
        Some((port, protocol)) => (port, Some(protocol.trim())),
        None => (spec, None),
    };

    let port = port.trim().parse::<u16>().ok().filter(|p| *p > 0)?;
    let protocol = protocol.and_then(PortProtocol::parse);

    Some(PortSpec { port, protocol })
}

/// A validated deployment, ready to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentPlan {
    /// Deployment and container name.
    pub name: String,
    /// Target namespace.
    pub namespace: String,
    /// Container image.
    pub image: String,
    /// Replica count.
    pub replicas: i32,
    /// Labels applied to the deployment, selector and pod template.
    pub labels: BTreeMap<String, String>,
    /// Container port, if one parsed.
    pub port: Option<PortSpec>,
    /// Pull policy, if a valid one was given.
    pub pull_policy: Option<PullPolicy>,
    /// Non-empty pull secret names.
    pub pull_secrets: Vec<String>,
    /// Environment variables.
    pub env: BTreeMap<String, String>,
}

impl DeploymentPlan {
    /// Render the typed Deployment.
    #[must_use]
    pub fn build(&self) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(self.labels.clone()),
                ..Default::default()
            },
            spec: Some(self.build_spec()),
            ..Default::default()
        }
    }

    /// Render the Deployment as a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`KubelinkError::Validation`] if serialization fails.
    pub fn to_document(&self) -> Result<Value> {
        serde_json::to_value(self.build()).map_err(|e| {
            KubelinkError::validation(format!("cannot encode deployment '{}': {e}", self.name))
        })
    }

    fn selector_labels(&self) -> BTreeMap<String, String> {
        self.labels
            .get(APP_LABEL)
            .map(|app| BTreeMap::from([(APP_LABEL.to_string(), app.clone())]))
            .unwrap_or_else(|| self.labels.clone())
    }

    fn build_spec(&self) -> DeploymentSpec {
        DeploymentSpec {
            replicas: Some(self.replicas),
            selector: LabelSelector {
                match_labels: Some(self.selector_labels()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(self.labels.clone()),
                    ..Default::default()
                }),
                spec: Some(self.build_pod_spec()),
            },
            ..Default::default()
        }
    }

    fn build_pod_spec(&self) -> PodSpec {
        let pull_secrets = (!self.pull_secrets.is_empty()).then(|| {
            self.pull_secrets
                .iter()
                .map(|name| LocalObjectReference { name: name.clone() })
                .collect()
        });

        PodSpec {
            containers: vec![self.build_container()],
            image_pull_secrets: pull_secrets,
            ..Default::default()
        }
    }

    fn build_container(&self) -> Container {
        Container {
            name: self.name.clone(),
            image: Some(self.image.clone()),
            ports: self.port.map(|p| {
                vec![ContainerPort {
                    container_port: i32::from(p.port),
                    protocol: p.protocol.map(|p| p.to_string()),
                    ..Default::default()
                }]
            }),
            image_pull_policy: self.pull_policy.map(|p| p.to_string()),
            env: (!self.env.is_empty()).then(|| self.build_env_vars()),
            ..Default::default()
        }
    }

    fn build_env_vars(&self) -> Vec<EnvVar> {
        self.env
            .iter()
            .map(|(name, value)| EnvVar {
                name: name.clone(),
                value: Some(value.clone()),
                ..Default::default()
            })
            .collect()
    }
}
