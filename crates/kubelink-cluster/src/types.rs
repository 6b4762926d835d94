//! Option and status types shared by the typed and generic client paths.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of the pod lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PodPhase {
    /// Pod has been accepted but containers are not yet running.
    Pending,
    /// Pod is running with at least one container.
    Running,
    /// All containers terminated successfully.
    Succeeded,
    /// At least one container failed.
    Failed,
    /// Pod status cannot be determined.
    #[default]
    Unknown,
}

impl PodPhase {
    /// Parse a pod phase from a Kubernetes phase string.
    #[must_use]
    pub fn from_k8s_phase(phase: &str) -> Self {
        match phase {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }

    /// Read the phase reported in a pod's status.
    #[must_use]
    pub fn of(pod: &k8s_openapi::api::core::v1::Pod) -> Self {
        pod.status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .map(Self::from_k8s_phase)
            .unwrap_or_default()
    }

    /// Check whether current logs can be read from a pod in this phase.
    #[must_use]
    pub const fn has_current_logs(&self) -> bool {
        matches!(self, Self::Running | Self::Succeeded)
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Options for list calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOptions {
    /// Maximum number of items to return.
    #[serde(default)]
    pub limit: Option<u32>,
    /// Label selector, e.g. `app=web,tier!=cache`.
    #[serde(default)]
    pub label_selector: Option<String>,
    /// Field selector, e.g. `status.phase=Running`.
    #[serde(default)]
    pub field_selector: Option<String>,
}

impl ListOptions {
    /// Returns true if any selector narrows the result set.
    #[must_use]
    pub fn has_selectors(&self) -> bool {
        self.label_selector.as_deref().is_some_and(|s| !s.is_empty())
            || self.field_selector.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Convert to `kube` list parameters.
    #[must_use]
    pub fn to_list_params(&self) -> kube::api::ListParams {
        let mut params = kube::api::ListParams::default();
        if let Some(labels) = self.label_selector.as_deref().filter(|s| !s.is_empty()) {
            params = params.labels(labels);
        }
        if let Some(fields) = self.field_selector.as_deref().filter(|s| !s.is_empty()) {
            params = params.fields(fields);
        }
        if let Some(limit) = self.limit.filter(|l| *l > 0) {
            params = params.limit(limit);
        }
        params
    }
}

/// Options for delete calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Grace period override; `None` keeps the server default.
    pub grace_period_seconds: Option<u32>,
}

impl DeleteOptions {
    /// Delete immediately with a zero grace period.
    #[must_use]
    pub const fn force() -> Self {
        Self {
            grace_period_seconds: Some(0),
        }
    }

    /// Convert to `kube` delete parameters.
    #[must_use]
    pub fn to_delete_params(self) -> kube::api::DeleteParams {
        kube::api::DeleteParams {
            grace_period_seconds: self.grace_period_seconds,
            ..kube::api::DeleteParams::default()
        }
    }
}

/// Options for a point-in-time container log read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// Container to read from.
    pub container: String,
    /// Only return the last N lines.
    pub tail_lines: Option<i64>,
    /// Only return lines newer than this many seconds.
    pub since_seconds: Option<i64>,
    /// Read the previous (terminated) instance of the container.
    pub previous: bool,
}

impl LogOptions {
    /// Convert to `kube` log parameters. Follow is always off.
    #[must_use]
    pub fn to_log_params(&self) -> kube::api::LogParams {
        kube::api::LogParams {
            container: Some(self.container.clone()),
            follow: false,
            previous: self.previous,
            since_seconds: self.since_seconds,
            tail_lines: self.tail_lines,
            ..kube::api::LogParams::default()
        }
    }
}
