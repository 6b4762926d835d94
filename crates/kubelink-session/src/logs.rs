//! Bounded container log reads.
//!
//! A read resolves the pod and container, checks that the pod phase allows
//! reading current logs, then reads at most [`LOG_BYTE_LIMIT`] bytes of a
//! point-in-time log stream.

use std::fmt::Write as _;
use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use kubelink_cluster::{LogOptions, PodPhase};
use kubelink_core::{KubelinkError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::translator::ResourceTranslator;

/// Maximum number of log bytes returned by one read.
pub const LOG_BYTE_LIMIT: usize = 100 * 1024;

/// A request for the logs of one container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRequest {
    /// Pod name.
    pub pod_name: String,
    /// Pod namespace; empty selects the current namespace.
    #[serde(default)]
    pub namespace: String,
    /// Container name; `None` selects the first declared container.
    #[serde(default)]
    pub container_name: Option<String>,
    /// Only return the last N lines; ignored unless positive.
    #[serde(default)]
    pub tail_lines: Option<i64>,
    /// Read the previous terminated instance of the container.
    #[serde(default)]
    pub previous: bool,
    /// Only return lines newer than this.
    #[serde(default)]
    pub since: Option<Duration>,
}

impl LogRequest {
    /// Current logs of the first container of `pod_name`.
    #[must_use]
    pub fn new(pod_name: impl Into<String>) -> Self {
        Self {
            pod_name: pod_name.into(),
            ..Self::default()
        }
    }
}

/// The outcome of a log read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOutput {
    /// Names the container, pod, namespace and active filters.
    pub header: String,
    /// Log text, at most [`LOG_BYTE_LIMIT`] bytes.
    pub payload: String,
    /// True if the ceiling was reached.
    pub truncated: bool,
}

impl LogOutput {
    /// Header, payload and, when truncated, a single closing notice.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.header.len() + self.payload.len() + 64);
        out.push_str(&self.header);
        out.push('\n');
        out.push_str(&self.payload);
        if self.truncated {
            if !self.payload.ends_with('\n') {
                out.push('\n');
            }
            let _ = write!(out, "[output truncated at {} KiB]", LOG_BYTE_LIMIT / 1024);
        }
        out
    }
}

/// Reads container logs through a [`ResourceTranslator`].
#[derive(Debug, Clone)]
pub struct LogReader {
    translator: ResourceTranslator,
}

impl LogReader {
    /// Create a reader sharing the translator's registry and policy.
    #[must_use]
    pub fn new(translator: ResourceTranslator) -> Self {
        Self { translator }
    }

    /// Read the logs described by `request`.
    ///
    /// # Errors
    ///
    /// - [`KubelinkError::Validation`] if the pod name is empty, or the pod
    ///   is not Running or Succeeded and `previous` is false
    /// - [`KubelinkError::NotFound`] if the pod, container or any log
    ///   output is missing
    /// - retry, deadline and cancellation errors from the policy
    pub async fn read(&self, request: &LogRequest, cancel: &CancelToken) -> Result<LogOutput> {
        if request.pod_name.is_empty() {
            return Err(KubelinkError::validation("pod name must not be empty"));
        }

        let session = self.translator.current_session()?;
        let namespace = self.translator.resolve_namespace(&request.namespace);
        let pod_name = request.pod_name.as_str();

        let pod = self
            .translator
            .get_pod_in(&session, &namespace, pod_name, cancel)
            .await?;

        let phase = PodPhase::of(&pod);
        if !request.previous && !phase.has_current_logs() {
            return Err(KubelinkError::validation(format!(
                "pod '{pod_name}' in namespace '{namespace}' is in phase {phase}; \
                 current logs are only available for Running or Succeeded pods, \
                 use previous=true to read the last terminated container"
            )));
        }

        let container = resolve_container(&pod, request.container_name.as_deref())?;
        let options = LogOptions {
            container: container.clone(),
            tail_lines: request.tail_lines.filter(|n| *n > 0),
            since_seconds: request.since.map(since_seconds),
            previous: request.previous,
        };

        let bytes = self
            .translator
            .read_logs_in(&session, &namespace, pod_name, &options, LOG_BYTE_LIMIT, cancel)
            .await?;

        if bytes.is_empty() {
            let which = if request.previous { "previous logs" } else { "logs" };
            return Err(KubelinkError::not_found(format!(
                "no {which} found for container {container} in pod {pod_name}"
            )));
        }

        let (payload, truncated) = bounded_payload(&bytes);
        debug!(
            cluster = %session.name,
            namespace = %namespace,
            pod = pod_name,
            container = %container,
            bytes = payload.len(),
            truncated,
            "Read container logs"
        );
        if truncated {
            info!(pod = pod_name, container = %container, "Log output reached the byte ceiling");
        }

        Ok(LogOutput {
            header: header(&container, pod_name, &namespace, &options),
            payload,
            truncated,
        })
    }
}

/// Pick the requested container, or the first declared one.
fn resolve_container(pod: &Pod, requested: Option<&str>) -> Result<String> {
    let pod_name = pod.metadata.name.as_deref().unwrap_or_default();
    let names: Vec<&str> = pod
        .spec
        .as_ref()
        .map(|spec| spec.containers.iter().map(|c| c.name.as_str()).collect())
        .unwrap_or_default();

    let Some(first) = names.first() else {
        return Err(KubelinkError::not_found(format!(
            "pod '{pod_name}' declares no containers"
        )));
    };

    match requested.filter(|name| !name.is_empty()) {
        None => Ok((*first).to_string()),
        Some(name) if names.contains(&name) => Ok(name.to_string()),
        Some(name) => Err(KubelinkError::not_found(format!(
            "container '{name}' not found in pod '{pod_name}'; available containers: {}",
            names.join(", ")
        ))),
    }
}

/// Whole seconds, rounded up, at least one.
fn since_seconds(since: Duration) -> i64 {
    let secs = since.as_secs() + u64::from(since.subsec_nanos() > 0);
    i64::try_from(secs.max(1)).unwrap_or(i64::MAX)
}

fn format_since(seconds: i64) -> String {
    let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if h > 0 {
        format!("{h}h{m}m{s}s")
    } else if m > 0 {
        format!("{m}m{s}s")
    } else {
        format!("{s}s")
    }
}

fn header(container: &str, pod: &str, namespace: &str, options: &LogOptions) -> String {
    let mut filters = Vec::new();
    if options.previous {
        filters.push("previous=true".to_string());
    }
    if let Some(tail) = options.tail_lines {
        filters.push(format!("tail={tail}"));
    }
    if let Some(since) = options.since_seconds {
        filters.push(format!("since={}", format_since(since)));
    }

    let mut out = format!("Logs for container '{container}' in pod '{pod}' (namespace '{namespace}')");
    if !filters.is_empty() {
        let _ = write!(out, " [{}]", filters.join(", "));
    }
    out.push(':');
    out
}

/// Decode at most [`LOG_BYTE_LIMIT`] bytes and report whether anything was
/// cut, either by the byte ceiling or because lossy decoding grew the text
/// past it.
fn bounded_payload(bytes: &[u8]) -> (String, bool) {
    let mut truncated = bytes.len() >= LOG_BYTE_LIMIT;
    let bytes = &bytes[..bytes.len().min(LOG_BYTE_LIMIT)];

    let mut text = String::from_utf8_lossy(bytes).into_owned();
    if text.len() > LOG_BYTE_LIMIT {
        let mut end = LOG_BYTE_LIMIT;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
        truncated = true;
    }
    (text, truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubelink_cluster::mock::pod;
    use kubelink_core::ErrorKind;

    #[test]
    fn first_container_is_default() {
        let p = pod("prod", "web", "Running", &["app", "sidecar"]);
        assert_eq!(resolve_container(&p, None).unwrap(), "app");
        assert_eq!(resolve_container(&p, Some("")).unwrap(), "app");
        assert_eq!(resolve_container(&p, Some("sidecar")).unwrap(), "sidecar");
    }

    #[test]
    fn unknown_container_lists_names() {
        let p = pod("prod", "web", "Running", &["app", "sidecar"]);
        let err = resolve_container(&p, Some("proxy")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("proxy"));
        assert!(err.to_string().contains("app, sidecar"));
    }

    #[test]
    fn no_containers_is_not_found() {
        let p = pod("prod", "web", "Running", &[]);
        assert_eq!(resolve_container(&p, None).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn since_rounds_up() {
        assert_eq!(since_seconds(Duration::from_millis(10)), 1);
        assert_eq!(since_seconds(Duration::ZERO), 1);
        assert_eq!(since_seconds(Duration::from_millis(1500)), 2);
        assert_eq!(since_seconds(Duration::from_secs(300)), 300);
    }

    #[test]
    fn header_names_filters() {
        let options = LogOptions {
            container: "app".into(),
            tail_lines: Some(100),
            since_seconds: Some(330),
            previous: true,
        };
        assert_eq!(
            header("app", "web", "prod", &options),
            "Logs for container 'app' in pod 'web' (namespace 'prod') [previous=true, tail=100, since=5m30s]:"
        );
        assert_eq!(
            header("app", "web", "prod", &LogOptions::default()),
            "Logs for container 'app' in pod 'web' (namespace 'prod'):"
        );
    }

    #[test]
    fn payload_is_capped() {
        let big = vec![b'x'; LOG_BYTE_LIMIT + 10];
        let (text, truncated) = bounded_payload(&big);
        assert!(truncated);
        assert_eq!(text.len(), LOG_BYTE_LIMIT);

        let (text, truncated) = bounded_payload(b"hello\n");
        assert!(!truncated);
        assert_eq!(text, "hello\n");
    }

    #[test]
    fn payload_exactly_at_ceiling_is_truncated() {
        let exact = vec![b'x'; LOG_BYTE_LIMIT];
        let (text, truncated) = bounded_payload(&exact);
        assert!(truncated);
        assert_eq!(text.len(), LOG_BYTE_LIMIT);

        let (_, truncated) = bounded_payload(&exact[..LOG_BYTE_LIMIT - 1]);
        assert!(!truncated);
    }

    #[test]
    fn invalid_utf8_growing_past_ceiling_is_truncated() {
        // Each 0xFF decodes to a three byte replacement character.
        let raw = vec![0xFF; 60 * 1024];
        let (text, truncated) = bounded_payload(&raw);
        assert!(truncated);
        assert!(text.len() <= LOG_BYTE_LIMIT);
        assert!(text.chars().all(|c| c == char::REPLACEMENT_CHARACTER));

        let (text, truncated) = bounded_payload(&[b'o', b'k', 0xFF, b'\n']);
        assert!(!truncated);
        assert_eq!(text, "ok\u{FFFD}\n");
    }

    #[test]
    fn truncation_notice_once_at_end() {
        let output = LogOutput {
            header: "h:".into(),
            payload: "line\n".into(),
            truncated: true,
        };
        let rendered = output.render();
        assert_eq!(rendered.matches("[output truncated").count(), 1);
        assert!(rendered.ends_with("[output truncated at 100 KiB]"));

        let output = LogOutput {
            truncated: false,
            ..output
        };
        assert!(!output.render().contains("truncated"));
    }
}
