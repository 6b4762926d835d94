//! End-to-end scenarios for the cluster manager against in-memory clusters.
//!
//! Run with:
//!   cargo test -p kubelink-session --test session_scenarios

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use kubelink_cluster::mock::pod;
use kubelink_cluster::{DeleteOptions, ListOptions, LoadedConfig, MockCluster, MockConnector};
use kubelink_core::{ErrorKind, KubelinkError, ResourceDescriptor};
use kubelink_session::{
    cancel_pair, CancelToken, ClusterManager, DeploymentParams, ListRequest, LogRequest,
    RetryPolicy, SessionConfig, LOG_BYTE_LIMIT,
};
use serde_json::json;
use tempfile::TempDir;

// =============================================================================
// Fixtures
// =============================================================================

fn kubeconfig(context: &str) -> String {
    format!(
        "apiVersion: v1
kind: Config
current-context: {context}
clusters:
- name: {context}
  cluster:
    server: https://{context}.example.com:6443
contexts:
- name: {context}
  context:
    cluster: {context}
    user: admin
users:
- name: admin
  user:
    token: secret
"
    )
}

struct Harness {
    dir: TempDir,
    connector: Arc<MockConnector>,
    manager: ClusterManager,
}

impl Harness {
    fn new() -> Self {
        let connector = Arc::new(MockConnector::new());
        let retry = RetryPolicy::new(3, vec![Duration::from_millis(1)]);
        let manager =
            ClusterManager::with_policy(connector.clone(), &SessionConfig::default(), retry);
        Self {
            dir: tempfile::tempdir().unwrap(),
            connector,
            manager,
        }
    }

    /// Write a kubeconfig for `context` served by `cluster`.
    fn kubeconfig_for(&self, file: &str, context: &str, cluster: &Arc<MockCluster>) -> PathBuf {
        let path = self.dir.path().join(file);
        std::fs::write(&path, kubeconfig(context)).unwrap();
        self.connector.insert(&path, Arc::clone(cluster));
        path
    }

    /// Register a fresh cluster named `name` and return it.
    async fn cluster(&self, name: &str) -> Arc<MockCluster> {
        let cluster = Arc::new(MockCluster::new(name));
        let path = self.kubeconfig_for(name, name, &cluster);
        self.manager.register_cluster(name, &path).await.unwrap();
        cluster
    }
}

fn never() -> CancelToken {
    CancelToken::never()
}

// =============================================================================
// Registration
// =============================================================================

#[tokio::test]
async fn register_reachable_cluster() {
    let h = Harness::new();
    let cluster = Arc::new(MockCluster::new("prod"));
    let path = h.kubeconfig_for("prod.yaml", "prod", &cluster);

    let message = h.manager.register_cluster("prod", &path).await.unwrap();
    assert!(message.contains("'prod'"));
    assert!(h.manager.registry().list_registered().contains(&"prod".to_string()));
    assert_eq!(h.manager.registry().lookup("prod").unwrap().name, "prod");
    assert_eq!(h.manager.list_clusters(), "1 clusters:\n* prod");
}

#[tokio::test]
async fn unreachable_cluster_is_rejected() {
    let h = Harness::new();
    let cluster = Arc::new(MockCluster::new("prod"));
    cluster.fail_probe(KubelinkError::connection("401 Unauthorized"));
    let path = h.kubeconfig_for("prod.yaml", "prod", &cluster);

    let err = h.manager.register_cluster("prod", &path).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(err.to_string().contains("prod"));
    assert_eq!(h.manager.list_clusters(), "No clusters registered");
}

#[tokio::test]
async fn malformed_kubeconfig_is_config_error() {
    let h = Harness::new();
    let path = h.dir.path().join("broken.yaml");
    std::fs::write(&path, "clusters: [unterminated").unwrap();

    let err = h.manager.register_cluster("prod", &path).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);

    let err = h
        .manager
        .register_cluster("prod", h.dir.path())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[tokio::test]
async fn reregistration_uses_new_handles_exclusively() {
    let h = Harness::new();
    let first = Arc::new(MockCluster::new("first"));
    let second = Arc::new(MockCluster::new("second"));
    first.add_pod(pod("default", "old", "Running", &["app"]));
    second.add_pod(pod("default", "new", "Running", &["app"]));

    let p1 = h.kubeconfig_for("one.yaml", "prod", &first);
    let p2 = h.kubeconfig_for("two.yaml", "prod", &second);
    h.manager.register_cluster("prod", &p1).await.unwrap();
    h.manager.register_cluster("prod", &p2).await.unwrap();

    let calls_before = first.call_count();
    let listed = h
        .manager
        .list_pods("default", &ListOptions::default(), &never())
        .await
        .unwrap();

    assert!(listed.contains("default/new"));
    assert!(!listed.contains("default/old"));
    assert_eq!(first.call_count(), calls_before);
}

#[tokio::test]
async fn context_switching() {
    let h = Harness::new();
    let a = h.cluster("alpha").await;
    let b = h.cluster("beta").await;
    a.add_pod(pod("default", "from-alpha", "Running", &["app"]));
    b.add_pod(pod("default", "from-beta", "Running", &["app"]));

    let err = h.manager.switch_context("gamma").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    h.manager.switch_context("beta").unwrap();
    assert_eq!(h.manager.registry().current().unwrap().name, "beta");
    let listed = h
        .manager
        .list_pods("", &ListOptions::default(), &never())
        .await
        .unwrap();
    assert!(listed.contains("from-beta"));

    h.manager.switch_context("alpha").unwrap();
    assert!(h.manager.list_clusters().contains("* alpha"));
}

#[tokio::test]
async fn unregistering_current_falls_back() {
    let h = Harness::new();
    h.cluster("beta").await;
    h.cluster("alpha").await;
    h.manager.switch_context("beta").unwrap();

    h.manager.unregister_cluster("beta").unwrap();
    assert_eq!(h.manager.registry().current().unwrap().name, "alpha");

    h.manager.unregister_cluster("alpha").unwrap();
    let err = h.manager.registry().current().unwrap_err();
    assert!(err.to_string().contains("no clusters configured"));
}

#[test]
fn namespace_selection() {
    let h = Harness::new();
    assert_eq!(h.manager.current_namespace(), "default");
    h.manager.set_namespace("payments");
    assert_eq!(h.manager.current_namespace(), "payments");
    h.manager.set_namespace("");
    assert_eq!(h.manager.current_namespace(), "default");
}

#[tokio::test]
async fn declared_context_brings_its_namespace() {
    let h = Harness::new();
    let cluster = Arc::new(MockCluster::new("prod"));
    let path = h.kubeconfig_for("prod.yaml", "prod", &cluster);
    let with_namespace = kubeconfig("prod").replace(
        "    user: admin\nusers:",
        "    user: admin\n    namespace: payments\nusers:",
    );
    std::fs::write(&path, with_namespace).unwrap();

    let loaded = LoadedConfig::from_file(&path).unwrap();
    let message = h.manager.register_declared(&loaded).await.unwrap();
    assert!(message.contains("'prod'"));
    assert_eq!(h.manager.current_namespace(), "payments");

    let plain = Arc::new(MockCluster::new("staging"));
    let path = h.kubeconfig_for("staging.yaml", "staging", &plain);
    let loaded = LoadedConfig::from_file(&path).unwrap();
    h.manager.register_declared(&loaded).await.unwrap();
    assert_eq!(h.manager.current_namespace(), "payments");
}

// =============================================================================
// Resource operations
// =============================================================================

#[tokio::test]
async fn get_on_empty_registry_reports_no_clusters() {
    let h = Harness::new();
    let err = h
        .manager
        .get_resource(&ResourceDescriptor::pods("ns", "missing"), &never())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(err.to_string().contains("no clusters configured"));
}

#[tokio::test]
async fn get_names_object_and_namespace() {
    let h = Harness::new();
    let cluster = h.cluster("prod").await;
    cluster.add_namespace("shop");

    let err = h
        .manager
        .get_resource(&ResourceDescriptor::services("nowhere", "api"), &never())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("'api'"));
    assert!(err.to_string().contains("'nowhere'"));

    let err = h
        .manager
        .get_resource(&ResourceDescriptor::services("shop", "api"), &never())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("'api'"));
    assert!(err.to_string().contains("'shop'"));
}

#[tokio::test]
async fn delete_into_missing_namespace_never_reaches_cluster() {
    let h = Harness::new();
    let cluster = h.cluster("prod").await;
    cluster.add_pod(pod("default", "web", "Running", &["app"]));
    cluster.add_document(
        &ResourceDescriptor::services("default", "api"),
        json!({"metadata": {"name": "api", "namespace": "default"}}),
    );

    let err = h
        .manager
        .delete_resource(&ResourceDescriptor::services("ghost", "api"), true, &never())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("'api'"));
    assert!(err.to_string().contains("'ghost'"));

    let err = h
        .manager
        .delete_pod("ghost", "web", false, &never())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("'web'"));
    assert!(err.to_string().contains("'ghost'"));

    assert_eq!(cluster.last_delete(), None);
    assert!(cluster
        .document(&ResourceDescriptor::services("default", "api"))
        .is_some());
}

#[tokio::test]
async fn get_defaults_to_current_namespace() {
    let h = Harness::new();
    let cluster = h.cluster("prod").await;
    let target = ResourceDescriptor::services("shop", "api");
    cluster.add_document(&target, json!({"metadata": {"name": "api", "namespace": "shop"}}));

    h.manager.set_namespace("shop");
    let rendered = h
        .manager
        .get_resource(&ResourceDescriptor::services("", "api"), &never())
        .await
        .unwrap();
    assert!(rendered.contains("\"api\""));
}

#[tokio::test]
async fn list_with_and_without_selectors() {
    let h = Harness::new();
    let cluster = h.cluster("prod").await;
    let target = ResourceDescriptor::services("shop", "");
    cluster.add_document(
        &target.clone().named("api"),
        json!({"metadata": {"name": "api", "namespace": "shop", "labels": {"tier": "backend"}}}),
    );

    let listed = h
        .manager
        .list_resources(&ListRequest::new(target.clone()), &never())
        .await
        .unwrap();
    assert_eq!(listed, "1 services:\n- shop/api");

    let err = h
        .manager
        .list_resources(&ListRequest::new(target.clone()).with_labels("tier=frontend"), &never())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("matching selectors"));

    let err = h
        .manager
        .list_resources(&ListRequest::new(target.in_namespace("empty")), &never())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "no services found in namespace 'empty'");
}

#[tokio::test]
async fn create_and_force_delete_generic() {
    let h = Harness::new();
    let cluster = h.cluster("prod").await;
    h.manager.set_namespace("default");

    let target = ResourceDescriptor::new("", "v1", "configmaps", "", "");
    let document = json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {"name": "settings"},
        "data": {"mode": "fast"}
    });
    h.manager
        .create_resource(&target, &document, &never())
        .await
        .unwrap();

    let stored = target.clone().in_namespace("default").named("settings");
    assert_eq!(cluster.document(&stored).unwrap()["data"]["mode"], "fast");

    let err = h
        .manager
        .create_resource(&target, &document, &never())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let message = h
        .manager
        .delete_resource(&target.clone().named("settings"), true, &never())
        .await
        .unwrap();
    assert_eq!(message, "Deleted configmaps 'settings' in namespace 'default'");
    assert_eq!(cluster.last_delete(), Some(DeleteOptions::force()));
    assert!(cluster.document(&stored).is_none());

    let err = h
        .manager
        .delete_resource(&target.named("settings"), false, &never())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn typed_pod_operations() {
    let h = Harness::new();
    let cluster = h.cluster("prod").await;
    cluster.add_pod(pod("shop", "web-1", "Running", &["app"]));
    cluster.add_pod(pod("shop", "web-2", "Pending", &["app"]));

    let rendered = h.manager.get_pod("shop", "web-1", &never()).await.unwrap();
    assert!(rendered.contains("\"web-1\""));

    let listed = h
        .manager
        .list_pods("shop", &ListOptions { limit: Some(1), ..Default::default() }, &never())
        .await
        .unwrap();
    assert!(listed.starts_with("1 pods:"));

    h.manager.delete_pod("shop", "web-2", false, &never()).await.unwrap();
    assert_eq!(cluster.last_delete(), Some(DeleteOptions::default()));

    let err = h.manager.get_pod("shop", "web-2", &never()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// =============================================================================
// Deployments
// =============================================================================

#[tokio::test]
async fn create_deployment_reports_name_and_namespace() {
    let h = Harness::new();
    let cluster = h.cluster("prod").await;

    let mut params = DeploymentParams::new("web", "nginx:1.27");
    params.replicas = 3;
    params.container_port = Some("80/TCP".into());

    let message = h.manager.create_deployment(&params, &never()).await.unwrap();
    assert!(message.contains("web"));
    assert!(message.contains("default"));

    let stored = cluster
        .document(&ResourceDescriptor::deployments("default", "web"))
        .unwrap();
    assert_eq!(stored["spec"]["replicas"], 3);
    let port = &stored["spec"]["template"]["spec"]["containers"][0]["ports"][0];
    assert_eq!(port["containerPort"], 80);
    assert_eq!(port["protocol"], "TCP");
}

#[tokio::test]
async fn create_deployment_validates_before_submitting() {
    let h = Harness::new();
    let cluster = h.cluster("prod").await;
    let calls = cluster.call_count();

    let err = h
        .manager
        .create_deployment(&DeploymentParams::new("web", ""), &never())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(cluster.call_count(), calls);
}

#[tokio::test]
async fn list_deployments_empty_result() {
    let h = Harness::new();
    h.cluster("prod").await;

    let err = h
        .manager
        .list_deployments("", &ListOptions::default(), &never())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "no deployments found in all namespaces");
}

// =============================================================================
// Logs
// =============================================================================

#[tokio::test]
async fn pending_pod_logs_need_previous() {
    let h = Harness::new();
    let cluster = h.cluster("prod").await;
    cluster.add_pod(pod("default", "web", "Pending", &["app"]));

    let err = h
        .manager
        .stream_logs(&LogRequest::new("web"), &never())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("Pending"));
    assert!(err.to_string().contains("previous=true"));
}

#[tokio::test]
async fn previous_logs_of_failed_pod() {
    let h = Harness::new();
    let cluster = h.cluster("prod").await;
    cluster.add_pod(pod("default", "web", "Failed", &["app"]));
    cluster.set_logs("default", "web", "app", true, b"panic: boom\n");

    let request = LogRequest {
        previous: true,
        tail_lines: Some(0),
        since: Some(Duration::from_millis(1500)),
        ..LogRequest::new("web")
    };
    let rendered = h.manager.stream_logs(&request, &never()).await.unwrap();
    assert!(rendered.contains("previous=true"));
    assert!(rendered.contains("since=2s"));
    assert!(!rendered.contains("tail="));
    assert!(rendered.ends_with("panic: boom\n"));

    let options = cluster.last_log_options().unwrap();
    assert_eq!(options.tail_lines, None);
    assert_eq!(options.since_seconds, Some(2));
}

#[tokio::test]
async fn empty_logs_are_not_found() {
    let h = Harness::new();
    let cluster = h.cluster("prod").await;
    cluster.add_pod(pod("default", "web", "Running", &["app"]));

    let err = h
        .manager
        .stream_logs(&LogRequest::new("web"), &never())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.to_string(), "no logs found for container app in pod web");
}

#[tokio::test]
async fn container_resolution() {
    let h = Harness::new();
    let cluster = h.cluster("prod").await;
    cluster.add_pod(pod("default", "web", "Running", &["app", "proxy"]));
    cluster.set_logs("default", "web", "app", false, b"from app\n");
    cluster.set_logs("default", "web", "proxy", false, b"from proxy\n");

    let rendered = h.manager.stream_logs(&LogRequest::new("web"), &never()).await.unwrap();
    assert!(rendered.contains("container 'app'"));
    assert!(rendered.contains("from app"));

    let request = LogRequest {
        container_name: Some("metrics".into()),
        ..LogRequest::new("web")
    };
    let err = h.manager.stream_logs(&request, &never()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("app, proxy"));
}

#[tokio::test]
async fn oversized_logs_are_truncated_once() {
    let h = Harness::new();
    let cluster = h.cluster("prod").await;
    cluster.add_pod(pod("default", "web", "Running", &["app"]));
    let line = b"0123456789abcdef\n";
    let big: Vec<u8> = line.iter().copied().cycle().take(LOG_BYTE_LIMIT * 2).collect();
    cluster.set_logs("default", "web", "app", false, &big);

    let rendered = h.manager.stream_logs(&LogRequest::new("web"), &never()).await.unwrap();
    let (header, rest) = rendered.split_once('\n').unwrap();
    assert!(header.starts_with("Logs for container 'app' in pod 'web'"));
    assert_eq!(rest.matches("[output truncated").count(), 1);
    assert!(rest.ends_with("[output truncated at 100 KiB]"));

    let payload_len = rest.len() - "\n[output truncated at 100 KiB]".len();
    assert!(payload_len <= LOG_BYTE_LIMIT);
}

#[tokio::test]
async fn logs_exactly_at_ceiling_are_marked_truncated() {
    let h = Harness::new();
    let cluster = h.cluster("prod").await;
    cluster.add_pod(pod("default", "web", "Running", &["app"]));
    cluster.set_logs("default", "web", "app", false, &vec![b'x'; LOG_BYTE_LIMIT]);

    let rendered = h.manager.stream_logs(&LogRequest::new("web"), &never()).await.unwrap();
    let (_, rest) = rendered.split_once('\n').unwrap();
    assert_eq!(rest.matches("[output truncated").count(), 1);
    let payload = rest.strip_suffix("\n[output truncated at 100 KiB]").unwrap();
    assert_eq!(payload.len(), LOG_BYTE_LIMIT);

    cluster.set_logs("default", "web", "app", false, &vec![b'x'; LOG_BYTE_LIMIT - 1]);
    let rendered = h.manager.stream_logs(&LogRequest::new("web"), &never()).await.unwrap();
    assert!(!rendered.contains("[output truncated"));
}

// =============================================================================
// Retry and cancellation
// =============================================================================

#[tokio::test]
async fn transient_failures_are_retried() {
    let h = Harness::new();
    let cluster = h.cluster("prod").await;
    cluster.add_pod(pod("default", "web", "Running", &["app"]));
    cluster.fail_next(KubelinkError::transient("connection reset by peer"));
    cluster.fail_next(KubelinkError::transient("connection reset by peer"));

    let rendered = h
        .manager
        .list_pods("default", &ListOptions::default(), &never())
        .await
        .unwrap();
    assert!(rendered.contains("default/web"));
}

#[tokio::test]
async fn exhausted_retries_keep_last_cause() {
    let h = Harness::new();
    let cluster = h.cluster("prod").await;
    for i in 0..3 {
        cluster.fail_next(KubelinkError::transient(format!("timeout #{i}")));
    }

    let err = h
        .manager
        .list_pods("", &ListOptions::default(), &never())
        .await
        .unwrap_err();
    assert!(matches!(err, KubelinkError::RetriesExhausted { attempts: 3, .. }));
    assert!(err.to_string().contains("timeout #2"));
}

#[tokio::test]
async fn cancelled_call_is_not_retried() {
    let h = Harness::new();
    let cluster = h.cluster("prod").await;
    let (handle, token) = cancel_pair();
    handle.cancel();
    let calls = cluster.call_count();

    let err = h
        .manager
        .list_pods("", &ListOptions::default(), &token)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(cluster.call_count(), calls);
}
