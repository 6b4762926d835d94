//! kubelink - cluster session bootstrap.
//!
//! Registers the configured clusters, probing each one, and reports the
//! resulting sessions. The tool-invocation front end embeds
//! [`ClusterManager`] the same way.
//!
//! # Environment
//!
//! - `KUBELINK_CLUSTERS`: `name=path` pairs separated by commas
//! - `KUBECONFIG` / `~/.kube/config`: used when `KUBELINK_CLUSTERS` is unset,
//!   registered under the name of its declared context
//! - `RUST_LOG`: log filter, defaults to `info,kubelink=debug`
//! - see [`SessionConfig::from_env`] for deadlines and retries

use std::path::PathBuf;
use std::sync::Arc;

use kubelink_cluster::{KubeConnector, LoadedConfig};
use kubelink_session::{ClusterManager, SessionConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Parse `name=path,name=path`.
fn parse_cluster_list(value: &str) -> Vec<(String, PathBuf)> {
    value
        .split(',')
        .filter_map(|entry| {
            let (name, path) = entry.split_once('=')?;
            let (name, path) = (name.trim(), path.trim());
            (!name.is_empty() && !path.is_empty()).then(|| (name.to_string(), PathBuf::from(path)))
        })
        .collect()
}

fn default_kubeconfig() -> Option<PathBuf> {
    if let Some(paths) = std::env::var_os("KUBECONFIG") {
        if let Some(first) = std::env::split_paths(&paths).find(|p| !p.as_os_str().is_empty()) {
            return Some(first);
        }
    }
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".kube").join("config"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,kubelink=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting kubelink");

    let config = SessionConfig::from_env();
    tracing::info!(
        read_timeout = config.read_timeout_seconds,
        write_timeout = config.write_timeout_seconds,
        max_attempts = config.max_attempts,
        namespace = %config.default_namespace,
        "Loaded session configuration"
    );

    let manager = ClusterManager::new(Arc::new(KubeConnector::new()), &config);

    match std::env::var("KUBELINK_CLUSTERS") {
        Ok(value) => {
            for (name, path) in parse_cluster_list(&value) {
                match manager.register_cluster(&name, &path).await {
                    Ok(message) => tracing::info!(cluster = %name, "{message}"),
                    Err(e) => tracing::error!(cluster = %name, error = %e, "Failed to register cluster"),
                }
            }
        }
        Err(_) => {
            let path = default_kubeconfig().ok_or("no kubeconfig location: set KUBECONFIG or HOME")?;
            let loaded = LoadedConfig::from_file(&path)?;
            match manager.register_declared(&loaded).await {
                Ok(message) => tracing::info!(path = %path.display(), "{message}"),
                Err(e) => tracing::error!(path = %path.display(), error = %e, "Failed to register cluster"),
            }
        }
    }

    if manager.registry().is_empty() {
        return Err("no cluster could be registered".into());
    }

    println!("{}", manager.list_clusters());
    println!("Current namespace: {}", manager.current_namespace());
    Ok(())
}
