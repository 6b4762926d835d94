//! Connection registry.
//!
//! Holds the named cluster sessions together with the current context and
//! namespace. All state sits behind one `RwLock`; the lock is never held
//! across a remote call, so registration connects and probes first and only
//! then takes the write lock to publish the session.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kubelink_cluster::{Connector, GenericResourceOps, LoadedConfig, TypedResourceOps};
use kubelink_core::{KubelinkError, Result};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

/// Namespace used when the caller selects the empty namespace.
pub const DEFAULT_NAMESPACE: &str = "default";

/// A registered, reachable cluster connection.
///
/// Sessions are immutable once published; re-registration replaces the
/// whole session.
pub struct ClusterSession {
    /// Registration name.
    pub name: String,
    /// Typed client path.
    pub typed: Arc<dyn TypedResourceOps>,
    /// Generic client path.
    pub generic: Arc<dyn GenericResourceOps>,
    /// Kubeconfig the session was built from.
    pub source_path: PathBuf,
    /// Active context declared by that kubeconfig.
    pub declared_context: Option<String>,
    /// When the session passed its liveness probe.
    pub registered_at: DateTime<Utc>,
}

impl std::fmt::Debug for ClusterSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterSession")
            .field("name", &self.name)
            .field("source_path", &self.source_path)
            .field("declared_context", &self.declared_context)
            .field("registered_at", &self.registered_at)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct RegistryState {
    sessions: HashMap<String, Arc<ClusterSession>>,
    current_context: String,
    current_namespace: String,
}

/// Named cluster sessions plus the current context and namespace.
pub struct Registry {
    state: RwLock<RegistryState>,
    connector: Arc<dyn Connector>,
    probe_timeout: Duration,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("state", &*self.state.read())
            .field("probe_timeout", &self.probe_timeout)
            .finish_non_exhaustive()
    }
}

fn normalize_namespace(namespace: &str) -> String {
    if namespace.is_empty() {
        DEFAULT_NAMESPACE.to_string()
    } else {
        namespace.to_string()
    }
}

impl Registry {
    /// Create an empty registry.
    ///
    /// `probe_timeout` bounds the liveness probe made during registration.
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>, probe_timeout: Duration, namespace: &str) -> Self {
        Self {
            state: RwLock::new(RegistryState {
                sessions: HashMap::new(),
                current_context: String::new(),
                current_namespace: normalize_namespace(namespace),
            }),
            connector,
            probe_timeout,
        }
    }

    /// Load the kubeconfig at `path` and register it under `name`.
    ///
    /// # Errors
    ///
    /// - [`KubelinkError::Config`] if `name` is empty or the file is missing,
    ///   unreadable, a directory, or malformed
    /// - [`KubelinkError::Connection`] if the cluster fails its liveness probe
    pub async fn register(
        &self,
        name: &str,
        path: impl AsRef<Path>,
    ) -> Result<Arc<ClusterSession>> {
        if name.is_empty() {
            return Err(KubelinkError::config("cluster name must not be empty"));
        }
        let config = LoadedConfig::from_file(path)?;
        self.register_loaded(name, &config).await
    }

    /// Register an already loaded kubeconfig under `name`.
    ///
    /// Replaces any session previously registered under the same name.
    ///
    /// # Errors
    ///
    /// Same as [`Registry::register`].
    pub async fn register_loaded(
        &self,
        name: &str,
        config: &LoadedConfig,
    ) -> Result<Arc<ClusterSession>> {
        if name.is_empty() {
            return Err(KubelinkError::config("cluster name must not be empty"));
        }

        let handles = self.connector.connect(config).await?;

        let probe = tokio::time::timeout(self.probe_timeout, handles.typed.probe()).await;
        let unreachable = match probe {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!(
                "liveness probe timed out after {}s",
                self.probe_timeout.as_secs()
            )),
        };
        if let Some(reason) = unreachable {
            warn!(cluster = %name, reason = %reason, "Cluster failed liveness probe");
            return Err(KubelinkError::connection(format!(
                "cluster '{name}' is unreachable: {reason}"
            )));
        }

        let session = Arc::new(ClusterSession {
            name: name.to_string(),
            typed: handles.typed,
            generic: handles.generic,
            source_path: config.source_path.clone(),
            declared_context: handles.declared_context,
            registered_at: Utc::now(),
        });

        let (replaced, became_current) = {
            let mut state = self.state.write();
            let replaced = state
                .sessions
                .insert(name.to_string(), Arc::clone(&session))
                .is_some();
            let became_current = state.sessions.len() == 1
                || state.current_context.is_empty()
                || session.declared_context.as_deref() == Some(name);
            if became_current {
                state.current_context = name.to_string();
            }
            (replaced, became_current)
        };

        info!(
            cluster = %name,
            path = %config.source_path.display(),
            replaced,
            current = became_current,
            "Registered cluster"
        );
        Ok(session)
    }

    /// Remove the session registered under `name`.
    ///
    /// Clears the current context if it named the removed session.
    ///
    /// # Errors
    ///
    /// Returns [`KubelinkError::NotFound`] if no such session exists.
    pub fn unregister(&self, name: &str) -> Result<Arc<ClusterSession>> {
        let mut state = self.state.write();
        let removed = state
            .sessions
            .remove(name)
            .ok_or_else(|| cluster_not_found(name))?;
        if state.current_context == name {
            state.current_context.clear();
        }
        drop(state);

        info!(cluster = %name, "Unregistered cluster");
        Ok(removed)
    }

    /// Look up a session by name.
    ///
    /// # Errors
    ///
    /// Returns [`KubelinkError::NotFound`] if no such session exists.
    pub fn lookup(&self, name: &str) -> Result<Arc<ClusterSession>> {
        self.state
            .read()
            .sessions
            .get(name)
            .cloned()
            .ok_or_else(|| cluster_not_found(name))
    }

    /// Resolve the current session.
    ///
    /// Falls back to the registered session with the smallest name when the
    /// current context names no session.
    ///
    /// # Errors
    ///
    /// Returns [`KubelinkError::Connection`] if no cluster is registered.
    pub fn current(&self) -> Result<Arc<ClusterSession>> {
        let state = self.state.read();
        if let Some(session) = state.sessions.get(&state.current_context) {
            return Ok(Arc::clone(session));
        }

        let fallback = state
            .sessions
            .iter()
            .min_by(|a, b| a.0.cmp(b.0))
            .map(|(_, session)| Arc::clone(session));
        match fallback {
            Some(session) => {
                debug!(
                    requested = %state.current_context,
                    resolved = %session.name,
                    "Current context not registered, using fallback session"
                );
                Ok(session)
            }
            None => Err(KubelinkError::connection("no clusters configured")),
        }
    }

    /// Make `name` the current context.
    ///
    /// # Errors
    ///
    /// Returns [`KubelinkError::NotFound`] if no such session exists.
    pub fn set_current_context(&self, name: &str) -> Result<()> {
        let mut state = self.state.write();
        if !state.sessions.contains_key(name) {
            return Err(cluster_not_found(name));
        }
        state.current_context = name.to_string();
        drop(state);

        info!(cluster = %name, "Switched current context");
        Ok(())
    }

    /// Select the current namespace; the empty string selects `default`.
    ///
    /// The namespace is not checked against the cluster.
    pub fn set_current_namespace(&self, namespace: &str) -> String {
        let namespace = normalize_namespace(namespace);
        self.state.write().current_namespace.clone_from(&namespace);
        info!(namespace = %namespace, "Switched current namespace");
        namespace
    }

    /// The current namespace. Never empty.
    #[must_use]
    pub fn current_namespace(&self) -> String {
        self.state.read().current_namespace.clone()
    }

    /// The current context name, possibly naming no registered session.
    #[must_use]
    pub fn current_context_name(&self) -> String {
        self.state.read().current_context.clone()
    }

    /// Names of all registered sessions, sorted.
    #[must_use]
    pub fn list_registered(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.read().sessions.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().sessions.len()
    }

    /// Returns true if no session is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().sessions.is_empty()
    }
}

fn cluster_not_found(name: &str) -> KubelinkError {
    KubelinkError::not_found(format!("cluster '{name}' not found"))
}
