//! Kubeconfig loading.
//!
//! Reads a kubeconfig document from disk, validates the backing file and
//! extracts the declared active context. The parsed document is handed to a
//! [`Connector`](crate::Connector) to build client handles.

use std::path::{Path, PathBuf};

use kube::config::Kubeconfig;
use kubelink_core::{KubelinkError, Result};
use tracing::debug;

/// A parsed kubeconfig together with the file it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Path of the backing kubeconfig file.
    pub source_path: PathBuf,
    /// The `current-context` declared by the document, if any.
    pub current_context: Option<String>,
    /// The parsed document.
    pub kubeconfig: Kubeconfig,
}

impl LoadedConfig {
    /// Read and parse the kubeconfig at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`KubelinkError::Config`] if the file is missing, is a
    /// directory, cannot be read, or does not parse as a kubeconfig.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        validate_source(path)?;

        let bytes = std::fs::read(path).map_err(|e| {
            KubelinkError::config(format!("cannot read kubeconfig {}: {e}", path.display()))
        })?;

        Self::from_bytes(&bytes, path)
    }

    /// Parse kubeconfig `bytes` whose backing file is `source_path`.
    ///
    /// The backing file is validated as well, so a descriptor whose source
    /// has since disappeared is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`KubelinkError::Config`] if the source file is invalid or the
    /// bytes are not a UTF-8 kubeconfig document.
    pub fn from_bytes(bytes: &[u8], source_path: impl AsRef<Path>) -> Result<Self> {
        let source_path = source_path.as_ref();
        validate_source(source_path)?;

        let text = std::str::from_utf8(bytes).map_err(|e| {
            KubelinkError::config(format!(
                "kubeconfig {} is not valid UTF-8: {e}",
                source_path.display()
            ))
        })?;

        if text.trim().is_empty() {
            return Err(KubelinkError::config(format!(
                "kubeconfig {} is empty",
                source_path.display()
            )));
        }

        let kubeconfig = Kubeconfig::from_yaml(text).map_err(|e| {
            KubelinkError::config(format!(
                "failed to parse kubeconfig {}: {e}",
                source_path.display()
            ))
        })?;

        let current_context = kubeconfig
            .current_context
            .clone()
            .filter(|name| !name.is_empty());

        debug!(
            path = %source_path.display(),
            current_context = ?current_context,
            contexts = kubeconfig.contexts.len(),
            "Loaded kubeconfig"
        );

        Ok(Self {
            source_path: source_path.to_path_buf(),
            current_context,
            kubeconfig,
        })
    }

    /// The namespace declared by the current context, if any.
    #[must_use]
    pub fn declared_namespace(&self) -> Option<String> {
        let current = self.current_context.as_deref()?;
        self.kubeconfig
            .contexts
            .iter()
            .find(|c| c.name == current)
            .and_then(|c| c.context.as_ref())
            .and_then(|c| c.namespace.clone())
    }
}

fn validate_source(path: &Path) -> Result<()> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        KubelinkError::config(format!("kubeconfig {} is not accessible: {e}", path.display()))
    })?;

    if metadata.is_dir() {
        return Err(KubelinkError::config(format!(
            "kubeconfig {} is a directory",
            path.display()
        )));
    }

    Ok(())
}
