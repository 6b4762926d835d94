//! Cluster session registry and resource operation manager.
//!
//! This crate sits between a tool-invocation front end and one or more
//! Kubernetes API servers. It provides:
//!
//! - [`Registry`]: named cluster sessions, each probed before it is
//!   accepted, plus the current context and namespace
//! - [`ResourceTranslator`]: create/get/list/delete on the typed and
//!   generic client paths
//! - [`RetryPolicy`]: per-attempt deadlines and bounded retries observing a
//!   [`CancelToken`]
//! - [`LogReader`]: container log reads capped at [`LOG_BYTE_LIMIT`] bytes
//! - [`ClusterManager`]: the façade returning text results
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                   Tool invocation layer                │
//! └───────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌───────────────────────────────────────────────────────┐
//! │                    ClusterManager                      │
//! │  ┌────────────┐  ┌────────────────────┐  ┌──────────┐ │
//! │  │  Registry  │◄─│ ResourceTranslator │◄─│LogReader │ │
//! │  └────────────┘  └────────────────────┘  └──────────┘ │
//! │                            │                           │
//! │                       RetryPolicy                      │
//! └───────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌───────────────────────────────────────────────────────┐
//! │        TypedResourceOps / GenericResourceOps           │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use kubelink_cluster::KubeConnector;
//! use kubelink_session::{CancelToken, ClusterManager, LogRequest, SessionConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SessionConfig::from_env();
//! let manager = ClusterManager::new(Arc::new(KubeConnector::new()), &config);
//!
//! manager.register_cluster("prod", "/home/me/.kube/config").await?;
//! manager.set_namespace("web");
//!
//! let logs = manager
//!     .stream_logs(&LogRequest::new("frontend-0"), &CancelToken::never())
//!     .await?;
//! println!("{logs}");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod cancel;
pub mod config;
pub mod deployment;
pub mod format;
pub mod logs;
pub mod manager;
pub mod registry;
pub mod retry;
pub mod translator;

pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use config::{SessionConfig, Timeouts};
pub use deployment::{DeploymentParams, DeploymentPlan};
pub use format::{Formatter, PlainFormatter};
pub use logs::{LogOutput, LogReader, LogRequest, LOG_BYTE_LIMIT};
pub use manager::ClusterManager;
pub use registry::{ClusterSession, Registry};
pub use retry::RetryPolicy;
pub use translator::{ListRequest, ResourceTranslator};
