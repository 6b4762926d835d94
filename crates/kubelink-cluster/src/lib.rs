//! Cluster API contract and kube-rs backed client for kubelink.
//!
//! This crate defines the capability set the session manager consumes:
//!
//! - [`Connector`] turns a [`LoadedConfig`] into a pair of client handles
//! - [`TypedResourceOps`] covers strongly-shaped access to well-known kinds
//!   (namespaces, pods, deployments, container logs)
//! - [`GenericResourceOps`] covers schema-less documents addressed by a
//!   [`ResourceDescriptor`](kubelink_core::ResourceDescriptor)
//!
//! [`KubeConnector`] implements the contract against a real API server using
//! `kube`. With the `test-utils` feature, [`MockCluster`] and [`MockConnector`]
//! provide an in-memory implementation.
//!
//! # Example
//!
//! ```no_run
//! use kubelink_cluster::{Connector, KubeConnector, LoadedConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = LoadedConfig::from_file("/home/me/.kube/config")?;
//! let handles = KubeConnector::new().connect(&config).await?;
//!
//! handles.typed.probe().await?;
//! let pods = handles.typed.list_pods("default", &Default::default()).await?;
//! println!("{} pods", pods.len());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod k8s;
pub mod ops;
pub mod types;

pub use config::LoadedConfig;
pub use k8s::KubeConnector;
pub use ops::{ClusterHandles, Connector, GenericResourceOps, TypedResourceOps};
pub use types::{DeleteOptions, ListOptions, LogOptions, PodPhase};

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{MockCluster, MockConnector};
