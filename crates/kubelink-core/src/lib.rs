//! Core types and utilities for kubelink.
//!
//! This crate provides the foundational types shared by the cluster client and
//! the session manager:
//!
//! - **Error taxonomy**: [`KubelinkError`] and its [`ErrorKind`] classification
//! - **Resource addressing**: [`ResourceDescriptor`] identifying a cluster object
//!   by group, version, plural resource name, namespace and name
//!
//! # Example
//!
//! ```
//! use kubelink_core::ResourceDescriptor;
//!
//! let pod = ResourceDescriptor::pods("kube-system", "coredns-abc");
//! assert_eq!(pod.api_version(), "v1");
//!
//! let deploy = ResourceDescriptor::deployments("default", "web");
//! assert_eq!(deploy.api_version(), "apps/v1");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod resource;

pub use error::{ErrorKind, KubelinkError, Result};
pub use resource::ResourceDescriptor;
