//! kbatch Kubernetes adapter
//!
//! Maps job descriptors onto Kubernetes objects and drives them through
//! `kubectl`:
//! - naming: job ids and companion object names
//! - auth: command prefixes and kubeconfig bootstrapping
//! - builder: descriptor to resource graph
//! - render: resource graph to manifest YAML
//! - gateway: create, get, delete and list through the control plane
//! - status: cluster objects to normalized job info
//!
//! Process execution, host identity and rendering are traits so they can be
//! swapped out.

pub mod adapter;
pub mod auth;
pub mod builder;
pub mod config;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod naming;
pub mod process;
pub mod render;
pub mod status;

#[cfg(test)]
mod testing;

pub use adapter::{ConfigureReport, KubernetesAdapter};
pub use config::{AdapterConfig, AuthConfig, ServerConfig};
pub use error::{AdapterError, Result};
pub use identity::{HostIdentity, SystemIdentity};
pub use naming::JobId;
pub use process::{ProcessRunner, ShellRunner};
pub use render::{ManifestRenderer, Renderer, Template};
