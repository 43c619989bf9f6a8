//! Adapter configuration
//!
//! Declared once per cluster and immutable after the adapter is constructed.
//! Every field has a documented default so an empty document is a valid
//! configuration.

use kbatch_core::domain::native::MountSpec;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{AdapterError, Result};

pub const DEFAULT_BIN: &str = "/usr/bin/kubectl";
pub const DEFAULT_CLUSTER: &str = "kbatch";
pub const DEFAULT_ENDPOINT: &str = "https://localhost:8080";
pub const DEFAULT_GPU_TYPE: &str = "nvidia.com/gpu";

/// Kubernetes adapter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// kubeconfig file passed to every invocation
    pub config_file: String,

    /// Path to the control-plane binary
    pub bin: String,

    /// Cluster name registered in the kubeconfig
    pub cluster: String,

    /// Explicit context; oidc defaults it to the cluster name
    pub context: Option<String>,

    /// Mounts added to every pod, ahead of job-specific mounts
    pub mounts: Vec<MountSpec>,

    /// List pods across every namespace instead of the user's own
    pub all_namespaces: bool,

    /// Prepended to the username to form the kubeconfig user
    pub username_prefix: String,

    /// Prepended to the sanitized username to form the namespace
    pub namespace_prefix: String,

    /// Add the invoking user's groups (gid >= 1000) to every pod
    pub auto_supplemental_groups: bool,

    /// Extended resource key used when a job asks for GPUs
    pub gpu_type: String,

    pub server: ServerConfig,

    pub auth: AuthConfig,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            config_file: default_config_file(),
            bin: DEFAULT_BIN.to_string(),
            cluster: DEFAULT_CLUSTER.to_string(),
            context: None,
            mounts: Vec::new(),
            all_namespaces: false,
            username_prefix: String::new(),
            namespace_prefix: String::new(),
            auto_supplemental_groups: false,
            gpu_type: DEFAULT_GPU_TYPE.to_string(),
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

/// `$KUBECONFIG`, else `~/.kube/config`
pub fn default_config_file() -> String {
    std::env::var("KUBECONFIG").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_default();
        format!("{home}/.kube/config")
    })
}

/// Cluster API endpoint registered by `set-cluster`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub endpoint: String,
    pub cert_authority_file: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            cert_authority_file: None,
        }
    }
}

/// Credential strategy
///
/// A configuration without an `auth` block is treated as `managed`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthConfig {
    /// Credentials are provisioned outside the adapter
    #[default]
    Managed,
    /// Bind a context to the cluster and a prefixed user
    Oidc,
    /// Fetch credentials for a GKE cluster with a service account
    Gke {
        svc_acct_file: String,
        #[serde(default)]
        zone: Option<String>,
        #[serde(default)]
        region: Option<String>,
    },
}

impl AuthConfig {
    pub fn is_oidc(&self) -> bool {
        matches!(self, AuthConfig::Oidc)
    }
}

impl AdapterConfig {
    /// Loads configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            AdapterError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
            .map_err(|e| AdapterError::Configuration(format!("invalid adapter config: {e}")))
    }

    /// The context every invocation targets, if any
    ///
    /// oidc without an explicit context binds one named after the cluster;
    /// the other strategies never invent one.
    pub fn effective_context(&self) -> Option<String> {
        match (&self.context, &self.auth) {
            (Some(ctx), _) => Some(ctx.clone()),
            (None, AuthConfig::Oidc) => Some(self.cluster.clone()),
            (None, _) => None,
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.bin.is_empty() {
            return Err(AdapterError::Configuration("bin cannot be empty".into()));
        }

        if self.cluster.is_empty() {
            return Err(AdapterError::Configuration("cluster cannot be empty".into()));
        }

        if !self.server.endpoint.starts_with("http://")
            && !self.server.endpoint.starts_with("https://")
        {
            return Err(AdapterError::Configuration(
                "server.endpoint must start with http:// or https://".into(),
            ));
        }

        if let AuthConfig::Gke { svc_acct_file, .. } = &self.auth {
            if svc_acct_file.is_empty() {
                return Err(AdapterError::Configuration(
                    "gke auth requires svc_acct_file".into(),
                ));
            }
        }

        Ok(())
    }
}
