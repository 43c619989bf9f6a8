//! Typed native job configuration
//!
//! The "native" block of a job descriptor carries everything that is specific
//! to running on a container orchestrator. Every field is optional on the
//! wire; documented defaults are applied by the adapter when it builds the
//! resource graph.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default container name when the descriptor does not provide one
pub const DEFAULT_CONTAINER_NAME: &str = "job";
pub const DEFAULT_CPU: &str = "1";
pub const DEFAULT_MEMORY: &str = "4Gi";
pub const DEFAULT_RESTART_POLICY: &str = "Never";
pub const DEFAULT_IMAGE_PULL_POLICY: &str = "IfNotPresent";

/// Orchestrator-specific part of a job descriptor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeSpec {
    /// Primary container; required to build a pod
    pub container: Option<ContainerSpec>,
    pub init_containers: Vec<InitContainerSpec>,
    pub configmap: Option<ConfigMapSpec>,
    /// Job-specific mounts, appended after the adapter's global mounts
    pub mounts: Vec<MountSpec>,
    pub node_selector: Option<BTreeMap<String, String>>,
    /// Extended resource key used for GPU requests
    pub gpu_type: Option<String>,
    /// String data for a companion secret (e.g. a session password)
    pub secret: Option<BTreeMap<String, String>>,
}

/// Container command, either a shell-style string or an explicit argv
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    Line(String),
    Args(Vec<String>),
}

impl CommandSpec {
    /// Argument vector, splitting a command line on whitespace
    pub fn to_args(&self) -> Vec<String> {
        match self {
            CommandSpec::Line(line) => line.split_whitespace().map(str::to_string).collect(),
            CommandSpec::Args(args) => args.clone(),
        }
    }
}

/// Security context overrides for the primary container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityContextSpec {
    #[serde(alias = "runAsUser")]
    pub run_as_user: Option<u32>,
    #[serde(alias = "runAsGroup")]
    pub run_as_group: Option<u32>,
    #[serde(alias = "runAsNonRoot")]
    pub run_as_non_root: Option<bool>,
    #[serde(alias = "fsGroup")]
    pub fs_group: Option<u32>,
}

/// Probe thresholds; unset fields fall back to cluster defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSpec {
    pub initial_delay_seconds: Option<u32>,
    pub failure_threshold: Option<u32>,
    pub period_seconds: Option<u32>,
    pub timeout_seconds: Option<u32>,
}

/// Primary container declaration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerSpec {
    pub name: Option<String>,
    pub image: String,
    pub command: Option<CommandSpec>,
    pub port: Option<u16>,
    pub env: BTreeMap<String, String>,
    pub cpu: Option<String>,
    pub cpu_request: Option<String>,
    pub cpu_limit: Option<String>,
    pub memory: Option<String>,
    pub memory_request: Option<String>,
    pub memory_limit: Option<String>,
    pub working_dir: Option<String>,
    pub restart_policy: Option<String>,
    pub image_pull_policy: Option<String>,
    pub image_pull_secret: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub startup_probe: Option<ProbeSpec>,
    #[serde(alias = "securityContext")]
    pub security_context: Option<SecurityContextSpec>,
    pub supplemental_groups: Vec<u32>,
}

impl ContainerSpec {
    pub fn name_or_default(&self) -> &str {
        self.name.as_deref().unwrap_or(DEFAULT_CONTAINER_NAME)
    }

    /// (request, limit) for cpu
    pub fn cpu_bounds(&self) -> (String, String) {
        split_bounds(&self.cpu, &self.cpu_request, &self.cpu_limit, DEFAULT_CPU)
    }

    /// (request, limit) for memory
    pub fn memory_bounds(&self) -> (String, String) {
        split_bounds(
            &self.memory,
            &self.memory_request,
            &self.memory_limit,
            DEFAULT_MEMORY,
        )
    }
}

fn split_bounds(
    both: &Option<String>,
    request: &Option<String>,
    limit: &Option<String>,
    default: &str,
) -> (String, String) {
    let fallback = both.clone().unwrap_or_else(|| default.to_string());
    (
        request.clone().unwrap_or_else(|| fallback.clone()),
        limit.clone().unwrap_or(fallback),
    )
}

/// Init container declaration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitContainerSpec {
    pub name: String,
    pub image: String,
    pub command: Option<CommandSpec>,
    pub image_pull_policy: Option<String>,
    /// Overrides on top of the primary container's resolved environment
    pub env: BTreeMap<String, String>,
}

/// Inline files projected through a companion config map
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigMapSpec {
    pub files: Vec<ConfigMapFile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigMapFile {
    pub filename: String,
    pub data: String,
    /// Where the primary container sees the file (directory, or file path with `sub_path`)
    pub mount_path: Option<String>,
    pub sub_path: Option<String>,
    /// Where init containers see the file, independently of `mount_path`
    pub init_mount_path: Option<String>,
    pub init_sub_path: Option<String>,
}

/// Volume mount declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MountSpec {
    Host {
        name: String,
        #[serde(default = "default_host_type")]
        host_type: String,
        path: String,
        destination_path: String,
    },
    Nfs {
        name: String,
        host: String,
        path: String,
        destination_path: String,
    },
}

fn default_host_type() -> String {
    "Directory".to_string()
}

impl MountSpec {
    pub fn name(&self) -> &str {
        match self {
            MountSpec::Host { name, .. } | MountSpec::Nfs { name, .. } => name,
        }
    }

    pub fn destination_path(&self) -> &str {
        match self {
            MountSpec::Host {
                destination_path, ..
            }
            | MountSpec::Nfs {
                destination_path, ..
            } => destination_path,
        }
    }
}
