//! Resolved resource graph
//!
//! Plain data: everything a renderer needs, with every default already
//! applied. Nothing here reads the environment.

use kbatch_core::domain::native::ProbeSpec;
use std::collections::BTreeMap;

use crate::naming::JobId;

/// A pod plus the companion objects created with it
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceGraph {
    pub id: JobId,
    pub namespace: String,
    pub pod: Pod,
    pub service: Option<Service>,
    pub config_map: Option<ConfigMap>,
    pub secret: Option<Secret>,
}

impl ResourceGraph {
    /// Every volume name referenced by any container's mounts
    pub fn mounted_volume_names(&self) -> Vec<&str> {
        std::iter::once(&self.pod.container)
            .chain(self.pod.init_containers.iter())
            .flat_map(|c| c.volume_mounts.iter().map(|m| m.name.as_str()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pod {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub restart_policy: String,
    pub security: PodSecurity,
    pub node_selector: BTreeMap<String, String>,
    pub image_pull_secret: Option<String>,
    pub init_containers: Vec<Container>,
    pub container: Container,
    pub volumes: Vec<Volume>,
}

/// Pod-level security context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodSecurity {
    pub run_as_user: u32,
    pub run_as_group: u32,
    pub run_as_non_root: bool,
    pub fs_group: u32,
    pub supplemental_groups: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub image_pull_policy: String,
    pub working_dir: Option<String>,
    pub port: Option<u16>,
    pub env: BTreeMap<String, String>,
    pub resources: Option<Resources>,
    pub startup_probe: Option<ProbeSpec>,
    pub volume_mounts: Vec<VolumeMount>,
}

/// Requests and limits, keyed by resource name (`cpu`, `memory`, GPU key)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resources {
    pub requests: BTreeMap<String, String>,
    pub limits: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub name: String,
    pub source: VolumeSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeSource {
    HostPath { path: String, host_type: String },
    Nfs { server: String, path: String },
    /// A single key of the job's config map, projected as `path`
    ConfigMap {
        name: String,
        key: String,
        path: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    /// Name of the pod volume this mount refers to
    pub name: String,
    pub mount_path: String,
    pub sub_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub name: String,
    pub port: u16,
    pub target_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigMap {
    pub name: String,
    /// File contents keyed by filename
    pub data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Secret {
    pub name: String,
    pub string_data: BTreeMap<String, String>,
}
