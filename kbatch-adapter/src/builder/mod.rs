//! Resource graph builder
//!
//! Turns a job descriptor into a fully resolved [`ResourceGraph`]: the pod,
//! its volumes and mounts, and the companion config map, service and secret.
//! The only I/O is reading host identity records.

mod context;
pub mod resources;

pub use context::{BuildContext, effective_supplemental_groups};
pub use resources::*;

use kbatch_core::JobDescriptor;
use kbatch_core::domain::native::{
    ConfigMapFile, ContainerSpec, DEFAULT_IMAGE_PULL_POLICY, DEFAULT_RESTART_POLICY,
    InitContainerSpec, MountSpec, NativeSpec,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::AdapterConfig;
use crate::error::{AdapterError, Result};
use crate::identity::HostIdentity;
use crate::naming::{
    ACCOUNT_LABEL, CompanionKind, JOB_LABEL, JobId, MANAGED_BY, MANAGED_BY_LABEL, NAME_LABEL,
    OWNER_ANNOTATION, slug,
};

/// Filename under which the job script is projected into the pod
pub const SCRIPT_FILENAME: &str = "script.sh";
pub const SCRIPT_MOUNT_PATH: &str = "/kbatch/script.sh";

/// Port the companion service listens on
const SERVICE_PORT: u16 = 80;

type IdSource = Arc<dyn Fn(&str) -> JobId + Send + Sync>;

/// Builds resource graphs for one user
///
/// Holds only immutable configuration; each [`build`](Self::build) call works
/// on its own [`BuildContext`].
#[derive(Clone)]
pub struct ResourceGraphBuilder {
    identity: Arc<dyn HostIdentity>,
    username: String,
    namespace: String,
    mounts: Vec<MountSpec>,
    auto_supplemental_groups: bool,
    gpu_type: String,
    id_source: IdSource,
}

/// Config map declaration plus the volumes and mounts that project it
struct ConfigMapParts {
    config_map: ConfigMap,
    volumes: Vec<Volume>,
    mounts: Vec<VolumeMount>,
    init_mounts: Vec<VolumeMount>,
}

impl ResourceGraphBuilder {
    pub fn new(
        config: &AdapterConfig,
        identity: Arc<dyn HostIdentity>,
        username: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            identity,
            username: username.into(),
            namespace: namespace.into(),
            mounts: config.mounts.clone(),
            auto_supplemental_groups: config.auto_supplemental_groups,
            gpu_type: config.gpu_type.clone(),
            id_source: Arc::new(JobId::generate),
        }
    }

    /// Replaces random id generation, e.g. to reproduce a rendered document
    pub fn with_id_source(mut self, source: impl Fn(&str) -> JobId + Send + Sync + 'static) -> Self {
        self.id_source = Arc::new(source);
        self
    }

    pub fn build(&self, descriptor: &JobDescriptor) -> Result<(ResourceGraph, JobId)> {
        let native = descriptor.native.as_ref().ok_or_else(missing_container)?;
        let spec = native.container.as_ref().ok_or_else(missing_container)?;

        let mut ctx = BuildContext::resolve(
            self.identity.as_ref(),
            &self.username,
            spec,
            &self.mounts,
            &native.mounts,
            self.auto_supplemental_groups,
        )?;

        let container_name = spec.name_or_default().to_string();
        let id = (self.id_source)(&container_name);
        debug!("Generated ID: {}", id);

        let config_map = config_map_parts(&mut ctx, native, descriptor.content.as_deref(), &id)?;

        let mount_volumes: Vec<Volume> = ctx.mounts.iter().map(volume_from_mount).collect();
        let base_mounts: Vec<VolumeMount> = ctx.mounts.iter().map(volume_mount_from).collect();

        let mut container_mounts = base_mounts.clone();
        let mut init_mounts = base_mounts;
        let mut volumes = mount_volumes;
        if let Some(parts) = &config_map {
            container_mounts.extend(parts.mounts.iter().cloned());
            init_mounts.extend(parts.init_mounts.iter().cloned());
            volumes.extend(parts.volumes.iter().cloned());
        }

        let init_containers = native
            .init_containers
            .iter()
            .map(|init| init_container(init, &ctx.env, &init_mounts))
            .collect();

        let gpu_type = native.gpu_type.clone().unwrap_or_else(|| self.gpu_type.clone());
        let container = Container {
            name: container_name.clone(),
            image: spec.image.clone(),
            command: spec.command.as_ref().map(|c| c.to_args()).unwrap_or_default(),
            image_pull_policy: spec
                .image_pull_policy
                .clone()
                .unwrap_or_else(|| DEFAULT_IMAGE_PULL_POLICY.to_string()),
            working_dir: spec.working_dir.clone().filter(|d| !d.is_empty()),
            port: spec.port,
            env: ctx.env.clone(),
            resources: Some(resources_for(spec, &gpu_type, descriptor.gpus_per_node)),
            startup_probe: spec.startup_probe.clone(),
            volume_mounts: container_mounts,
        };

        let pod = Pod {
            name: id.to_string(),
            labels: self.labels(descriptor, spec, &id, &container_name),
            annotations: BTreeMap::from([(OWNER_ANNOTATION.to_string(), ctx.username.clone())]),
            restart_policy: spec
                .restart_policy
                .clone()
                .unwrap_or_else(|| DEFAULT_RESTART_POLICY.to_string()),
            security: ctx.security.clone(),
            node_selector: native.node_selector.clone().unwrap_or_default(),
            image_pull_secret: spec.image_pull_secret.clone(),
            init_containers,
            container,
            volumes,
        };

        let graph = ResourceGraph {
            id: id.clone(),
            namespace: self.namespace.clone(),
            service: spec.port.map(|port| Service {
                name: id.companion(CompanionKind::Service),
                port: SERVICE_PORT,
                target_port: port,
            }),
            config_map: config_map.map(|parts| parts.config_map),
            secret: native.secret.as_ref().map(|data| Secret {
                name: id.companion(CompanionKind::Secret),
                string_data: data.clone(),
            }),
            pod,
        };

        Ok((graph, id))
    }

    fn labels(
        &self,
        descriptor: &JobDescriptor,
        spec: &ContainerSpec,
        id: &JobId,
        container_name: &str,
    ) -> BTreeMap<String, String> {
        let job_name = descriptor
            .job_name
            .as_deref()
            .unwrap_or(container_name);

        let mut labels = spec.labels.clone();
        labels.insert(JOB_LABEL.to_string(), id.to_string());
        labels.insert(NAME_LABEL.to_string(), slug(job_name));
        labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string());
        if let Some(account) = &descriptor.accounting_id {
            labels.insert(ACCOUNT_LABEL.to_string(), account.clone());
        }
        labels
    }
}

fn missing_container() -> AdapterError {
    AdapterError::Configuration("native container configuration is required".to_string())
}

/// One config map volume per file and mount group
///
/// Files without a mount path are still stored in the config map but are not
/// mounted anywhere. Filenames are config map keys and must be unique,
/// including the reserved [`SCRIPT_FILENAME`] when the job carries a script.
fn config_map_parts(
    ctx: &mut BuildContext,
    native: &NativeSpec,
    script: Option<&str>,
    id: &JobId,
) -> Result<Option<ConfigMapParts>> {
    let mut files = native
        .configmap
        .as_ref()
        .map(|cm| cm.files.clone())
        .unwrap_or_default();

    if let Some(content) = script {
        if files.iter().any(|file| file.filename == SCRIPT_FILENAME) {
            return Err(AdapterError::Configuration(format!(
                "configmap file '{SCRIPT_FILENAME}' is reserved for the job script"
            )));
        }
        files.push(ConfigMapFile {
            filename: SCRIPT_FILENAME.to_string(),
            data: content.to_string(),
            mount_path: Some(SCRIPT_MOUNT_PATH.to_string()),
            sub_path: Some(SCRIPT_FILENAME.to_string()),
            init_mount_path: None,
            init_sub_path: None,
        });
    }

    if files.is_empty() {
        return Ok(None);
    }

    let name = id.companion(CompanionKind::ConfigMap);
    let mut parts = ConfigMapParts {
        config_map: ConfigMap {
            name: name.clone(),
            data: BTreeMap::new(),
        },
        volumes: Vec::new(),
        mounts: Vec::new(),
        init_mounts: Vec::new(),
    };

    for file in files {
        if parts.config_map.data.contains_key(&file.filename) {
            return Err(AdapterError::Configuration(format!(
                "duplicate configmap file '{}'",
                file.filename
            )));
        }

        let project = |volume: &str| Volume {
            name: volume.to_string(),
            source: VolumeSource::ConfigMap {
                name: name.clone(),
                key: file.filename.clone(),
                path: file.filename.clone(),
            },
        };

        if let Some(mount_path) = &file.mount_path {
            let volume = ctx.namer.claim(&["configmap", file.filename.as_str()]);
            parts.volumes.push(project(&volume));
            parts.mounts.push(VolumeMount {
                name: volume,
                mount_path: mount_path.clone(),
                sub_path: file.sub_path.clone(),
            });
        }

        if let Some(init_path) = &file.init_mount_path {
            let volume = ctx.namer.claim(&["configmap", file.filename.as_str(), "init"]);
            parts.volumes.push(project(&volume));
            parts.init_mounts.push(VolumeMount {
                name: volume,
                mount_path: init_path.clone(),
                sub_path: file.init_sub_path.clone(),
            });
        }

        parts.config_map.data.insert(file.filename, file.data);
    }

    Ok(Some(parts))
}

fn volume_from_mount(mount: &MountSpec) -> Volume {
    let source = match mount {
        MountSpec::Host {
            host_type, path, ..
        } => VolumeSource::HostPath {
            path: path.clone(),
            host_type: host_type.clone(),
        },
        MountSpec::Nfs { host, path, .. } => VolumeSource::Nfs {
            server: host.clone(),
            path: path.clone(),
        },
    };
    Volume {
        name: mount.name().to_string(),
        source,
    }
}

fn volume_mount_from(mount: &MountSpec) -> VolumeMount {
    VolumeMount {
        name: mount.name().to_string(),
        mount_path: mount.destination_path().to_string(),
        sub_path: None,
    }
}

fn init_container(
    spec: &InitContainerSpec,
    main_env: &BTreeMap<String, String>,
    mounts: &[VolumeMount],
) -> Container {
    let mut env = main_env.clone();
    env.extend(spec.env.clone());

    Container {
        name: spec.name.clone(),
        image: spec.image.clone(),
        command: spec.command.as_ref().map(|c| c.to_args()).unwrap_or_default(),
        image_pull_policy: spec
            .image_pull_policy
            .clone()
            .unwrap_or_else(|| DEFAULT_IMAGE_PULL_POLICY.to_string()),
        working_dir: None,
        port: None,
        env,
        resources: None,
        startup_probe: None,
        volume_mounts: mounts.to_vec(),
    }
}

fn resources_for(spec: &ContainerSpec, gpu_type: &str, gpus: Option<u32>) -> Resources {
    let (cpu_request, cpu_limit) = spec.cpu_bounds();
    let (memory_request, memory_limit) = spec.memory_bounds();

    let mut resources = Resources {
        requests: BTreeMap::from([
            ("cpu".to_string(), cpu_request),
            ("memory".to_string(), memory_request),
        ]),
        limits: BTreeMap::from([
            ("cpu".to_string(), cpu_limit),
            ("memory".to_string(), memory_limit),
        ]),
    };

    // Extended resources only need a limit; the request defaults to it
    if let Some(count) = gpus.filter(|n| *n > 0) {
        resources
            .limits
            .insert(gpu_type.to_string(), count.to_string());
    }

    resources
}
