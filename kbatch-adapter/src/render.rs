//! Manifest rendering
//!
//! Turns a [`ResourceGraph`] into the multi-document YAML piped to
//! `kubectl create -f -`. Output depends only on the graph, so rendering the
//! same graph twice is byte-identical.

use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::builder::{
    ConfigMap, Container, Pod, ResourceGraph, Secret, Service, Volume, VolumeSource,
};
use crate::error::{AdapterError, Result};
use crate::naming::{JOB_LABEL, MAX_LABEL_LEN, is_dns_label};

const DOCUMENT_SEPARATOR: &str = "---\n";

/// Named templates a renderer knows how to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Template {
    /// Pod plus its companion objects
    Pod,
}

impl Template {
    pub fn name(&self) -> &'static str {
        match self {
            Template::Pod => "pod",
        }
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub trait Renderer: Send + Sync {
    fn render(&self, template: Template, graph: &ResourceGraph) -> Result<String>;
}

/// Renders Kubernetes manifests as YAML
#[derive(Debug, Clone, Default)]
pub struct ManifestRenderer;

impl Renderer for ManifestRenderer {
    fn render(&self, template: Template, graph: &ResourceGraph) -> Result<String> {
        match template {
            Template::Pod => render_pod_template(graph),
        }
    }
}

fn render_pod_template(graph: &ResourceGraph) -> Result<String> {
    check_volumes(graph)?;

    let mut documents = vec![pod_manifest(&graph.pod, &graph.namespace)];
    if let Some(service) = &graph.service {
        documents.push(service_manifest(service, graph));
    }
    if let Some(config_map) = &graph.config_map {
        documents.push(config_map_manifest(config_map, &graph.namespace));
    }
    if let Some(secret) = &graph.secret {
        documents.push(secret_manifest(secret, &graph.namespace));
    }

    let rendered = documents
        .iter()
        .map(|doc| serde_yaml::to_string(doc).map_err(|e| AdapterError::Render(e.to_string())))
        .collect::<Result<Vec<_>>>()?;
    Ok(rendered.join(DOCUMENT_SEPARATOR))
}

/// Volume names must be unique DNS-1123 labels and every mount must name a
/// declared volume
fn check_volumes(graph: &ResourceGraph) -> Result<()> {
    let mut declared = HashSet::new();
    for volume in &graph.pod.volumes {
        if !is_dns_label(&volume.name) {
            return Err(AdapterError::Render(format!(
                "volume name '{}' is not a DNS-1123 label (lowercase alphanumerics and '-', at most {MAX_LABEL_LEN} chars)",
                volume.name
            )));
        }
        if !declared.insert(volume.name.as_str()) {
            return Err(AdapterError::Render(format!(
                "duplicate volume name '{}'",
                volume.name
            )));
        }
    }

    if let Some(missing) = graph
        .mounted_volume_names()
        .into_iter()
        .find(|name| !declared.contains(name))
    {
        return Err(AdapterError::Render(format!(
            "volume mount references undeclared volume '{missing}'"
        )));
    }

    Ok(())
}

fn metadata(name: &str, namespace: &str) -> Map<String, Value> {
    let mut meta = Map::new();
    meta.insert("name".into(), json!(name));
    meta.insert("namespace".into(), json!(namespace));
    meta
}

fn pod_manifest(pod: &Pod, namespace: &str) -> Value {
    let mut meta = metadata(&pod.name, namespace);
    meta.insert("labels".into(), json!(pod.labels));
    meta.insert("annotations".into(), json!(pod.annotations));

    let security = &pod.security;
    let mut spec = Map::new();
    spec.insert("restartPolicy".into(), json!(pod.restart_policy));
    spec.insert(
        "securityContext".into(),
        json!({
            "runAsUser": security.run_as_user,
            "runAsGroup": security.run_as_group,
            "runAsNonRoot": security.run_as_non_root,
            "fsGroup": security.fs_group,
            "supplementalGroups": security.supplemental_groups,
        }),
    );
    spec.insert("nodeSelector".into(), json!(pod.node_selector));
    if let Some(secret) = &pod.image_pull_secret {
        spec.insert("imagePullSecrets".into(), json!([{ "name": secret }]));
    }
    if !pod.init_containers.is_empty() {
        let init: Vec<Value> = pod.init_containers.iter().map(container_manifest).collect();
        spec.insert("initContainers".into(), Value::Array(init));
    }
    spec.insert("containers".into(), json!([container_manifest(&pod.container)]));
    if !pod.volumes.is_empty() {
        let volumes: Vec<Value> = pod.volumes.iter().map(volume_manifest).collect();
        spec.insert("volumes".into(), Value::Array(volumes));
    }

    json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": meta,
        "spec": spec,
    })
}

fn container_manifest(container: &Container) -> Value {
    let mut c = Map::new();
    c.insert("name".into(), json!(container.name));
    c.insert("image".into(), json!(container.image));
    c.insert("imagePullPolicy".into(), json!(container.image_pull_policy));
    if !container.command.is_empty() {
        c.insert("command".into(), json!(container.command));
    }
    if let Some(dir) = &container.working_dir {
        c.insert("workingDir".into(), json!(dir));
    }
    if let Some(port) = container.port {
        c.insert("ports".into(), json!([{ "containerPort": port }]));
    }

    let env: Vec<Value> = container
        .env
        .iter()
        .map(|(name, value)| json!({ "name": name, "value": value }))
        .collect();
    c.insert("env".into(), Value::Array(env));

    if let Some(resources) = &container.resources {
        c.insert(
            "resources".into(),
            json!({ "requests": resources.requests, "limits": resources.limits }),
        );
    }

    // A probe without a port has nothing to check
    if let (Some(probe), Some(port)) = (&container.startup_probe, container.port) {
        let mut startup = Map::new();
        startup.insert("tcpSocket".into(), json!({ "port": port }));
        for (key, value) in [
            ("initialDelaySeconds", probe.initial_delay_seconds),
            ("failureThreshold", probe.failure_threshold),
            ("periodSeconds", probe.period_seconds),
            ("timeoutSeconds", probe.timeout_seconds),
        ] {
            if let Some(value) = value {
                startup.insert(key.into(), json!(value));
            }
        }
        c.insert("startupProbe".into(), Value::Object(startup));
    }

    if !container.volume_mounts.is_empty() {
        let mounts: Vec<Value> = container
            .volume_mounts
            .iter()
            .map(|m| {
                let mut mount = Map::new();
                mount.insert("name".into(), json!(m.name));
                mount.insert("mountPath".into(), json!(m.mount_path));
                if let Some(sub_path) = &m.sub_path {
                    mount.insert("subPath".into(), json!(sub_path));
                }
                Value::Object(mount)
            })
            .collect();
        c.insert("volumeMounts".into(), Value::Array(mounts));
    }

    c.insert(
        "securityContext".into(),
        json!({
            "allowPrivilegeEscalation": false,
            "capabilities": { "drop": ["ALL"] },
            "privileged": false,
        }),
    );

    Value::Object(c)
}

fn volume_manifest(volume: &Volume) -> Value {
    match &volume.source {
        VolumeSource::HostPath { path, host_type } => json!({
            "name": volume.name,
            "hostPath": { "path": path, "type": host_type },
        }),
        VolumeSource::Nfs { server, path } => json!({
            "name": volume.name,
            "nfs": { "server": server, "path": path },
        }),
        VolumeSource::ConfigMap { name, key, path } => json!({
            "name": volume.name,
            "configMap": {
                "name": name,
                "items": [{ "key": key, "path": path }],
            },
        }),
    }
}

fn service_manifest(service: &Service, graph: &ResourceGraph) -> Value {
    let selector = BTreeMap::from([(JOB_LABEL, graph.id.as_str())]);
    json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": metadata(&service.name, &graph.namespace),
        "spec": {
            "selector": selector,
            "ports": [{
                "protocol": "TCP",
                "port": service.port,
                "targetPort": service.target_port,
            }],
            "type": "NodePort",
        },
    })
}

fn config_map_manifest(config_map: &ConfigMap, namespace: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": metadata(&config_map.name, namespace),
        "data": config_map.data,
    })
}

fn secret_manifest(secret: &Secret, namespace: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": metadata(&secret.name, namespace),
        "type": "Opaque",
        "stringData": secret.string_data,
    })
}
