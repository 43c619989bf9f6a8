//! Status mapping
//!
//! Maps raw pod, service and secret objects (as returned by `kubectl get -o
//! json`) onto a normalized [`JobInfo`]. Only the fields read here are
//! modelled; everything else in the cluster objects is ignored.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use kbatch_core::{ConnectionInfo, JobInfo, JobState};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

use crate::naming::{LEGACY_NAME_LABEL, NAME_LABEL, OWNER_ANNOTATION};

/// Container waiting reasons that mean the job cannot make progress
const STUCK_REASONS: [&str; 4] = [
    "CrashLoopBackOff",
    "ErrImagePull",
    "ImagePullBackOff",
    "CreateContainerConfigError",
];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PodObject {
    metadata: ObjectMeta,
    status: PodStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ObjectMeta {
    name: Option<String>,
    namespace: Option<String>,
    creation_timestamp: Option<DateTime<Utc>>,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PodStatus {
    phase: Option<String>,
    #[serde(rename = "hostIP")]
    host_ip: Option<String>,
    start_time: Option<DateTime<Utc>>,
    conditions: Vec<PodCondition>,
    container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PodCondition {
    reason: Option<String>,
    last_transition_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContainerStatus {
    ready: bool,
    state: ContainerState,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContainerState {
    running: Option<RunningState>,
    terminated: Option<TerminatedState>,
    waiting: Option<WaitingState>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RunningState {
    started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TerminatedState {
    reason: Option<String>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WaitingState {
    reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServiceObject {
    spec: ServiceSpec,
    status: ServiceStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServiceSpec {
    ports: Vec<ServicePort>,
    #[serde(rename = "externalIPs")]
    external_ips: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ServicePort {
    port: Option<u16>,
    node_port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ServiceStatus {
    load_balancer: LoadBalancerStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoadBalancerStatus {
    ingress: Vec<LoadBalancerIngress>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoadBalancerIngress {
    ip: Option<String>,
    hostname: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SecretObject {
    data: BTreeMap<String, String>,
}

/// Maps cluster objects onto normalized job info
#[derive(Debug, Clone, Default)]
pub struct StatusMapper {
    namespace_prefix: String,
}

impl StatusMapper {
    pub fn new(namespace_prefix: impl Into<String>) -> Self {
        Self {
            namespace_prefix: namespace_prefix.into(),
        }
    }

    /// Normalizes one pod and its (possibly empty) companions
    ///
    /// An empty pod object means the job is gone and maps to `completed`.
    pub fn map_pod(
        &self,
        pod: &Value,
        service: Option<&Value>,
        secret: Option<&Value>,
        now: DateTime<Utc>,
    ) -> JobInfo {
        if is_empty(pod) {
            return JobInfo::completed("");
        }

        let pod: PodObject = decode(pod, "pod");
        let id = pod.metadata.name.clone().unwrap_or_default();
        let container = pod.status.container_statuses.first();

        let dispatch_time = container.and_then(|c| {
            c.state
                .running
                .as_ref()
                .and_then(|r| r.started_at)
                .or_else(|| c.state.terminated.as_ref().and_then(|t| t.started_at))
        });
        let finished_at = container
            .and_then(|c| c.state.terminated.as_ref())
            .and_then(|t| t.finished_at);
        let wallclock_time = dispatch_time.map(|start| {
            let end = if container.is_some_and(|c| c.state.running.is_some()) {
                now
            } else {
                finished_at.unwrap_or(now)
            };
            (end - start).num_seconds().max(0)
        });

        JobInfo {
            status: job_state(&pod.status),
            job_name: Some(job_name(&pod.metadata, &id)),
            job_owner: self.job_owner(&pod.metadata),
            submission_time: submission_time(&pod.status, &pod.metadata),
            dispatch_time,
            wallclock_time,
            connection: Some(connection_info(&pod.status, service, secret)),
            id,
        }
    }

    /// Maps every item of a pod list, skipping items without a name
    pub fn map_pod_list(&self, list: &Value, now: DateTime<Utc>) -> Vec<JobInfo> {
        let Some(items) = list.get("items").and_then(Value::as_array) else {
            return Vec::new();
        };

        items
            .iter()
            .map(|pod| self.map_pod(pod, None, None, now))
            .filter(|info| !info.id.is_empty())
            .collect()
    }

    fn job_owner(&self, meta: &ObjectMeta) -> Option<String> {
        if let Some(owner) = meta.annotations.get(OWNER_ANNOTATION) {
            return Some(owner.clone());
        }
        meta.namespace.as_ref().map(|ns| {
            ns.strip_prefix(self.namespace_prefix.as_str())
                .unwrap_or(ns)
                .to_string()
        })
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn decode<T: DeserializeOwned + Default>(value: &Value, what: &str) -> T {
    T::deserialize(value).unwrap_or_else(|e| {
        warn!("Ignoring unreadable {} object: {}", what, e);
        T::default()
    })
}

fn job_state(status: &PodStatus) -> JobState {
    let stuck = status.container_statuses.iter().any(|c| {
        let errored = c
            .state
            .terminated
            .as_ref()
            .is_some_and(|t| t.reason.as_deref() == Some("Error"));
        let waiting = c
            .state
            .waiting
            .as_ref()
            .and_then(|w| w.reason.as_deref())
            .is_some_and(|reason| STUCK_REASONS.contains(&reason));
        errored || waiting
    });
    if stuck {
        return JobState::Suspended;
    }

    let all_ready = !status.container_statuses.is_empty()
        && status.container_statuses.iter().all(|c| c.ready);

    match status.phase.as_deref() {
        Some("Succeeded") => JobState::Completed,
        Some("Failed") => JobState::Suspended,
        _ if all_ready => JobState::Running,
        Some("Pending") => {
            let unschedulable = status
                .conditions
                .iter()
                .any(|c| c.reason.as_deref() == Some("Unschedulable"));
            if unschedulable {
                JobState::QueuedHeld
            } else {
                JobState::Queued
            }
        }
        _ => JobState::Queued,
    }
}

fn submission_time(status: &PodStatus, meta: &ObjectMeta) -> Option<DateTime<Utc>> {
    meta.creation_timestamp
        .or(status.start_time)
        .or_else(|| status.conditions.first().and_then(|c| c.last_transition_time))
}

fn job_name(meta: &ObjectMeta, id: &str) -> String {
    meta.labels
        .get(NAME_LABEL)
        .or_else(|| meta.labels.get(LEGACY_NAME_LABEL))
        .cloned()
        .unwrap_or_else(|| id.to_string())
}

fn connection_info(
    status: &PodStatus,
    service: Option<&Value>,
    secret: Option<&Value>,
) -> ConnectionInfo {
    let service = service.filter(|v| !is_empty(v));
    let secret = secret.filter(|v| !is_empty(v));
    if service.is_none() && secret.is_none() {
        return ConnectionInfo::default();
    }

    let service: ServiceObject = service.map(|v| decode(v, "service")).unwrap_or_default();
    let secret: SecretObject = secret.map(|v| decode(v, "secret")).unwrap_or_default();

    let external = service
        .status
        .load_balancer
        .ingress
        .iter()
        .find_map(|i| i.ip.clone().or_else(|| i.hostname.clone()))
        .or_else(|| service.spec.external_ips.first().cloned());

    ConnectionInfo {
        host: external.or_else(|| status.host_ip.clone()),
        port: service
            .spec
            .ports
            .first()
            .and_then(|p| p.node_port.or(p.port)),
        password: secret
            .data
            .get("password")
            .or_else(|| secret.data.get("token"))
            .and_then(|encoded| decode_secret(encoded)),
    }
}

fn decode_secret(encoded: &str) -> Option<String> {
    match STANDARD.decode(encoded.trim()) {
        Ok(bytes) => String::from_utf8(bytes).ok(),
        Err(e) => {
            warn!("Secret value is not valid base64: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 4, 18, h, m, s).unwrap()
    }

    fn running_pod() -> Value {
        json!({
            "metadata": {
                "name": "jupyter-3back6b5",
                "namespace": "user-bob",
                "creationTimestamp": "2020-04-18T13:01:56Z",
                "labels": {
                    "job": "jupyter-3back6b5",
                    "app.kubernetes.io/name": "jupyter"
                },
                "annotations": { "kbatch.io/owner": "bob" }
            },
            "status": {
                "phase": "Running",
                "hostIP": "10.20.0.40",
                "startTime": "2020-04-18T13:01:56Z",
                "containerStatuses": [{
                    "name": "jupyter",
                    "ready": true,
                    "state": { "running": { "startedAt": "2020-04-18T13:01:58Z" } }
                }]
            }
        })
    }

    fn service() -> Value {
        json!({
            "metadata": { "name": "jupyter-3back6b5-service" },
            "spec": {
                "ports": [{ "nodePort": 30689, "port": 80, "protocol": "TCP", "targetPort": 8080 }],
                "type": "NodePort"
            },
            "status": { "loadBalancer": {} }
        })
    }

    fn secret() -> Value {
        // "ssshhh"
        json!({ "metadata": { "name": "jupyter-3back6b5-secret" }, "data": { "password": "c3NzaGho" } })
    }

    fn mapper() -> StatusMapper {
        StatusMapper::new("user-")
    }

    fn with_status(status: Value) -> Value {
        let mut pod = running_pod();
        pod["status"] = status;
        pod
    }

    #[test]
    fn test_empty_pod_is_completed() {
        let info = mapper().map_pod(&json!({}), None, None, at(14, 0, 0));
        assert_eq!(info.status, JobState::Completed);
        assert!(info.connection.is_none());
        assert!(info.submission_time.is_none());
    }

    #[test]
    fn test_running_pod_with_companions() {
        let info = mapper().map_pod(
            &running_pod(),
            Some(&service()),
            Some(&secret()),
            at(13, 2, 58),
        );

        assert_eq!(info.id, "jupyter-3back6b5");
        assert_eq!(info.status, JobState::Running);
        assert_eq!(info.job_name.as_deref(), Some("jupyter"));
        assert_eq!(info.job_owner.as_deref(), Some("bob"));
        assert_eq!(info.submission_time, Some(at(13, 1, 56)));
        assert_eq!(info.dispatch_time, Some(at(13, 1, 58)));
        assert_eq!(info.wallclock_time, Some(60));
        assert_eq!(
            info.connection,
            Some(ConnectionInfo {
                host: Some("10.20.0.40".into()),
                port: Some(30689),
                password: Some("ssshhh".into()),
            })
        );
    }

    #[test]
    fn test_no_companions_gives_null_host() {
        let info = mapper().map_pod(&running_pod(), Some(&json!({})), None, at(14, 0, 0));
        assert_eq!(info.connection, Some(ConnectionInfo::default()));
    }

    #[test]
    fn test_external_address_preferred() {
        let mut svc = service();
        svc["status"]["loadBalancer"]["ingress"] = json!([{ "hostname": "lb.example.org" }]);
        let info = mapper().map_pod(&running_pod(), Some(&svc), None, at(14, 0, 0));
        assert_eq!(info.connection.unwrap().host.as_deref(), Some("lb.example.org"));

        let mut svc = service();
        svc["spec"]["externalIPs"] = json!(["192.0.2.7"]);
        svc["spec"]["ports"] = json!([{ "port": 80 }]);
        let conn = mapper()
            .map_pod(&running_pod(), Some(&svc), None, at(14, 0, 0))
            .connection
            .unwrap();
        assert_eq!(conn.host.as_deref(), Some("192.0.2.7"));
        assert_eq!(conn.port, Some(80));
    }

    #[test]
    fn test_token_used_when_no_password() {
        let secret = json!({ "data": { "token": "c3NzaGho" } });
        let info = mapper().map_pod(&running_pod(), None, Some(&secret), at(14, 0, 0));
        assert_eq!(info.connection.unwrap().password.as_deref(), Some("ssshhh"));
    }

    #[test]
    fn test_pending_states() {
        let queued = with_status(json!({ "phase": "Pending" }));
        let info = mapper().map_pod(&queued, None, None, at(14, 0, 0));
        assert_eq!(info.status, JobState::Queued);
        assert!(info.dispatch_time.is_none());
        assert!(info.wallclock_time.is_none());

        let held = with_status(json!({
            "phase": "Pending",
            "conditions": [{
                "type": "PodScheduled",
                "status": "False",
                "reason": "Unschedulable",
                "lastTransitionTime": "2020-04-18T13:05:00Z"
            }]
        }));
        assert_eq!(
            mapper().map_pod(&held, None, None, at(14, 0, 0)).status,
            JobState::QueuedHeld
        );
    }

    #[test]
    fn test_running_but_not_ready_is_queued() {
        let pod = with_status(json!({
            "phase": "Running",
            "containerStatuses": [
                { "ready": true, "state": { "running": {} } },
                { "ready": false, "state": { "running": {} } }
            ]
        }));
        assert_eq!(mapper().map_pod(&pod, None, None, at(14, 0, 0)).status, JobState::Queued);
    }

    #[test]
    fn test_failure_states_are_suspended() {
        for waiting in STUCK_REASONS {
            let pod = with_status(json!({
                "phase": "Pending",
                "containerStatuses": [{ "ready": false, "state": { "waiting": { "reason": waiting } } }]
            }));
            assert_eq!(
                mapper().map_pod(&pod, None, None, at(14, 0, 0)).status,
                JobState::Suspended,
                "{waiting}"
            );
        }

        let errored = with_status(json!({
            "phase": "Running",
            "containerStatuses": [{
                "ready": false,
                "state": { "terminated": { "reason": "Error", "exitCode": 1 } }
            }]
        }));
        assert_eq!(
            mapper().map_pod(&errored, None, None, at(14, 0, 0)).status,
            JobState::Suspended
        );

        let failed = with_status(json!({ "phase": "Failed" }));
        assert_eq!(
            mapper().map_pod(&failed, None, None, at(14, 0, 0)).status,
            JobState::Suspended
        );
    }

    #[test]
    fn test_completed_pod_wallclock_uses_finish_time() {
        let pod = with_status(json!({
            "phase": "Succeeded",
            "containerStatuses": [{
                "ready": false,
                "state": { "terminated": {
                    "reason": "Completed",
                    "startedAt": "2020-04-18T13:02:00Z",
                    "finishedAt": "2020-04-18T13:12:00Z"
                } }
            }]
        }));
        let info = mapper().map_pod(&pod, None, None, at(18, 0, 0));
        assert_eq!(info.status, JobState::Completed);
        assert_eq!(info.dispatch_time, Some(at(13, 2, 0)));
        assert_eq!(info.wallclock_time, Some(600));
    }

    #[test]
    fn test_unknown_phase_is_queued() {
        let pod = with_status(json!({ "phase": "Unknown" }));
        assert_eq!(mapper().map_pod(&pod, None, None, at(14, 0, 0)).status, JobState::Queued);
    }

    #[test]
    fn test_name_and_owner_fallbacks() {
        let pod = json!({
            "metadata": {
                "name": "bash-1",
                "namespace": "user-alice",
                "labels": { "k8s-app": "legacy" }
            },
            "status": {
                "phase": "Pending",
                "conditions": [{ "lastTransitionTime": "2020-04-18T13:05:00Z" }]
            }
        });
        let info = mapper().map_pod(&pod, None, None, at(14, 0, 0));
        assert_eq!(info.job_name.as_deref(), Some("legacy"));
        assert_eq!(info.job_owner.as_deref(), Some("alice"));
        assert_eq!(info.submission_time, Some(at(13, 5, 0)));

        let bare = json!({ "metadata": { "name": "bash-2", "namespace": "shared" } });
        let info = mapper().map_pod(&bare, None, None, at(14, 0, 0));
        assert_eq!(info.job_name.as_deref(), Some("bash-2"));
        assert_eq!(info.job_owner.as_deref(), Some("shared"));
    }

    #[test]
    fn test_map_pod_list() {
        let list = json!({
            "apiVersion": "v1",
            "kind": "List",
            "items": [running_pod(), with_status(json!({ "phase": "Pending" }))]
        });
        let infos = mapper().map_pod_list(&list, at(14, 0, 0));
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].status, JobState::Running);
        assert_eq!(infos[1].status, JobState::Queued);

        assert!(mapper().map_pod_list(&json!({}), at(14, 0, 0)).is_empty());
    }
}
