//! Control-plane gateway
//!
//! Every cluster interaction goes through here as a `kubectl` invocation.
//! Absence is a normal answer: queries for missing objects return an empty
//! object and deletes of missing objects succeed.

use chrono::{DateTime, Utc};
use kbatch_core::JobInfo;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::auth::KubeContext;
use crate::error::{AdapterError, Result};
use crate::naming::{CompanionKind, JobId};
use crate::process::{ProcessRunner, call};
use crate::status::StatusMapper;

/// Human-readable stdout kubectl prints instead of an empty list
const NO_RESOURCES_SENTINEL: &str = "No resources found";

/// Cluster object kinds the adapter touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Pod,
    Service,
    Secret,
    ConfigMap,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Pod => "pod",
            ResourceKind::Service => "service",
            ResourceKind::Secret => "secret",
            ResourceKind::ConfigMap => "configmap",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<CompanionKind> for ResourceKind {
    fn from(kind: CompanionKind) -> Self {
        match kind {
            CompanionKind::Service => ResourceKind::Service,
            CompanionKind::Secret => ResourceKind::Secret,
            CompanionKind::ConfigMap => ResourceKind::ConfigMap,
        }
    }
}

/// Every object a job may own: the pod, then its companions
pub fn delete_targets(id: &JobId) -> Vec<(ResourceKind, String)> {
    std::iter::once((ResourceKind::Pod, id.to_string()))
        .chain(
            CompanionKind::ALL
                .iter()
                .map(|kind| (ResourceKind::from(*kind), id.companion(*kind))),
        )
        .collect()
}

/// Issues control-plane commands for one user's namespace
#[derive(Clone)]
pub struct ControlPlane {
    ctx: KubeContext,
    runner: Arc<dyn ProcessRunner>,
    mapper: StatusMapper,
    all_namespaces: bool,
}

impl ControlPlane {
    pub fn new(
        ctx: KubeContext,
        runner: Arc<dyn ProcessRunner>,
        mapper: StatusMapper,
        all_namespaces: bool,
    ) -> Self {
        Self {
            ctx,
            runner,
            mapper,
            all_namespaces,
        }
    }

    pub fn context(&self) -> &KubeContext {
        &self.ctx
    }

    fn run(&self, command: &str, stdin: Option<&str>) -> Result<String> {
        call(self.runner.as_ref(), command, stdin, &BTreeMap::new())
    }

    /// Creates every object in `document`, which is piped on stdin
    pub fn submit(&self, document: &str) -> Result<()> {
        let cmd = format!("{} create -f -", self.ctx.formatted_cmd());
        self.run(&cmd, Some(document))?;
        Ok(())
    }

    /// Fetches one object as JSON; a missing object is `{}`
    ///
    /// # Arguments
    /// * `kind` - Object kind passed to `kubectl get`
    /// * `name` - Object name in the user's namespace
    ///
    /// # Returns
    /// The parsed object, or `{}` when it is absent or the output is unreadable
    pub fn query(&self, kind: ResourceKind, name: &str) -> Result<Value> {
        let cmd = format!("{} get {} {}", self.ctx.formatted_cmd(), kind, name);
        match self.run(&cmd, None) {
            Ok(stdout) => Ok(parse_output(&stdout)),
            Err(e) if e.is_not_found() => Ok(json!({})),
            Err(e) => Err(e),
        }
    }

    /// Deletes the pod and its companions without waiting for finalization
    ///
    /// Every delete is attempted. Missing objects are ignored; the first other
    /// failure is returned once all four calls have been made.
    ///
    /// # Arguments
    /// * `id` - Job whose pod, service, secret and config map are removed
    pub fn delete(&self, id: &JobId) -> Result<()> {
        let mut first_error: Option<AdapterError> = None;

        for (kind, name) in delete_targets(id) {
            let cmd = format!(
                "{} delete {} {} --wait=false",
                self.ctx.namespaced_cmd(),
                kind,
                name
            );
            match self.run(&cmd, None) {
                Ok(_) => debug!("Deleted {} {}", kind, name),
                Err(e) if e.is_not_found() => debug!("{} {} already absent", kind, name),
                Err(e) => {
                    warn!("Failed to delete {} {}: {}", kind, name, e);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Pod list in the user's namespace, or across all namespaces
    pub fn list_pods(&self) -> Result<Value> {
        let cmd = if self.all_namespaces {
            format!("{} -o json get pods --all-namespaces", self.ctx.base_cmd())
        } else {
            format!("{} -o json get pods", self.ctx.namespaced_cmd())
        };
        let stdout = self.run(&cmd, None)?;
        Ok(parse_output(&stdout))
    }

    /// Normalized status of one job
    ///
    /// A missing pod short-circuits to `completed` without looking up the
    /// companions.
    ///
    /// # Arguments
    /// * `id` - Job to look up
    /// * `now` - Reference time for the wallclock of running jobs
    ///
    /// # Returns
    /// The job's info, with connection details when a service or secret exists
    pub fn info(&self, id: &JobId, now: DateTime<Utc>) -> Result<JobInfo> {
        let pod = self.query(ResourceKind::Pod, id.as_str())?;
        if is_empty_object(&pod) {
            info!("Pod {} not found, reporting completed", id);
            return Ok(JobInfo::completed(id.as_str()));
        }

        let service = self.query(ResourceKind::Service, &id.companion(CompanionKind::Service))?;
        let secret = self.query(ResourceKind::Secret, &id.companion(CompanionKind::Secret))?;

        let mut info = self.mapper.map_pod(&pod, Some(&service), Some(&secret), now);
        if info.id.is_empty() {
            info.id = id.to_string();
        }
        Ok(info)
    }

    pub fn info_all(&self, now: DateTime<Utc>) -> Result<Vec<JobInfo>> {
        let list = self.list_pods()?;
        Ok(self.mapper.map_pod_list(&list, now))
    }

    /// Jobs whose owner is one of `owners`
    pub fn info_where_owner(&self, owners: &[String], now: DateTime<Utc>) -> Result<Vec<JobInfo>> {
        Ok(self
            .info_all(now)?
            .into_iter()
            .filter(|info| {
                info.job_owner
                    .as_ref()
                    .is_some_and(|owner| owners.contains(owner))
            })
            .collect())
    }
}

fn is_empty_object(value: &Value) -> bool {
    value.as_object().is_some_and(|map| map.is_empty())
}

/// Parses JSON stdout, treating empty, sentinel and unparseable output as `{}`
fn parse_output(stdout: &str) -> Value {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return json!({});
    }
    if trimmed.starts_with(NO_RESOURCES_SENTINEL) {
        debug!("{}", trimmed);
        return json!({});
    }

    match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(e) => {
            let err = AdapterError::MalformedOutput(e.to_string());
            warn!("{}, treating as empty", err);
            json!({})
        }
    }
}
