//! Kubernetes batch adapter
//!
//! Entry point tying the pieces together: the builder turns a descriptor into
//! a resource graph, the renderer turns that into a document, and the control
//! plane creates, queries and deletes it.

use chrono::Utc;
use kbatch_core::{JobDescriptor, JobInfo, JobState};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::auth::KubeContext;
use crate::builder::{ResourceGraph, ResourceGraphBuilder};
use crate::config::AdapterConfig;
use crate::error::Result;
use crate::gateway::ControlPlane;
use crate::identity::HostIdentity;
use crate::naming::JobId;
use crate::process::ProcessRunner;
use crate::render::{Renderer, Template};
use crate::status::StatusMapper;

/// Filename of the rendered document written into the job's workdir
pub const RENDERED_FILENAME: &str = "pod.yml";

/// Outcome of each kubeconfig setup step
#[derive(Debug)]
pub struct ConfigureReport {
    /// `config set-cluster`
    pub cluster: Result<()>,
    /// The credential strategy (gcloud login, oidc context, or nothing)
    pub credentials: Result<()>,
}

impl ConfigureReport {
    pub fn is_complete(&self) -> bool {
        self.cluster.is_ok() && self.credentials.is_ok()
    }
}

pub struct KubernetesAdapter {
    config: AdapterConfig,
    runner: Arc<dyn ProcessRunner>,
    renderer: Arc<dyn Renderer>,
    builder: ResourceGraphBuilder,
    plane: ControlPlane,
}

impl KubernetesAdapter {
    /// Resolves the invoking user and the command context
    ///
    /// Performs no control-plane calls; see [`bootstrap`](Self::bootstrap).
    ///
    /// # Arguments
    /// * `config` - Adapter configuration, already validated
    /// * `runner` - Executes every `kubectl`/`gcloud` invocation
    /// * `identity` - Host user and group lookups
    /// * `renderer` - Turns resource graphs into manifests
    ///
    /// # Returns
    /// The adapter, or an identity error if the current user cannot be resolved
    pub fn new(
        config: AdapterConfig,
        runner: Arc<dyn ProcessRunner>,
        identity: Arc<dyn HostIdentity>,
        renderer: Arc<dyn Renderer>,
    ) -> Result<Self> {
        let username = identity.current_username()?;
        let ctx = KubeContext::new(&config, &username);

        let builder =
            ResourceGraphBuilder::new(&config, identity, username, ctx.namespace.clone());
        let plane = ControlPlane::new(
            ctx,
            runner.clone(),
            StatusMapper::new(config.namespace_prefix.clone()),
            config.all_namespaces,
        );

        Ok(Self {
            config,
            runner,
            renderer,
            builder,
            plane,
        })
    }

    /// Constructs the adapter and applies the kubeconfig side effects
    ///
    /// Failures of `set-cluster` or the credential strategy are logged and
    /// the adapter is returned anyway.
    ///
    /// # Arguments
    /// Same as [`new`](Self::new)
    ///
    /// # Returns
    /// The configured adapter; only construction errors are propagated
    pub fn bootstrap(
        config: AdapterConfig,
        runner: Arc<dyn ProcessRunner>,
        identity: Arc<dyn HostIdentity>,
        renderer: Arc<dyn Renderer>,
    ) -> Result<Self> {
        let adapter = Self::new(config, runner, identity, renderer)?;
        adapter.log_initialization();
        adapter.configure();
        Ok(adapter)
    }

    /// Registers the cluster and applies the credential strategy, logging
    /// failures
    pub fn configure(&self) {
        let report = self.try_configure();
        if let Err(e) = &report.cluster {
            error!("Failed to set cluster {}: {}", self.plane.context().cluster, e);
        }
        if let Err(e) = &report.credentials {
            error!("Failed to configure auth: {}", e);
        }
    }

    /// Runs both kubeconfig setup steps and reports each outcome
    ///
    /// The credential step runs even when `set-cluster` fails.
    pub fn try_configure(&self) -> ConfigureReport {
        let ctx = self.plane.context();
        ConfigureReport {
            cluster: ctx.set_cluster(self.runner.as_ref(), &self.config.server),
            credentials: ctx.configure(self.runner.as_ref()),
        }
    }

    fn log_initialization(&self) {
        let ctx = self.plane.context();
        info!("Kubernetes adapter initialized");
        info!("  cluster: {}", ctx.cluster);
        info!("  namespace: {}", ctx.namespace);
        info!("  context: {}", ctx.context.as_deref().unwrap_or("(none)"));
        info!("  bin: {}", ctx.bin);
        info!("  config_file: {}", ctx.config_file);
        info!("  auto_supplemental_groups: {}", self.config.auto_supplemental_groups);
        info!("  mounts: {}", self.config.mounts.len());
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn context(&self) -> &KubeContext {
        self.plane.context()
    }

    /// Builds and renders a descriptor without submitting it
    pub fn render(&self, descriptor: &JobDescriptor) -> Result<(String, JobId)> {
        let (graph, id) = self.builder.build(descriptor)?;
        let document = self.render_graph(&graph)?;
        Ok((document, id))
    }

    fn render_graph(&self, graph: &ResourceGraph) -> Result<String> {
        self.renderer.render(Template::Pod, graph)
    }

    /// Submits a job and returns its id
    ///
    /// When the descriptor's workdir exists, the rendered document is also
    /// saved there as [`RENDERED_FILENAME`].
    ///
    /// # Arguments
    /// * `descriptor` - Job to build, render and create
    ///
    /// # Returns
    /// The generated job id (also the pod name)
    pub fn submit(&self, descriptor: &JobDescriptor) -> Result<JobId> {
        let (document, id) = self.render(descriptor)?;

        if let Some(workdir) = &descriptor.workdir {
            persist_rendered(workdir, &document);
        }

        self.plane.submit(&document)?;
        info!("Submitted job {}", id);
        Ok(id)
    }

    pub fn info(&self, id: &JobId) -> Result<JobInfo> {
        self.plane.info(id, Utc::now())
    }

    pub fn status(&self, id: &JobId) -> Result<JobState> {
        Ok(self.info(id)?.status)
    }

    /// Best-effort removal of the pod and every companion
    pub fn delete(&self, id: &JobId) -> Result<()> {
        self.plane.delete(id)?;
        info!("Deleted job {}", id);
        Ok(())
    }

    pub fn info_all(&self) -> Result<Vec<JobInfo>> {
        self.plane.info_all(Utc::now())
    }

    pub fn info_where_owner(&self, owners: &[String]) -> Result<Vec<JobInfo>> {
        self.plane.info_where_owner(owners, Utc::now())
    }
}

/// Writes the rendered document next to the job for inspection
///
/// Skipped when the directory does not exist; write errors are only logged.
fn persist_rendered(workdir: &Path, document: &str) {
    if !workdir.is_dir() {
        return;
    }
    let path = workdir.join(RENDERED_FILENAME);
    if let Err(e) = std::fs::write(&path, document) {
        warn!("Could not write {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthConfig, ServerConfig};
    use crate::process::ProcessOutput;
    use crate::render::ManifestRenderer;
    use crate::testing::{FakeIdentity, FakeRunner};
    use kbatch_core::domain::native::{ContainerSpec, NativeSpec};

    const NS: &str = "/usr/bin/kubectl --kubeconfig=/home/testuser/.kube/config --namespace=testuser";

    fn config() -> AdapterConfig {
        AdapterConfig {
            config_file: "/home/testuser/.kube/config".into(),
            ..Default::default()
        }
    }

    fn adapter(config: AdapterConfig, runner: Arc<FakeRunner>) -> KubernetesAdapter {
        KubernetesAdapter::new(
            config,
            runner,
            Arc::new(FakeIdentity::default()),
            Arc::new(ManifestRenderer),
        )
        .unwrap()
    }

    fn descriptor() -> JobDescriptor {
        JobDescriptor::new(NativeSpec {
            container: Some(ContainerSpec {
                name: Some("bash".into()),
                image: "busybox".into(),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    #[test]
    fn test_new_makes_no_calls() {
        let runner = Arc::new(FakeRunner::new());
        let adapter = adapter(config(), runner.clone());
        assert_eq!(adapter.context().namespace, "testuser");
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_bootstrap_survives_control_plane_failures() {
        let runner = Arc::new(FakeRunner::failing());
        let config = AdapterConfig {
            auth: AuthConfig::Oidc,
            server: ServerConfig {
                endpoint: "https://k8s.example.org".into(),
                cert_authority_file: None,
            },
            ..config()
        };
        let adapter = KubernetesAdapter::bootstrap(
            config,
            runner.clone(),
            Arc::new(FakeIdentity::default()),
            Arc::new(ManifestRenderer),
        )
        .unwrap();

        assert_eq!(adapter.context().context.as_deref(), Some("kbatch"));
        assert_eq!(runner.calls().len(), 2);
    }

    #[test]
    fn test_try_configure_reports_each_step() {
        let runner = Arc::new(FakeRunner::failing());
        let config = AdapterConfig {
            auth: AuthConfig::Oidc,
            ..config()
        };
        let report = adapter(config.clone(), runner.clone()).try_configure();
        assert!(report.cluster.is_err());
        assert!(report.credentials.is_err());
        assert!(!report.is_complete());
        assert_eq!(runner.calls().len(), 2);

        let runner = Arc::new(FakeRunner::new());
        let report = adapter(config, runner.clone()).try_configure();
        assert!(report.is_complete());
        assert!(runner.commands()[0].contains("config set-cluster"));
        assert!(runner.commands()[1].contains("config set-context kbatch"));
    }

    #[test]
    fn test_submit_pipes_rendered_document() {
        let runner = Arc::new(FakeRunner::new());
        let adapter = adapter(config(), runner.clone());

        let id = adapter.submit(&descriptor()).unwrap();
        assert!(id.as_str().starts_with("bash-"));

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].command, format!("{NS} -o json create -f -"));
        let stdin = calls[0].stdin.as_deref().unwrap();
        assert!(stdin.contains(&format!("name: {id}")));
    }

    #[test]
    fn test_submit_writes_rendered_document_to_workdir() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(FakeRunner::new());
        let adapter = adapter(config(), runner.clone());

        let mut descriptor = descriptor();
        descriptor.workdir = Some(dir.path().to_path_buf());
        adapter.submit(&descriptor).unwrap();

        let written = std::fs::read_to_string(dir.path().join(RENDERED_FILENAME)).unwrap();
        assert_eq!(Some(written.as_str()), runner.calls()[0].stdin.as_deref());
    }

    #[test]
    fn test_missing_workdir_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = adapter(config(), Arc::new(FakeRunner::new()));

        let mut descriptor = descriptor();
        descriptor.workdir = Some(dir.path().join("missing"));
        adapter.submit(&descriptor).unwrap();
        assert!(!dir.path().join("missing").exists());
    }

    #[test]
    fn test_submit_without_container_makes_no_calls() {
        let runner = Arc::new(FakeRunner::new());
        let adapter = adapter(config(), runner.clone());
        assert!(adapter.submit(&JobDescriptor::default()).is_err());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_status_of_vanished_job() {
        let runner = FakeRunner::new().reply(
            &format!("{NS} -o json get pod bash-123"),
            ProcessOutput::failed("Error from server (NotFound): pods \"bash-123\" not found"),
        );
        let adapter = adapter(config(), Arc::new(runner));
        assert_eq!(
            adapter.status(&JobId::from("bash-123")).unwrap(),
            JobState::Completed
        );
    }
}
