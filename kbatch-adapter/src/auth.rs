//! Auth and context configuration
//!
//! Resolves, once, everything that prefixes a control-plane invocation
//! (binary, kubeconfig, context, namespace) and performs the one-time
//! kubeconfig side effects for the selected credential strategy:
//! - managed: nothing, credentials are provisioned elsewhere
//! - oidc: bind a context to the cluster, namespace and prefixed user
//! - gke: activate a service account and fetch cluster credentials

use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::{AdapterConfig, AuthConfig, ServerConfig};
use crate::error::Result;
use crate::process::{ProcessRunner, call};

const GCLOUD: &str = "gcloud";

/// Resolved invocation context for one user against one cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubeContext {
    pub bin: String,
    pub config_file: String,
    pub cluster: String,
    pub context: Option<String>,
    pub namespace: String,
    /// Username presented to the cluster
    pub k8s_username: String,
    pub auth: AuthConfig,
}

impl KubeContext {
    pub fn new(config: &AdapterConfig, username: &str) -> Self {
        Self {
            bin: config.bin.clone(),
            config_file: config.config_file.clone(),
            cluster: config.cluster.clone(),
            context: config.effective_context(),
            namespace: namespace_for(&config.namespace_prefix, username),
            k8s_username: format!("{}{}", config.username_prefix, username),
            auth: config.auth.clone(),
        }
    }

    /// `<bin> --kubeconfig=<file>[ --context=<ctx>]`
    pub fn base_cmd(&self) -> String {
        let mut cmd = format!("{} --kubeconfig={}", self.bin, self.config_file);
        if let Some(ctx) = &self.context {
            cmd.push_str(&format!(" --context={ctx}"));
        }
        cmd
    }

    pub fn namespaced_cmd(&self) -> String {
        format!("{} --namespace={}", self.base_cmd(), self.namespace)
    }

    /// Namespaced prefix requesting JSON output
    pub fn formatted_cmd(&self) -> String {
        format!("{} -o json", self.namespaced_cmd())
    }

    /// Prefix for `config` subcommands, which must not carry `--context`
    fn config_cmd(&self) -> String {
        format!("{} --kubeconfig={} config", self.bin, self.config_file)
    }

    /// Registers the cluster endpoint in the kubeconfig
    pub fn set_cluster(&self, runner: &dyn ProcessRunner, server: &ServerConfig) -> Result<()> {
        let mut cmd = format!(
            "{} set-cluster {} --server={}",
            self.config_cmd(),
            self.cluster,
            server.endpoint
        );
        if let Some(cert) = &server.cert_authority_file {
            cmd.push_str(&format!(" --certificate-authority={cert}"));
        }

        info!("Registering cluster {} at {}", self.cluster, server.endpoint);
        call(runner, &cmd, None, &BTreeMap::new())?;
        Ok(())
    }

    /// Applies the credential strategy's side effects
    pub fn configure(&self, runner: &dyn ProcessRunner) -> Result<()> {
        match &self.auth {
            AuthConfig::Managed => {
                debug!("Managed auth, nothing to configure");
                Ok(())
            }
            AuthConfig::Oidc => match &self.context {
                Some(ctx) => self.set_context(runner, ctx),
                None => Ok(()),
            },
            AuthConfig::Gke {
                svc_acct_file,
                zone,
                region,
            } => {
                self.activate_service_account(runner, svc_acct_file)?;
                self.fetch_gke_credentials(runner, zone.as_deref(), region.as_deref())
            }
        }
    }

    fn set_context(&self, runner: &dyn ProcessRunner, ctx: &str) -> Result<()> {
        let cmd = format!(
            "{} set-context {} --cluster={} --namespace={} --user={}",
            self.config_cmd(),
            ctx,
            self.cluster,
            self.namespace,
            self.k8s_username
        );

        info!("Binding context {} for user {}", ctx, self.k8s_username);
        call(runner, &cmd, None, &BTreeMap::new())?;
        Ok(())
    }

    fn activate_service_account(&self, runner: &dyn ProcessRunner, key_file: &str) -> Result<()> {
        let cmd = format!("{GCLOUD} auth activate-service-account --key-file={key_file}");
        call(runner, &cmd, None, &BTreeMap::new())?;
        Ok(())
    }

    fn fetch_gke_credentials(
        &self,
        runner: &dyn ProcessRunner,
        zone: Option<&str>,
        region: Option<&str>,
    ) -> Result<()> {
        let locale = match (region, zone) {
            (Some(region), _) => format!(" --region={region}"),
            (None, Some(zone)) => format!(" --zone={zone}"),
            (None, None) => String::new(),
        };
        let cmd = format!(
            "{GCLOUD} container clusters get-credentials{} {}",
            locale, self.cluster
        );

        // The kubeconfig goes through the environment; gcloud has no flag for it
        let env = BTreeMap::from([("KUBECONFIG".to_string(), self.config_file.clone())]);

        info!("Fetching GKE credentials for cluster {}", self.cluster);
        call(runner, &cmd, None, &env)?;
        Ok(())
    }
}

/// Namespace for `username`: prefix plus the name with `.`, `@`, `_` as `-`
pub fn namespace_for(prefix: &str, username: &str) -> String {
    let sanitized: String = username
        .chars()
        .map(|c| if matches!(c, '.' | '@' | '_') { '-' } else { c })
        .collect();
    format!("{prefix}{sanitized}")
}
