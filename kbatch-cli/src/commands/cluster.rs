//! Cluster command handlers
//!
//! One-time kubeconfig setup: cluster registration and credentials.

use anyhow::{Result, bail};
use colored::*;
use kbatch_adapter::{AuthConfig, ConfigureReport, KubernetesAdapter};

/// Runs `set-cluster` and the credential strategy, reporting each step
///
/// Unlike adapter bootstrap, failures are surfaced through the exit status.
///
/// # Arguments
/// * `adapter` - Adapter whose configuration and runner are used
///
/// # Returns
/// An error if either step failed
pub fn configure(adapter: &KubernetesAdapter) -> Result<()> {
    let ctx = adapter.context();
    let report = adapter.try_configure();
    print_report(adapter, &report);

    if let Some(context) = &ctx.context {
        println!("  Context:   {}", context.dimmed());
    }
    println!("  Namespace: {}", ctx.namespace.dimmed());

    if !report.is_complete() {
        bail!("cluster configuration incomplete");
    }
    Ok(())
}

fn print_report(adapter: &KubernetesAdapter, report: &ConfigureReport) {
    let ctx = adapter.context();
    match &report.cluster {
        Ok(()) => println!(
            "{} Registered cluster {} at {}",
            "✓".green(),
            ctx.cluster.cyan(),
            adapter.config().server.endpoint
        ),
        Err(e) => println!("{} Failed to register cluster: {}", "✗".red(), e),
    }

    match &report.credentials {
        Ok(()) => println!("{} Credentials: {}", "✓".green(), describe_auth(&ctx.auth)),
        Err(e) => println!("{} Failed to configure credentials: {}", "✗".red(), e),
    }
}

fn describe_auth(auth: &AuthConfig) -> String {
    match auth {
        AuthConfig::Managed => "managed externally".to_string(),
        AuthConfig::Oidc => "oidc context".to_string(),
        AuthConfig::Gke { region, zone, .. } => match region.as_ref().or(zone.as_ref()) {
            Some(location) => format!("gke service account ({location})"),
            None => "gke service account".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_auth() {
        assert_eq!(describe_auth(&AuthConfig::Managed), "managed externally");
        assert_eq!(
            describe_auth(&AuthConfig::Gke {
                svc_acct_file: "/key".into(),
                zone: Some("us-east1-b".into()),
                region: Some("us-east1".into()),
            }),
            "gke service account (us-east1)"
        );
    }
}
