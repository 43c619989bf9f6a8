//! Job command handlers
//!
//! Handles submitting, rendering, inspecting and deleting jobs.

use anyhow::{Context, Result};
use colored::*;
use kbatch_adapter::{JobId, KubernetesAdapter};
use kbatch_core::{JobDescriptor, JobInfo, JobState};
use std::path::{Path, PathBuf};

/// Reads a YAML descriptor, attaching the script file if given
pub fn load_descriptor(path: &Path, script: Option<&Path>) -> Result<JobDescriptor> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read descriptor {}", path.display()))?;
    let mut descriptor: JobDescriptor = serde_yaml::from_str(&text)
        .with_context(|| format!("Invalid job descriptor {}", path.display()))?;

    if let Some(script) = script {
        let content = std::fs::read_to_string(script)
            .with_context(|| format!("Failed to read script {}", script.display()))?;
        descriptor.content = Some(content);
    }

    Ok(descriptor)
}

pub fn submit(
    adapter: &KubernetesAdapter,
    path: &Path,
    script: Option<&Path>,
    workdir: Option<PathBuf>,
) -> Result<()> {
    let mut descriptor = load_descriptor(path, script)?;
    if workdir.is_some() {
        descriptor.workdir = workdir;
    }

    let id = adapter.submit(&descriptor).context("Failed to submit job")?;

    println!("{} Submitted job {}", "✓".green(), id.to_string().cyan());
    println!("  Namespace: {}", adapter.context().namespace.dimmed());
    Ok(())
}

pub fn render(adapter: &KubernetesAdapter, path: &Path, script: Option<&Path>) -> Result<()> {
    let descriptor = load_descriptor(path, script)?;
    let (document, _) = adapter.render(&descriptor)?;
    print!("{document}");
    Ok(())
}

pub fn info(adapter: &KubernetesAdapter, id: &str, json: bool) -> Result<()> {
    let info = adapter.info(&JobId::from(id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        print_job_details(&info);
    }
    Ok(())
}

pub fn status(adapter: &KubernetesAdapter, id: &str) -> Result<()> {
    let state = adapter.status(&JobId::from(id))?;
    println!("{}", colorize_state(state));
    Ok(())
}

pub fn delete(adapter: &KubernetesAdapter, id: &str) -> Result<()> {
    adapter
        .delete(&JobId::from(id))
        .with_context(|| format!("Failed to delete job {id}"))?;
    println!("{} Deleted job {}", "✓".green(), id.cyan());
    Ok(())
}

pub fn list(adapter: &KubernetesAdapter, owners: &[String], json: bool) -> Result<()> {
    let jobs = if owners.is_empty() {
        adapter.info_all()?
    } else {
        adapter.info_where_owner(owners)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
        return Ok(());
    }

    if jobs.is_empty() {
        println!("{}", "No jobs found.".yellow());
    } else {
        println!("{}", format!("Found {} job(s):", jobs.len()).bold());
        println!();
        for job in &jobs {
            print_job_summary(job);
        }
    }
    Ok(())
}

fn print_job_summary(job: &JobInfo) {
    println!("  {} Job {}", "▸".cyan(), job.id.dimmed());
    println!("    Status:   {}", colorize_state(job.status));
    if let Some(owner) = &job.job_owner {
        println!("    Owner:    {}", owner.dimmed());
    }
    if let Some(submitted) = job.submission_time {
        println!(
            "    Created:  {}",
            submitted.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
        );
    }
    println!();
}

fn print_job_details(job: &JobInfo) {
    println!("{}", "Job Details:".bold());
    println!("  ID:          {}", job.id.cyan());
    println!("  Status:      {}", colorize_state(job.status));

    if let Some(name) = &job.job_name {
        println!("  Name:        {}", name);
    }
    if let Some(owner) = &job.job_owner {
        println!("  Owner:       {}", owner);
    }
    if let Some(submitted) = job.submission_time {
        println!("  Submitted:   {}", submitted.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(dispatched) = job.dispatch_time {
        println!("  Started:     {}", dispatched.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(seconds) = job.wallclock_time {
        println!("  Wallclock:   {}s", seconds);
    }

    if let Some(conn) = &job.connection {
        println!("\n{}", "Connection:".bold());
        println!("  Host:        {}", conn.host.as_deref().unwrap_or("-"));
        if let Some(port) = conn.port {
            println!("  Port:        {}", port);
        }
        if conn.password.is_some() {
            println!("  Password:    {}", "(set, use --json to show)".dimmed());
        }
    }
}

fn colorize_state(state: JobState) -> ColoredString {
    match state {
        JobState::Queued => state.as_str().yellow(),
        JobState::QueuedHeld => state.as_str().magenta(),
        JobState::Running => state.as_str().blue(),
        JobState::Suspended => state.as_str().red(),
        JobState::Completed => state.as_str().green(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_descriptor_with_script() {
        let mut descriptor = tempfile::NamedTempFile::new().unwrap();
        write!(
            descriptor,
            r#"
job_name: Nightly Build
gpus_per_node: 1
native:
  container:
    name: builder
    image: rust:1.85
    command: cargo build --release
    port: 8080
  mounts:
    - type: nfs
      name: scratch
      host: nfs.example.org
      path: /scratch
      destination_path: /scratch
"#
        )
        .unwrap();

        let mut script = tempfile::NamedTempFile::new().unwrap();
        write!(script, "#!/bin/sh\necho hi\n").unwrap();

        let loaded = load_descriptor(descriptor.path(), Some(script.path())).unwrap();
        assert_eq!(loaded.job_name.as_deref(), Some("Nightly Build"));
        assert_eq!(loaded.gpus_per_node, Some(1));
        assert_eq!(loaded.content.as_deref(), Some("#!/bin/sh\necho hi\n"));

        let native = loaded.native.unwrap();
        let container = native.container.unwrap();
        assert_eq!(container.image, "rust:1.85");
        assert_eq!(container.port, Some(8080));
        assert_eq!(native.mounts[0].name(), "scratch");
    }

    #[test]
    fn test_missing_descriptor_is_an_error() {
        let err = load_descriptor(Path::new("/nonexistent/job.yml"), None).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/job.yml"));
    }

    #[test]
    fn test_every_state_is_printed_by_name() {
        for state in [
            JobState::Queued,
            JobState::QueuedHeld,
            JobState::Running,
            JobState::Suspended,
            JobState::Completed,
        ] {
            assert!(colorize_state(state).to_string().contains(state.as_str()));
        }
    }
}
