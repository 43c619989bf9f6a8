//! Process execution
//!
//! Every control-plane interaction is a CLI invocation. The [`ProcessRunner`]
//! trait is the only place commands actually leave the process, so the rest of
//! the adapter can be exercised against a scripted fake.

use std::collections::BTreeMap;
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::{debug, error, warn};

use crate::error::{AdapterError, Result};

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl ProcessOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            success: true,
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            success: false,
        }
    }
}

/// Runs a command line and captures its output
///
/// Timeouts and cancellation are the implementation's business; callers only
/// see success or failure plus the captured streams.
pub trait ProcessRunner: Send + Sync {
    /// Runs `command`, feeding `stdin` if given, with `env` added to the environment
    fn run(
        &self,
        command: &str,
        stdin: Option<&str>,
        env: &BTreeMap<String, String>,
    ) -> std::io::Result<ProcessOutput>;
}

/// Runs commands through `sh -c` on the local host
#[derive(Debug, Clone, Default)]
pub struct ShellRunner;

impl ProcessRunner for ShellRunner {
    fn run(
        &self,
        command: &str,
        stdin: Option<&str>,
        env: &BTreeMap<String, String>,
    ) -> std::io::Result<ProcessOutput> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Dropping the handle closes stdin so the command sees EOF
        if let Some(mut handle) = child.stdin.take() {
            match handle.write_all(stdin.unwrap_or_default().as_bytes()) {
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => return Err(e),
                _ => {}
            }
        }

        let output = child.wait_with_output()?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        debug!(
            "Command finished: exit_code={}, stdout_len={}, stderr_len={}",
            output.status.code().unwrap_or(-1),
            stdout.len(),
            stderr.len()
        );

        Ok(ProcessOutput {
            stdout,
            stderr,
            success: output.status.success(),
        })
    }
}

/// Runs `command` and returns its stdout, classifying failures
///
/// A non-zero exit becomes [`AdapterError::NotFound`] when the server says the
/// object does not exist and [`AdapterError::ControlPlane`] otherwise.
pub fn call(
    runner: &dyn ProcessRunner,
    command: &str,
    stdin: Option<&str>,
    env: &BTreeMap<String, String>,
) -> Result<String> {
    debug!("Executing command: {}", command);

    let output = runner
        .run(command, stdin, env)
        .map_err(|source| AdapterError::Process {
            command: command.to_string(),
            source,
        })?;

    if output.success {
        debug!("Command succeeded");
        return Ok(output.stdout);
    }

    let err = AdapterError::from_stderr(&output.stderr);
    if err.is_not_found() {
        warn!("Resource not found: {}", output.stderr.trim());
    } else {
        error!("Command failed: {}", output.stderr.trim());
    }
    Err(err)
}
