//! Scripted collaborators for unit tests

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::error::{AdapterError, Result};
use crate::identity::{HostIdentity, PasswdEntry};
use crate::process::{ProcessOutput, ProcessRunner};

/// One recorded invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: String,
    pub stdin: Option<String>,
    pub env: BTreeMap<String, String>,
}

/// Replies to exact command lines and records every call
///
/// Unscripted commands succeed with empty output.
#[derive(Default)]
pub struct FakeRunner {
    replies: Mutex<HashMap<String, ProcessOutput>>,
    calls: Mutex<Vec<Invocation>>,
    fail_everything: bool,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// A runner on which every command fails with a generic error
    pub fn failing() -> Self {
        Self {
            fail_everything: true,
            ..Self::default()
        }
    }

    pub fn reply(self, command: &str, output: ProcessOutput) -> Self {
        self.replies
            .lock()
            .unwrap()
            .insert(command.to_string(), output);
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.command).collect()
    }
}

impl ProcessRunner for FakeRunner {
    fn run(
        &self,
        command: &str,
        stdin: Option<&str>,
        env: &BTreeMap<String, String>,
    ) -> std::io::Result<ProcessOutput> {
        self.calls.lock().unwrap().push(Invocation {
            command: command.to_string(),
            stdin: stdin.map(str::to_string),
            env: env.clone(),
        });

        if self.fail_everything {
            return Ok(ProcessOutput::failed("error: connection refused"));
        }

        Ok(self
            .replies
            .lock()
            .unwrap()
            .get(command)
            .cloned()
            .unwrap_or_else(|| ProcessOutput::ok("")))
    }
}

/// Fixed identity: `testuser`, uid 1001, gid 1002 (`testgroup`)
pub struct FakeIdentity {
    pub username: String,
    pub entry: PasswdEntry,
    pub group: String,
    pub groups: Vec<u32>,
}

impl Default for FakeIdentity {
    fn default() -> Self {
        Self {
            username: "testuser".to_string(),
            entry: PasswdEntry {
                home_dir: "/home/testuser".to_string(),
                uid: 1001,
                gid: 1002,
            },
            group: "testgroup".to_string(),
            groups: vec![1002, 10, 1001, 1000],
        }
    }
}

impl FakeIdentity {
    pub fn named(username: &str) -> Self {
        Self {
            username: username.to_string(),
            ..Self::default()
        }
    }
}

impl HostIdentity for FakeIdentity {
    fn current_username(&self) -> Result<String> {
        Ok(self.username.clone())
    }

    fn passwd_entry(&self, username: &str) -> Result<PasswdEntry> {
        if username == self.username {
            Ok(self.entry.clone())
        } else {
            Err(AdapterError::Identity(format!("no passwd entry for {username}")))
        }
    }

    fn group_name(&self, _gid: u32) -> Result<String> {
        Ok(self.group.clone())
    }

    fn group_membership_ids(&self, _username: &str) -> Result<Vec<u32>> {
        Ok(self.groups.clone())
    }
}
