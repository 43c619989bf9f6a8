//! Host identity lookups
//!
//! Pods run as the submitting user, so uid/gid/home/group defaults come from
//! the local passwd and group databases.

use nix::unistd::{Gid, Group, Uid, User};
use std::ffi::CString;

use crate::error::{AdapterError, Result};

/// The parts of a passwd record the adapter needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswdEntry {
    pub home_dir: String,
    pub uid: u32,
    pub gid: u32,
}

/// Access to the invoking user's identity
pub trait HostIdentity: Send + Sync {
    fn current_username(&self) -> Result<String>;

    fn passwd_entry(&self, username: &str) -> Result<PasswdEntry>;

    fn group_name(&self, gid: u32) -> Result<String>;

    /// Ids of every group `username` belongs to, in database order
    fn group_membership_ids(&self, username: &str) -> Result<Vec<u32>>;
}

/// Reads identity records from the local system databases
#[derive(Debug, Clone, Default)]
pub struct SystemIdentity;

impl HostIdentity for SystemIdentity {
    fn current_username(&self) -> Result<String> {
        let uid = Uid::current();
        User::from_uid(uid)
            .map_err(|e| AdapterError::Identity(format!("getpwuid({uid}): {e}")))?
            .map(|user| user.name)
            .ok_or_else(|| AdapterError::Identity(format!("no passwd entry for uid {uid}")))
    }

    fn passwd_entry(&self, username: &str) -> Result<PasswdEntry> {
        let user = lookup_user(username)?;
        Ok(PasswdEntry {
            home_dir: user.dir.to_string_lossy().to_string(),
            uid: user.uid.as_raw(),
            gid: user.gid.as_raw(),
        })
    }

    fn group_name(&self, gid: u32) -> Result<String> {
        Group::from_gid(Gid::from_raw(gid))
            .map_err(|e| AdapterError::Identity(format!("getgrgid({gid}): {e}")))?
            .map(|group| group.name)
            .ok_or_else(|| AdapterError::Identity(format!("no group entry for gid {gid}")))
    }

    fn group_membership_ids(&self, username: &str) -> Result<Vec<u32>> {
        let user = lookup_user(username)?;
        let name = CString::new(username)
            .map_err(|e| AdapterError::Identity(format!("invalid username {username:?}: {e}")))?;
        let groups = nix::unistd::getgrouplist(&name, user.gid)
            .map_err(|e| AdapterError::Identity(format!("getgrouplist({username}): {e}")))?;
        Ok(groups.into_iter().map(|gid| gid.as_raw()).collect())
    }
}

fn lookup_user(username: &str) -> Result<User> {
    User::from_name(username)
        .map_err(|e| AdapterError::Identity(format!("getpwnam({username}): {e}")))?
        .ok_or_else(|| AdapterError::Identity(format!("no passwd entry for {username}")))
}
