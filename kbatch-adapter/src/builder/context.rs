//! Build context
//!
//! Everything resolved from the host identity for one build. A fresh context is
//! created per call, so the builder itself holds no scratch state.

use kbatch_core::domain::native::{ContainerSpec, MountSpec};
use std::collections::BTreeMap;
use tracing::debug;

use super::resources::PodSecurity;
use crate::error::Result;
use crate::identity::HostIdentity;
use crate::naming::VolumeNamer;

/// Lowest gid considered a real (non-system) group
pub const MIN_SUPPLEMENTAL_GID: u32 = 1000;

pub struct BuildContext {
    pub username: String,
    pub security: PodSecurity,
    /// Primary container environment, defaults already merged in
    pub env: BTreeMap<String, String>,
    /// Adapter mounts followed by job mounts
    pub mounts: Vec<MountSpec>,
    pub namer: VolumeNamer,
}

impl BuildContext {
    pub fn resolve(
        identity: &dyn HostIdentity,
        username: &str,
        container: &ContainerSpec,
        global_mounts: &[MountSpec],
        job_mounts: &[MountSpec],
        auto_supplemental_groups: bool,
    ) -> Result<Self> {
        let membership = if auto_supplemental_groups {
            identity.group_membership_ids(username)?
        } else {
            Vec::new()
        };
        let supplemental_groups =
            effective_supplemental_groups(&membership, &container.supplemental_groups);

        let passwd = identity.passwd_entry(username)?;
        let overrides = container.security_context.clone().unwrap_or_default();
        let run_as_group = overrides.run_as_group.unwrap_or(passwd.gid);
        let security = PodSecurity {
            run_as_user: overrides.run_as_user.unwrap_or(passwd.uid),
            run_as_group,
            run_as_non_root: overrides.run_as_non_root.unwrap_or(true),
            fs_group: overrides.fs_group.unwrap_or(run_as_group),
            supplemental_groups,
        };

        let group = identity.group_name(security.run_as_group)?;
        let mut env = BTreeMap::from([
            ("USER".to_string(), username.to_string()),
            ("UID".to_string(), security.run_as_user.to_string()),
            ("HOME".to_string(), passwd.home_dir.clone()),
            ("GROUP".to_string(), group),
            ("GID".to_string(), security.run_as_group.to_string()),
            ("KUBECONFIG".to_string(), "/dev/null".to_string()),
        ]);
        env.extend(container.env.clone());

        let mounts: Vec<MountSpec> = global_mounts.iter().chain(job_mounts).cloned().collect();
        let mut namer = VolumeNamer::new();
        for mount in &mounts {
            namer.reserve(mount.name());
        }

        debug!(
            "Resolved build context: user={}, uid={}, gid={}, groups={:?}",
            username, security.run_as_user, security.run_as_group, security.supplemental_groups
        );

        Ok(Self {
            username: username.to_string(),
            security,
            env,
            mounts,
            namer,
        })
    }
}

/// Sorted, deduplicated union of real host groups and explicit groups
pub fn effective_supplemental_groups(membership: &[u32], explicit: &[u32]) -> Vec<u32> {
    let mut groups: Vec<u32> = membership
        .iter()
        .copied()
        .filter(|gid| *gid >= MIN_SUPPLEMENTAL_GID)
        .chain(explicit.iter().copied())
        .collect();
    groups.sort_unstable();
    groups.dedup();
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeIdentity;
    use kbatch_core::domain::native::SecurityContextSpec;

    #[test]
    fn test_explicit_groups_only_without_auto() {
        let identity = FakeIdentity {
            groups: vec![1000, 1001],
            ..Default::default()
        };
        let container = ContainerSpec {
            supplemental_groups: vec![1002],
            ..Default::default()
        };
        let ctx = BuildContext::resolve(&identity, "testuser", &container, &[], &[], false).unwrap();
        assert_eq!(ctx.security.supplemental_groups, vec![1002]);
    }

    #[test]
    fn test_auto_groups_union_sorted() {
        let identity = FakeIdentity {
            groups: vec![1001, 1000],
            ..Default::default()
        };
        let container = ContainerSpec {
            supplemental_groups: vec![1002],
            ..Default::default()
        };
        let ctx = BuildContext::resolve(&identity, "testuser", &container, &[], &[], true).unwrap();
        assert_eq!(ctx.security.supplemental_groups, vec![1000, 1001, 1002]);
    }

    #[test]
    fn test_supplemental_groups_drop_system_groups_and_duplicates() {
        assert_eq!(
            effective_supplemental_groups(&[1002, 10, 1001, 1000], &[1001, 5]),
            vec![5, 1000, 1001, 1002]
        );
        assert!(effective_supplemental_groups(&[4, 27], &[]).is_empty());
    }

    #[test]
    fn test_identity_defaults() {
        let identity = FakeIdentity::default();
        let ctx = BuildContext::resolve(
            &identity,
            "testuser",
            &ContainerSpec::default(),
            &[],
            &[],
            false,
        )
        .unwrap();

        assert_eq!(
            ctx.security,
            PodSecurity {
                run_as_user: 1001,
                run_as_group: 1002,
                run_as_non_root: true,
                fs_group: 1002,
                supplemental_groups: vec![],
            }
        );
        assert_eq!(ctx.env["USER"], "testuser");
        assert_eq!(ctx.env["UID"], "1001");
        assert_eq!(ctx.env["HOME"], "/home/testuser");
        assert_eq!(ctx.env["GROUP"], "testgroup");
        assert_eq!(ctx.env["GID"], "1002");
        assert_eq!(ctx.env["KUBECONFIG"], "/dev/null");
    }

    #[test]
    fn test_overrides_win_field_by_field() {
        let container = ContainerSpec {
            security_context: Some(SecurityContextSpec {
                run_as_user: Some(1000),
                run_as_group: Some(1000),
                run_as_non_root: None,
                fs_group: None,
            }),
            env: BTreeMap::from([
                ("HOME".to_string(), "/my/home".to_string()),
                ("PATH".to_string(), "/usr/bin".to_string()),
            ]),
            ..Default::default()
        };
        let ctx = BuildContext::resolve(&FakeIdentity::default(), "testuser", &container, &[], &[], false)
            .unwrap();

        assert_eq!(ctx.security.run_as_user, 1000);
        assert_eq!(ctx.security.run_as_group, 1000);
        assert!(ctx.security.run_as_non_root);
        assert_eq!(ctx.security.fs_group, 1000);
        assert_eq!(ctx.env["HOME"], "/my/home");
        assert_eq!(ctx.env["PATH"], "/usr/bin");
        assert_eq!(ctx.env["UID"], "1000");
    }
}
