//! Resource naming
//!
//! Job ids and every name derived from them. Companion objects are found by
//! suffixing the id, so no id-to-name mapping is ever persisted.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Maximum length of a DNS-1123 label
pub const MAX_LABEL_LEN: usize = 63;

const RANDOM_BITS: u32 = 48;

/// Label selecting every object that belongs to a job
pub const JOB_LABEL: &str = "job";
/// Label carrying the human-readable job name
pub const NAME_LABEL: &str = "app.kubernetes.io/name";
/// Legacy name label honoured when reading pods created by other tools
pub const LEGACY_NAME_LABEL: &str = "k8s-app";
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY: &str = "kbatch";
/// Annotation carrying the submitting user (annotations accept any username)
pub const OWNER_ANNOTATION: &str = "kbatch.io/owner";
pub const ACCOUNT_LABEL: &str = "account";

/// Externally visible job handle; also the pod name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Derives a fresh id from a container name
    pub fn generate(container_name: &str) -> Self {
        let suffix = rand::thread_rng().gen_range(0..(1u64 << RANDOM_BITS));
        Self::with_suffix(container_name, suffix)
    }

    /// Deterministic variant of [`JobId::generate`]
    pub fn with_suffix(container_name: &str, suffix: u64) -> Self {
        Self(format!("{}-{}", slug(container_name), to_base36(suffix)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn companion(&self, kind: CompanionKind) -> String {
        companion_name(&self.0, kind)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Objects created alongside a job's pod
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompanionKind {
    Service,
    Secret,
    ConfigMap,
}

impl CompanionKind {
    pub const ALL: [CompanionKind; 3] = [
        CompanionKind::Service,
        CompanionKind::Secret,
        CompanionKind::ConfigMap,
    ];

    pub fn suffix(&self) -> &'static str {
        match self {
            CompanionKind::Service => "service",
            CompanionKind::Secret => "secret",
            CompanionKind::ConfigMap => "configmap",
        }
    }
}

pub fn companion_name(id: &str, kind: CompanionKind) -> String {
    format!("{}-{}", id, kind.suffix())
}

/// Lower-cases and replaces spaces with hyphens
pub fn slug(name: &str) -> String {
    name.to_lowercase().replace(' ', "-")
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if value == 0 {
        return "0".to_string();
    }

    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).to_string()
}

/// Maps an arbitrary identifier onto the DNS-1123 label charset
///
/// Anything outside `[a-z0-9-]` becomes `-`, runs of `-` collapse, the result
/// never starts or ends with `-`, and is at most [`MAX_LABEL_LEN`] chars.
pub fn sanitize_volume_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.to_lowercase().chars() {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() {
            c
        } else {
            '-'
        };
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }

    let trimmed = truncate_label(out.trim_matches('-'), MAX_LABEL_LEN);
    if trimmed.is_empty() {
        "volume".to_string()
    } else {
        trimmed
    }
}

/// Checks that `name` is a valid DNS-1123 label, as Kubernetes requires of
/// volume names
pub fn is_dns_label(name: &str) -> bool {
    let bytes = name.as_bytes();
    let edge = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => {
            name.len() <= MAX_LABEL_LEN
                && edge(first)
                && edge(last)
                && bytes.iter().all(|b| edge(b) || *b == b'-')
        }
        _ => false,
    }
}

fn truncate_label(name: &str, max: usize) -> String {
    let cut: String = name.chars().take(max).collect();
    cut.trim_end_matches('-').to_string()
}

/// Hands out pod-unique volume names
///
/// Names already claimed (e.g. by declared mounts) are never reissued; a
/// colliding candidate gets a numeric discriminator.
#[derive(Debug, Default)]
pub struct VolumeNamer {
    used: HashSet<String>,
}

impl VolumeNamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a name chosen elsewhere so it is not handed out again
    pub fn reserve(&mut self, name: &str) {
        self.used.insert(name.to_string());
    }

    /// Returns a unique sanitized name built from `parts`
    pub fn claim(&mut self, parts: &[&str]) -> String {
        let base = sanitize_volume_name(&parts.join("-"));
        if self.used.insert(base.clone()) {
            return base;
        }

        let mut n = 2;
        loop {
            let discriminator = format!("-{n}");
            let stem = truncate_label(&base, MAX_LABEL_LEN - discriminator.len());
            let candidate = format!("{stem}{discriminator}");
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}
