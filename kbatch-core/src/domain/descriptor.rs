//! Job descriptors

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::native::NativeSpec;

/// What a caller asks the adapter to run
///
/// The adapter only reads this record; it never mutates it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobDescriptor {
    /// Script text, projected into the pod as `script.sh`
    pub content: Option<String>,
    /// When this directory exists the rendered document is saved there
    pub workdir: Option<PathBuf>,
    pub job_name: Option<String>,
    pub accounting_id: Option<String>,
    pub gpus_per_node: Option<u32>,
    pub native: Option<NativeSpec>,
}

impl JobDescriptor {
    pub fn new(native: NativeSpec) -> Self {
        Self {
            native: Some(native),
            ..Default::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}
