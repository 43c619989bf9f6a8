//! Configuration module
//!
//! Loads the adapter configuration the CLI runs with.

use anyhow::{Context, Result};
use kbatch_adapter::AdapterConfig;
use std::path::Path;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub adapter: AdapterConfig,
}

impl Config {
    /// Reads `path` if given, otherwise uses the built-in defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let adapter = match path {
            Some(path) => AdapterConfig::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => AdapterConfig::default(),
        };
        adapter.validate().context("Invalid adapter configuration")?;
        Ok(Self { adapter })
    }
}
