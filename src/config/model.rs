// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [pipeline.ingest]
/// plugins = ["http-input", "json-decode", "kafka-output"]
///
/// [pipeline.replay]
/// plugins = ["file-input", "json-decode", "kafka-output"]
/// ```
///
/// Keys under `[pipeline.<name>]` are the pipeline names.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub pipeline: BTreeMap<String, PipelineSpec>,
}

/// One `[pipeline.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSpec {
    /// Ordered plugin names the driver walks.
    pub plugins: Vec<String>,
}

/// Validated configuration.
///
/// Construct via `TryFrom<RawConfigFile>` (see [`validate`]) or
/// [`loader::load_and_validate`].
///
/// [`validate`]: super::validate
/// [`loader::load_and_validate`]: super::loader::load_and_validate
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub pipeline: BTreeMap<String, PipelineConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        let pipeline = raw
            .pipeline
            .into_iter()
            .map(|(name, spec)| {
                let config = PipelineConfig {
                    name: name.clone(),
                    plugins: spec.plugins,
                };
                (name, config)
            })
            .collect();
        Self { pipeline }
    }
}

/// Immutable per-pipeline configuration the driver walks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub name: String,
    /// Plugins in execution order. A name may appear more than once.
    pub plugins: Vec<String>,
}

impl PipelineConfig {
    pub fn new(name: impl Into<String>, plugins: Vec<String>) -> Self {
        Self {
            name: name.into(),
            plugins,
        }
    }
}
