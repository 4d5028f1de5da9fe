use std::collections::BTreeMap;

use taskpipe::config::{ConfigFile, PipelineConfig, PipelineSpec, RawConfigFile};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                pipeline: BTreeMap::new(),
            },
        }
    }

    pub fn with_pipeline(mut self, name: &str, plugins: &[&str]) -> Self {
        self.config.pipeline.insert(
            name.to_string(),
            PipelineSpec {
                plugins: plugins.iter().map(|s| s.to_string()).collect(),
            },
        );
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Shortcut for a single validated [`PipelineConfig`].
pub fn pipeline_config(name: &str, plugins: &[&str]) -> PipelineConfig {
    PipelineConfig::new(name, plugins.iter().map(|s| s.to_string()).collect())
}
