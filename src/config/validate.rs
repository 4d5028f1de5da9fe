// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{PipelineError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::PipelineError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_pipelines(cfg)?;
    validate_plugin_chains(cfg)?;
    Ok(())
}

fn ensure_has_pipelines(cfg: &RawConfigFile) -> Result<()> {
    if cfg.pipeline.is_empty() {
        return Err(PipelineError::ConfigError(
            "config must contain at least one [pipeline.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_plugin_chains(cfg: &RawConfigFile) -> Result<()> {
    for (name, spec) in cfg.pipeline.iter() {
        if spec.plugins.is_empty() {
            return Err(PipelineError::ConfigError(format!(
                "pipeline '{}' must list at least one plugin",
                name
            )));
        }

        for plugin in spec.plugins.iter() {
            if plugin.trim().is_empty() {
                return Err(PipelineError::ConfigError(format!(
                    "pipeline '{}' contains a blank plugin name",
                    name
                )));
            }
        }
    }
    Ok(())
}
