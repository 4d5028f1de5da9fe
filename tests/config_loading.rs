//! Config model, loader and validation.

use std::io::Write;

use taskpipe::config::loader::{default_config_path, load_and_validate, load_from_path};
use taskpipe::config::{ConfigFile, RawConfigFile};
use taskpipe::errors::PipelineError;

use taskpipe_test_utils::builders::ConfigFileBuilder;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp config");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_and_validates_a_pipeline_config() {
    let file = write_config(
        r#"
[pipeline.ingest]
plugins = ["http-input", "json-decode", "kafka-output"]

[pipeline.replay]
plugins = ["file-input", "json-decode", "kafka-output"]
"#,
    );

    let cfg = load_and_validate(file.path()).expect("config should load");

    assert_eq!(cfg.pipeline.len(), 2);

    let ingest = &cfg.pipeline["ingest"];
    assert_eq!(ingest.name, "ingest");
    assert_eq!(
        ingest.plugins,
        vec!["http-input", "json-decode", "kafka-output"]
    );

    let replay = &cfg.pipeline["replay"];
    assert_eq!(replay.name, "replay");
    assert_eq!(replay.plugins[0], "file-input");
}

#[test]
fn rejects_a_config_without_pipelines() {
    let file = write_config("");

    let err = load_and_validate(file.path()).unwrap_err();
    assert!(matches!(err, PipelineError::ConfigError(_)));
}

#[test]
fn rejects_an_empty_plugin_chain() {
    let file = write_config(
        r#"
[pipeline.empty]
plugins = []
"#,
    );

    let err = load_and_validate(file.path()).unwrap_err();
    assert!(matches!(err, PipelineError::ConfigError(_)));
}

#[test]
fn rejects_blank_plugin_names() {
    let file = write_config(
        r#"
[pipeline.blank]
plugins = ["a", "  ", "c"]
"#,
    );

    let err = load_and_validate(file.path()).unwrap_err();
    assert!(matches!(err, PipelineError::ConfigError(_)));
}

#[test]
fn surfaces_toml_parse_errors() {
    let file = write_config("this is not toml [");

    let err = load_and_validate(file.path()).unwrap_err();
    assert!(matches!(err, PipelineError::TomlError(_)));
}

#[test]
fn loading_without_validation_keeps_the_raw_shape() {
    let file = write_config(
        r#"
[pipeline.empty]
plugins = []
"#,
    );

    // The raw loader accepts shapes that validation later rejects.
    let raw: RawConfigFile = load_from_path(file.path()).expect("raw load should succeed");
    assert!(raw.pipeline["empty"].plugins.is_empty());

    let err = ConfigFile::try_from(raw).unwrap_err();
    assert!(matches!(err, PipelineError::ConfigError(_)));
}

#[test]
fn duplicate_plugin_names_in_a_chain_are_allowed() {
    let cfg = ConfigFileBuilder::new()
        .with_pipeline("doubled", &["decode", "enrich", "decode"])
        .build();

    assert_eq!(
        cfg.pipeline["doubled"].plugins,
        vec!["decode", "enrich", "decode"]
    );
}

#[test]
fn missing_config_file_is_an_io_error() {
    let err = load_and_validate("/definitely/not/a/real/Taskpipe.toml").unwrap_err();
    assert!(matches!(err, PipelineError::IoError(_)));
}

#[test]
fn default_config_path_points_at_the_working_directory() {
    assert_eq!(default_config_path(), std::path::PathBuf::from("Taskpipe.toml"));
}
