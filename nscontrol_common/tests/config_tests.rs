//! Config loading tests.
//!
//! Tests for `ConfigLoader` on `NsControlConfig`: missing files, parse
//! errors, defaults for an omitted `[segment]` table, and validation.

use nscontrol_common::config::{ConfigError, ConfigLoader, LogLevel, NsControlConfig};
use nscontrol_common::shm::consts::{ARENA_CAPACITY, ARENA_NAME};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Write `content` as `nscontrol.toml` inside `dir` and return its path.
fn write_config(dir: &Path, content: &str) -> std::path::PathBuf {
    let path = dir.join("nscontrol.toml");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn missing_file_is_reported() {
    let result = NsControlConfig::load(Path::new("/nonexistent/path/nscontrol.toml"));
    assert!(matches!(result, Err(ConfigError::FileNotFound)));
}

#[test]
fn invalid_toml_is_a_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(dir.path(), "invalid toml {{{{");
    assert!(matches!(
        NsControlConfig::load(&path),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn segment_table_is_optional() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        dir.path(),
        r#"
[shared]
service_name = "console"
"#,
    );

    let config = NsControlConfig::load(&path).unwrap();
    assert_eq!(config.shared.log_level, LogLevel::Info);
    assert_eq!(config.segment.name, ARENA_NAME);
    assert_eq!(config.segment.capacity, ARENA_CAPACITY);
    assert!(config.validate().is_ok());
}

#[test]
fn segment_fields_override_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        dir.path(),
        r#"
[shared]
log_level = "debug"
service_name = "engine"

[segment]
name = "nscontrol_test"
capacity = 1048576
attach_timeout_ms = 250
"#,
    );

    let config = NsControlConfig::load(&path).unwrap();
    assert_eq!(config.shared.log_level, LogLevel::Debug);
    assert_eq!(config.segment.name, "nscontrol_test");
    assert_eq!(config.segment.capacity, 1_048_576);
    assert_eq!(config.segment.attach_timeout_ms, 250);
    assert_eq!(config.segment.directory, Path::new("/dev/shm"));
}

#[test]
fn invalid_segment_is_rejected_by_validate() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        dir.path(),
        r#"
[shared]
service_name = "engine"

[segment]
capacity = 5000
"#,
    );

    let config = NsControlConfig::load(&path).unwrap();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::ValidationError(_))
    ));
}
