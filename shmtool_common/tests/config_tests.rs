//! Configuration file loading tests.

use shmtool_common::config::{ConfigError, ConfigLoader, LogLevel, ShmtoolConfig};
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{content}").unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn full_config_loads() {
    let file = write_config(
        r#"
[shared]
log_level = "debug"

[segment]
permissions = "0640"
huge_pages = true
no_reserve = true
key_proj_id = 7
"#,
    );

    let config = ShmtoolConfig::load(file.path()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.shared.log_level, LogLevel::Debug);
    assert_eq!(config.segment.permission_bits().unwrap(), 0o640);
    assert!(config.segment.huge_pages);
    assert!(config.segment.no_reserve);
    assert_eq!(config.segment.key_proj_id, 7);
}

#[test]
fn missing_sections_use_defaults() {
    let file = write_config("[shared]\n");

    let config = ShmtoolConfig::load(file.path()).unwrap();
    assert_eq!(config.shared.log_level, LogLevel::Info);
    assert_eq!(config.segment.permission_bits().unwrap(), 0o600);
    assert!(!config.segment.huge_pages);
    assert_eq!(config.segment.key_proj_id, 0x42);
}

#[test]
fn partial_segment_section_keeps_other_defaults() {
    let file = write_config("[segment]\nno_reserve = true\n");

    let config = ShmtoolConfig::load(file.path()).unwrap();
    assert!(config.segment.no_reserve);
    assert!(!config.segment.huge_pages);
    assert_eq!(config.segment.permissions, "600");
}

#[test]
fn invalid_toml_is_parse_error() {
    let file = write_config("invalid toml {{{{");

    let result = ShmtoolConfig::load(file.path());
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn invalid_permissions_fail_validation() {
    let file = write_config("[segment]\npermissions = \"rw-------\"\n");

    let config = ShmtoolConfig::load(file.path()).unwrap();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::ValidationError(_))
    ));
}

#[test]
fn explicit_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    assert!(matches!(
        ShmtoolConfig::load_or_default(&path, true),
        Err(ConfigError::FileNotFound)
    ));
    assert!(ShmtoolConfig::load_or_default(&path, false).is_ok());
}
