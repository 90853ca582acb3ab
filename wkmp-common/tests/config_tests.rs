//! Tests for bootstrap configuration loading
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate WKMP_VL_CONFIG are marked with #[serial].

use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;
use wkmp_common::config::{
    load_config, load_toml_config, resolve_config_path, LayoutKind, TomlConfig, CONFIG_ENV_VAR,
};

#[test]
fn test_defaults() {
    let config = TomlConfig::default();
    assert_eq!(config.workers, 4);
    assert_eq!(config.layout.kind, LayoutKind::Builtin);
    assert_eq!(config.logging.level, "info");
    assert!(config.logging.file.is_none());
    assert!(config.validate().is_ok());
}

#[test]
fn test_load_full_config() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("vl.toml");
    std::fs::write(
        &path,
        r#"
database_path = "/var/lib/wkmp/catalog.db"
import_path = "/music"
workers = 8

[layout]
kind = "rules"
rules_file = "/etc/wkmp/layout.toml"

[logging]
level = "debug"
"#,
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config.database_path, PathBuf::from("/var/lib/wkmp/catalog.db"));
    assert_eq!(config.import_path, Some(PathBuf::from("/music")));
    assert_eq!(config.workers, 8);
    assert_eq!(config.layout.kind, LayoutKind::Rules);
    assert_eq!(
        config.layout.rules_file,
        Some(PathBuf::from("/etc/wkmp/layout.toml"))
    );
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_rules_layout_requires_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("vl.toml");
    std::fs::write(&path, "[layout]\nkind = \"rules\"\n").unwrap();

    let err = load_toml_config(&path).unwrap_err();
    assert!(err.to_string().contains("rules_file"), "unexpected error: {}", err);
}

#[test]
fn test_zero_workers_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("vl.toml");
    std::fs::write(&path, "workers = 0\n").unwrap();

    assert!(load_toml_config(&path).is_err());
}

#[test]
fn test_malformed_toml_is_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("vl.toml");
    std::fs::write(&path, "workers = [unterminated\n").unwrap();

    let err = load_toml_config(&path).unwrap_err();
    assert!(matches!(err, wkmp_common::Error::Toml(_)));
}

#[test]
#[serial]
fn test_cli_argument_wins_over_env() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");

    let resolved = resolve_config_path(Some(&PathBuf::from("/tmp/from-cli.toml")));
    assert_eq!(resolved, Some(PathBuf::from("/tmp/from-cli.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_used_without_cli() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");

    let resolved = resolve_config_path(None);
    assert_eq!(resolved, Some(PathBuf::from("/tmp/from-env.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_load_config_from_env_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("vl.toml");
    std::fs::write(&path, "workers = 2\n").unwrap();
    env::set_var(CONFIG_ENV_VAR, &path);

    let config = load_config(None).unwrap();
    assert_eq!(config.workers, 2);

    env::remove_var(CONFIG_ENV_VAR);
}
