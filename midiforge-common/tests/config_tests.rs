//! Tests for config file loading and resolution
//!
//! Note: Uses serial_test to prevent environment variable races.
//! Tests that touch MIDIFORGE_CONFIG are marked with #[serial].

use midiforge_common::config::{
    load_config, load_toml_config, resolve_config_path, TomlConfig, CONFIG_ENV_VAR,
};
use midiforge_common::Error;
use serial_test::serial;
use std::env;
use tempfile::TempDir;

#[test]
fn test_load_full_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[augment]
transpose = [-2, 2]
time_stretch = [0.1]
workers = 8
max_in_flight = 64
progress_interval_secs = 2
entry_extension = "midi"

[logging]
level = "debug"
"#,
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config.augment.transpose, Some(vec![-2, 2]));
    assert_eq!(config.augment.time_stretch, Some(vec![0.1]));
    assert_eq!(config.augment.workers, Some(8));
    assert_eq!(config.augment.max_in_flight, Some(64));
    assert_eq!(config.augment.progress_interval_secs, Some(2));
    assert_eq!(config.augment.entry_extension.as_deref(), Some("midi"));
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_malformed_toml_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "[augment\nworkers = ").unwrap();

    match load_toml_config(&path) {
        Err(Error::Config(msg)) => assert!(msg.contains("parse")),
        other => panic!("expected config error, got {:?}", other),
    }
}

#[test]
fn test_wrong_value_type_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("types.toml");
    std::fs::write(&path, "[augment]\nworkers = \"many\"\n").unwrap();

    assert!(load_toml_config(&path).is_err());
}

#[test]
#[serial]
fn test_explicit_missing_file_is_error() {
    env::remove_var(CONFIG_ENV_VAR);
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.toml");

    assert!(matches!(
        resolve_config_path(Some(&missing)),
        Err(Error::Config(_))
    ));
}

#[test]
#[serial]
fn test_env_var_names_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("env.toml");
    std::fs::write(&path, "[augment]\nworkers = 3\n").unwrap();

    env::set_var(CONFIG_ENV_VAR, &path);
    let resolved = resolve_config_path(None);
    let loaded = load_config(None);
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(resolved.unwrap(), Some(path));
    assert_eq!(loaded.unwrap().augment.workers, Some(3));
}

#[test]
#[serial]
fn test_cli_path_beats_env_var() {
    let temp_dir = TempDir::new().unwrap();
    let env_path = temp_dir.path().join("env.toml");
    let cli_path = temp_dir.path().join("cli.toml");
    std::fs::write(&env_path, "[augment]\nworkers = 3\n").unwrap();
    std::fs::write(&cli_path, "[augment]\nworkers = 5\n").unwrap();

    env::set_var(CONFIG_ENV_VAR, &env_path);
    let loaded = load_config(Some(&cli_path));
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(loaded.unwrap().augment.workers, Some(5));
}

#[test]
fn test_round_trip_through_toml() {
    let mut config = TomlConfig::default();
    config.augment.workers = Some(2);
    config.augment.time_stretch = Some(vec![-0.5, 0.25]);

    let text = toml::to_string(&config).unwrap();
    let parsed: TomlConfig = toml::from_str(&text).unwrap();
    assert_eq!(parsed, config);
}
