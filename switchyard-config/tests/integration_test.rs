//! Integration tests for switchyard-config

use std::env;
use std::fs;
use std::path::PathBuf;
use switchyard_config::*;

fn temp_file(name: &str, contents: &str) -> PathBuf {
    let path = env::temp_dir().join(format!("switchyard-config-{}-{}", std::process::id(), name));
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_config_manager_with_prefix() {
    unsafe {
        env::set_var("SYIT_ONE_SWR_RETRY", "4");
        env::set_var("SYIT_ONE_LOG_LEVEL", "warn");
    }

    let manager = ConfigManager::with_prefix("SYIT_ONE");
    manager.load_env().unwrap();

    assert_eq!(manager.get::<u32>("swr.retry").unwrap(), 4);
    assert_eq!(manager.get_string("log.level").unwrap(), "warn");
    assert!(!manager.has("one.swr_retry"));

    unsafe {
        env::remove_var("SYIT_ONE_SWR_RETRY");
        env::remove_var("SYIT_ONE_LOG_LEVEL");
    }
}

#[test]
fn test_env_loader_with_prefix() {
    let loader = EnvLoader::new(Some("SYIT_TWO".to_string()));

    unsafe {
        env::set_var("SYIT_TWO_SWR_RETRY_DELAY_MS", "250");
    }

    assert_eq!(loader.load_var("swr.retry_delay_ms").unwrap(), "250");
    assert_eq!(loader.load_var_or("swr.retry", "3"), "3");
    assert!(loader.load().unwrap().contains_key("swr.retry_delay_ms"));

    unsafe {
        env::remove_var("SYIT_TWO_SWR_RETRY_DELAY_MS");
    }
}

#[test]
fn test_toml_file_into_settings() {
    let path = temp_file(
        "settings.toml",
        r#"
[swr]
cache_time_secs = 60
stale_time_secs = 10
enable_background_refresh = true
refresh_interval_secs = 30

[events]
async_handling = false

[log]
format = "pretty"
"#,
    );

    let manager = ConfigManager::builder()
        .with_prefix("SYIT_THREE")
        .add_file(&path, FileFormat::Toml)
        .build()
        .unwrap();
    let settings = SwitchyardSettings::load(&manager).unwrap();

    assert_eq!(settings.swr.cache_time_secs, 60);
    assert_eq!(settings.swr.stale_time_secs, 10);
    assert!(settings.swr.enable_background_refresh);
    assert_eq!(settings.swr.refresh_interval_secs, 30);
    assert!(!settings.events.async_handling);
    assert_eq!(settings.log.format, "pretty");
    assert_eq!(settings.query, QuerySettings::default());

    fs::remove_file(path).ok();
}

#[test]
fn test_environment_overrides_file() {
    let path = temp_file("override.json", r#"{"swr": {"retry": 1, "retry_delay_ms": 10}}"#);

    unsafe {
        env::set_var("SYIT_FOUR_SWR_RETRY", "6");
    }

    let manager = ConfigManager::builder()
        .with_prefix("SYIT_FOUR")
        .add_file(&path, FileFormat::Json)
        .load_env()
        .build()
        .unwrap();
    let settings = SwitchyardSettings::load(&manager).unwrap();

    assert_eq!(settings.swr.retry, 6);
    assert_eq!(settings.swr.retry_delay_ms, 10);

    unsafe {
        env::remove_var("SYIT_FOUR_SWR_RETRY");
    }
    fs::remove_file(path).ok();
}

#[test]
fn test_invalid_settings_rejected() {
    let path = temp_file("invalid.json", r#"{"swr": {"cache_time_secs": 5, "stale_time_secs": 30}}"#);

    let manager = ConfigManager::builder()
        .add_file(&path, FileFormat::Json)
        .build()
        .unwrap();

    let err = SwitchyardSettings::load(&manager).unwrap_err();
    assert!(matches!(err, ConfigError::ValidationError(_)));

    fs::remove_file(path).ok();
}

#[test]
fn test_missing_file_is_a_load_error() {
    let manager = ConfigManager::new();
    let result = manager.load_file("/nonexistent/switchyard.toml", FileFormat::Toml);
    assert!(matches!(result, Err(ConfigError::LoadError(_))));
}
