//! Subscriber installation

use switchyard_log::{LogConfig, LogError, LogFormat, LogOutput};

#[test]
fn test_init_once() {
    let guard = LogConfig::new()
        .format(LogFormat::Compact)
        .output(LogOutput::Stderr)
        .with_env_filter("debug")
        .init()
        .unwrap();

    tracing::info!(component = "log", "subscriber installed");

    let second = LogConfig::new().init();
    assert!(matches!(second, Err(LogError::AlreadyInitialized(_))));

    drop(guard);
}
