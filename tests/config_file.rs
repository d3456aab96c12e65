use daqlink::config::{ConfigError, SessionConfig};
use tempfile::TempDir;

#[test]
fn saved_config_loads_back() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.json");

    let config = SessionConfig {
        ack_timeout_ms: 1500,
        heartbeat_interval_ms: 2500,
        telnet_port: 9900,
        ..SessionConfig::default()
    };
    config.save(&path).unwrap();

    let loaded = SessionConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(loaded.dispatch().ack_timeout.as_millis(), 1500);
}

#[test]
fn partial_file_is_completed_with_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.json");
    std::fs::write(&path, r#"{ "max_failures": 5 }"#).unwrap();

    let loaded = SessionConfig::load(&path).unwrap();
    assert_eq!(loaded.max_failures, 5);
    assert_eq!(loaded.ack_timeout_ms, SessionConfig::default().ack_timeout_ms);
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = TempDir::new().unwrap();
    let result = SessionConfig::load(dir.path().join("absent.json"));
    assert!(matches!(result, Err(ConfigError::Io(_))));
}

#[test]
fn invalid_values_are_rejected_on_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.json");
    std::fs::write(&path, r#"{ "heartbeat_interval_ms": 0 }"#).unwrap();

    match SessionConfig::load(&path) {
        Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, "heartbeat_interval_ms"),
        other => panic!("unexpected result: {:?}", other),
    }
}
