use std::path::PathBuf;
use std::time::Duration;

use lantern::config::Config;
use lantern::error::ConfigError;

#[test]
fn test_config_defaults() {
    let cfg = Config::default();

    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.doc_root, PathBuf::from("resources"));
    assert_eq!(cfg.max_connections, 65535);
    assert_eq!(cfg.max_events, 10000);
    assert_eq!(cfg.worker_threads, 8);
    assert_eq!(cfg.max_requests, 10000);
    assert_eq!(cfg.tick_interval(), Duration::from_secs(5));
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_config_idle_timeout_is_three_ticks() {
    let cfg = Config {
        tick_interval_ms: 250,
        ..Config::default()
    };
    assert_eq!(cfg.idle_timeout(), Duration::from_millis(750));
}

#[test]
fn test_config_partial_yaml() {
    let cfg = Config::from_yaml_str("doc_root: /srv/www\nworker_threads: 2\n").unwrap();

    assert_eq!(cfg.doc_root, PathBuf::from("/srv/www"));
    assert_eq!(cfg.worker_threads, 2);
    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.max_requests, 10000);
}

#[test]
fn test_config_invalid_yaml() {
    let err = Config::from_yaml_str("worker_threads: [oops").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));

    let err = Config::from_yaml_str("port: not-a-number").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_config_rejects_zero_values() {
    for yaml in [
        "worker_threads: 0",
        "max_requests: 0",
        "max_connections: 0",
        "max_events: 0",
        "tick_interval_ms: 0",
    ] {
        let err = Config::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{yaml}");
    }
}

#[test]
fn test_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lantern.yaml");
    std::fs::write(&path, "port: 9000\ntick_interval_ms: 100\n").unwrap();

    let cfg = Config::from_file(&path).unwrap();
    assert_eq!(cfg.port, 9000);
    assert_eq!(cfg.tick_interval(), Duration::from_millis(100));
}

#[test]
fn test_config_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::from_file(&dir.path().join("missing.yaml")).unwrap_err();

    assert!(matches!(err, ConfigError::Read { .. }));
    assert!(err.to_string().contains("missing.yaml"));
}

#[test]
fn test_config_load_from_env() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lantern.yaml");
    std::fs::write(&path, "worker_threads: 3\ndoc_root: /from/file\n").unwrap();

    unsafe {
        std::env::set_var("LANTERN_CONFIG", &path);
        std::env::set_var("LANTERN_DOC_ROOT", "/from/env");
    }
    let cfg = Config::load();
    unsafe {
        std::env::remove_var("LANTERN_CONFIG");
        std::env::remove_var("LANTERN_DOC_ROOT");
    }

    let cfg = cfg.unwrap();
    assert_eq!(cfg.worker_threads, 3);
    assert_eq!(cfg.doc_root, PathBuf::from("/from/env"));
}
