//! ironwatch.toml 통합 설정 테스트
//!
//! - ironwatch.toml.example 파싱 테스트
//! - 부분 설정 로딩 테스트
//! - 환경변수 우선순위 테스트

use ironwatch_core::config::IronwatchConfig;
use ironwatch_core::error::{ConfigError, IronwatchError};

// =============================================================================
// ironwatch.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_and_validates() {
    let content = include_str!("../../../ironwatch.toml.example");
    let config = IronwatchConfig::parse(content).expect("example config should parse");
    config
        .validate()
        .expect("example config should pass validation");

    assert_eq!(config.general.data_dir, "/var/lib/ironwatch");
    assert_eq!(config.general.pid_file, "/var/run/ironwatch/ironwatch.pid");
    assert_eq!(config.detection.rule_dir, "/etc/ironwatch/rules");
}

#[test]
fn example_config_matches_code_defaults() {
    let content = include_str!("../../../ironwatch.toml.example");
    let example = IronwatchConfig::parse(content).expect("should parse");
    let defaults = IronwatchConfig::default();

    assert_eq!(example.listener.port, defaults.listener.port);
    assert_eq!(example.listener.queue_capacity, defaults.listener.queue_capacity);
    assert_eq!(example.listener.backpressure, defaults.listener.backpressure);
    assert_eq!(example.batch.batch_size, defaults.batch.batch_size);
    assert_eq!(example.batch.batch_timeout_ms, defaults.batch.batch_timeout_ms);
    assert_eq!(example.storage.path, defaults.storage.path);
    assert_eq!(
        example.detection.poll_interval_secs,
        defaults.detection.poll_interval_secs
    );
    assert_eq!(
        example.extraction.poll_interval_secs,
        defaults.extraction.poll_interval_secs
    );
    assert_eq!(example.metrics.port, defaults.metrics.port);
}

// =============================================================================
// 부분 설정 테스트
// =============================================================================

#[test]
fn partial_config_listener_only() {
    let toml = r#"
[listener]
bind = "127.0.0.1"
port = 5514
"#;
    let config = IronwatchConfig::parse(toml).expect("should parse");
    assert_eq!(config.listener.socket_addr(), "127.0.0.1:5514");
    assert_eq!(config.batch.batch_size, 100);
    assert!(config.detection.enabled);
}

#[test]
fn partial_config_two_sections() {
    let toml = r#"
[batch]
batch_size = 10
batch_timeout_ms = 1000
tick_ms = 100

[extraction]
enabled = false
"#;
    let config = IronwatchConfig::parse(toml).expect("should parse");
    config.validate().expect("should validate");
    assert_eq!(config.batch.batch_size, 10);
    assert!(!config.extraction.enabled);
    assert_eq!(config.extraction.batch_size, 50);
}

#[test]
fn wrong_type_is_parse_error() {
    let toml = r#"
[listener]
port = "five thousand"
"#;
    let err = IronwatchConfig::parse(toml).unwrap_err();
    assert!(matches!(
        err,
        IronwatchError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[tokio::test]
async fn load_from_file_applies_validation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ironwatch.toml");
    tokio::fs::write(&path, "[batch]\nbatch_size = 0\n")
        .await
        .expect("write config");

    let err = IronwatchConfig::load(&path).await.unwrap_err();
    assert!(err.to_string().contains("batch.batch_size"));
}

// =============================================================================
// 환경변수 우선순위 테스트
// =============================================================================

fn with_env<T>(key: &str, value: &str, f: impl FnOnce() -> T) -> T {
    let original = std::env::var(key).ok();
    // SAFETY: serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var(key, value);
    }
    let result = f();
    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var(key, val),
            None => std::env::remove_var(key),
        }
    }
    result
}

#[test]
#[serial_test::serial]
fn env_override_takes_precedence_over_toml() {
    let toml = r#"
[listener]
port = 5140
"#;
    let port = with_env("IRONWATCH_LISTENER_PORT", "6514", || {
        let mut config = IronwatchConfig::parse(toml).expect("should parse");
        config.apply_env_overrides();
        config.listener.port
    });
    assert_eq!(port, 6514);
}

#[test]
#[serial_test::serial]
fn env_override_numeric_and_bool_fields() {
    let (interval, enabled) = with_env("IRONWATCH_DETECTION_POLL_INTERVAL_SECS", "30", || {
        with_env("IRONWATCH_EXTRACTION_ENABLED", "false", || {
            let mut config = IronwatchConfig::default();
            config.apply_env_overrides();
            (config.detection.poll_interval_secs, config.extraction.enabled)
        })
    });
    assert_eq!(interval, 30);
    assert!(!enabled);
}

#[test]
#[serial_test::serial]
fn env_override_invalid_value_is_ignored() {
    let size = with_env("IRONWATCH_BATCH_BATCH_SIZE", "lots", || {
        let mut config = IronwatchConfig::default();
        config.apply_env_overrides();
        config.batch.batch_size
    });
    assert_eq!(size, 100);
}
