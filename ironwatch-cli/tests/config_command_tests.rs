//! Integration tests for `ironwatch config` command.
//!
//! Tests config validation and display functionality with real TOML files.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use ironwatch_cli::commands::config::{build_config_report, validate};
use ironwatch_core::config::IronwatchConfig;

#[tokio::test]
async fn test_config_validate_valid_toml() {
    // Given: A valid config file
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("ironwatch.toml");

    let valid_config = r#"
[general]
log_level = "info"
log_format = "json"

[listener]
port = 5514

[detection]
poll_interval_secs = 10
"#;
    fs::write(&config_path, valid_config).expect("should write config");

    // When: Validating the config
    let report = validate(&config_path).await;

    // Then: Should succeed
    assert!(report.valid, "valid config should pass: {:?}", report.errors);
    assert!(report.errors.is_empty());
}

#[tokio::test]
async fn test_config_validate_malformed_toml() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("bad.toml");
    fs::write(&config_path, "[general\nlog_level = \"info\"\n").expect("should write bad config");

    let report = validate(&config_path).await;

    assert!(!report.valid, "malformed TOML should fail");
    assert_eq!(report.errors.len(), 1);
}

#[tokio::test]
async fn test_config_validate_missing_file() {
    let report = validate(Path::new("/nonexistent/ironwatch.toml")).await;
    assert!(!report.valid, "missing file should fail");
}

#[tokio::test]
async fn test_config_validate_empty_file_uses_defaults() {
    // Given: An empty config file
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("empty.toml");
    fs::write(&config_path, "").expect("should write empty file");

    // When: Validating
    let report = validate(&config_path).await;

    // Then: Every section falls back to defaults
    assert!(report.valid, "empty config should use defaults");
}

#[tokio::test]
async fn test_config_validate_poll_interval_out_of_range() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("ironwatch.toml");
    fs::write(&config_path, "[detection]\npoll_interval_secs = 0\n").expect("should write");

    let report = validate(&config_path).await;

    assert!(!report.valid);
    assert!(
        report.errors[0].contains("poll_interval_secs"),
        "error should name the field: {}",
        report.errors[0]
    );
}

#[tokio::test]
async fn test_config_validate_tick_longer_than_batch_timeout() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("ironwatch.toml");
    fs::write(
        &config_path,
        "[batch]\nbatch_timeout_ms = 100\ntick_ms = 500\n",
    )
    .expect("should write");

    let report = validate(&config_path).await;
    assert!(!report.valid);
}

#[tokio::test]
async fn test_config_validate_unknown_log_format() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("ironwatch.toml");
    fs::write(&config_path, "[general]\nlog_format = \"xml\"\n").expect("should write");

    let report = validate(&config_path).await;
    assert!(!report.valid);
}

#[tokio::test]
async fn test_config_show_reflects_file_values() {
    // Given: A config overriding a few values
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("ironwatch.toml");
    fs::write(
        &config_path,
        "[batch]\nbatch_size = 250\n\n[extraction]\nenabled = false\n",
    )
    .expect("should write");
    let config = IronwatchConfig::from_file(&config_path)
        .await
        .expect("config should load");

    // When: Showing the batch section
    let report = build_config_report(&config_path, &config, Some("batch")).unwrap();

    // Then: File values appear, defaults fill the rest
    assert_eq!(report.config["batch_size"], 250);
    assert!(report.config["batch_timeout_ms"].is_number());
    assert!(report.config_toml.contains("batch_size = 250"));

    let full = build_config_report(&config_path, &config, None).unwrap();
    assert_eq!(full.config["extraction"]["enabled"], false);
}
