//! Integration tests for metrics server functionality.
//!
//! Only failure paths are exercised here: a successful install claims the
//! process-global recorder.

use ironwatch_core::config::MetricsConfig;
use ironwatch_daemon::metrics_server;
use serial_test::serial;

fn config(listen_addr: &str, endpoint: &str) -> MetricsConfig {
    MetricsConfig {
        enabled: true,
        listen_addr: listen_addr.to_owned(),
        port: 19100,
        endpoint: endpoint.to_owned(),
    }
}

#[test]
#[serial]
fn test_install_metrics_recorder_fails_with_invalid_address() {
    let result = metrics_server::install_metrics_recorder(&config("999.999.999.999", "/metrics"));

    let err = result.unwrap_err().to_string();
    assert!(err.contains("invalid metrics listen address"), "{err}");
}

#[test]
#[serial]
fn test_install_metrics_recorder_rejects_custom_endpoint() {
    let result = metrics_server::install_metrics_recorder(&config("127.0.0.1", "/prom"));

    let err = result.unwrap_err().to_string();
    assert!(err.contains("unsupported metrics endpoint"), "{err}");
}
