//! Orchestrator integration tests.
//!
//! Tests the full flow: config -> storage and rule import -> module start
//! -> status snapshot -> shutdown.

use std::path::Path;
use std::time::Duration;

use ironwatch_core::config::IronwatchConfig;
use ironwatch_core::status::DaemonStatus;
use ironwatch_daemon::orchestrator::Orchestrator;
use ironwatch_storage::AlertFilter;
use tempfile::TempDir;
use tokio::net::UdpSocket;

const CRON_LINE: &str =
    "<86>Dec  6 04:17:01 Hp-lap704 CRON[1234]: pam_unix(cron:session): session opened for user root";

const CRON_RULE: &str = r#"
name: cron-activity
source_kind: linux
severity: low
matcher:
  conditions:
    - type: field_contains
      value: CRON
"#;

/// Build a config rooted at `dir`. The listener is disabled unless a port is given.
fn test_config(dir: &Path, listener_port: Option<u16>, rule_dir: Option<&Path>) -> IronwatchConfig {
    let (enabled, port) = match listener_port {
        Some(port) => (true, port),
        None => (false, 5140),
    };
    let rule_dir = rule_dir.map(|p| p.display().to_string()).unwrap_or_default();
    let toml_str = format!(
        r#"
[general]
log_level = "info"
data_dir = "{data_dir}"
pid_file = ""

[listener]
enabled = {enabled}
bind = "127.0.0.1"
port = {port}

[batch]
batch_timeout_ms = 50
tick_ms = 10

[detection]
poll_interval_secs = 1
rule_dir = "{rule_dir}"

[extraction]
poll_interval_secs = 1
"#,
        data_dir = dir.display(),
    );
    IronwatchConfig::parse(&toml_str).expect("failed to parse test config")
}

fn write_rule_dir(dir: &Path) -> std::path::PathBuf {
    let rule_dir = dir.join("rules");
    std::fs::create_dir_all(&rule_dir).unwrap();
    std::fs::write(rule_dir.join("cron.yml"), CRON_RULE).unwrap();
    std::fs::write(rule_dir.join("broken.yml"), "name: [unterminated").unwrap();
    rule_dir
}

/// Reserve an ephemeral UDP port for the listener.
fn free_udp_port() -> u16 {
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.local_addr().unwrap().port()
}

#[tokio::test]
async fn test_build_registers_enabled_modules_in_start_order() {
    let dir = TempDir::new().unwrap();
    let orchestrator = Orchestrator::build_from_config(test_config(dir.path(), None, None))
        .await
        .unwrap();

    assert_eq!(orchestrator.module_names(), vec!["extraction", "detection"]);
    assert!(dir.path().join("ironwatch.db").exists());
}

#[tokio::test]
async fn test_build_rejects_invalid_config() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), None, None);
    config.detection.poll_interval_secs = 0;

    let result = Orchestrator::build_from_config(config).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_build_from_missing_config_file_fails() {
    let dir = TempDir::new().unwrap();
    let result = Orchestrator::build(&dir.path().join("absent.toml")).await;
    let err = result.err().expect("missing config should fail").to_string();
    assert!(err.contains("failed to load config"), "{err}");
}

#[tokio::test]
async fn test_startup_imports_rule_directory() {
    let dir = TempDir::new().unwrap();
    let rule_dir = write_rule_dir(dir.path());

    let orchestrator =
        Orchestrator::build_from_config(test_config(dir.path(), None, Some(&rule_dir)))
            .await
            .unwrap();

    let rules = orchestrator.storage().list_rules().unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].name, "cron-activity");
}

#[tokio::test]
async fn test_start_and_stop_single_module() {
    let dir = TempDir::new().unwrap();
    let mut orchestrator = Orchestrator::build_from_config(test_config(dir.path(), None, None))
        .await
        .unwrap();

    orchestrator.start_module("detection").await.unwrap();
    let status = orchestrator.status().await;
    assert!(status.module("detection").unwrap().running);
    assert!(!status.module("extraction").unwrap().running);
    assert!(status.health.is_unhealthy(), "stopped extraction is unhealthy");

    orchestrator.stop_module("detection").await.unwrap();
    let status = orchestrator.status().await;
    assert!(!status.module("detection").unwrap().running);

    assert!(orchestrator.start_module("ingestion").await.is_err(), "listener disabled");
    assert!(orchestrator.stop_module("detection").await.is_err(), "already stopped");
}

#[tokio::test]
async fn test_health_all_running() {
    let dir = TempDir::new().unwrap();
    let mut orchestrator = Orchestrator::build_from_config(test_config(dir.path(), None, None))
        .await
        .unwrap();

    orchestrator.start_module("extraction").await.unwrap();
    orchestrator.start_module("detection").await.unwrap();
    let health = orchestrator.health().await;
    assert!(health.status.is_healthy(), "{:?}", health.status);
    assert_eq!(health.modules.len(), 2);

    orchestrator.shutdown().await.unwrap();
    assert!(orchestrator.cancel_token().is_cancelled());
}

#[tokio::test]
async fn test_run_until_cancelled_writes_status_snapshot() {
    let dir = TempDir::new().unwrap();
    let pid_path = dir.path().join("run").join("ironwatch.pid");
    let mut config = test_config(dir.path(), None, None);
    config.general.pid_file = pid_path.display().to_string();

    let mut orchestrator = Orchestrator::build_from_config(config)
        .await
        .unwrap()
        .with_status_interval(Duration::from_millis(50));
    let status_path = orchestrator.config().status_path();

    let token = orchestrator.cancel_token();
    let watched_pid = pid_path.clone();
    let watched_status = status_path.clone();
    tokio::spawn(async move {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !(watched_pid.exists() && watched_status.exists()) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .ok();
        token.cancel();
    });

    orchestrator.run().await.unwrap();

    assert!(!pid_path.exists(), "PID file removed on shutdown");
    let status = DaemonStatus::read(&status_path).await.unwrap();
    assert_eq!(status.pid, std::process::id());
    assert_eq!(status.modules.len(), 2);
    assert!(status.modules.iter().all(|m| !m.running), "final snapshot after stop");
}

#[tokio::test]
async fn test_datagram_to_alert_through_daemon() {
    let dir = TempDir::new().unwrap();
    let rule_dir = write_rule_dir(dir.path());
    let port = free_udp_port();

    let mut orchestrator =
        Orchestrator::build_from_config(test_config(dir.path(), Some(port), Some(&rule_dir)))
            .await
            .unwrap()
            .with_status_interval(Duration::from_millis(100));
    assert_eq!(
        orchestrator.module_names(),
        vec!["ingestion", "extraction", "detection"]
    );

    let storage = orchestrator.storage().clone();
    let token = orchestrator.cancel_token();
    let driver = tokio::spawn(async move {
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let delivered = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                // 리스너가 아직 바인드되지 않았을 수 있으므로 알림이 생길 때까지 반복 전송
                if storage.count_summary().unwrap().entries == 0 {
                    let _ = client.send_to(CRON_LINE.as_bytes(), ("127.0.0.1", port)).await;
                }
                if storage.count_summary().unwrap().alerts > 0 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await;
        token.cancel();
        delivered.is_ok()
    });

    orchestrator.run().await.unwrap();
    assert!(driver.await.unwrap(), "alert was not created in time");

    let alerts = orchestrator
        .storage()
        .query_alerts(&AlertFilter::default())
        .unwrap();
    assert!(!alerts.is_empty());
    assert_eq!(alerts[0].title, "cron-activity");
    assert_eq!(alerts[0].hostname.as_deref(), Some("Hp-lap704"));

    let status = DaemonStatus::read(orchestrator.config().status_path())
        .await
        .unwrap();
    let ingestion = status.module("ingestion").unwrap();
    assert!(!ingestion.running);
    assert!(ingestion.counter("saved").unwrap_or(0) >= 1);
}
