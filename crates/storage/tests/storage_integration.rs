//! 파일 기반 저장소 통합 테스트
//!
//! - 재오픈 후 데이터 유지
//! - 여러 스레드에서의 단일 writer 직렬화
//! - 대량 배치 라운드트립

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use ironwatch_core::types::{LogEntry, LogKind, Severity};
use ironwatch_storage::{AlertFilter, NewAlert, NewRule, ProcessingFlag, Storage};

fn linux_entry(hostname: &str, ip: &str, raw: &str) -> LogEntry {
    let now = SystemTime::now();
    LogEntry {
        kind: LogKind::Linux,
        hostname: hostname.to_owned(),
        source_ip: ip.parse::<IpAddr>().expect("valid ip"),
        event_time: now,
        received_at: now,
        raw: raw.to_owned(),
        fields: vec![("app_name".to_owned(), "sshd".to_owned())],
        detail: None,
    }
}

/// 재오픈 후에도 엔트리, 룰, 알림, 처리 플래그가 유지되어야 한다
#[test]
fn data_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ironwatch.db");

    {
        let storage = Storage::open(&path, Duration::from_secs(1)).expect("open");
        storage
            .insert_entries(&[
                linux_entry("db-01", "10.1.0.5", "first"),
                linux_entry("db-01", "10.1.0.5", "second"),
            ])
            .expect("insert");
        let rule_id = storage
            .upsert_rule(&NewRule {
                name: "any-sshd".to_owned(),
                description: String::new(),
                source_kind: None,
                severity: Severity::High,
                enabled: true,
                matcher_spec: r#"{"conditions":[{"type":"field_equals","field":"app_name","value":"sshd"}]}"#.to_owned(),
            })
            .expect("rule");
        let pending = storage
            .fetch_unprocessed(ProcessingFlag::Processed, None, 10)
            .expect("fetch");
        storage
            .create_alert(&NewAlert {
                log_entry_id: pending[0].id,
                host_id: pending[0].host_id,
                rule_id,
                severity: Severity::High,
                title: "any-sshd".to_owned(),
                description: "any-sshd matched on db-01".to_owned(),
                metadata: serde_json::json!({}),
            })
            .expect("alert");
        storage.mark_processed(&[pending[0].id]).expect("mark");
    }

    let storage = Storage::open(&path, Duration::from_secs(1)).expect("reopen");
    let summary = storage.count_summary().expect("summary");
    assert_eq!(summary.hosts, 1);
    assert_eq!(summary.entries, 2);
    assert_eq!(summary.alerts, 1);
    assert_eq!(summary.rules, 1);
    assert_eq!(summary.unprocessed, 1);
    assert_eq!(summary.unextracted, 2);

    let remaining = storage
        .fetch_unprocessed(ProcessingFlag::Processed, None, 10)
        .expect("fetch");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].raw, "second");
}

/// 여러 스레드가 동시에 써도 모든 배치가 커밋되어야 한다
#[test]
fn concurrent_writers_serialize_through_one_connection() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = Arc::new(
        Storage::open(dir.path().join("ironwatch.db"), Duration::from_secs(5)).expect("open"),
    );

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let storage = Arc::clone(&storage);
            std::thread::spawn(move || {
                for i in 0..25 {
                    let host = format!("host-{t}");
                    storage
                        .insert_entries(&[linux_entry(&host, "10.0.0.1", &format!("{t}-{i}"))])
                        .expect("insert");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("writer thread");
    }

    let summary = storage.count_summary().expect("summary");
    assert_eq!(summary.entries, 100);
    assert_eq!(summary.hosts, 4);
}

/// 같은 호스트 스트림 안에서는 커밋 순서가 수신 순서를 따라야 한다
#[test]
fn batch_preserves_receipt_order_within_host() {
    let storage = Storage::open_in_memory().expect("open");
    let batch: Vec<_> = (0..200)
        .map(|i| linux_entry("web-01", "10.0.0.8", &format!("line-{i:03}")))
        .collect();
    assert_eq!(storage.insert_entries(&batch).expect("insert"), 200);

    let fetched = storage
        .fetch_unprocessed(ProcessingFlag::Processed, Some(LogKind::Linux), 500)
        .expect("fetch");
    let raws: Vec<_> = fetched.iter().map(|e| e.raw.clone()).collect();
    let expected: Vec<_> = (0..200).map(|i| format!("line-{i:03}")).collect();
    assert_eq!(raws, expected);

    assert!(
        storage
            .query_alerts(&AlertFilter::default())
            .expect("alerts")
            .is_empty()
    );
}
