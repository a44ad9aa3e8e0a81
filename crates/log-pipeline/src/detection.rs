//! 탐지 엔진 -- 미처리 엔트리를 폴링하여 규칙을 평가하고 알림을 생성합니다.
//!
//! 한 사이클의 흐름:
//! 1. 규칙 테이블을 다시 읽어 엔진을 갱신 (활성화/비활성화가 다음 사이클부터 반영)
//! 2. `processed = 0` 엔트리를 오래된 순으로 최대 `max_per_cycle`개 조회
//! 3. 아직 추출되지 않은 엔트리는 상세 필드를 먼저 추출 (`ssh_action` 같은 상세 필드
//!    조건이 추출 워커의 실행 순서와 무관하게 동작)
//! 4. 엔트리마다 모든 규칙 평가, 매칭마다 알림 하나
//! 5. 평가한 엔트리를 모두 처리 완료로 표시
//!
//! 상세 기록에 실패한 엔트리는 이번 사이클에서 평가하지 않고 다음 사이클로 미룹니다.
//!
//! 알림 저장 실패는 해당 알림만 건너뛰고 사이클은 계속됩니다.
//! 표시 단계가 실패하면 같은 엔트리가 다음 사이클에 다시 평가되며,
//! `(엔트리, 규칙)` 유일 제약으로 알림은 중복 생성되지 않습니다.

use std::sync::Arc;

use serde_json::json;

use ironwatch_core::config::DetectionConfig;
use ironwatch_core::metrics as m;
use ironwatch_storage::{NewAlert, ProcessingFlag, Storage, StoredEntry};

use crate::error::LogPipelineError;
use crate::extract::FieldExtractor;
use crate::extraction::backfill_entries;
use crate::rule::{RuleEngine, RuleMatch};
use crate::stats::{DetectionStats, ExtractionStats};
use crate::worker::PollCycle;

/// 알림 메타데이터에 넣는 원문 최대 길이 (문자)
const RAW_EXCERPT_CHARS: usize = 500;

/// 탐지 엔진
pub struct DetectionEngine {
    storage: Storage,
    engine: RuleEngine,
    extractor: Arc<FieldExtractor>,
    max_per_cycle: usize,
    stats: Arc<DetectionStats>,
    extraction_stats: Arc<ExtractionStats>,
}

/// 사이클 하나의 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub evaluated: usize,
    /// 평가 전에 이 사이클에서 직접 추출한 엔트리 수
    pub extracted: usize,
    /// 상세 기록 실패로 다음 사이클로 미룬 엔트리 수
    pub deferred: usize,
    pub alerts_created: usize,
    pub duplicates: usize,
    pub alert_errors: usize,
}

impl DetectionEngine {
    pub fn new(storage: Storage, config: &DetectionConfig) -> Self {
        Self {
            storage,
            engine: RuleEngine::new().with_max_threshold_entries(config.max_threshold_keys),
            extractor: Arc::new(FieldExtractor::new()),
            max_per_cycle: config.max_per_cycle.max(1),
            stats: Arc::new(DetectionStats::default()),
            extraction_stats: Arc::new(ExtractionStats::default()),
        }
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    /// 한 사이클을 실행합니다.
    ///
    /// # Errors
    /// - 규칙/엔트리 조회 실패
    /// - 처리 완료 표시 실패 (엔트리는 다음 사이클에 다시 평가됨)
    pub async fn evaluate_pending(&mut self) -> Result<CycleReport, LogPipelineError> {
        self.stats.record_cycle();

        let storage = self.storage.clone();
        let extractor = Arc::clone(&self.extractor);
        let extraction_stats = Arc::clone(&self.extraction_stats);
        let limit = self.max_per_cycle;
        let (rules, entries, extracted, deferred) = tokio::task::spawn_blocking(move || {
            let rules = storage.list_rules()?;
            let mut entries = storage.fetch_unprocessed(ProcessingFlag::Processed, None, limit)?;
            let done = backfill_entries(&storage, &extractor, &extraction_stats, &mut entries);
            let extracted = storage.mark_extracted(&done)?;

            let fetched = entries.len();
            entries.retain(|e| e.extracted || !e.kind.supports_extraction());
            let deferred = fetched - entries.len();
            Ok::<_, LogPipelineError>((rules, entries, extracted, deferred))
        })
        .await?
        .inspect_err(|_| self.record_error())?;

        if extracted > 0 {
            self.stats.record_extracted(extracted);
        }
        if deferred > 0 {
            self.record_error();
            tracing::warn!(deferred, "entries without a stored detail record deferred to next cycle");
        }

        let reload = self.engine.reload(&rules);
        if reload.skipped > 0 {
            tracing::warn!(skipped = reload.skipped, "some rules were not loaded");
        }
        if entries.is_empty() {
            return Ok(CycleReport {
                extracted,
                deferred,
                ..CycleReport::default()
            });
        }

        let mut alerts = Vec::new();
        for entry in &entries {
            match self.engine.evaluate(entry) {
                Ok(matches) => alerts.extend(matches.iter().map(|hit| build_alert(entry, hit))),
                Err(e) => {
                    self.record_error();
                    tracing::warn!(entry_id = entry.id, error = %e, "rule evaluation failed");
                }
            }
        }

        let ids: Vec<i64> = entries.iter().map(|e| e.id).collect();
        let storage = self.storage.clone();
        let stats = Arc::clone(&self.stats);
        let report = tokio::task::spawn_blocking(move || {
            let mut report = CycleReport {
                evaluated: ids.len(),
                extracted,
                deferred,
                ..CycleReport::default()
            };
            for alert in &alerts {
                match storage.create_alert(alert) {
                    Ok(Some(alert_id)) => {
                        report.alerts_created += 1;
                        stats.record_alert();
                        metrics::counter!(
                            m::ALERTS_CREATED_TOTAL,
                            m::LABEL_SEVERITY => alert.severity.as_str()
                        )
                        .increment(1);
                        tracing::info!(
                            alert_id,
                            entry_id = alert.log_entry_id,
                            rule_id = alert.rule_id,
                            severity = %alert.severity,
                            title = %alert.title,
                            "alert created"
                        );
                    }
                    Ok(None) => {
                        report.duplicates += 1;
                        stats.record_duplicate();
                    }
                    Err(e) => {
                        report.alert_errors += 1;
                        stats.record_error();
                        metrics::counter!(m::DETECTION_ERRORS_TOTAL).increment(1);
                        tracing::warn!(
                            entry_id = alert.log_entry_id,
                            rule_id = alert.rule_id,
                            error = %e,
                            "failed to persist alert"
                        );
                    }
                }
            }
            storage.mark_processed(&ids)?;
            Ok::<_, LogPipelineError>(report)
        })
        .await?
        .inspect_err(|_| self.record_error())?;

        self.stats.record_processed(report.evaluated);
        metrics::counter!(m::DETECTION_ENTRIES_PROCESSED_TOTAL).increment(report.evaluated as u64);
        tracing::debug!(
            evaluated = report.evaluated,
            alerts = report.alerts_created,
            duplicates = report.duplicates,
            "detection cycle finished"
        );
        Ok(report)
    }

    fn record_error(&self) {
        self.stats.record_error();
        metrics::counter!(m::DETECTION_ERRORS_TOTAL).increment(1);
    }
}

impl PollCycle for DetectionEngine {
    type Stats = DetectionStats;

    fn name(&self) -> &'static str {
        "detection"
    }

    async fn run_cycle(&mut self) -> Result<usize, LogPipelineError> {
        self.evaluate_pending().await.map(|r| r.evaluated)
    }

    fn stats(&self) -> Arc<DetectionStats> {
        Arc::clone(&self.stats)
    }
}

fn build_alert(entry: &StoredEntry, hit: &RuleMatch) -> NewAlert {
    let description = if hit.description.trim().is_empty() {
        format!("{} matched on {}", hit.rule_name, entry.hostname)
    } else {
        hit.description.clone()
    };

    let matched: serde_json::Map<String, serde_json::Value> = hit
        .matched_fields
        .iter()
        .map(|(k, v)| (k.clone(), json!(v)))
        .collect();

    let mut metadata = json!({
        "rule_id": hit.rule_id,
        "rule_name": hit.rule_name,
        "kind": entry.kind.as_str(),
        "hostname": entry.hostname,
        "source_ip": entry.source_ip,
        "raw": entry.raw.chars().take(RAW_EXCERPT_CHARS).collect::<String>(),
        "matched_fields": matched,
    });
    if let (Some(threshold), Some(obj)) = (&hit.threshold, metadata.as_object_mut()) {
        obj.insert("group_key".to_owned(), json!(threshold.group_key));
        obj.insert("count".to_owned(), json!(threshold.count));
        obj.insert("window_secs".to_owned(), json!(threshold.window_secs));
    }

    NewAlert {
        log_entry_id: entry.id,
        host_id: entry.host_id,
        rule_id: hit.rule_id,
        severity: hit.severity,
        title: hit.rule_name.clone(),
        description,
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::SystemTime;

    use ironwatch_core::types::{LogEntry, LogKind, Severity};
    use ironwatch_storage::{AlertFilter, NewRule};

    use crate::rule::{Condition, MatcherSpec};

    fn linux_entry(host: &str, raw: &str, app: &str, message: &str) -> LogEntry {
        let now = SystemTime::now();
        LogEntry {
            kind: LogKind::Linux,
            hostname: host.to_owned(),
            source_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)),
            event_time: now,
            received_at: now,
            raw: raw.to_owned(),
            fields: vec![
                ("app_name".to_owned(), app.to_owned()),
                ("message".to_owned(), message.to_owned()),
            ],
            detail: None,
        }
    }

    fn add_rule(storage: &Storage, name: &str, severity: Severity, conditions: Vec<Condition>) -> i64 {
        let spec = MatcherSpec { conditions };
        storage
            .upsert_rule(&NewRule {
                name: name.to_owned(),
                description: String::new(),
                source_kind: Some(LogKind::Linux),
                severity,
                enabled: true,
                matcher_spec: spec.to_json().unwrap(),
            })
            .unwrap()
    }

    fn contains(value: &str) -> Condition {
        Condition::FieldContains {
            field: None,
            value: value.to_owned(),
        }
    }

    fn engine(storage: &Storage) -> DetectionEngine {
        DetectionEngine::new(storage.clone(), &DetectionConfig::default())
    }

    #[tokio::test]
    async fn matching_entry_creates_alert_and_is_marked() {
        let storage = Storage::open_in_memory().unwrap();
        add_rule(&storage, "cron-activity", Severity::Low, vec![contains("CRON")]);
        storage
            .insert_entries(&[linux_entry(
                "Hp-lap704",
                "<86>Dec  6 04:17:01 Hp-lap704 CRON[1234]: pam_unix(cron:session): session opened",
                "CRON",
                "pam_unix(cron:session): session opened",
            )])
            .unwrap();

        let mut engine = engine(&storage);
        let report = engine.evaluate_pending().await.unwrap();
        assert_eq!(report.evaluated, 1);
        assert_eq!(report.alerts_created, 1);

        let alerts = storage.query_alerts(&AlertFilter::default()).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Low);
        assert_eq!(alerts[0].title, "cron-activity");
        assert_eq!(alerts[0].description, "cron-activity matched on Hp-lap704");
        assert_eq!(alerts[0].metadata["hostname"], "Hp-lap704");

        // 다음 사이클에는 평가할 엔트리가 없음
        let again = engine.evaluate_pending().await.unwrap();
        assert_eq!(again, CycleReport::default());
        assert_eq!(engine.stats.alerts_created(), 1);
    }

    #[tokio::test]
    async fn every_matching_rule_fires() {
        let storage = Storage::open_in_memory().unwrap();
        add_rule(&storage, "any-cron", Severity::Low, vec![contains("cron")]);
        add_rule(&storage, "session", Severity::Medium, vec![contains("session opened")]);
        add_rule(&storage, "no-match", Severity::High, vec![contains("kernel panic")]);
        storage
            .insert_entries(&[linux_entry("h1", "CRON session opened", "CRON", "session opened")])
            .unwrap();

        let report = engine(&storage).evaluate_pending().await.unwrap();
        assert_eq!(report.alerts_created, 2);
    }

    #[tokio::test]
    async fn non_matching_entries_are_still_marked() {
        let storage = Storage::open_in_memory().unwrap();
        add_rule(&storage, "cron", Severity::Low, vec![contains("CRON")]);
        storage
            .insert_entries(&[linux_entry("h1", "systemd started", "systemd", "started")])
            .unwrap();

        let report = engine(&storage).evaluate_pending().await.unwrap();
        assert_eq!(report.evaluated, 1);
        assert_eq!(report.alerts_created, 0);
        assert_eq!(storage.count_summary().unwrap().unprocessed, 0);
    }

    #[tokio::test]
    async fn disabled_rule_takes_effect_next_cycle() {
        let storage = Storage::open_in_memory().unwrap();
        let rule_id = add_rule(&storage, "cron", Severity::Low, vec![contains("CRON")]);
        storage.set_rule_enabled(rule_id, false).unwrap();
        storage
            .insert_entries(&[linux_entry("h1", "CRON job", "CRON", "job")])
            .unwrap();

        let mut engine = engine(&storage);
        assert_eq!(engine.evaluate_pending().await.unwrap().alerts_created, 0);

        storage.set_rule_enabled(rule_id, true).unwrap();
        storage
            .insert_entries(&[linux_entry("h1", "CRON job", "CRON", "job")])
            .unwrap();
        assert_eq!(engine.evaluate_pending().await.unwrap().alerts_created, 1);
    }

    #[tokio::test]
    async fn threshold_rule_fires_once_per_group() {
        let storage = Storage::open_in_memory().unwrap();
        add_rule(
            &storage,
            "ssh-brute-force",
            Severity::High,
            vec![
                Condition::FieldContains {
                    field: Some("message".to_owned()),
                    value: "Failed password".to_owned(),
                },
                Condition::CountThresholdOverWindow {
                    threshold: 5,
                    window_secs: 60,
                    group_by: Some("source_ip".to_owned()),
                },
            ],
        );
        let batch: Vec<LogEntry> = (0..6)
            .map(|_| {
                linux_entry(
                    "bastion",
                    "sshd: Failed password for root from 10.0.0.7 port 22 ssh2",
                    "sshd",
                    "Failed password for root from 10.0.0.7 port 22 ssh2",
                )
            })
            .collect();
        storage.insert_entries(&batch).unwrap();

        let report = engine(&storage).evaluate_pending().await.unwrap();
        assert_eq!(report.evaluated, 6);
        assert_eq!(report.alerts_created, 1);

        let alerts = storage.query_alerts(&AlertFilter::default()).unwrap();
        assert_eq!(alerts[0].metadata["count"], 5);
        assert_eq!(alerts[0].metadata["group_key"], "10.0.0.7");
    }

    #[tokio::test]
    async fn detail_field_rule_matches_without_extraction_worker() {
        let storage = Storage::open_in_memory().unwrap();
        add_rule(
            &storage,
            "ssh-failed-root",
            Severity::Medium,
            vec![
                Condition::FieldEquals {
                    field: Some("ssh_action".to_owned()),
                    value: "Failed".to_owned(),
                },
                Condition::FieldEquals {
                    field: Some("ssh_user".to_owned()),
                    value: "root".to_owned(),
                },
            ],
        );
        storage
            .insert_entries(&[linux_entry(
                "bastion",
                "sshd: Failed password for root from 10.0.0.7 port 22 ssh2",
                "sshd",
                "Failed password for root from 10.0.0.7 port 22 ssh2",
            )])
            .unwrap();

        let mut engine = engine(&storage);
        let report = engine.evaluate_pending().await.unwrap();
        assert_eq!(report.extracted, 1);
        assert_eq!(report.deferred, 0);
        assert_eq!(report.alerts_created, 1);

        let summary = storage.count_summary().unwrap();
        assert_eq!(summary.unextracted, 0);
        assert_eq!(summary.unprocessed, 0);
        assert!(engine.stats.snapshot().contains(&("extracted".to_owned(), 1)));
    }

    #[tokio::test]
    async fn malformed_rule_is_skipped() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .upsert_rule(&NewRule {
                name: "broken".to_owned(),
                description: String::new(),
                source_kind: None,
                severity: Severity::High,
                enabled: true,
                matcher_spec: "{not json".to_owned(),
            })
            .unwrap();
        add_rule(&storage, "cron", Severity::Low, vec![contains("CRON")]);
        storage
            .insert_entries(&[linux_entry("h1", "CRON job", "CRON", "job")])
            .unwrap();

        let mut engine = engine(&storage);
        let report = engine.evaluate_pending().await.unwrap();
        assert_eq!(report.alerts_created, 1);
        assert_eq!(engine.engine().rule_count(), 1);
    }

    #[test]
    fn metadata_raw_is_truncated() {
        let now = SystemTime::now();
        let entry = StoredEntry {
            id: 3,
            host_id: 1,
            hostname: "h".to_owned(),
            kind: LogKind::Linux,
            source_ip: "10.0.0.1".to_owned(),
            event_time: now,
            received_at: now,
            raw: "x".repeat(2_000),
            fields: Vec::new(),
            detail: None,
            processed: false,
            extracted: false,
        };
        let hit = RuleMatch {
            rule_id: 1,
            rule_name: "r".to_owned(),
            description: "custom".to_owned(),
            severity: Severity::Critical,
            matched_fields: Vec::new(),
            threshold: None,
        };
        let alert = build_alert(&entry, &hit);
        assert_eq!(alert.description, "custom");
        assert_eq!(
            alert.metadata["raw"].as_str().map(|s| s.len()),
            Some(RAW_EXCERPT_CHARS)
        );
        assert!(alert.metadata.get("group_key").is_none());
    }
}
