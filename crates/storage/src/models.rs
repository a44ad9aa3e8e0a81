//! 저장소 레코드와 조회 필터

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use ironwatch_core::types::{LogDetail, LogKind, Severity};

/// 기본 페이지 크기
pub const DEFAULT_PAGE_SIZE: usize = 100;
/// 페이지 크기 상한
pub const MAX_PAGE_SIZE: usize = 10_000;

/// 처리 커서 종류
///
/// 탐지 엔진과 필드 추출 워커는 서로 다른 플래그를 사용하므로
/// 같은 커서를 두고 경합하지 않습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingFlag {
    /// 탐지 엔진 평가 완료
    Processed,
    /// 상세 필드 추출 완료
    Extracted,
}

impl ProcessingFlag {
    pub(crate) fn column(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Extracted => "extracted",
        }
    }
}

/// 저장된 로그 엔트리
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub id: i64,
    pub host_id: i64,
    pub hostname: String,
    pub kind: LogKind,
    pub source_ip: String,
    pub event_time: SystemTime,
    pub received_at: SystemTime,
    pub raw: String,
    pub fields: Vec<(String, String)>,
    pub detail: Option<LogDetail>,
    pub processed: bool,
    pub extracted: bool,
}

impl StoredEntry {
    /// 파서 필드에서 값을 조회합니다.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// 호스트 목록 항목 (통계 포함)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSummary {
    pub id: i64,
    pub hostname: String,
    pub ip_address: String,
    pub kind: LogKind,
    pub first_seen: SystemTime,
    pub last_seen: SystemTime,
    pub log_count: u64,
    pub alert_count: u64,
    pub unresolved_alerts: u64,
}

/// 새 알림
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub log_entry_id: i64,
    pub host_id: i64,
    pub rule_id: i64,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub metadata: serde_json::Value,
}

/// 저장된 알림
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: i64,
    pub log_entry_id: i64,
    pub host_id: i64,
    pub hostname: Option<String>,
    /// 룰이 삭제되면 None
    pub rule_id: Option<i64>,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub metadata: serde_json::Value,
    pub resolved: bool,
    pub created_at: SystemTime,
}

/// 알림 조회 필터
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertFilter {
    pub severity: Option<Severity>,
    pub resolved: Option<bool>,
    pub host_id: Option<i64>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for AlertFilter {
    fn default() -> Self {
        Self {
            severity: None,
            resolved: None,
            host_id: None,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

/// 로그 조회 필터 (시간 범위는 수신 시각 기준, 양 끝 포함)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub kind: Option<LogKind>,
    pub host_id: Option<i64>,
    pub since: Option<SystemTime>,
    pub until: Option<SystemTime>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for LogFilter {
    fn default() -> Self {
        Self {
            kind: None,
            host_id: None,
            since: None,
            until: None,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

/// 룰 등록/갱신 입력
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRule {
    pub name: String,
    pub description: String,
    /// None = 모든 종류
    pub source_kind: Option<LogKind>,
    pub severity: Severity,
    pub enabled: bool,
    /// JSON 텍스트
    pub matcher_spec: String,
}

/// 저장된 룰
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRecord {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub source_kind: Option<LogKind>,
    pub severity: Severity,
    pub enabled: bool,
    pub matcher_spec: String,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

/// 전체 건수 요약
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountSummary {
    pub hosts: u64,
    pub entries: u64,
    pub alerts: u64,
    pub unresolved_alerts: u64,
    pub rules: u64,
    pub unprocessed: u64,
    pub unextracted: u64,
}

/// `SystemTime`을 Unix epoch 밀리초로 변환합니다. epoch 이전은 0.
pub fn to_millis(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Unix epoch 밀리초를 `SystemTime`으로 변환합니다. 음수는 epoch.
pub fn from_millis(millis: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(u64::try_from(millis).unwrap_or(0))
}

pub(crate) fn kind_from_column(value: &str) -> LogKind {
    LogKind::from_str_loose(value).unwrap_or(LogKind::Unknown)
}

pub(crate) fn severity_from_column(value: &str) -> Severity {
    Severity::from_str_loose(value).unwrap_or_default()
}

pub(crate) fn clamp_limit(limit: usize) -> i64 {
    let limit = if limit == 0 { DEFAULT_PAGE_SIZE } else { limit };
    i64::try_from(limit.min(MAX_PAGE_SIZE)).unwrap_or(i64::MAX)
}
