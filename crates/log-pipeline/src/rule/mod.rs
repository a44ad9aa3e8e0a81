//! 탐지 규칙 엔진 -- 규칙 테이블 기반 로그 매칭
//!
//! 규칙은 YAML 파일로 작성되어 규칙 테이블에 들어가고, 엔진은 매 사이클마다
//! 테이블을 다시 읽어 matcher 명세를 컴파일합니다.
//!
//! # 규칙 형식
//! ```yaml
//! name: cron-activity
//! source_kind: linux
//! severity: low
//! matcher:
//!   conditions:
//!     - type: field_contains
//!       value: CRON
//! ```
//!
//! # 아키텍처
//! - [`RuleEngine`]: 규칙 관리, 매칭, threshold 카운터
//! - [`loader`]: YAML 파일 로딩, 규칙 테이블 import
//! - [`matcher`]: 조건 매칭 로직 (equals, contains, regex)
//! - [`types`]: 규칙 데이터 구조 정의

pub mod loader;
pub mod matcher;
pub mod types;

pub use loader::{ImportSummary, RuleFileReport, RuleLoader};
pub use matcher::{FieldView, RuleMatcher};
pub use types::{Condition, MatcherSpec, RuleDefinition, ThresholdSpec};

use std::collections::{HashMap, HashSet};
use std::time::{Duration, SystemTime};

use ironwatch_core::types::{LogKind, Severity};
use ironwatch_storage::{RuleRecord, StoredEntry};

use crate::error::LogPipelineError;

/// threshold 카운터 정리 시 유지하는 기간
const THRESHOLD_RETENTION: Duration = Duration::from_secs(3600);

/// threshold 그룹 필드가 없는 규칙의 그룹 키
const GLOBAL_GROUP: &str = "*";

/// 엔진에 적재된 규칙
#[derive(Debug, Clone)]
pub struct ActiveRule {
    pub id: i64,
    pub name: String,
    pub description: String,
    /// `None`이면 모든 종류
    pub source_kind: Option<LogKind>,
    pub severity: Severity,
    pub spec: MatcherSpec,
}

impl ActiveRule {
    /// 규칙 테이블 행에서 만듭니다. matcher 명세가 잘못되었으면 에러입니다.
    pub fn from_record(record: &RuleRecord) -> Result<Self, LogPipelineError> {
        Ok(Self {
            id: record.id,
            name: record.name.clone(),
            description: record.description.clone(),
            source_kind: record.source_kind,
            severity: record.severity,
            spec: MatcherSpec::from_json(&record.name, &record.matcher_spec)?,
        })
    }

    fn applies_to(&self, kind: LogKind) -> bool {
        self.source_kind.is_none_or(|k| k == kind)
    }
}

/// 규칙 매칭 결과
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub rule_id: i64,
    pub rule_name: String,
    pub description: String,
    pub severity: Severity,
    /// 규칙 조건이 참조한 필드 값
    pub matched_fields: Vec<(String, String)>,
    /// threshold 규칙인 경우 발화 정보
    pub threshold: Option<ThresholdHit>,
}

/// threshold 발화 정보
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdHit {
    pub group_key: String,
    pub count: u64,
    pub window_secs: u64,
}

/// 규칙 재적재 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    pub loaded: usize,
    pub disabled: usize,
    /// 명세 오류로 건너뛴 규칙 수
    pub skipped: usize,
}

/// Threshold 카운터
#[derive(Debug)]
struct ThresholdCounter {
    /// 현재 윈도우의 매칭 수
    count: u64,
    /// 윈도우 시작 시각 (첫 매칭 엔트리의 수신 시각)
    window_start: SystemTime,
    /// 이 윈도우에서 이미 발화했는지
    alerted: bool,
}

/// 규칙 엔진 -- 탐지 규칙 관리 및 매칭 코디네이터
///
/// 모든 활성 규칙을 독립적으로 평가하며, 매칭된 규칙마다 결과를 하나씩 냅니다.
/// threshold 규칙은 (rule_id, group_key)별 내부 카운터로 관리합니다.
///
/// # 사용 예시
/// ```ignore
/// let mut engine = RuleEngine::new();
/// engine.reload(&storage.list_rules()?);
///
/// for entry in storage.fetch_unprocessed(ProcessingFlag::Processed, None, 500)? {
///     for m in engine.evaluate(&entry)? {
///         // 알림 생성
///     }
/// }
/// ```
pub struct RuleEngine {
    /// 활성 규칙 (id 순)
    rules: Vec<ActiveRule>,
    /// 컴파일된 매처
    matcher: RuleMatcher,
    /// threshold 카운터: (rule_id, group_key) -> counter
    threshold_counters: HashMap<(i64, String), ThresholdCounter>,
    /// threshold 카운터 최대 항목 수 (메모리 성장 제한)
    max_threshold_entries: usize,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            matcher: RuleMatcher::new(),
            threshold_counters: HashMap::new(),
            max_threshold_entries: 100_000,
        }
    }

    /// 최대 threshold 항목 수를 설정합니다.
    pub fn with_max_threshold_entries(mut self, max: usize) -> Self {
        self.max_threshold_entries = max.max(1);
        self
    }

    /// 규칙 테이블 전체로 규칙 집합을 교체합니다.
    ///
    /// 비활성 규칙은 버리고, 명세가 잘못된 규칙은 경고 후 건너뜁니다.
    /// 남아 있는 규칙의 threshold 카운터는 유지됩니다.
    pub fn reload(&mut self, records: &[RuleRecord]) -> ReloadSummary {
        let mut summary = ReloadSummary::default();
        self.rules.clear();
        self.matcher.clear();

        for record in records {
            if !record.enabled {
                summary.disabled += 1;
                continue;
            }
            match self.add_rule(record) {
                Ok(()) => summary.loaded += 1,
                Err(e) => {
                    summary.skipped += 1;
                    tracing::warn!(
                        rule_id = record.id,
                        rule = %record.name,
                        error = %e,
                        "skipping rule with malformed matcher spec"
                    );
                }
            }
        }

        let live: HashSet<i64> = self.rules.iter().map(|r| r.id).collect();
        self.threshold_counters.retain(|(id, _), _| live.contains(id));
        summary
    }

    /// 단일 규칙을 추가합니다.
    pub fn add_rule(&mut self, record: &RuleRecord) -> Result<(), LogPipelineError> {
        let rule = ActiveRule::from_record(record)?;
        self.matcher.compile_rule(rule.id, &rule.name, &rule.spec)?;
        self.rules.retain(|r| r.id != rule.id);
        self.rules.push(rule);
        self.rules.sort_by_key(|r| r.id);
        Ok(())
    }

    /// 규칙을 제거합니다.
    pub fn remove_rule(&mut self, rule_id: i64) -> Option<ActiveRule> {
        self.matcher.remove_rule(rule_id);
        self.threshold_counters.retain(|(id, _), _| *id != rule_id);
        let idx = self.rules.iter().position(|r| r.id == rule_id)?;
        Some(self.rules.remove(idx))
    }

    /// 현재 로드된 규칙 수
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// 현재 threshold 카운터 수
    pub fn threshold_key_count(&self) -> usize {
        self.threshold_counters.len()
    }

    /// 엔트리에 대해 모든 활성 규칙을 평가합니다.
    ///
    /// 매칭된 규칙 목록을 반환합니다 (모든 매칭이 독립적으로 발화).
    /// threshold 규칙은 카운트가 임계값에 도달하는 순간에만 결과에 포함됩니다.
    /// 평가 중 오류가 난 규칙은 경고 후 건너뛰고 나머지 규칙은 계속 평가합니다.
    pub fn evaluate(&mut self, entry: &StoredEntry) -> Result<Vec<RuleMatch>, LogPipelineError> {
        let view = FieldView::new(entry);
        let mut matches = Vec::new();

        for rule in &self.rules {
            if !rule.applies_to(entry.kind) {
                continue;
            }
            match self.matcher.matches(rule.id, &rule.spec, &view) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    tracing::warn!(
                        rule_id = rule.id,
                        rule = %rule.name,
                        entry_id = entry.id,
                        error = %e,
                        "rule evaluation failed, skipping rule"
                    );
                    continue;
                }
            }

            let threshold = match rule.spec.threshold() {
                None => None,
                Some(spec) => {
                    // 그룹 필드가 없는 엔트리는 카운팅하지 않습니다
                    let Some(group_key) = Self::group_key(&view, spec.group_by) else {
                        continue;
                    };
                    let hit = Self::count_match(
                        &mut self.threshold_counters,
                        rule.id,
                        group_key,
                        entry.received_at,
                        spec,
                    );
                    match hit {
                        Some(hit) => Some(hit),
                        None => continue,
                    }
                }
            };

            matches.push(RuleMatch {
                rule_id: rule.id,
                rule_name: rule.name.clone(),
                description: rule.description.clone(),
                severity: rule.severity,
                matched_fields: Self::matched_fields(&rule.spec, &view),
                threshold,
            });
        }

        self.enforce_threshold_limits();
        Ok(matches)
    }

    fn group_key(view: &FieldView<'_>, group_by: Option<&str>) -> Option<String> {
        match group_by {
            None => Some(GLOBAL_GROUP.to_owned()),
            Some(field) => view.get(field).map(str::to_owned),
        }
    }

    /// 카운터를 갱신하고, 이번 매칭으로 임계값에 도달했으면 발화 정보를 돌려줍니다.
    fn count_match(
        counters: &mut HashMap<(i64, String), ThresholdCounter>,
        rule_id: i64,
        group_key: String,
        at: SystemTime,
        spec: ThresholdSpec<'_>,
    ) -> Option<ThresholdHit> {
        let window = Duration::from_secs(spec.window_secs);
        let counter = counters
            .entry((rule_id, group_key.clone()))
            .or_insert_with(|| ThresholdCounter {
                count: 0,
                window_start: at,
                alerted: false,
            });

        // 윈도우 만료 체크
        let elapsed = at.duration_since(counter.window_start).unwrap_or_default();
        if elapsed > window {
            counter.count = 0;
            counter.window_start = at;
            counter.alerted = false;
        }

        counter.count += 1;

        if counter.count >= spec.threshold && !counter.alerted {
            counter.alerted = true;
            Some(ThresholdHit {
                group_key,
                count: counter.count,
                window_secs: spec.window_secs,
            })
        } else {
            None
        }
    }

    fn matched_fields(spec: &MatcherSpec, view: &FieldView<'_>) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = Vec::new();
        for name in spec.conditions.iter().filter_map(Condition::field) {
            if out.iter().any(|(k, _)| k == name) {
                continue;
            }
            if let Some(value) = view.get(name) {
                out.push((name.to_owned(), value.to_owned()));
            }
        }
        out
    }

    /// threshold 카운터의 메모리 성장을 제한합니다.
    fn enforce_threshold_limits(&mut self) {
        if self.threshold_counters.len() <= self.max_threshold_entries {
            return;
        }

        let now = SystemTime::now();
        self.threshold_counters.retain(|_, counter| {
            now.duration_since(counter.window_start).unwrap_or_default() < THRESHOLD_RETENTION
        });

        if self.threshold_counters.len() > self.max_threshold_entries {
            tracing::warn!(
                count = self.threshold_counters.len(),
                max = self.max_threshold_entries,
                "threshold counter limit exceeded after cleanup, clearing all"
            );
            self.threshold_counters.clear();
        }
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}
