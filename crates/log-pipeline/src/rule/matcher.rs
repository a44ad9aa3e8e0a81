//! 규칙 매칭 로직 -- 조건 평가 및 정규식 캐싱
//!
//! [`RuleMatcher`]는 규칙의 조건을 저장된 엔트리에 대해 평가합니다.
//! 정규식 패턴은 규칙 로딩 시 한 번만 컴파일하여 캐싱합니다.
//!
//! 필드 조회 순서 ([`FieldView`]):
//! 1. 내장 필드 `kind`, `hostname`, `source_ip`, `raw`
//! 2. 파서가 만든 구조화 필드
//! 3. 상세 레코드 필드

use std::collections::HashMap;

use regex::Regex;

use ironwatch_storage::StoredEntry;

use super::types::{Condition, MatcherSpec};
use crate::error::LogPipelineError;

/// 엔트리 하나에 대한 필드 조회기
pub struct FieldView<'a> {
    entry: &'a StoredEntry,
    detail_fields: Vec<(String, String)>,
}

impl<'a> FieldView<'a> {
    pub fn new(entry: &'a StoredEntry) -> Self {
        Self {
            entry,
            detail_fields: entry
                .detail
                .as_ref()
                .map(|d| d.fields())
                .unwrap_or_default(),
        }
    }

    /// 필드 값을 조회합니다.
    pub fn get(&self, field: &str) -> Option<&str> {
        match field {
            "kind" => Some(self.entry.kind.as_str()),
            "hostname" => Some(&self.entry.hostname),
            "source_ip" => Some(&self.entry.source_ip),
            "raw" => Some(&self.entry.raw),
            _ => self
                .entry
                .field(field)
                .or_else(|| lookup(&self.detail_fields, field)),
        }
    }

    /// `field`가 없으면 원문을 대상으로 합니다.
    pub fn target(&self, field: Option<&str>) -> Option<&str> {
        match field {
            Some(name) => self.get(name),
            None => Some(&self.entry.raw),
        }
    }

    pub fn entry(&self) -> &StoredEntry {
        self.entry
    }
}

fn lookup<'f>(fields: &'f [(String, String)], name: &str) -> Option<&'f str> {
    fields
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// 규칙 매처 -- 조건 평가 및 정규식 캐싱
///
/// 규칙 로딩 시 정규식을 미리 컴파일하여 매칭 시 재컴파일 오버헤드를 제거합니다.
pub struct RuleMatcher {
    /// 컴파일된 정규식 캐시: (rule_id, condition_index) -> Regex
    regex_cache: HashMap<(i64, usize), Regex>,
}

impl RuleMatcher {
    pub fn new() -> Self {
        Self {
            regex_cache: HashMap::new(),
        }
    }

    /// 규칙의 정규식 조건을 미리 컴파일합니다.
    pub fn compile_rule(
        &mut self,
        rule_id: i64,
        rule_name: &str,
        spec: &MatcherSpec,
    ) -> Result<(), LogPipelineError> {
        let mut compiled = Vec::new();
        for (idx, condition) in spec.conditions.iter().enumerate() {
            if let Condition::FieldRegex { field, pattern } = condition {
                let regex = Regex::new(pattern).map_err(|e| LogPipelineError::RuleSpec {
                    rule: rule_name.to_owned(),
                    reason: format!(
                        "invalid regex in condition[{idx}] for field '{}': {e}",
                        field.as_deref().unwrap_or("raw")
                    ),
                })?;
                compiled.push(((rule_id, idx), regex));
            }
        }
        self.regex_cache.extend(compiled);
        Ok(())
    }

    /// 규칙 제거 시 캐시를 정리합니다.
    pub fn remove_rule(&mut self, rule_id: i64) {
        self.regex_cache.retain(|(id, _), _| *id != rule_id);
    }

    pub fn clear(&mut self) {
        self.regex_cache.clear();
    }

    /// 규칙의 모든 필드 조건이 엔트리에 매칭되는지 평가합니다.
    ///
    /// threshold 조건은 여기서 평가하지 않습니다. 필드가 없으면 매칭 실패입니다.
    pub fn matches(
        &self,
        rule_id: i64,
        spec: &MatcherSpec,
        view: &FieldView<'_>,
    ) -> Result<bool, LogPipelineError> {
        for (idx, condition) in spec.conditions.iter().enumerate() {
            let matched = match condition {
                Condition::FieldEquals { field, value } => view
                    .target(field.as_deref())
                    .is_some_and(|v| v.to_lowercase() == value.to_lowercase()),
                Condition::FieldContains { field, value } => view
                    .target(field.as_deref())
                    .is_some_and(|v| v.to_lowercase().contains(&value.to_lowercase())),
                Condition::FieldRegex { field, .. } => {
                    let regex = self.regex_cache.get(&(rule_id, idx)).ok_or_else(|| {
                        LogPipelineError::RuleSpec {
                            rule: rule_id.to_string(),
                            reason: format!("regex not compiled for condition[{idx}]"),
                        }
                    })?;
                    view.target(field.as_deref())
                        .is_some_and(|v| regex.is_match(v))
                }
                Condition::CountThresholdOverWindow { .. } => true,
            };

            if !matched {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

impl Default for RuleMatcher {
    fn default() -> Self {
        Self::new()
    }
}
