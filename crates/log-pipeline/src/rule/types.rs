//! 탐지 규칙 데이터 타입
//!
//! YAML 규칙 파일에서 역직렬화되는 구조체와, 저장소 규칙 테이블에
//! JSON으로 저장되는 matcher 명세를 정의합니다.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use ironwatch_core::types::{LogKind, Severity};
use ironwatch_storage::NewRule;

use crate::error::LogPipelineError;

/// 규칙 이름 최대 길이
const MAX_RULE_NAME_LEN: usize = 256;

/// 모든 종류에 적용되는 source_kind 값
pub const ANY_SOURCE_KIND: &str = "any";

/// 탐지 규칙 -- 하나의 YAML 규칙 파일에 대응합니다.
///
/// # YAML 스키마
/// ```yaml
/// name: ssh-brute-force
/// description: Repeated failed SSH logins from one address
/// source_kind: linux
/// severity: high
/// enabled: true
/// matcher:
///   conditions:
///     - type: field_contains
///       field: message
///       value: "Failed password"
///     - type: count_threshold_over_window
///       threshold: 5
///       window_secs: 60
///       group_by: source_ip
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    /// 규칙 이름 (규칙 테이블의 고유 키)
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// 적용 대상 종류 (`any` 또는 로그 종류)
    #[serde(default = "default_source_kind")]
    pub source_kind: String,
    #[serde(deserialize_with = "severity_loose")]
    pub severity: Severity,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub matcher: MatcherSpec,
}

fn default_source_kind() -> String {
    ANY_SOURCE_KIND.to_owned()
}

fn default_enabled() -> bool {
    true
}

/// 대소문자를 구분하지 않고 심각도를 읽습니다 (`High`, `high`, `crit` 등).
fn severity_loose<'de, D>(deserializer: D) -> Result<Severity, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Severity::from_str_loose(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("unknown severity '{raw}'")))
}

impl RuleDefinition {
    /// 규칙의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LogPipelineError> {
        if self.name.trim().is_empty() {
            return Err(LogPipelineError::RuleSpec {
                rule: "(empty)".to_owned(),
                reason: "rule name must not be empty".to_owned(),
            });
        }

        if self.name.len() > MAX_RULE_NAME_LEN {
            return Err(LogPipelineError::RuleSpec {
                rule: self.name.chars().take(32).collect(),
                reason: format!("rule name must not exceed {MAX_RULE_NAME_LEN} characters"),
            });
        }

        self.source_kind()?;
        self.matcher.validate(&self.name)
    }

    /// `source_kind`를 해석합니다. `any`는 `None`입니다.
    pub fn source_kind(&self) -> Result<Option<LogKind>, LogPipelineError> {
        parse_source_kind(&self.source_kind).map_err(|reason| LogPipelineError::RuleSpec {
            rule: self.name.clone(),
            reason,
        })
    }

    /// 규칙 테이블 행으로 변환합니다. matcher 명세는 JSON 텍스트로 저장됩니다.
    pub fn to_new_rule(&self) -> Result<NewRule, LogPipelineError> {
        self.validate()?;
        Ok(NewRule {
            name: self.name.clone(),
            description: self.description.clone(),
            source_kind: self.source_kind()?,
            severity: self.severity,
            enabled: self.enabled,
            matcher_spec: self.matcher.to_json()?,
        })
    }
}

/// `any` 또는 로그 종류 문자열을 해석합니다.
pub fn parse_source_kind(raw: &str) -> Result<Option<LogKind>, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(ANY_SOURCE_KIND) {
        return Ok(None);
    }
    LogKind::from_str_loose(trimmed)
        .map(Some)
        .ok_or_else(|| format!("unknown source_kind '{trimmed}'"))
}

/// matcher 명세 -- 모든 조건이 AND로 결합됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatcherSpec {
    pub conditions: Vec<Condition>,
}

impl MatcherSpec {
    /// 규칙 테이블에 저장된 JSON 텍스트를 해석하고 검증합니다.
    pub fn from_json(rule: &str, json: &str) -> Result<Self, LogPipelineError> {
        let spec: Self = serde_json::from_str(json).map_err(|e| LogPipelineError::RuleSpec {
            rule: rule.to_owned(),
            reason: format!("invalid matcher spec: {e}"),
        })?;
        spec.validate(rule)?;
        Ok(spec)
    }

    pub fn to_json(&self) -> Result<String, LogPipelineError> {
        Ok(serde_json::to_string(self)?)
    }

    /// 조건 구성을 검증합니다.
    ///
    /// - threshold 조건은 최대 하나
    /// - threshold가 아닌 조건이 최소 하나
    /// - threshold와 window는 0보다 커야 함
    /// - 정규식은 컴파일 가능해야 함
    pub fn validate(&self, rule: &str) -> Result<(), LogPipelineError> {
        let spec_error = |reason: String| LogPipelineError::RuleSpec {
            rule: rule.to_owned(),
            reason,
        };

        let thresholds = self
            .conditions
            .iter()
            .filter(|c| c.is_threshold())
            .count();
        if thresholds > 1 {
            return Err(spec_error(format!(
                "at most one count_threshold_over_window condition allowed, found {thresholds}"
            )));
        }
        if self.conditions.len() == thresholds {
            return Err(spec_error(
                "at least one field condition is required".to_owned(),
            ));
        }

        for (idx, condition) in self.conditions.iter().enumerate() {
            if let Some(field) = condition.field() {
                if field.trim().is_empty() {
                    return Err(spec_error(format!("condition[{idx}]: empty field name")));
                }
            }
            match condition {
                Condition::FieldRegex { pattern, .. } => {
                    Regex::new(pattern).map_err(|e| {
                        spec_error(format!("condition[{idx}]: invalid regex: {e}"))
                    })?;
                }
                Condition::CountThresholdOverWindow {
                    threshold,
                    window_secs,
                    ..
                } => {
                    if *threshold == 0 {
                        return Err(spec_error(
                            "threshold must be greater than 0".to_owned(),
                        ));
                    }
                    if *window_secs == 0 {
                        return Err(spec_error(
                            "window_secs must be greater than 0".to_owned(),
                        ));
                    }
                }
                Condition::FieldEquals { .. } | Condition::FieldContains { .. } => {}
            }
        }
        Ok(())
    }

    /// threshold 조건 (있으면)
    pub fn threshold(&self) -> Option<ThresholdSpec<'_>> {
        self.conditions.iter().find_map(|c| match c {
            Condition::CountThresholdOverWindow {
                threshold,
                window_secs,
                group_by,
            } => Some(ThresholdSpec {
                threshold: *threshold,
                window_secs: *window_secs,
                group_by: group_by.as_deref(),
            }),
            _ => None,
        })
    }
}

/// 조건 하나
///
/// `field`가 없으면 원문 페이로드에 대해 매칭합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// 대소문자 무시 완전 일치
    FieldEquals {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field: Option<String>,
        #[serde(deserialize_with = "scalar_string")]
        value: String,
    },
    /// 대소문자 무시 부분 문자열
    FieldContains {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field: Option<String>,
        #[serde(deserialize_with = "scalar_string")]
        value: String,
    },
    /// 정규식 (작성된 그대로, 대소문자 무시는 `(?i)`)
    FieldRegex {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field: Option<String>,
        pattern: String,
    },
    /// 같은 그룹 키로 윈도우 내 매칭 수가 임계값에 도달하면 발화
    CountThresholdOverWindow {
        threshold: u64,
        window_secs: u64,
        /// 그룹 필드. 없으면 규칙 전체가 하나의 그룹입니다.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        group_by: Option<String>,
    },
}

impl Condition {
    pub fn is_threshold(&self) -> bool {
        matches!(self, Self::CountThresholdOverWindow { .. })
    }

    /// 조건이 참조하는 필드 이름
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::FieldEquals { field, .. }
            | Self::FieldContains { field, .. }
            | Self::FieldRegex { field, .. } => field.as_deref(),
            Self::CountThresholdOverWindow { group_by, .. } => group_by.as_deref(),
        }
    }
}

/// threshold 조건 보기
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdSpec<'a> {
    pub threshold: u64,
    pub window_secs: u64,
    pub group_by: Option<&'a str>,
}

/// 숫자/불리언 값도 문자열로 받습니다 (`value: 4625`).
fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Int(i64),
        Float(f64),
        Bool(bool),
    }

    Ok(match Scalar::deserialize(deserializer)? {
        Scalar::Text(s) => s,
        Scalar::Int(i) => i.to_string(),
        Scalar::Float(f) => f.to_string(),
        Scalar::Bool(b) => b.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rule() -> RuleDefinition {
        RuleDefinition {
            name: "cron-activity".to_owned(),
            description: "cron job executed".to_owned(),
            source_kind: "linux".to_owned(),
            severity: Severity::Low,
            enabled: true,
            matcher: MatcherSpec {
                conditions: vec![Condition::FieldContains {
                    field: None,
                    value: "CRON".to_owned(),
                }],
            },
        }
    }

    fn threshold(threshold: u64, window_secs: u64) -> Condition {
        Condition::CountThresholdOverWindow {
            threshold,
            window_secs,
            group_by: Some("source_ip".to_owned()),
        }
    }

    #[test]
    fn valid_rule_passes_validation() {
        sample_rule().validate().unwrap();
    }

    #[test]
    fn empty_name_fails_validation() {
        let mut rule = sample_rule();
        rule.name = "  ".to_owned();
        assert!(rule.validate().is_err());
    }

    #[test]
    fn too_long_name_fails_validation() {
        let mut rule = sample_rule();
        rule.name = "x".repeat(300);
        assert!(rule.validate().is_err());
    }

    #[test]
    fn unknown_source_kind_fails_validation() {
        let mut rule = sample_rule();
        rule.source_kind = "mainframe".to_owned();
        assert!(matches!(
            rule.validate(),
            Err(LogPipelineError::RuleSpec { .. })
        ));
    }

    #[test]
    fn any_source_kind_is_none() {
        let mut rule = sample_rule();
        rule.source_kind = "ANY".to_owned();
        assert_eq!(rule.source_kind().unwrap(), None);
    }

    #[test]
    fn two_thresholds_are_rejected() {
        let mut rule = sample_rule();
        rule.matcher.conditions.push(threshold(5, 60));
        rule.matcher.conditions.push(threshold(10, 60));
        assert!(rule.validate().is_err());
    }

    #[test]
    fn threshold_alone_is_rejected() {
        let mut rule = sample_rule();
        rule.matcher.conditions = vec![threshold(5, 60)];
        assert!(rule.validate().is_err());
    }

    #[test]
    fn zero_threshold_or_window_fails() {
        let mut rule = sample_rule();
        rule.matcher.conditions.push(threshold(0, 60));
        assert!(rule.validate().is_err());

        let mut rule = sample_rule();
        rule.matcher.conditions.push(threshold(5, 0));
        assert!(rule.validate().is_err());
    }

    #[test]
    fn invalid_regex_fails_validation() {
        let mut rule = sample_rule();
        rule.matcher.conditions = vec![Condition::FieldRegex {
            field: Some("message".to_owned()),
            pattern: "[invalid".to_owned(),
        }];
        assert!(rule.validate().is_err());
    }

    #[test]
    fn rule_from_yaml() {
        let yaml = r#"
name: ssh-brute-force
severity: High
source_kind: linux
matcher:
  conditions:
    - type: field_equals
      field: app_name
      value: sshd
    - type: field_contains
      field: message
      value: "Failed password"
    - type: count_threshold_over_window
      threshold: 5
      window_secs: 60
      group_by: source_ip
"#;
        let rule: RuleDefinition = serde_yaml::from_str(yaml).unwrap();
        rule.validate().unwrap();
        assert!(rule.enabled);
        assert_eq!(rule.severity, Severity::High);
        assert_eq!(rule.matcher.conditions.len(), 3);
        assert_eq!(
            rule.matcher.threshold(),
            Some(ThresholdSpec {
                threshold: 5,
                window_secs: 60,
                group_by: Some("source_ip"),
            })
        );
    }

    #[test]
    fn numeric_values_are_read_as_text() {
        let yaml = r#"
name: failed-logon
severity: medium
matcher:
  conditions:
    - type: field_equals
      field: EventID
      value: 4625
"#;
        let rule: RuleDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            rule.matcher.conditions[0],
            Condition::FieldEquals {
                field: Some("EventID".to_owned()),
                value: "4625".to_owned(),
            }
        );
        assert_eq!(rule.source_kind, ANY_SOURCE_KIND);
    }

    #[test]
    fn unknown_condition_type_is_rejected() {
        let yaml = r#"
name: exotic
severity: low
matcher:
  conditions:
    - type: sequence_of
      steps: [a, b]
"#;
        assert!(serde_yaml::from_str::<RuleDefinition>(yaml).is_err());
    }

    #[test]
    fn matcher_spec_survives_json_storage() {
        let rule = sample_rule();
        let new_rule = rule.to_new_rule().unwrap();
        assert_eq!(new_rule.source_kind, Some(LogKind::Linux));
        let spec = MatcherSpec::from_json(&rule.name, &new_rule.matcher_spec).unwrap();
        assert_eq!(spec, rule.matcher);
    }

    #[test]
    fn malformed_stored_spec_is_rule_spec_error() {
        assert!(matches!(
            MatcherSpec::from_json("broken", "{\"conditions\": 3}"),
            Err(LogPipelineError::RuleSpec { .. })
        ));
    }
}
