#![no_main]

use std::time::SystemTime;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use ironwatch_core::types::LogKind;
use ironwatch_log_pipeline::rule::matcher::{FieldView, RuleMatcher};
use ironwatch_log_pipeline::rule::types::{Condition, MatcherSpec};
use ironwatch_storage::StoredEntry;

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    /// 규칙 조건 목록 (최대 8개로 제한)
    conditions: Vec<FuzzCondition>,
    entry_raw: String,
    entry_hostname: String,
    fields: Vec<(String, String)>,
}

#[derive(Arbitrary, Debug)]
struct FuzzCondition {
    field: Option<FuzzField>,
    kind: FuzzKind,
    value: String,
}

#[derive(Arbitrary, Debug)]
enum FuzzField {
    Raw,
    Hostname,
    Message,
    Custom(String),
}

#[derive(Arbitrary, Debug)]
enum FuzzKind {
    Equals,
    Contains,
    Regex,
}

impl FuzzField {
    fn name(&self) -> String {
        match self {
            FuzzField::Raw => "raw".to_owned(),
            FuzzField::Hostname => "hostname".to_owned(),
            FuzzField::Message => "message".to_owned(),
            FuzzField::Custom(name) => name.clone(),
        }
    }
}

impl FuzzCondition {
    fn to_condition(&self) -> Condition {
        let field = self.field.as_ref().map(FuzzField::name);
        let value = self.value.clone();
        match self.kind {
            FuzzKind::Equals => Condition::FieldEquals { field, value },
            FuzzKind::Contains => Condition::FieldContains { field, value },
            FuzzKind::Regex => Condition::FieldRegex {
                field,
                pattern: value,
            },
        }
    }
}

fuzz_target!(|input: FuzzInput| {
    // 조건 수 제한 (성능)
    let spec = MatcherSpec {
        conditions: input
            .conditions
            .iter()
            .take(8)
            .map(FuzzCondition::to_condition)
            .collect(),
    };

    if spec.validate("fuzz_rule").is_err() {
        return;
    }

    let mut matcher = RuleMatcher::new();

    // compile_rule이 실패해도 크래시는 안 됨
    if matcher.compile_rule(1, "fuzz_rule", &spec).is_err() {
        return;
    }

    let now = SystemTime::now();
    let entry = StoredEntry {
        id: 1,
        host_id: 1,
        hostname: input.entry_hostname,
        kind: LogKind::Linux,
        source_ip: "10.0.0.1".to_owned(),
        event_time: now,
        received_at: now,
        raw: input.entry_raw,
        fields: input.fields.into_iter().take(16).collect(),
        detail: None,
        processed: false,
        extracted: false,
    };

    // matches도 크래시 없이 Ok/Err 반환해야 함
    let _ = matcher.matches(1, &spec, &FieldView::new(&entry));
});
