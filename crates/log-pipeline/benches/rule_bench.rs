//! 룰 매칭 벤치마크
//!
//! 단일/다중 룰 매칭 성능과 규칙 수에 따른 스케일링을 측정합니다.

use std::time::SystemTime;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use ironwatch_core::types::{LinuxDetail, LogDetail, LogKind, Severity};
use ironwatch_log_pipeline::rule::matcher::{FieldView, RuleMatcher};
use ironwatch_log_pipeline::rule::types::{Condition, MatcherSpec};
use ironwatch_log_pipeline::rule::RuleEngine;
use ironwatch_storage::{RuleRecord, StoredEntry};

fn create_entry(message: &str) -> StoredEntry {
    let now = SystemTime::now();
    StoredEntry {
        id: 1,
        host_id: 1,
        hostname: "web-server-01".to_owned(),
        kind: LogKind::Linux,
        source_ip: "192.168.1.100".to_owned(),
        event_time: now,
        received_at: now,
        raw: format!("<38>Dec  6 04:17:07 web-server-01 sshd[1234]: {message}"),
        fields: vec![
            ("app_name".to_owned(), "sshd".to_owned()),
            ("pid".to_owned(), "1234".to_owned()),
            ("message".to_owned(), message.to_owned()),
        ],
        detail: Some(LogDetail::Linux(LinuxDetail {
            app_name: Some("sshd".to_owned()),
            pid: Some(1234),
            message: message.to_owned(),
            ssh_action: Some("Failed".to_owned()),
            ssh_user: Some("root".to_owned()),
            ssh_ip: Some("10.9.9.9".to_owned()),
        })),
        processed: false,
        extracted: true,
    }
}

fn equals(field: &str, value: &str) -> Condition {
    Condition::FieldEquals {
        field: Some(field.to_owned()),
        value: value.to_owned(),
    }
}

fn record(id: i64, spec: &MatcherSpec) -> RuleRecord {
    let now = SystemTime::now();
    RuleRecord {
        id,
        name: format!("rule-{id}"),
        description: String::new(),
        source_kind: Some(LogKind::Linux),
        severity: Severity::High,
        enabled: true,
        matcher_spec: spec.to_json().unwrap(),
        created_at: now,
        updated_at: now,
    }
}

fn simple_spec() -> MatcherSpec {
    MatcherSpec {
        conditions: vec![equals("app_name", "sshd")],
    }
}

fn regex_spec(pattern: &str) -> MatcherSpec {
    MatcherSpec {
        conditions: vec![Condition::FieldRegex {
            field: Some("message".to_owned()),
            pattern: pattern.to_owned(),
        }],
    }
}

fn complex_spec() -> MatcherSpec {
    MatcherSpec {
        conditions: vec![
            equals("app_name", "sshd"),
            Condition::FieldContains {
                field: Some("message".to_owned()),
                value: "failed password".to_owned(),
            },
            Condition::FieldRegex {
                field: Some("ssh_ip".to_owned()),
                pattern: r"^\d+\.\d+\.\d+\.\d+$".to_owned(),
            },
            equals("ssh_action", "failed"),
        ],
    }
}

fn bench_single_rule_match(c: &mut Criterion) {
    let spec = simple_spec();
    let mut matcher = RuleMatcher::new();
    matcher.compile_rule(1, "simple", &spec).unwrap();
    let entry = create_entry("Failed password for root from 10.9.9.9 port 22");
    let view = FieldView::new(&entry);

    let mut group = c.benchmark_group("single_rule");
    group.throughput(Throughput::Elements(1));
    group.bench_function("field_equals", |b| {
        b.iter(|| matcher.matches(1, black_box(&spec), black_box(&view)).unwrap())
    });
    group.finish();
}

fn bench_regex_rule_match(c: &mut Criterion) {
    let patterns = [
        ("simple", "Failed"),
        ("anchored", r"^Failed password"),
        ("ip_capture", r"from (\d+\.\d+\.\d+\.\d+) port"),
    ];
    let entry = create_entry("Failed password for root from 10.9.9.9 port 22");
    let view = FieldView::new(&entry);

    let mut group = c.benchmark_group("regex_rule");
    for (name, pattern) in patterns {
        let spec = regex_spec(pattern);
        let mut matcher = RuleMatcher::new();
        matcher.compile_rule(1, name, &spec).unwrap();
        group.bench_with_input(BenchmarkId::new("pattern", name), &spec, |b, spec| {
            b.iter(|| matcher.matches(1, black_box(spec), black_box(&view)).unwrap())
        });
    }
    group.finish();
}

fn bench_complex_rule_match(c: &mut Criterion) {
    let spec = complex_spec();
    let mut matcher = RuleMatcher::new();
    matcher.compile_rule(1, "complex", &spec).unwrap();
    let entry = create_entry("Failed password for root from 10.9.9.9 port 22");

    c.bench_function("complex_rule_4_conditions", |b| {
        b.iter(|| {
            let view = FieldView::new(black_box(&entry));
            matcher.matches(1, &spec, &view).unwrap()
        })
    });
}

fn bench_multiple_rules_scaling(c: &mut Criterion) {
    let entry = create_entry("Failed password for root from 10.9.9.9 port 22");
    let mut group = c.benchmark_group("rule_scaling");

    for count in [1_i64, 10, 50, 100] {
        let records: Vec<RuleRecord> = (1..=count)
            .map(|id| {
                if id % 2 == 0 {
                    record(id, &complex_spec())
                } else {
                    record(id, &simple_spec())
                }
            })
            .collect();
        let mut engine = RuleEngine::new();
        engine.reload(&records);

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("rules", count), &entry, |b, entry| {
            b.iter(|| engine.evaluate(black_box(entry)).unwrap())
        });
    }
    group.finish();
}

fn bench_threshold_rule(c: &mut Criterion) {
    let spec = MatcherSpec {
        conditions: vec![
            equals("ssh_action", "failed"),
            Condition::CountThresholdOverWindow {
                threshold: 1_000_000,
                window_secs: 3600,
                group_by: Some("ssh_ip".to_owned()),
            },
        ],
    };
    let mut engine = RuleEngine::new();
    engine.reload(&[record(1, &spec)]);
    let entry = create_entry("Failed password for root from 10.9.9.9 port 22");

    c.bench_function("threshold_counting", |b| {
        b.iter(|| engine.evaluate(black_box(&entry)).unwrap())
    });
}

fn bench_rule_compilation(c: &mut Criterion) {
    let spec = complex_spec();
    c.bench_function("rule_compilation", |b| {
        b.iter(|| {
            let mut matcher = RuleMatcher::new();
            matcher.compile_rule(1, "compile-test", black_box(&spec)).unwrap();
        })
    });
}

criterion_group!(
    benches,
    bench_single_rule_match,
    bench_regex_rule_match,
    bench_complex_rule_match,
    bench_multiple_rules_scaling,
    bench_threshold_rule,
    bench_rule_compilation
);
criterion_main!(benches);
