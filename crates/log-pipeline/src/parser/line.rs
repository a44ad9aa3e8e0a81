//! 범용 라인 파서 -- 모든 입력을 받아들이는 마지막 파서
//!
//! 다음 헤더 형식을 순서대로 시도합니다.
//!
//! 1. RFC 5424: `<PRI>1 TIMESTAMP HOSTNAME APP-NAME PROCID MSGID [SD] MSG`
//! 2. ISO 8601 타임스탬프 헤더: `2024-01-15T12:00:00Z host app[pid]: msg`
//! 3. BSD (RFC 3164): `Mmm d hh:mm:ss host app[pid]: msg` (선택적 `<PRI>` 접두사)
//!
//! 헤더가 맞으면 `linux` 종류, 아무것도 맞지 않으면 원문 전체를 `message`로 담은
//! `unknown` 종류를 돌려줍니다. 이 파서는 실패하지 않습니다.
//! SSH 인증 정보 같은 상세 필드는 백그라운드 추출 워커가 채웁니다.

use std::sync::LazyLock;
use std::time::SystemTime;

use chrono::{DateTime, Datelike, NaiveDateTime, TimeDelta, Utc};
use regex::{Captures, Regex};

use ironwatch_core::error::IronwatchError;
use ironwatch_core::pipeline::LogParser;
use ironwatch_core::types::{LogKind, ParsedLog};

const FORMAT: &str = "line";

/// RFC 5424에서 유효한 최대 PRI 값
/// facility 최댓값 23 * 8 + severity 최댓값 7 = 191
const MAX_SYSLOG_PRI: u8 = 191;

static RFC5424_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<(?P<pri>\d{1,3})>1\s+(?P<ts>\S+)\s+(?P<host>\S+)\s+(?P<app>\S+)\s+(?P<procid>\S+)\s+(?P<msgid>\S+)(?:\s+(?P<rest>.*))?$")
        .expect("valid rfc5424 regex")
});

static ISO_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?:<\d{1,3}>)?",
        r"(?P<ts>\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?)\s+",
        r"(?P<host>\S+)\s+",
        r"(?P<app>[^:\[\s]+)(?:\[(?P<pid>\d+)\])?:\s*",
        r"(?P<msg>.*)$",
    ))
    .expect("valid iso header regex")
});

static BSD_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?:<\d{1,3}>)?",
        r"(?P<ts>[A-Z][a-z]{2}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2})\s+",
        r"(?P<host>\S+)\s+",
        r"(?P<app>[^:\[\s]+)(?:\[(?P<pid>\d+)\])?:\s*",
        r"(?P<msg>.*)$",
    ))
    .expect("valid bsd header regex")
});

/// 범용 라인 파서
#[derive(Default)]
pub struct GenericLineParser;

impl GenericLineParser {
    pub fn new() -> Self {
        Self
    }

    fn parse_line(&self, payload: &str) -> ParsedLog {
        let line = payload.trim();
        if line.is_empty() {
            return unstructured(line);
        }

        if let Some(caps) = RFC5424_HEADER.captures(line) {
            if let Some(parsed) = parse_rfc5424(&caps) {
                return parsed;
            }
        }
        if let Some(caps) = ISO_HEADER.captures(line) {
            return header_entry(&caps, parse_iso_timestamp);
        }
        if let Some(caps) = BSD_HEADER.captures(line) {
            return header_entry(&caps, |ts| parse_bsd_timestamp(ts, Utc::now()));
        }

        unstructured(line)
    }
}

impl LogParser for GenericLineParser {
    fn kind(&self) -> LogKind {
        LogKind::Linux
    }

    fn format_name(&self) -> &str {
        FORMAT
    }

    fn probe(&self, _payload: &str) -> bool {
        true
    }

    fn parse(&self, payload: &str) -> Result<ParsedLog, IronwatchError> {
        Ok(self.parse_line(payload))
    }
}

fn unstructured(line: &str) -> ParsedLog {
    ParsedLog {
        kind: Some(LogKind::Unknown),
        fields: vec![("message".to_owned(), line.to_owned())],
        ..ParsedLog::default()
    }
}

/// ISO/BSD 헤더 캡처를 엔트리로 변환합니다.
fn header_entry(caps: &Captures<'_>, parse_ts: impl Fn(&str) -> Option<SystemTime>) -> ParsedLog {
    let host = caps.name("host").map_or("", |m| m.as_str());
    let app = caps.name("app").map_or("", |m| m.as_str());
    let msg = caps.name("msg").map_or("", |m| m.as_str());

    let mut fields = vec![
        ("hostname".to_owned(), host.to_owned()),
        ("app_name".to_owned(), app.to_owned()),
    ];
    if let Some(pid) = caps.name("pid") {
        fields.push(("pid".to_owned(), pid.as_str().to_owned()));
    }
    fields.push(("message".to_owned(), msg.to_owned()));

    ParsedLog {
        kind: Some(LogKind::Linux),
        hostname: Some(host.to_owned()),
        event_time: caps.name("ts").and_then(|ts| parse_ts(ts.as_str())),
        fields,
        detail: None,
    }
}

/// RFC 5424 헤더를 파싱합니다. PRI가 범위를 벗어나면 `None`.
fn parse_rfc5424(caps: &Captures<'_>) -> Option<ParsedLog> {
    let pri: u8 = caps.name("pri")?.as_str().parse().ok()?;
    if pri > MAX_SYSLOG_PRI {
        return None;
    }
    let nil = |name: &str| {
        caps.name(name)
            .map(|m| m.as_str())
            .filter(|v| *v != "-")
            .map(str::to_owned)
    };

    let hostname = nil("host");
    let app_name = nil("app");
    let procid = nil("procid");
    let msgid = nil("msgid");
    let rest = caps.name("rest").map_or("", |m| m.as_str());

    let (sd_fields, message) = if rest.starts_with('[') {
        let (sd, msg) = split_sd_and_message(rest);
        (parse_structured_data(&sd), msg)
    } else if let Some(msg) = rest.strip_prefix("- ") {
        (Vec::new(), msg.to_owned())
    } else if rest == "-" {
        (Vec::new(), String::new())
    } else {
        (Vec::new(), rest.to_owned())
    };

    let mut fields = Vec::new();
    if let Some(h) = &hostname {
        fields.push(("hostname".to_owned(), h.clone()));
    }
    if let Some(app) = app_name {
        fields.push(("app_name".to_owned(), app));
    }
    if let Some(pid) = procid {
        fields.push(("pid".to_owned(), pid));
    }
    fields.push(("message".to_owned(), message));
    fields.push(("facility".to_owned(), (pri / 8).to_string()));
    fields.push(("syslog_severity".to_owned(), (pri % 8).to_string()));
    if let Some(id) = msgid {
        fields.push(("msgid".to_owned(), id));
    }
    fields.extend(sd_fields);

    Some(ParsedLog {
        kind: Some(LogKind::Linux),
        hostname,
        event_time: nil("ts").and_then(|ts| parse_iso_timestamp(&ts)),
        fields,
        detail: None,
    })
}

/// ISO 8601 타임스탬프를 파싱합니다. 오프셋이 없으면 UTC로 간주합니다.
fn parse_iso_timestamp(ts: &str) -> Option<SystemTime> {
    let normalized = ts.replacen(' ', "T", 1);
    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(SystemTime::from(dt));
    }
    if let Ok(dt) = DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(SystemTime::from(dt));
    }
    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| SystemTime::from(naive.and_utc()))
}

/// BSD syslog 타임스탬프를 파싱합니다.
///
/// 형식: `MMM DD HH:MM:SS` (예: `Dec  6 04:17:07`)
/// 연도 정보가 없으므로 현재 연도를 가정하고, 그 결과가 하루 이상 미래라면 작년으로 봅니다.
fn parse_bsd_timestamp(ts: &str, now: DateTime<Utc>) -> Option<SystemTime> {
    let compact = ts.split_whitespace().collect::<Vec<_>>().join(" ");
    let at_year = |year: i32| {
        NaiveDateTime::parse_from_str(&format!("{year} {compact}"), "%Y %b %d %H:%M:%S")
            .ok()
            .map(|naive| naive.and_utc())
    };

    match at_year(now.year()) {
        Some(dt) if dt - now <= TimeDelta::days(1) => Some(SystemTime::from(dt)),
        _ => at_year(now.year() - 1).map(SystemTime::from),
    }
}

/// Structured Data 부분과 메시지 부분을 분리합니다.
///
/// SD는 하나 이상의 `[...]` 블록으로 구성되며, 그 이후가 메시지입니다.
fn split_sd_and_message(input: &str) -> (String, String) {
    let mut depth = 0usize;
    let mut in_quote = false;
    let mut escaped = false;

    for (idx, ch) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quote => escaped = true,
            '"' => in_quote = !in_quote,
            '[' if !in_quote => depth += 1,
            ']' if !in_quote => {
                depth = depth.saturating_sub(1);
                let next = input[idx + 1..].chars().next();
                if depth == 0 && next != Some('[') {
                    let (sd, msg) = input.split_at(idx + 1);
                    return (sd.to_owned(), msg.trim_start().to_owned());
                }
            }
            _ => {}
        }
    }

    // 닫히지 않은 SD가 있으면 전체를 SD로 간주
    (input.to_owned(), String::new())
}

/// `[id key="value" ...]` 블록들을 `id.key` 필드로 변환합니다.
fn parse_structured_data(sd: &str) -> Vec<(String, String)> {
    static SD_ELEMENT: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"\[(?P<id>[^\s\]]+)(?P<params>(?:\s+[^\s=\]]+="(?:[^"\\]|\\.)*")*)\s*\]"#)
            .expect("valid sd element regex")
    });
    static SD_PARAM: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"(?P<key>[^\s=\]]+)="(?P<value>(?:[^"\\]|\\.)*)""#)
            .expect("valid sd param regex")
    });

    let mut fields = Vec::new();
    for element in SD_ELEMENT.captures_iter(sd) {
        let id = element.name("id").map_or("", |m| m.as_str());
        let params = element.name("params").map_or("", |m| m.as_str());
        for param in SD_PARAM.captures_iter(params) {
            let key = param.name("key").map_or("", |m| m.as_str());
            let value = param
                .name("value")
                .map_or(String::new(), |m| unescape_sd_value(m.as_str()));
            fields.push((format!("{id}.{key}"), value));
        }
    }
    fields
}

fn unescape_sd_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(ch);
        }
    }
    out
}
