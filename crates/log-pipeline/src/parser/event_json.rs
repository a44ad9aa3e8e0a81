//! 구조화 이벤트(JSON) 파서
//!
//! Windows 이벤트 로그를 JSON 객체로 전송하는 형식을 파싱합니다.
//! 자기 기술적인 형식이므로 디스패처에서 가장 먼저 시도됩니다.
//!
//! # 처리 내용
//! - 객체를 dot notation 필드로 평탄화
//! - 여러 줄 `message`의 `Section:\n\tKey: Value` 구조를 `Section_Key` 필드로 분리
//! - 잘 알려진 이벤트 필드를 짧은 별칭으로 복사 (프로세스 경로는 파일명만)
//!
//! # 사용 예시
//! ```ignore
//! use ironwatch_log_pipeline::parser::EventJsonParser;
//! use ironwatch_core::pipeline::LogParser;
//!
//! let parser = EventJsonParser::new();
//! let parsed = parser.parse(r#"{"Computer":"DC-01","EventID":4688}"#)?;
//! assert_eq!(parsed.hostname.as_deref(), Some("DC-01"));
//! ```

use std::time::SystemTime;

use chrono::DateTime;
use serde_json::{Map, Value};

use ironwatch_core::error::IronwatchError;
use ironwatch_core::pipeline::LogParser;
use ironwatch_core::types::{LogDetail, LogKind, ParsedLog, WindowsDetail};

use crate::error::LogPipelineError;

const FORMAT: &str = "event_json";

/// 원본 필드 → 별칭. `true`면 경로의 파일명만 사용합니다.
const FIELD_ALIASES: &[(&str, &str, bool)] = &[
    ("CommandLine", "cmdline", false),
    ("ParentProcessName", "parent", true),
    ("NewProcessName", "name", true),
    ("Image", "image", true),
    ("TargetUserName", "user", false),
    ("TargetFilename", "target_file", false),
    ("LogName", "channel", false),
    ("CallerProcessName", "process_name", true),
    ("SubjectUserName", "subject_user", false),
];

const HOSTNAME_KEYS: &[&str] = &["hostname", "host", "Computer", "computer_name"];
const TIMESTAMP_KEYS: &[&str] = &["timestamp", "@timestamp", "TimeCreated", "EventTime"];
const CHANNEL_KEYS: &[&str] = &["LogName", "Channel", "channel"];
const EVENT_ID_KEYS: &[&str] = &["EventID", "EventId", "event_id"];

/// 구조화 이벤트 JSON 파서
pub struct EventJsonParser {
    /// 최대 허용 입력 크기 (바이트)
    max_input_size: usize,
}

impl EventJsonParser {
    pub fn new() -> Self {
        Self {
            max_input_size: 1024 * 1024, // 1MB
        }
    }

    /// 최대 입력 크기를 설정합니다.
    pub fn with_max_input_size(mut self, size: usize) -> Self {
        self.max_input_size = size;
        self
    }

    fn parse_event(&self, payload: &str) -> Result<ParsedLog, LogPipelineError> {
        if payload.len() > self.max_input_size {
            return Err(LogPipelineError::Parse {
                format: FORMAT.to_owned(),
                offset: 0,
                reason: format!(
                    "input too large: {} bytes (max: {})",
                    payload.len(),
                    self.max_input_size
                ),
            });
        }

        let body = payload.trim();
        let value: Value = serde_json::from_str(body).map_err(|e| LogPipelineError::Parse {
            format: FORMAT.to_owned(),
            offset: e.column(),
            reason: e.to_string(),
        })?;
        let Value::Object(obj) = value else {
            return Err(LogPipelineError::Parse {
                format: FORMAT.to_owned(),
                offset: 0,
                reason: "expected a JSON object".to_owned(),
            });
        };

        let mut fields = Vec::new();
        flatten_object(&obj, "", &mut fields);

        if let Some(message) = obj.get("message").and_then(Value::as_str) {
            fields.extend(split_message_sections(message));
        }

        for (source, alias, basename_only) in FIELD_ALIASES {
            if let Some(value) = scalar_string(obj.get(*source)) {
                let value = if *basename_only {
                    basename(&value).to_owned()
                } else {
                    value
                };
                fields.push(((*alias).to_owned(), value));
            }
        }

        let hostname = first_string(&obj, HOSTNAME_KEYS).filter(|h| !h.trim().is_empty());
        let event_time = first_string(&obj, TIMESTAMP_KEYS).and_then(|ts| {
            let parsed = parse_timestamp(&ts);
            if parsed.is_none() {
                tracing::debug!(timestamp = %ts, "unrecognized event timestamp, using receive time");
            }
            parsed
        });

        let detail = WindowsDetail {
            channel: first_string(&obj, CHANNEL_KEYS),
            event_id: EVENT_ID_KEYS
                .iter()
                .find_map(|key| obj.get(*key).and_then(json_i64)),
            body: body.to_owned(),
        };

        Ok(ParsedLog {
            kind: Some(LogKind::Windows),
            hostname,
            event_time,
            fields,
            detail: Some(LogDetail::Windows(detail)),
        })
    }
}

impl Default for EventJsonParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LogParser for EventJsonParser {
    fn kind(&self) -> LogKind {
        LogKind::Windows
    }

    fn format_name(&self) -> &str {
        FORMAT
    }

    fn probe(&self, payload: &str) -> bool {
        let trimmed = payload.trim_start();
        trimmed.starts_with('{')
            && serde_json::from_str::<Value>(trimmed.trim_end()).is_ok_and(|v| v.is_object())
    }

    fn parse(&self, payload: &str) -> Result<ParsedLog, IronwatchError> {
        self.parse_event(payload).map_err(IronwatchError::from)
    }
}

/// JSON 객체를 평탄화하여 dot notation 필드 목록으로 변환합니다.
fn flatten_object(obj: &Map<String, Value>, prefix: &str, fields: &mut Vec<(String, String)>) {
    for (key, val) in obj {
        let field_name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        match val {
            Value::Object(nested) => flatten_object(nested, &field_name, fields),
            Value::Array(arr) => {
                // 배열은 JSON 문자열로 직렬화
                if let Ok(s) = serde_json::to_string(arr) {
                    fields.push((field_name, s));
                }
            }
            Value::Null => {}
            Value::String(s) => fields.push((field_name, s.clone())),
            Value::Number(n) => fields.push((field_name, n.to_string())),
            Value::Bool(b) => fields.push((field_name, b.to_string())),
        }
    }
}

/// 이벤트 메시지 본문을 `Section_Key` 필드로 분리합니다.
///
/// 값이 없는 `Key:` 줄은 섹션 헤더로 취급합니다.
fn split_message_sections(message: &str) -> Vec<(String, String)> {
    let mut fields = Vec::new();
    let mut section = String::new();

    for line in message.lines() {
        let line = line.trim();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if key.is_empty() {
            continue;
        }

        if value.is_empty() {
            section = key.replace(' ', "");
            continue;
        }

        let clean_key = key.replace(' ', "_");
        let name = if section.is_empty() {
            clean_key
        } else {
            format!("{section}_{clean_key}")
        };
        fields.push((name, value.to_owned()));
    }

    fields
}

fn scalar_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn first_string(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| scalar_string(obj.get(*key)))
}

fn json_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn basename(path: &str) -> &str {
    path.rsplit(['\\', '/']).next().unwrap_or(path)
}

/// 타임스탬프 문자열을 파싱합니다.
///
/// 지원 형식:
/// - RFC 3339 (ISO 8601): `2024-01-15T12:00:00Z`
/// - Unix timestamp (초): `1705320000`
/// - Unix timestamp (밀리초): `1705320000000`
fn parse_timestamp(timestamp: &str) -> Option<SystemTime> {
    let timestamp = timestamp.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp) {
        return Some(SystemTime::from(dt));
    }

    let ts_num = timestamp.parse::<i64>().ok()?;
    // 10자리 = 초, 13자리 = 밀리초
    let dt = if ts_num > 9_999_999_999 {
        DateTime::from_timestamp_millis(ts_num)?
    } else {
        DateTime::from_timestamp(ts_num, 0)?
    };
    Some(SystemTime::from(dt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    fn field<'a>(parsed: &'a ParsedLog, name: &str) -> Option<&'a str> {
        parsed
            .fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn probe_requires_json_object() {
        let parser = EventJsonParser::new();
        assert!(parser.probe(r#"  {"EventID": 4625}  "#));
        assert!(!parser.probe("[1, 2, 3]"));
        assert!(!parser.probe("{not json"));
        assert!(!parser.probe("Dec 6 04:17:07 host CRON[1]: {json-ish}"));
        assert!(!parser.probe(""));
    }

    #[test]
    fn parses_process_creation_event() {
        let parser = EventJsonParser::new();
        let raw = r#"{"Computer":"DC-01","EventID":4688,"LogName":"Security",
            "NewProcessName":"C:\\Windows\\System32\\cmd.exe",
            "ParentProcessName":"C:\\Windows\\explorer.exe",
            "CommandLine":"cmd.exe /c whoami","TimeCreated":"2024-01-15T12:00:00Z"}"#;
        let parsed = parser.parse(raw).unwrap();

        assert_eq!(parsed.kind, Some(LogKind::Windows));
        assert_eq!(parsed.hostname.as_deref(), Some("DC-01"));
        assert_eq!(
            parsed.event_time,
            Some(UNIX_EPOCH + Duration::from_secs(1_705_320_000))
        );
        assert_eq!(field(&parsed, "name"), Some("cmd.exe"));
        assert_eq!(field(&parsed, "parent"), Some("explorer.exe"));
        assert_eq!(field(&parsed, "cmdline"), Some("cmd.exe /c whoami"));
        assert_eq!(field(&parsed, "channel"), Some("Security"));

        let Some(LogDetail::Windows(detail)) = parsed.detail else {
            panic!("expected windows detail");
        };
        assert_eq!(detail.event_id, Some(4688));
        assert_eq!(detail.channel.as_deref(), Some("Security"));
        assert!(detail.body.starts_with('{'));
    }

    #[test]
    fn splits_message_sections() {
        let parser = EventJsonParser::new();
        let raw = serde_json::json!({
            "host": "ws-7",
            "message": "An account failed to log on.\r\n\r\nSubject:\r\n\tAccount Name:\tbob\r\n\tLogon ID:\t0x3E7\r\nNetwork Information:\r\n\tSource Network Address:\t10.0.0.5"
        })
        .to_string();
        let parsed = parser.parse(&raw).unwrap();

        assert_eq!(field(&parsed, "Subject_Account_Name"), Some("bob"));
        assert_eq!(field(&parsed, "Subject_Logon_ID"), Some("0x3E7"));
        assert_eq!(
            field(&parsed, "NetworkInformation_Source_Network_Address"),
            Some("10.0.0.5")
        );
    }

    #[test]
    fn flattens_nested_objects_with_dots() {
        let parser = EventJsonParser::new();
        let parsed = parser
            .parse(r#"{"EventData":{"TargetUserName":"admin","Status":"0xC000006D"},"tags":["a"]}"#)
            .unwrap();
        assert_eq!(field(&parsed, "EventData.TargetUserName"), Some("admin"));
        assert_eq!(field(&parsed, "tags"), Some(r#"["a"]"#));
        assert_eq!(parsed.hostname, None);
    }

    #[test]
    fn unix_timestamps_in_seconds_and_millis() {
        assert_eq!(
            parse_timestamp("1705320000"),
            Some(UNIX_EPOCH + Duration::from_secs(1_705_320_000))
        );
        assert_eq!(
            parse_timestamp("1705320000123"),
            Some(UNIX_EPOCH + Duration::from_millis(1_705_320_000_123))
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn rejects_oversized_input() {
        let parser = EventJsonParser::new().with_max_input_size(8);
        assert!(parser.parse(r#"{"host":"too-long"}"#).is_err());
    }
}
