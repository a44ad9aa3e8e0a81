//! 웹 접근 로그 파서 (combined / common log format)
//!
//! ```text
//! 203.0.113.9 - - [06/Dec/2025:04:17:07 +0000] "GET /index.html HTTP/1.1" 200 512 "-" "curl/8.0"
//! ```
//!
//! probe를 통과했지만 전체 패턴에 맞지 않는 라인은 파싱 에러입니다.

use std::sync::LazyLock;
use std::time::SystemTime;

use chrono::DateTime;
use regex::Regex;

use ironwatch_core::error::IronwatchError;
use ironwatch_core::pipeline::LogParser;
use ironwatch_core::types::{LogDetail, LogKind, NginxDetail, ParsedLog};

use crate::error::LogPipelineError;

const FORMAT: &str = "web_access";
const TIME_LOCAL_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

static PROBE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\s+").expect("valid probe regex")
});

static ACCESS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?P<remote_addr>[\d.]+)\s+",
        r"-\s+(?P<remote_user>\S+)\s+",
        r"\[(?P<time_local>[^\]]*)\]\s+",
        r#""(?P<method>\S+)\s+"#,
        r"(?P<uri>\S+)\s+",
        r#"(?P<protocol>[^"]+)"\s+"#,
        r"(?P<status>\d+)\s+",
        r"(?P<body_bytes>\d+)",
        r#"(?:\s+"(?P<referer>[^"]*)"\s+"(?P<user_agent>[^"]*)")?"#,
    ))
    .expect("valid access log regex")
});

/// 웹 접근 로그 파서
#[derive(Default)]
pub struct WebAccessParser;

impl WebAccessParser {
    pub fn new() -> Self {
        Self
    }

    fn parse_line(&self, payload: &str) -> Result<ParsedLog, LogPipelineError> {
        let line = payload.trim();
        let caps = ACCESS_PATTERN.captures(line).ok_or_else(|| LogPipelineError::Parse {
            format: FORMAT.to_owned(),
            offset: 0,
            reason: "line does not match the access log pattern".to_owned(),
        })?;

        let text = |name: &str| caps.name(name).map(|m| m.as_str().to_owned());
        let optional = |name: &str| text(name).filter(|v| !v.is_empty() && v != "-");

        let status: u16 = text("status")
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| LogPipelineError::Parse {
                format: FORMAT.to_owned(),
                offset: caps.name("status").map_or(0, |m| m.start()),
                reason: "status code out of range".to_owned(),
            })?;
        let body_bytes: u64 = text("body_bytes")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        let detail = NginxDetail {
            remote_addr: text("remote_addr").unwrap_or_default(),
            remote_user: optional("remote_user"),
            time_local: text("time_local").unwrap_or_default(),
            method: text("method").unwrap_or_default(),
            uri: text("uri").unwrap_or_default(),
            protocol: text("protocol").unwrap_or_default(),
            status,
            body_bytes,
            referer: optional("referer"),
            user_agent: optional("user_agent"),
        };

        let event_time = DateTime::parse_from_str(&detail.time_local, TIME_LOCAL_FORMAT)
            .ok()
            .map(SystemTime::from);

        let mut fields = LogDetail::Nginx(detail.clone()).fields();
        fields.push(("status_category".to_owned(), status_category(status).to_owned()));

        Ok(ParsedLog {
            kind: Some(LogKind::Nginx),
            hostname: None,
            event_time,
            fields,
            detail: Some(LogDetail::Nginx(detail)),
        })
    }
}

impl LogParser for WebAccessParser {
    fn kind(&self) -> LogKind {
        LogKind::Nginx
    }

    fn format_name(&self) -> &str {
        FORMAT
    }

    fn probe(&self, payload: &str) -> bool {
        let line = payload.trim();
        PROBE_PATTERN.is_match(line)
            && line.contains('[')
            && line.contains(']')
            && line.contains('"')
    }

    fn parse(&self, payload: &str) -> Result<ParsedLog, IronwatchError> {
        self.parse_line(payload).map_err(IronwatchError::from)
    }
}

fn status_category(status: u16) -> &'static str {
    match status {
        200..=299 => "success",
        300..=399 => "redirect",
        400..=499 => "client_error",
        500..=599 => "server_error",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    const COMBINED: &str = r#"203.0.113.9 - alice [06/Dec/2025:04:17:07 +0000] "GET /admin/login.php?id=1' OR '1'='1 HTTP/1.1" 403 162 "-" "sqlmap/1.7""#;

    #[test]
    fn probe_requires_ip_brackets_and_quotes() {
        let parser = WebAccessParser::new();
        assert!(parser.probe(COMBINED));
        assert!(!parser.probe("Dec 6 04:17:07 host sshd[1]: hi"));
        assert!(!parser.probe("10.0.0.1 plain text without markers"));
    }

    #[test]
    fn parses_combined_line() {
        let parser = WebAccessParser::new();
        let line = r#"203.0.113.9 - - [06/Dec/2025:04:17:07 +0000] "GET /index.html HTTP/1.1" 200 512 "https://example.com/" "curl/8.0""#;
        let parsed = parser.parse(line).unwrap();

        assert_eq!(parsed.kind, Some(LogKind::Nginx));
        assert_eq!(parsed.hostname, None);
        assert_eq!(
            parsed.event_time,
            Some(UNIX_EPOCH + Duration::from_secs(1_764_994_627))
        );
        let Some(LogDetail::Nginx(detail)) = &parsed.detail else {
            panic!("expected nginx detail");
        };
        assert_eq!(detail.remote_addr, "203.0.113.9");
        assert_eq!(detail.remote_user, None);
        assert_eq!(detail.method, "GET");
        assert_eq!(detail.uri, "/index.html");
        assert_eq!(detail.protocol, "HTTP/1.1");
        assert_eq!(detail.status, 200);
        assert_eq!(detail.body_bytes, 512);
        assert_eq!(detail.referer.as_deref(), Some("https://example.com/"));
        assert_eq!(detail.user_agent.as_deref(), Some("curl/8.0"));
        assert!(
            parsed
                .fields
                .contains(&("status_category".to_owned(), "success".to_owned()))
        );
    }

    #[test]
    fn common_format_without_referer_and_agent() {
        let parser = WebAccessParser::new();
        let parsed = parser
            .parse(r#"10.1.1.1 - bob [06/Dec/2025:04:17:07 +0900] "POST /api HTTP/2.0" 500 0"#)
            .unwrap();
        let Some(LogDetail::Nginx(detail)) = parsed.detail else {
            panic!("expected nginx detail");
        };
        assert_eq!(detail.remote_user.as_deref(), Some("bob"));
        assert_eq!(detail.user_agent, None);
        assert_eq!(status_category(detail.status), "server_error");
    }

    #[test]
    fn attack_uri_is_preserved_in_fields() {
        let parsed = WebAccessParser::new().parse(COMBINED).unwrap();
        let uri = parsed
            .fields
            .iter()
            .find(|(k, _)| k == "uri")
            .map(|(_, v)| v.as_str());
        assert_eq!(uri, Some("/admin/login.php?id=1'"));
    }

    #[test]
    fn probe_match_without_full_pattern_is_error() {
        let parser = WebAccessParser::new();
        let line = r#"10.0.0.1 [broken] "GET""#;
        assert!(parser.probe(line));
        assert!(parser.parse(line).is_err());
    }
}
