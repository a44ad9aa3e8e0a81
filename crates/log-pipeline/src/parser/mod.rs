//! 로그 파싱 모듈 -- 형식 판별과 우선순위 디스패치
//!
//! [`ParserRouter`]는 원시 레코드를 등록된 파서에 순서대로 probe하여
//! 처음으로 probe를 통과한 파서 하나에만 파싱을 맡깁니다.
//! 각 파서는 core의 [`LogParser`](ironwatch_core::pipeline::LogParser) trait을 구현합니다.
//!
//! # 기본 우선순위
//! 1. 구조화 이벤트 JSON ([`EventJsonParser`])
//! 2. 웹 접근 로그 ([`WebAccessParser`])
//! 3. 범용 라인 ([`GenericLineParser`], 항상 probe 통과)
//!
//! # 사용 예시
//! ```ignore
//! use ironwatch_log_pipeline::parser::{Dispatched, ParserRouter};
//!
//! let router = ParserRouter::with_defaults();
//! match router.dispatch(&record) {
//!     Dispatched::Entry(entry) => batch.push(entry),
//!     Dispatched::Rejected { entry, reason, .. } => overflow.append(&entry, &reason)?,
//! }
//! ```

pub mod event_json;
pub mod line;
pub mod web_access;

pub use event_json::EventJsonParser;
pub use line::GenericLineParser;
pub use web_access::WebAccessParser;

use ironwatch_core::error::IronwatchError;
use ironwatch_core::metrics as m;
use ironwatch_core::pipeline::LogParser;
use ironwatch_core::types::{LogEntry, LogKind, ParsedLog};

use crate::collector::RawRecord;
use crate::error::LogPipelineError;

/// 호스트명을 알 수 없을 때 사용하는 값
pub const UNKNOWN_HOSTNAME: &str = "unknown";

/// 디스패치 결과
///
/// 레코드 하나는 항상 정확히 하나의 결과를 만듭니다.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    /// 정상 파싱된 엔트리 (배치로 이동)
    Entry(LogEntry),
    /// 파서가 선택되었지만 실패한 레코드 (오버플로우로 이동)
    Rejected {
        /// 원문을 보존한 Unknown 엔트리
        entry: LogEntry,
        /// 선택되었던 파서 형식
        format: String,
        reason: String,
    },
}

impl Dispatched {
    pub fn entry(&self) -> &LogEntry {
        match self {
            Self::Entry(entry) | Self::Rejected { entry, .. } => entry,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// 파서 라우터 -- 로그 형식을 자동 감지하여 적절한 파서를 선택합니다.
///
/// 등록 순서가 우선순위입니다. 선택된 파서가 실패해도 다음 파서로
/// 넘어가지 않습니다.
pub struct ParserRouter {
    /// 등록된 파서 목록 (순서대로 probe)
    parsers: Vec<Box<dyn LogParser>>,
}

impl ParserRouter {
    /// 빈 파서 라우터를 생성합니다.
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    /// 기본 파서(event_json, web_access, line)가 등록된 라우터를 생성합니다.
    pub fn with_defaults() -> Self {
        Self::new()
            .register(Box::new(EventJsonParser::default()))
            .register(Box::new(WebAccessParser::new()))
            .register(Box::new(GenericLineParser::new()))
    }

    /// 파서를 목록 끝(가장 낮은 우선순위)에 등록합니다.
    pub fn register(mut self, parser: Box<dyn LogParser>) -> Self {
        self.parsers.push(parser);
        self
    }

    /// 등록된 형식 이름 목록 (우선순위 순)
    pub fn registered_formats(&self) -> Vec<&str> {
        self.parsers.iter().map(|p| p.format_name()).collect()
    }

    /// 원시 레코드를 엔트리로 변환합니다.
    ///
    /// 바이트는 손실 허용 UTF-8로 해석합니다. probe를 통과한 파서가 없거나
    /// 선택된 파서가 실패하면 원문을 담은 `Rejected`를 돌려줍니다.
    pub fn dispatch(&self, record: &RawRecord) -> Dispatched {
        let payload = String::from_utf8_lossy(&record.data);

        let Some(parser) = self.parsers.iter().find(|p| p.probe(&payload)) else {
            let reason = LogPipelineError::UnsupportedFormat("no parser accepted payload".into());
            return rejected(record, &payload, "none", reason.to_string());
        };

        match parser.parse(&payload) {
            Ok(parsed) => {
                let entry = build_entry(record, &payload, parser.kind(), parsed);
                metrics::counter!(m::ENTRIES_PARSED_TOTAL, m::LABEL_KIND => entry.kind.as_str())
                    .increment(1);
                Dispatched::Entry(entry)
            }
            Err(e) => {
                tracing::debug!(
                    format = parser.format_name(),
                    error = %e,
                    "selected parser failed"
                );
                rejected(record, &payload, parser.format_name(), e.to_string())
            }
        }
    }

    /// 특정 형식의 파서로 직접 파싱합니다 (재추출, 검증용).
    pub fn parse_with(&self, format: &str, payload: &str) -> Result<ParsedLog, IronwatchError> {
        let parser = self
            .parsers
            .iter()
            .find(|p| p.format_name() == format)
            .ok_or_else(|| LogPipelineError::UnsupportedFormat(format.to_owned()))?;
        parser.parse(payload)
    }
}

impl Default for ParserRouter {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn build_entry(record: &RawRecord, payload: &str, fallback: LogKind, parsed: ParsedLog) -> LogEntry {
    let hostname = parsed
        .hostname
        .map(|h| h.trim().to_owned())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| UNKNOWN_HOSTNAME.to_owned());

    LogEntry {
        kind: parsed.kind.unwrap_or(fallback),
        hostname,
        source_ip: record.source_ip,
        event_time: parsed.event_time.unwrap_or(record.received_at),
        received_at: record.received_at,
        raw: payload.to_owned(),
        fields: parsed.fields,
        detail: parsed.detail,
    }
}

fn rejected(record: &RawRecord, payload: &str, format: &str, reason: String) -> Dispatched {
    let entry = LogEntry {
        kind: LogKind::Unknown,
        hostname: UNKNOWN_HOSTNAME.to_owned(),
        source_ip: record.source_ip,
        event_time: record.received_at,
        received_at: record.received_at,
        raw: payload.to_owned(),
        fields: vec![("message".to_owned(), payload.trim().to_owned())],
        detail: None,
    };
    Dispatched::Rejected {
        entry,
        format: format.to_owned(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use ironwatch_core::types::LogDetail;
    use proptest::prelude::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn record(data: &[u8]) -> RawRecord {
        RawRecord::new(
            Bytes::copy_from_slice(data),
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)),
        )
    }

    #[test]
    fn with_defaults_has_priority_order() {
        let router = ParserRouter::with_defaults();
        assert_eq!(
            router.registered_formats(),
            vec!["event_json", "web_access", "line"]
        );
    }

    #[test]
    fn empty_router_rejects_everything() {
        let router = ParserRouter::new();
        let result = router.dispatch(&record(b"some log data"));
        assert!(result.is_rejected());
        assert_eq!(result.entry().kind, LogKind::Unknown);
        assert_eq!(result.entry().raw, "some log data");
    }

    #[test]
    fn json_takes_priority_over_generic_line() {
        let router = ParserRouter::with_defaults();
        let payload = br#"{"hostname":"WIN-DC01","EventID":4625,"LogName":"Security"}"#;
        let Dispatched::Entry(entry) = router.dispatch(&record(payload)) else {
            panic!("expected parsed entry");
        };
        assert_eq!(entry.kind, LogKind::Windows);
        assert_eq!(entry.hostname, "WIN-DC01");
        assert!(matches!(entry.detail, Some(LogDetail::Windows(_))));
    }

    #[test]
    fn access_line_goes_to_web_parser() {
        let router = ParserRouter::with_defaults();
        let line = br#"10.0.0.5 - - [06/Dec/2025:04:17:07 +0000] "GET / HTTP/1.1" 200 12 "-" "curl/8""#;
        let Dispatched::Entry(entry) = router.dispatch(&record(line)) else {
            panic!("expected parsed entry");
        };
        assert_eq!(entry.kind, LogKind::Nginx);
        assert_eq!(entry.hostname, UNKNOWN_HOSTNAME);
        assert_eq!(entry.source_ip, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)));
    }

    #[test]
    fn broken_access_line_is_rejected_not_reparsed() {
        let router = ParserRouter::with_defaults();
        let result = router.dispatch(&record(br#"10.0.0.1 [broken] "GET""#));
        let Dispatched::Rejected { entry, format, .. } = result else {
            panic!("expected rejection");
        };
        assert_eq!(format, "web_access");
        assert_eq!(entry.kind, LogKind::Unknown);
        assert_eq!(entry.raw, r#"10.0.0.1 [broken] "GET""#);
    }

    #[test]
    fn syslog_line_keeps_hostname() {
        let router = ParserRouter::with_defaults();
        let line = b"Dec  6 04:17:07 Hp-lap704 CRON[947]: pam_unix(cron:session): session opened";
        let Dispatched::Entry(entry) = router.dispatch(&record(line)) else {
            panic!("expected parsed entry");
        };
        assert_eq!(entry.kind, LogKind::Linux);
        assert_eq!(entry.hostname, "Hp-lap704");
        assert_eq!(entry.field("app_name"), Some("CRON"));
    }

    #[test]
    fn missing_timestamp_falls_back_to_receipt_time() {
        let router = ParserRouter::with_defaults();
        let rec = record(b"free text without any header");
        let entry = router.dispatch(&rec).entry().clone();
        assert_eq!(entry.kind, LogKind::Unknown);
        assert_eq!(entry.event_time, rec.received_at);
        assert_eq!(entry.hostname, UNKNOWN_HOSTNAME);
    }

    #[test]
    fn invalid_utf8_is_decoded_lossily() {
        let router = ParserRouter::with_defaults();
        let entry = router.dispatch(&record(&[0x66, 0x6f, 0xff, 0x6f])).entry().clone();
        assert!(entry.raw.contains('\u{FFFD}'));
    }

    #[test]
    fn parse_with_unknown_format_returns_error() {
        let router = ParserRouter::with_defaults();
        assert!(router.parse_with("xml", "<root/>").is_err());
        assert!(router.parse_with("line", "hello").is_ok());
    }

    proptest! {
        #[test]
        fn any_bytes_yield_one_result_with_raw_kept(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let router = ParserRouter::with_defaults();
            let rec = record(&data);
            let result = router.dispatch(&rec);
            prop_assert_eq!(&result.entry().raw, &String::from_utf8_lossy(&data).into_owned());
            prop_assert_eq!(result.entry().received_at, rec.received_at);
        }
    }
}
