//! 도메인 타입 -- 시스템 전역에서 사용되는 공통 타입
//!
//! 수집, 저장, 탐지 모듈이 공유하는 데이터 구조를 정의합니다.

use std::fmt;
use std::net::IpAddr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// 로그 소스 종류
///
/// 디스패처가 판별한 로그의 형식입니다. 호스트 유형 태그로도 사용됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    /// Windows 이벤트 JSON (구조화 이벤트)
    Windows,
    /// 웹 서버 접근 로그
    Nginx,
    /// syslog 형식 라인
    Linux,
    /// 어느 형식에도 해당하지 않는 원문
    Unknown,
}

impl LogKind {
    /// 모든 종류 (저장소 인덱스 순서)
    pub const ALL: [LogKind; 4] = [Self::Windows, Self::Nginx, Self::Linux, Self::Unknown];

    /// 저장소와 설정에서 사용하는 소문자 태그
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::Nginx => "nginx",
            Self::Linux => "linux",
            Self::Unknown => "unknown",
        }
    }

    /// 문자열에서 종류를 파싱합니다. 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "windows" | "event" | "structured" => Some(Self::Windows),
            "nginx" | "web" | "access" => Some(Self::Nginx),
            "linux" | "syslog" => Some(Self::Linux),
            "unknown" | "generic" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// 백그라운드 필드 추출 대상 여부
    pub fn supports_extraction(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 정규화된 로그 엔트리
///
/// 디스패처의 출력이며 배치 라이터가 저장소로 넘기는 단위입니다.
/// 하나의 엔트리는 정확히 하나의 호스트(hostname + source_ip)와 원문 하나를 참조합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// 판별된 로그 종류
    pub kind: LogKind,
    /// 호스트명 (알 수 없으면 "unknown")
    pub hostname: String,
    /// 데이터그램 송신 IP
    pub source_ip: IpAddr,
    /// 로그에 기록된 이벤트 시각 (없으면 수신 시각)
    pub event_time: SystemTime,
    /// 수신 시각
    pub received_at: SystemTime,
    /// 수신한 원문
    pub raw: String,
    /// 파서가 추출한 구조화 필드
    pub fields: Vec<(String, String)>,
    /// 파서가 즉시 생성한 상세 레코드 (있을 경우)
    pub detail: Option<LogDetail>,
}

impl LogEntry {
    /// 구조화 필드에서 값을 조회합니다.
    pub fn field(&self, name: &str) -> Option<&str> {
        lookup(&self.fields, name)
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({}): {}", self.kind, self.hostname, self.source_ip, self.raw)
    }
}

/// 파서 한 번의 결과
///
/// 디스패처가 수신 메타데이터와 합쳐 [`LogEntry`]를 만듭니다.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedLog {
    /// 실제로 판별된 종류 (범용 파서는 Linux 또는 Unknown)
    pub kind: Option<LogKind>,
    /// 로그에서 찾은 호스트명
    pub hostname: Option<String>,
    /// 로그에서 찾은 이벤트 시각
    pub event_time: Option<SystemTime>,
    /// 구조화 필드
    pub fields: Vec<(String, String)>,
    /// 즉시 생성된 상세 레코드
    pub detail: Option<LogDetail>,
}

/// 종류별 상세 레코드
///
/// 엔트리 id와 1:1로 대응하며 종류마다 별도 테이블에 저장됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LogDetail {
    Linux(LinuxDetail),
    Nginx(NginxDetail),
    Windows(WindowsDetail),
}

impl LogDetail {
    /// 상세 레코드가 속한 종류
    pub fn kind(&self) -> LogKind {
        match self {
            Self::Linux(_) => LogKind::Linux,
            Self::Nginx(_) => LogKind::Nginx,
            Self::Windows(_) => LogKind::Windows,
        }
    }

    /// 룰 매칭에 사용할 평탄화된 필드 목록
    pub fn fields(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        let mut push = |key: &str, value: Option<String>| {
            if let Some(v) = value {
                out.push((key.to_owned(), v));
            }
        };
        match self {
            Self::Linux(d) => {
                push("app_name", d.app_name.clone());
                push("pid", d.pid.map(|p| p.to_string()));
                push("message", Some(d.message.clone()));
                push("ssh_action", d.ssh_action.clone());
                push("ssh_user", d.ssh_user.clone());
                push("ssh_ip", d.ssh_ip.clone());
            }
            Self::Nginx(d) => {
                push("remote_addr", Some(d.remote_addr.clone()));
                push("remote_user", d.remote_user.clone());
                push("time_local", Some(d.time_local.clone()));
                push("method", Some(d.method.clone()));
                push("uri", Some(d.uri.clone()));
                push("protocol", Some(d.protocol.clone()));
                push("status", Some(d.status.to_string()));
                push("body_bytes", Some(d.body_bytes.to_string()));
                push("referer", d.referer.clone());
                push("user_agent", d.user_agent.clone());
            }
            Self::Windows(d) => {
                push("channel", d.channel.clone());
                push("event_id", d.event_id.map(|id| id.to_string()));
            }
        }
        out
    }
}

/// syslog 라인의 상세 필드 (SSH 인증 정보 포함)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinuxDetail {
    pub app_name: Option<String>,
    pub pid: Option<u32>,
    pub message: String,
    /// Accepted / Failed
    pub ssh_action: Option<String>,
    pub ssh_user: Option<String>,
    pub ssh_ip: Option<String>,
}

/// 웹 접근 로그의 상세 필드
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NginxDetail {
    pub remote_addr: String,
    pub remote_user: Option<String>,
    pub time_local: String,
    pub method: String,
    pub uri: String,
    pub protocol: String,
    pub status: u16,
    pub body_bytes: u64,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
}

/// Windows 이벤트의 상세 필드
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowsDetail {
    pub channel: Option<String>,
    pub event_id: Option<i64>,
    /// 원본 JSON 본문
    pub body: String,
}

/// 심각도 레벨
///
/// 보안 이벤트의 심각도를 나타냅니다.
/// `Ord` 구현으로 심각도 비교가 가능합니다 (`Info < Low < Medium < High < Critical`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// 정보성 이벤트
    #[default]
    Info,
    /// 낮은 심각도
    Low,
    /// 중간 심각도
    Medium,
    /// 높은 심각도
    High,
    /// 치명적 -- 즉시 대응 필요
    Critical,
}

impl Severity {
    /// 문자열에서 심각도를 파싱합니다.
    ///
    /// 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "info" | "informational" => Some(Self::Info),
            "low" => Some(Self::Low),
            "medium" | "med" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" | "crit" => Some(Self::Critical),
            _ => None,
        }
    }

    /// 저장소에 기록하는 소문자 표기
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "Info"),
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
            Self::Critical => write!(f, "Critical"),
        }
    }
}

fn lookup<'a>(fields: &'a [(String, String)], name: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}
