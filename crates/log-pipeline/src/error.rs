//! 로그 파이프라인 에러 타입
//!
//! [`LogPipelineError`]는 로그 파이프라인 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<LogPipelineError> for IronwatchError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use ironwatch_core::error::{
    ConfigError, DetectionError, IronwatchError, ParseError, PipelineError, TransportError,
};
use ironwatch_storage::StoreError;

/// 로그 파이프라인 도메인 에러
///
/// 수신, 파싱, 배치 저장, 오버플로우, 룰 로딩/평가 등 파이프라인 내부의
/// 모든 에러 상황을 포괄합니다.
#[derive(Debug, thiserror::Error)]
pub enum LogPipelineError {
    /// 로그 파싱 실패
    #[error("parse error: {format} at offset {offset}: {reason}")]
    Parse {
        /// 파서 형식 (event_json, web_access 등)
        format: String,
        /// 실패 위치 (바이트 오프셋)
        offset: usize,
        /// 실패 사유
        reason: String,
    },

    /// 지원하지 않는 로그 형식
    #[error("unsupported log format: {0}")]
    UnsupportedFormat(String),

    /// 룰 파일 로딩 실패
    #[error("rule load error: {path}: {reason}")]
    RuleLoad {
        /// 룰 파일 경로
        path: String,
        /// 로딩 실패 사유
        reason: String,
    },

    /// 룰 matcher 명세 오류
    #[error("rule spec error: rule '{rule}': {reason}")]
    RuleSpec {
        /// 문제가 된 룰 이름
        rule: String,
        /// 검증 실패 사유
        reason: String,
    },

    /// 소켓 바인드/수신 에러
    #[error("transport error: {addr}: {reason}")]
    Transport {
        /// 바인드 주소
        addr: String,
        /// 에러 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 채널/큐 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// 저장소 에러
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// 오버플로우 파일 기록/읽기 실패
    #[error("overflow file error: {path}: {reason}")]
    Overflow {
        /// 오버플로우 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 블로킹 작업 태스크 실패
    #[error("task join error: {0}")]
    Join(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    /// JSON 직렬화 에러
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<tokio::task::JoinError> for LogPipelineError {
    fn from(err: tokio::task::JoinError) -> Self {
        LogPipelineError::Join(err.to_string())
    }
}

impl From<LogPipelineError> for IronwatchError {
    fn from(err: LogPipelineError) -> Self {
        match err {
            LogPipelineError::Parse { offset, reason, .. } => {
                IronwatchError::Parse(ParseError::Failed { offset, reason })
            }
            LogPipelineError::UnsupportedFormat(format) => {
                IronwatchError::Parse(ParseError::UnsupportedFormat(format))
            }
            LogPipelineError::RuleLoad { path, reason } => {
                IronwatchError::Detection(DetectionError::RuleSpec { rule: path, reason })
            }
            LogPipelineError::RuleSpec { rule, reason } => {
                IronwatchError::Detection(DetectionError::RuleSpec { rule, reason })
            }
            LogPipelineError::Transport { addr, reason } => {
                IronwatchError::Transport(TransportError::Bind { addr, reason })
            }
            LogPipelineError::Config { field, reason } => {
                IronwatchError::Config(ConfigError::InvalidValue { field, reason })
            }
            LogPipelineError::Channel(reason) => {
                IronwatchError::Pipeline(PipelineError::ChannelSend(reason))
            }
            LogPipelineError::Storage(e) => e.into(),
            LogPipelineError::Io(e) => IronwatchError::Io(e),
            LogPipelineError::Regex(e) => {
                IronwatchError::Detection(DetectionError::Rule(e.to_string()))
            }
            other @ (LogPipelineError::Overflow { .. }
            | LogPipelineError::Join(_)
            | LogPipelineError::Json(_)) => {
                IronwatchError::Pipeline(PipelineError::InitFailed(other.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display() {
        let err = LogPipelineError::Parse {
            format: "web_access".to_owned(),
            offset: 42,
            reason: "unexpected character".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("web_access"));
        assert!(msg.contains("42"));
        assert!(msg.contains("unexpected character"));
    }

    #[test]
    fn rule_load_error_display() {
        let err = LogPipelineError::RuleLoad {
            path: "/etc/ironwatch/rules/test.yml".to_owned(),
            reason: "invalid YAML".to_owned(),
        };
        assert!(err.to_string().contains("test.yml"));
    }

    #[test]
    fn parse_error_converts_to_parse_variant() {
        let err = LogPipelineError::Parse {
            format: "event_json".to_owned(),
            offset: 0,
            reason: "bad".to_owned(),
        };
        let top: IronwatchError = err.into();
        assert!(matches!(top, IronwatchError::Parse(ParseError::Failed { .. })));
    }

    #[test]
    fn rule_spec_converts_to_detection_error() {
        let err = LogPipelineError::RuleSpec {
            rule: "ssh-brute-force".to_owned(),
            reason: "two threshold conditions".to_owned(),
        };
        let top: IronwatchError = err.into();
        assert!(matches!(
            top,
            IronwatchError::Detection(DetectionError::RuleSpec { .. })
        ));
    }

    #[test]
    fn transport_converts_to_bind_error() {
        let err = LogPipelineError::Transport {
            addr: "0.0.0.0:5140".to_owned(),
            reason: "address in use".to_owned(),
        };
        let top: IronwatchError = err.into();
        assert!(matches!(
            top,
            IronwatchError::Transport(TransportError::Bind { .. })
        ));
    }

    #[test]
    fn storage_error_passes_through() {
        let err = LogPipelineError::from(StoreError::LockPoisoned);
        let top: IronwatchError = err.into();
        assert!(matches!(top, IronwatchError::Storage(_)));
    }
}
