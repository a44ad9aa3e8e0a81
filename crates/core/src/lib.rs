//! ironwatch-core -- 공통 타입, trait, 에러, 설정
//!
//! 모든 ironwatch 크레이트가 공유하는 기반 모듈입니다.
//!
//! - [`types`]: 로그 종류, 정규화된 엔트리, 상세 레코드, 심각도
//! - [`pipeline`]: 파서 trait과 장기 실행 모듈 trait
//! - [`config`]: `ironwatch.toml` 설정
//! - [`error`]: 도메인별 에러
//! - [`metrics`]: Prometheus 메트릭 이름
//! - [`status`]: 데몬 상태 스냅샷 (`status.json`)

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod status;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{
    ConfigError, DetectionError, IronwatchError, ParseError, PipelineError, StorageError,
    TransportError,
};

// 설정
pub use config::IronwatchConfig;

// 파이프라인 trait
pub use pipeline::{DynPipeline, HealthStatus, LogParser, Pipeline, WorkerStatus};

// 상태 스냅샷
pub use status::{DaemonStatus, ModuleStatus};

// 도메인 타입
pub use types::{
    LinuxDetail, LogDetail, LogEntry, LogKind, NginxDetail, ParsedLog, Severity, WindowsDetail,
};
