//! ironwatch-log-pipeline -- 로그 수신, 정규화, 배치 저장, 탐지, 필드 추출
//!
//! # 모듈 구성
//!
//! - [`collector`]: UDP 데이터그램 수신 (데이터그램 하나 = 원시 레코드 하나)
//! - [`buffer`]: 수신 루프와 디스패처 사이의 유한 큐 (backpressure 정책)
//! - [`parser`]: 이벤트 JSON, 웹 접근 로그, 범용 라인 파서와 우선순위 디스패처
//! - [`writer`]: 크기/시간 기준 배치 저장, 실패 시 오버플로우 파일 기록
//! - [`overflow`]: 저장하지 못한 레코드의 NDJSON 파일
//! - [`rule`]: YAML 규칙, 조건 매칭, threshold 카운터
//! - [`detection`]: 미처리 엔트리를 폴링하여 알림을 만드는 탐지 엔진
//! - [`extract`] / [`extraction`]: 종류별 상세 레코드 추출과 백필 워커
//! - [`worker`]: 탐지/추출이 공유하는 폴링 루프
//! - [`pipeline`]: 수신부터 저장까지의 오케스트레이션 (Pipeline trait 구현)
//! - [`stats`]: 루프별 카운터
//! - [`config`]: 파이프라인 설정 (core 설정 확장)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! UDP -> IntakeQueue -> ParserRouter -> BatchWriter -> Storage <- DetectionEngine -> alerts
//!                            |               |            ^
//!                            +---> overflow <+            +---- ExtractionWorker
//! ```

pub mod buffer;
pub mod config;
pub mod detection;
pub mod error;
pub mod extract;
pub mod extraction;
pub mod overflow;
pub mod pipeline;
pub mod stats;
pub mod worker;
pub mod writer;

pub mod collector;
pub mod parser;
pub mod rule;

// --- 주요 타입 re-export ---

// 파이프라인
pub use pipeline::{IngestionPipeline, IngestionPipelineBuilder};

// 폴링 루프
pub use detection::{CycleReport, DetectionEngine};
pub use extraction::ExtractionWorker;
pub use worker::{PollCycle, PollingWorker};

// 설정
pub use config::{BackpressurePolicy, PipelineConfig, PipelineConfigBuilder};

// 에러
pub use error::LogPipelineError;

// 파서
pub use parser::{Dispatched, EventJsonParser, GenericLineParser, ParserRouter, WebAccessParser};

// 규칙 엔진
pub use rule::{RuleDefinition, RuleEngine, RuleLoader, RuleMatch};

// 수집기
pub use collector::{RawRecord, UdpListener};

// 배치 저장
pub use buffer::IntakeQueue;
pub use overflow::{OverflowFile, OverflowRecord};
pub use stats::{DetectionStats, ExtractionStats, IngestStats};
pub use writer::{BatchWriter, FlushOutcome};

// 필드 추출
pub use extract::FieldExtractor;
