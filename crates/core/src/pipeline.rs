//! 파이프라인 trait -- 모듈 확장 포인트 정의
//!
//! - [`LogParser`]: 디스패처에 등록되는 형식별 파서
//! - [`Pipeline`] / [`DynPipeline`]: 데몬이 시작/정지/상태 조회하는 장기 실행 루프

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::IronwatchError;
use crate::types::{LogKind, ParsedLog};

/// 로그 파서 trait
///
/// 새로운 로그 형식을 지원하려면 이 trait을 구현하고 디스패처의
/// 우선순위 목록에 등록합니다. 디스패치 로직은 바뀌지 않습니다.
pub trait LogParser: Send + Sync {
    /// 이 파서가 생성하는 대표 종류
    fn kind(&self) -> LogKind;

    /// 지원하는 로그 형식 이름
    fn format_name(&self) -> &str;

    /// 이 파서가 입력을 처리할 수 있는지 빠르게 판별
    fn probe(&self, payload: &str) -> bool;

    /// 입력을 구조화 필드로 파싱
    fn parse(&self, payload: &str) -> Result<ParsedLog, IronwatchError>;
}

/// 모듈 헬스 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 동작하지만 일부 기능 저하
    Degraded(String),
    /// 동작 불가
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// 루프 하나의 상태 스냅샷
///
/// `running`은 루프 태스크가 실제로 종료되었을 때만 false가 됩니다.
/// 오류가 발생했지만 계속 도는 루프는 `errors` 계열 카운터만 증가합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub running: bool,
    /// (카운터 이름, 값) -- 순서 유지
    pub counters: Vec<(String, u64)>,
}

impl WorkerStatus {
    /// 카운터 값을 이름으로 조회합니다.
    pub fn counter(&self, name: &str) -> Option<u64> {
        self.counters
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| *v)
    }
}

/// 시작/정지 가능한 장기 실행 모듈
pub trait Pipeline: Send {
    /// 백그라운드 태스크를 시작합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), IronwatchError>> + Send;

    /// 태스크를 정지하고 종료를 기다립니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), IronwatchError>> + Send;

    /// 현재 헬스 상태
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;

    /// 실행 여부와 카운터 스냅샷
    fn status(&self) -> WorkerStatus;
}

/// 박싱된 future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 트레잇 객체로 사용할 수 있는 [`Pipeline`]
///
/// 모든 `Pipeline` 구현체에 대해 자동으로 구현됩니다.
pub trait DynPipeline: Send {
    fn start(&mut self) -> BoxFuture<'_, Result<(), IronwatchError>>;
    fn stop(&mut self) -> BoxFuture<'_, Result<(), IronwatchError>>;
    fn health_check(&self) -> BoxFuture<'_, HealthStatus>;
    fn status(&self) -> WorkerStatus;
}

impl<T> DynPipeline for T
where
    T: Pipeline + Sync,
{
    fn start(&mut self) -> BoxFuture<'_, Result<(), IronwatchError>> {
        Box::pin(Pipeline::start(self))
    }

    fn stop(&mut self) -> BoxFuture<'_, Result<(), IronwatchError>> {
        Box::pin(Pipeline::stop(self))
    }

    fn health_check(&self) -> BoxFuture<'_, HealthStatus> {
        Box::pin(Pipeline::health_check(self))
    }

    fn status(&self) -> WorkerStatus {
        Pipeline::status(self)
    }
}
