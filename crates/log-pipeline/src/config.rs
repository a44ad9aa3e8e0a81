//! 수집 파이프라인 설정
//!
//! [`PipelineConfig`]는 core의 `[listener]`, `[batch]` 섹션을 기반으로
//! 수신 루프와 배치 라이터가 사용하는 설정을 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use ironwatch_core::config::IronwatchConfig;
//! use ironwatch_log_pipeline::config::PipelineConfig;
//!
//! let core_config = IronwatchConfig::default();
//! let config = PipelineConfig::from_core(&core_config);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ironwatch_core::config::{IronwatchConfig, MAX_BATCH_SIZE, MAX_DATAGRAM_SIZE, MAX_QUEUE_CAPACITY};

use crate::error::LogPipelineError;

/// 수신 큐가 가득 찼을 때의 처리 정책
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// 가장 오래된 레코드를 버리고 새 레코드를 넣음 (기본값)
    #[default]
    DropOldest,
    /// 공간이 생길 때까지 제한 시간만큼 대기, 시간 초과 시 새 레코드를 버림
    Block,
}

impl BackpressurePolicy {
    /// 설정 문자열에서 정책을 파싱합니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "drop_oldest" | "oldest" => Some(Self::DropOldest),
            "block" => Some(Self::Block),
            _ => None,
        }
    }
}

/// 수집 파이프라인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// UDP 바인드 주소 (예: "0.0.0.0:5140")
    pub bind_addr: String,
    /// 데이터그램 최대 크기 (바이트)
    pub max_datagram_size: usize,
    /// 수신 큐 용량
    pub queue_capacity: usize,
    /// 큐 포화 시 정책
    pub backpressure: BackpressurePolicy,
    /// `Block` 정책의 최대 대기 시간 (밀리초)
    pub send_timeout_ms: u64,
    /// 배치 크기 (이 개수만큼 모이면 플러시)
    pub batch_size: usize,
    /// 가장 오래된 엔트리 기준 플러시 제한 시간 (밀리초)
    pub batch_timeout_ms: u64,
    /// 플러시 조건 점검 주기 (밀리초)
    pub tick_ms: u64,
    /// 오버플로우 NDJSON 파일 경로
    pub overflow_path: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5140".to_owned(),
            max_datagram_size: MAX_DATAGRAM_SIZE,
            queue_capacity: 10_000,
            backpressure: BackpressurePolicy::DropOldest,
            send_timeout_ms: 100,
            batch_size: 100,
            batch_timeout_ms: 5_000,
            tick_ms: 500,
            overflow_path: PathBuf::from("overflow.ndjson"),
        }
    }
}

impl PipelineConfig {
    /// core 설정에서 파이프라인 설정을 생성합니다.
    ///
    /// 상대 경로는 `general.data_dir` 기준으로 해석됩니다.
    pub fn from_core(core: &IronwatchConfig) -> Self {
        Self {
            bind_addr: core.listener.socket_addr(),
            max_datagram_size: core.listener.max_datagram_size,
            queue_capacity: core.listener.queue_capacity,
            backpressure: BackpressurePolicy::from_str_loose(&core.listener.backpressure)
                .unwrap_or_default(),
            send_timeout_ms: core.listener.send_timeout_ms,
            batch_size: core.batch.batch_size,
            batch_timeout_ms: core.batch.batch_timeout_ms,
            tick_ms: core.batch.tick_ms,
            overflow_path: core.overflow_path(),
        }
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LogPipelineError> {
        if self.bind_addr.trim().is_empty() {
            return Err(LogPipelineError::Config {
                field: "bind_addr".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        if self.max_datagram_size == 0 || self.max_datagram_size > MAX_DATAGRAM_SIZE {
            return Err(LogPipelineError::Config {
                field: "max_datagram_size".to_owned(),
                reason: format!("must be 1-{MAX_DATAGRAM_SIZE}"),
            });
        }

        if self.queue_capacity == 0 || self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(LogPipelineError::Config {
                field: "queue_capacity".to_owned(),
                reason: format!("must be 1-{MAX_QUEUE_CAPACITY}"),
            });
        }

        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(LogPipelineError::Config {
                field: "batch_size".to_owned(),
                reason: format!("must be 1-{MAX_BATCH_SIZE}"),
            });
        }

        if self.batch_timeout_ms == 0 {
            return Err(LogPipelineError::Config {
                field: "batch_timeout_ms".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.tick_ms == 0 || self.tick_ms > self.batch_timeout_ms {
            return Err(LogPipelineError::Config {
                field: "tick_ms".to_owned(),
                reason: format!("must be 1-{} (batch_timeout_ms)", self.batch_timeout_ms),
            });
        }

        if self.overflow_path.as_os_str().is_empty() {
            return Err(LogPipelineError::Config {
                field: "overflow_path".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        Ok(())
    }
}

/// 파이프라인 설정 빌더
#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 바인드 주소를 설정합니다.
    pub fn bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.bind_addr = addr.into();
        self
    }

    /// 수신 큐 용량을 설정합니다.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// 큐 포화 정책을 설정합니다.
    pub fn backpressure(mut self, policy: BackpressurePolicy) -> Self {
        self.config.backpressure = policy;
        self
    }

    /// 배치 크기를 설정합니다.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// 배치 제한 시간을 설정합니다.
    pub fn batch_timeout_ms(mut self, ms: u64) -> Self {
        self.config.batch_timeout_ms = ms;
        self
    }

    /// 플러시 점검 주기를 설정합니다.
    pub fn tick_ms(mut self, ms: u64) -> Self {
        self.config.tick_ms = ms;
        self
    }

    /// 오버플로우 파일 경로를 설정합니다.
    pub fn overflow_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.overflow_path = path.into();
        self
    }

    /// 설정을 검증하고 생성합니다.
    pub fn build(self) -> Result<PipelineConfig, LogPipelineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
