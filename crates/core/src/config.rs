//! 설정 관리 -- ironwatch.toml 파싱 및 런타임 설정
//!
//! [`IronwatchConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`IRONWATCH_LISTENER_PORT=5514` 형식)
//! 3. 설정 파일 (`ironwatch.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), ironwatch_core::error::IronwatchError> {
//! use ironwatch_core::config::IronwatchConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = IronwatchConfig::load("ironwatch.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = IronwatchConfig::parse("[batch]\nbatch_size = 50")?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, IronwatchError};

/// 최대 배치 크기
pub const MAX_BATCH_SIZE: usize = 10_000;
/// 최대 수신 큐 용량
pub const MAX_QUEUE_CAPACITY: usize = 1_000_000;
/// UDP 데이터그램 최대 크기
pub const MAX_DATAGRAM_SIZE: usize = 65_535;
/// 폴링 주기 상한 (초)
pub const MAX_POLL_INTERVAL_SECS: u64 = 3_600;

/// Ironwatch 통합 설정
///
/// `ironwatch.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IronwatchConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// UDP 수신기 설정
    #[serde(default)]
    pub listener: ListenerConfig,
    /// 배치 라이터 설정
    #[serde(default)]
    pub batch: BatchConfig,
    /// 저장소 설정
    #[serde(default)]
    pub storage: StorageConfig,
    /// 탐지 엔진 설정
    #[serde(default)]
    pub detection: DetectionConfig,
    /// 필드 추출 워커 설정
    #[serde(default)]
    pub extraction: ExtractionConfig,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl IronwatchConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, IronwatchError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, IronwatchError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IronwatchError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                IronwatchError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, IronwatchError> {
        toml::from_str(toml_str).map_err(|e| {
            IronwatchError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `IRONWATCH_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "IRONWATCH_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "IRONWATCH_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.data_dir, "IRONWATCH_GENERAL_DATA_DIR");
        override_string(&mut self.general.pid_file, "IRONWATCH_GENERAL_PID_FILE");

        // Listener
        override_bool(&mut self.listener.enabled, "IRONWATCH_LISTENER_ENABLED");
        override_string(&mut self.listener.bind, "IRONWATCH_LISTENER_BIND");
        override_u16(&mut self.listener.port, "IRONWATCH_LISTENER_PORT");
        override_usize(
            &mut self.listener.max_datagram_size,
            "IRONWATCH_LISTENER_MAX_DATAGRAM_SIZE",
        );
        override_usize(
            &mut self.listener.queue_capacity,
            "IRONWATCH_LISTENER_QUEUE_CAPACITY",
        );
        override_string(
            &mut self.listener.backpressure,
            "IRONWATCH_LISTENER_BACKPRESSURE",
        );
        override_u64(
            &mut self.listener.send_timeout_ms,
            "IRONWATCH_LISTENER_SEND_TIMEOUT_MS",
        );

        // Batch
        override_usize(&mut self.batch.batch_size, "IRONWATCH_BATCH_BATCH_SIZE");
        override_u64(
            &mut self.batch.batch_timeout_ms,
            "IRONWATCH_BATCH_BATCH_TIMEOUT_MS",
        );
        override_u64(&mut self.batch.tick_ms, "IRONWATCH_BATCH_TICK_MS");
        override_string(
            &mut self.batch.overflow_path,
            "IRONWATCH_BATCH_OVERFLOW_PATH",
        );

        // Storage
        override_string(&mut self.storage.path, "IRONWATCH_STORAGE_PATH");
        override_u64(
            &mut self.storage.busy_timeout_ms,
            "IRONWATCH_STORAGE_BUSY_TIMEOUT_MS",
        );

        // Detection
        override_bool(&mut self.detection.enabled, "IRONWATCH_DETECTION_ENABLED");
        override_u64(
            &mut self.detection.poll_interval_secs,
            "IRONWATCH_DETECTION_POLL_INTERVAL_SECS",
        );
        override_usize(
            &mut self.detection.max_per_cycle,
            "IRONWATCH_DETECTION_MAX_PER_CYCLE",
        );
        override_string(&mut self.detection.rule_dir, "IRONWATCH_DETECTION_RULE_DIR");
        override_usize(
            &mut self.detection.max_threshold_keys,
            "IRONWATCH_DETECTION_MAX_THRESHOLD_KEYS",
        );

        // Extraction
        override_bool(&mut self.extraction.enabled, "IRONWATCH_EXTRACTION_ENABLED");
        override_u64(
            &mut self.extraction.poll_interval_secs,
            "IRONWATCH_EXTRACTION_POLL_INTERVAL_SECS",
        );
        override_usize(
            &mut self.extraction.batch_size,
            "IRONWATCH_EXTRACTION_BATCH_SIZE",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "IRONWATCH_METRICS_ENABLED");
        override_string(
            &mut self.metrics.listen_addr,
            "IRONWATCH_METRICS_LISTEN_ADDR",
        );
        override_u16(&mut self.metrics.port, "IRONWATCH_METRICS_PORT");
        override_string(&mut self.metrics.endpoint, "IRONWATCH_METRICS_ENDPOINT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), IronwatchError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        self.listener.validate()?;
        self.batch.validate()?;

        if self.storage.path.is_empty() {
            return Err(invalid("storage.path", "must not be empty".to_owned()));
        }

        check_interval("detection.poll_interval_secs", self.detection.poll_interval_secs)?;
        if self.detection.max_per_cycle == 0 {
            return Err(invalid(
                "detection.max_per_cycle",
                "must be greater than 0".to_owned(),
            ));
        }
        if self.detection.max_threshold_keys == 0 {
            return Err(invalid(
                "detection.max_threshold_keys",
                "must be greater than 0".to_owned(),
            ));
        }

        check_interval(
            "extraction.poll_interval_secs",
            self.extraction.poll_interval_secs,
        )?;
        if self.extraction.batch_size == 0 || self.extraction.batch_size > MAX_BATCH_SIZE {
            return Err(invalid(
                "extraction.batch_size",
                format!("must be between 1 and {MAX_BATCH_SIZE}"),
            ));
        }

        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(invalid("metrics.port", "must not be 0".to_owned()));
            }
            if !self.metrics.endpoint.starts_with('/') {
                return Err(invalid(
                    "metrics.endpoint",
                    "must start with '/'".to_owned(),
                ));
            }
        }

        Ok(())
    }

    /// `data_dir` 기준으로 상대 경로를 해석합니다.
    pub fn resolve_data_path(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            Path::new(&self.general.data_dir).join(candidate)
        }
    }

    /// 데이터베이스 파일 경로
    pub fn storage_path(&self) -> PathBuf {
        self.resolve_data_path(&self.storage.path)
    }

    /// 오버플로 파일 경로
    pub fn overflow_path(&self) -> PathBuf {
        self.resolve_data_path(&self.batch.overflow_path)
    }

    /// 데몬 상태 스냅샷 파일 경로
    pub fn status_path(&self) -> PathBuf {
        Path::new(&self.general.data_dir).join("status.json")
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 데이터 디렉토리
    pub data_dir: String,
    /// PID 파일 경로
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            data_dir: "/var/lib/ironwatch".to_owned(),
            pid_file: "/var/run/ironwatch.pid".to_owned(),
        }
    }
}

/// UDP 수신기 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub bind: String,
    /// 수신 포트
    pub port: u16,
    /// 데이터그램 최대 크기 (바이트)
    pub max_datagram_size: usize,
    /// 수신 큐 용량
    pub queue_capacity: usize,
    /// 큐가 가득 찼을 때 정책 (drop_oldest, block)
    pub backpressure: String,
    /// block 정책에서 최대 대기 시간 (밀리초)
    pub send_timeout_ms: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "0.0.0.0".to_owned(),
            port: 5140,
            max_datagram_size: MAX_DATAGRAM_SIZE,
            queue_capacity: 10_000,
            backpressure: "drop_oldest".to_owned(),
            send_timeout_ms: 100,
        }
    }
}

impl ListenerConfig {
    /// `bind:port` 형식의 소켓 주소 문자열
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    fn validate(&self) -> Result<(), IronwatchError> {
        if self.port == 0 {
            return Err(invalid("listener.port", "must not be 0".to_owned()));
        }
        if self.max_datagram_size == 0 || self.max_datagram_size > MAX_DATAGRAM_SIZE {
            return Err(invalid(
                "listener.max_datagram_size",
                format!("must be between 1 and {MAX_DATAGRAM_SIZE}"),
            ));
        }
        if self.queue_capacity == 0 || self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(invalid(
                "listener.queue_capacity",
                format!("must be between 1 and {MAX_QUEUE_CAPACITY}"),
            ));
        }
        let valid_policies = ["drop_oldest", "block"];
        if !valid_policies.contains(&self.backpressure.as_str()) {
            return Err(invalid(
                "listener.backpressure",
                format!("must be one of: {}", valid_policies.join(", ")),
            ));
        }
        Ok(())
    }
}

/// 배치 라이터 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// 이 개수에 도달하면 즉시 플러시
    pub batch_size: usize,
    /// 가장 오래된 엔트리가 이 시간(밀리초)을 넘기면 플러시
    pub batch_timeout_ms: u64,
    /// 타임아웃 검사 주기 (밀리초)
    pub tick_ms: u64,
    /// 저장 실패 시 기록할 NDJSON 파일 (data_dir 기준 상대 경로 허용)
    pub overflow_path: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            batch_timeout_ms: 5_000,
            tick_ms: 500,
            overflow_path: "overflow.ndjson".to_owned(),
        }
    }
}

impl BatchConfig {
    fn validate(&self) -> Result<(), IronwatchError> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(invalid(
                "batch.batch_size",
                format!("must be between 1 and {MAX_BATCH_SIZE}"),
            ));
        }
        if self.batch_timeout_ms == 0 {
            return Err(invalid(
                "batch.batch_timeout_ms",
                "must be greater than 0".to_owned(),
            ));
        }
        if self.tick_ms == 0 || self.tick_ms > self.batch_timeout_ms {
            return Err(invalid(
                "batch.tick_ms",
                "must be between 1 and batch_timeout_ms".to_owned(),
            ));
        }
        if self.overflow_path.is_empty() {
            return Err(invalid(
                "batch.overflow_path",
                "must not be empty".to_owned(),
            ));
        }
        Ok(())
    }
}

/// 저장소 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite 파일 경로 (data_dir 기준 상대 경로 허용)
    pub path: String,
    /// 잠금 대기 시간 (밀리초)
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "ironwatch.db".to_owned(),
            busy_timeout_ms: 5_000,
        }
    }
}

/// 탐지 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 폴링 주기 (초)
    pub poll_interval_secs: u64,
    /// 사이클당 최대 처리 엔트리 수
    pub max_per_cycle: usize,
    /// 시작 시 가져올 YAML 룰 디렉토리 (빈 문자열이면 건너뜀)
    pub rule_dir: String,
    /// 임계값 카운터 최대 키 수
    pub max_threshold_keys: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: 5,
            max_per_cycle: 500,
            rule_dir: String::new(),
            max_threshold_keys: 100_000,
        }
    }
}

/// 필드 추출 워커 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 폴링 주기 (초)
    pub poll_interval_secs: u64,
    /// 사이클당 처리 엔트리 수
    pub batch_size: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: 10,
            batch_size: 50,
        }
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 리스너 주소
    pub listen_addr: String,
    /// 리스너 포트
    pub port: u16,
    /// 노출 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

fn invalid(field: &str, reason: String) -> IronwatchError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

fn check_interval(field: &str, secs: u64) -> Result<(), IronwatchError> {
    if secs == 0 || secs > MAX_POLL_INTERVAL_SECS {
        return Err(invalid(
            field,
            format!("must be between 1 and {MAX_POLL_INTERVAL_SECS}"),
        ));
    }
    Ok(())
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    override_parsed(target, env_key, "bool");
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key, "usize");
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key, "u16");
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key, "u64");
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str, type_name: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                expected = type_name,
                "failed to parse env var, ignoring"
            ),
        }
    }
}
