//! 데몬 상태 스냅샷
//!
//! 데몬은 주기적으로 [`DaemonStatus`]를 `<data_dir>/status.json`에 기록하고,
//! CLI `status` 명령과 외부 대시보드는 이 파일을 읽습니다.
//! 쓰기는 임시 파일에 기록한 뒤 rename하므로 읽는 쪽은 항상 완전한 JSON을 봅니다.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::IronwatchError;
use crate::pipeline::{HealthStatus, WorkerStatus};

/// 모듈 하나의 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleStatus {
    /// 모듈 이름 (`ingestion`, `detection`, `extraction`)
    pub name: String,
    pub running: bool,
    pub health: HealthStatus,
    /// (카운터 이름, 값)
    pub counters: Vec<(String, u64)>,
}

impl ModuleStatus {
    /// 헬스 상태와 워커 스냅샷으로 모듈 상태를 만듭니다.
    pub fn new(name: impl Into<String>, health: HealthStatus, worker: WorkerStatus) -> Self {
        Self {
            name: name.into(),
            running: worker.running,
            health,
            counters: worker.counters,
        }
    }

    pub fn counter(&self, name: &str) -> Option<u64> {
        self.counters
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| *v)
    }
}

/// 데몬 전체 상태 스냅샷
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// 데몬 프로세스 ID
    pub pid: u32,
    /// 시작 이후 경과 시간 (초)
    pub uptime_secs: u64,
    /// 스냅샷 작성 시각 (UNIX 초)
    pub written_at: u64,
    /// 모듈 중 가장 나쁜 헬스 상태
    pub health: HealthStatus,
    /// 시작 순서대로 정렬된 모듈 상태
    pub modules: Vec<ModuleStatus>,
}

impl DaemonStatus {
    /// 이름으로 모듈 상태를 찾습니다.
    pub fn module(&self, name: &str) -> Option<&ModuleStatus> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// 스냅샷을 원자적으로 기록합니다 (같은 디렉토리의 임시 파일 + rename).
    pub async fn write_atomic(&self, path: impl AsRef<Path>) -> Result<(), IronwatchError> {
        let path = path.as_ref();
        let body = serde_json::to_vec_pretty(self).map_err(std::io::Error::from)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// 스냅샷 파일을 읽습니다.
    pub async fn read(path: impl AsRef<Path>) -> Result<Self, IronwatchError> {
        let content = tokio::fs::read(path.as_ref()).await?;
        let status = serde_json::from_slice(&content).map_err(std::io::Error::from)?;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DaemonStatus {
        DaemonStatus {
            pid: 4242,
            uptime_secs: 90,
            written_at: 1_765_000_000,
            health: HealthStatus::Degraded("ingestion: queue 95% full".to_owned()),
            modules: vec![
                ModuleStatus {
                    name: "ingestion".to_owned(),
                    running: true,
                    health: HealthStatus::Degraded("queue 95% full".to_owned()),
                    counters: vec![("received".to_owned(), 10), ("saved".to_owned(), 9)],
                },
                ModuleStatus {
                    name: "detection".to_owned(),
                    running: false,
                    health: HealthStatus::Unhealthy("stopped".to_owned()),
                    counters: vec![],
                },
            ],
        }
    }

    #[tokio::test]
    async fn write_then_read_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("status.json");

        sample().write_atomic(&path).await.unwrap();
        let loaded = DaemonStatus::read(&path).await.unwrap();

        assert_eq!(loaded, sample());
        assert_eq!(loaded.module("ingestion").unwrap().counter("saved"), Some(9));
        assert!(loaded.module("extraction").is_none());
        assert!(!dir.path().join("nested").join("status.json.tmp").exists());
    }

    #[tokio::test]
    async fn overwrite_replaces_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");

        sample().write_atomic(&path).await.unwrap();
        let mut next = sample();
        next.uptime_secs = 120;
        next.write_atomic(&path).await.unwrap();

        assert_eq!(DaemonStatus::read(&path).await.unwrap().uptime_secs, 120);
    }

    #[tokio::test]
    async fn read_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DaemonStatus::read(dir.path().join("absent.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, IronwatchError::Io(_)));
    }

    #[test]
    fn health_serializes_with_reason() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["health"]["state"], "degraded");
        assert_eq!(json["modules"][1]["health"]["reason"], "stopped");
    }
}
