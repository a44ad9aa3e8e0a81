//! 저장소 핸들
//!
//! [`Storage`]는 하나의 SQLite 연결을 `Arc<Mutex<_>>`로 감싼 핸들입니다.
//! 모든 쓰기 호출은 이 잠금을 통해 직렬화됩니다 (단일 writer).
//! 처리량 상한은 이 잠금에서 결정되며, 소규모/중규모 환경을 전제로 합니다.
//!
//! API는 동기식입니다. 비동기 워커는 `tokio::task::spawn_blocking`으로 호출합니다.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::Connection;
use tracing::debug;

use crate::error::StoreError;
use crate::models::CountSummary;
use crate::schema;

/// 임베디드 저장소 핸들 (복제 가능, 연결 공유)
#[derive(Clone)]
pub struct Storage {
    conn: Arc<Mutex<Connection>>,
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}

impl Storage {
    /// 파일 기반 저장소를 엽니다. 상위 디렉토리가 없으면 생성합니다.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| StoreError::Path {
                    path: parent.display().to_string(),
                    source,
                })?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        schema::initialize(&conn, true)?;
        debug!(path = %path.display(), "storage opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 메모리 저장소를 엽니다 (테스트, 리플레이 검증용).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn, false)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 잠금을 잡고 연결에 대해 작업을 실행합니다.
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&mut guard)
    }

    /// 전체 건수 요약
    pub fn count_summary(&self) -> Result<CountSummary, StoreError> {
        self.with_conn(|conn| {
            let count = |sql: &str| -> Result<u64, StoreError> {
                let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
                Ok(u64::try_from(n).unwrap_or(0))
            };
            Ok(CountSummary {
                hosts: count("SELECT COUNT(*) FROM host")?,
                entries: count("SELECT COUNT(*) FROM log_entry")?,
                alerts: count("SELECT COUNT(*) FROM alert")?,
                unresolved_alerts: count("SELECT COUNT(*) FROM alert WHERE resolved = 0")?,
                rules: count("SELECT COUNT(*) FROM alert_rule")?,
                unprocessed: count("SELECT COUNT(*) FROM log_entry WHERE processed = 0")?,
                unextracted: count(
                    "SELECT COUNT(*) FROM log_entry WHERE extracted = 0 AND kind != 'unknown'",
                )?,
            })
        })
    }
}
