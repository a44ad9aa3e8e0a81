//! 호스트(자산) 저장소 연산
//!
//! 호스트 식별자는 (hostname, ip) 쌍입니다. 같은 hostname이라도 IP가 다르면
//! 별도의 행이 만들어집니다.

use std::time::SystemTime;

use rusqlite::{Connection, OptionalExtension, params};

use ironwatch_core::types::LogKind;

use crate::error::StoreError;
use crate::models::{HostSummary, from_millis, kind_from_column, to_millis};
use crate::store::Storage;

impl Storage {
    /// 호스트 id를 조회하거나 새로 만듭니다.
    ///
    /// 멱등: 같은 hostname+ip로 다시 호출하면 같은 id를 돌려주고 `last_seen`만 갱신합니다.
    pub fn get_or_create_host(
        &self,
        hostname: &str,
        ip: &str,
        kind: LogKind,
    ) -> Result<i64, StoreError> {
        let now = to_millis(SystemTime::now());
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let id = upsert_host(&tx, hostname, ip, kind, now)?;
            tx.commit()?;
            Ok(id)
        })
    }

    /// 통계를 포함한 호스트 목록 (최근 활동 순)
    pub fn list_hosts(&self) -> Result<Vec<HostSummary>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT h.id, h.hostname, h.ip_address, h.kind, h.first_seen, h.last_seen,
                        (SELECT COUNT(*) FROM log_entry e WHERE e.host_id = h.id),
                        (SELECT COUNT(*) FROM alert a WHERE a.host_id = h.id),
                        (SELECT COUNT(*) FROM alert a WHERE a.host_id = h.id AND a.resolved = 0)
                 FROM host h
                 ORDER BY h.last_seen DESC, h.id ASC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(HostSummary {
                    id: row.get(0)?,
                    hostname: row.get(1)?,
                    ip_address: row.get(2)?,
                    kind: kind_from_column(&row.get::<_, String>(3)?),
                    first_seen: from_millis(row.get(4)?),
                    last_seen: from_millis(row.get(5)?),
                    log_count: row.get::<_, i64>(6)?.max(0) as u64,
                    alert_count: row.get::<_, i64>(7)?.max(0) as u64,
                    unresolved_alerts: row.get::<_, i64>(8)?.max(0) as u64,
                })
            })?;

            let mut hosts = Vec::new();
            for row in rows {
                hosts.push(row?);
            }
            Ok(hosts)
        })
    }
}

/// 트랜잭션 안에서 호스트를 조회/생성합니다.
///
/// 유형 태그는 처음 본 레코드의 종류로 고정됩니다.
pub(crate) fn upsert_host(
    conn: &Connection,
    hostname: &str,
    ip: &str,
    kind: LogKind,
    seen_millis: i64,
) -> Result<i64, StoreError> {
    if hostname.trim().is_empty() {
        return Err(StoreError::InvalidArgument(
            "hostname must not be empty".to_owned(),
        ));
    }

    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM host WHERE hostname = ?1 AND ip_address = ?2",
            params![hostname, ip],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        Some(id) => {
            conn.execute(
                "UPDATE host SET last_seen = MAX(last_seen, ?1) WHERE id = ?2",
                params![seen_millis, id],
            )?;
            Ok(id)
        }
        None => {
            conn.execute(
                "INSERT INTO host (hostname, ip_address, kind, first_seen, last_seen)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![hostname, ip, kind.as_str(), seen_millis],
            )?;
            Ok(conn.last_insert_rowid())
        }
    }
}
