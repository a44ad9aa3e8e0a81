//! 로그 엔트리와 상세 레코드 저장소 연산

use std::collections::HashMap;

use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

use ironwatch_core::types::{
    LinuxDetail, LogDetail, LogEntry, LogKind, NginxDetail, WindowsDetail,
};

use crate::error::StoreError;
use crate::hosts::upsert_host;
use crate::models::{
    LogFilter, ProcessingFlag, StoredEntry, clamp_limit, from_millis, kind_from_column, to_millis,
};
use crate::store::Storage;

const ENTRY_COLUMNS: &str = "e.id, e.host_id, h.hostname, e.kind, e.source_ip, e.event_time,
     e.received_at, e.raw, e.fields, e.processed, e.extracted";

impl Storage {
    /// 배치를 하나의 트랜잭션으로 저장합니다.
    ///
    /// 각 엔트리의 호스트를 조회/생성하고, 파서가 상세 레코드를 만들었다면 함께 기록합니다.
    /// 상세 레코드가 함께 기록된 엔트리는 추출 완료로 표시됩니다.
    /// 실패하면 전체 배치가 롤백됩니다.
    pub fn insert_entries(&self, entries: &[LogEntry]) -> Result<usize, StoreError> {
        if entries.is_empty() {
            return Ok(0);
        }

        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut host_ids: HashMap<(&str, String), i64> = HashMap::new();
            let mut inserted = 0usize;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO log_entry
                        (host_id, kind, event_time, received_at, source_ip, raw, fields, extracted)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )?;

                for entry in entries {
                    let ip = entry.source_ip.to_string();
                    let received = to_millis(entry.received_at);
                    let host_id = match host_ids.get(&(entry.hostname.as_str(), ip.clone())) {
                        Some(id) => {
                            tx.execute(
                                "UPDATE host SET last_seen = MAX(last_seen, ?1) WHERE id = ?2",
                                params![received, id],
                            )?;
                            *id
                        }
                        None => {
                            let id = upsert_host(&tx, &entry.hostname, &ip, entry.kind, received)?;
                            host_ids.insert((entry.hostname.as_str(), ip.clone()), id);
                            id
                        }
                    };

                    let fields = serde_json::to_string(&entry.fields)?;
                    stmt.execute(params![
                        host_id,
                        entry.kind.as_str(),
                        to_millis(entry.event_time),
                        received,
                        ip,
                        entry.raw,
                        fields,
                        entry.detail.is_some(),
                    ])?;
                    let entry_id = tx.last_insert_rowid();

                    if let Some(detail) = &entry.detail {
                        write_detail(&tx, entry_id, detail)?;
                    }
                    inserted += 1;
                }
            }
            tx.commit()?;
            Ok(inserted)
        })
    }

    /// 아직 처리되지 않은 엔트리를 오래된 순으로 가져옵니다.
    ///
    /// `flag`에 따라 탐지(`processed`) 또는 추출(`extracted`) 커서를 사용합니다.
    pub fn fetch_unprocessed(
        &self,
        flag: ProcessingFlag,
        kind: Option<LogKind>,
        limit: usize,
    ) -> Result<Vec<StoredEntry>, StoreError> {
        let mut sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM log_entry e JOIN host h ON h.id = e.host_id
             WHERE e.{} = 0",
            flag.column()
        );
        let mut values: Vec<Value> = Vec::new();
        if let Some(kind) = kind {
            sql.push_str(" AND e.kind = ?");
            values.push(Value::Text(kind.as_str().to_owned()));
        }
        sql.push_str(" ORDER BY e.id ASC LIMIT ?");
        values.push(Value::Integer(clamp_limit(limit)));

        self.with_conn(|conn| query_entries(conn, &sql, values))
    }

    /// 탐지 완료로 표시합니다. 실제로 갱신된 행 수를 돌려줍니다.
    pub fn mark_processed(&self, entry_ids: &[i64]) -> Result<usize, StoreError> {
        self.mark(ProcessingFlag::Processed, entry_ids)
    }

    /// 추출 완료로 표시합니다.
    pub fn mark_extracted(&self, entry_ids: &[i64]) -> Result<usize, StoreError> {
        self.mark(ProcessingFlag::Extracted, entry_ids)
    }

    fn mark(&self, flag: ProcessingFlag, entry_ids: &[i64]) -> Result<usize, StoreError> {
        if entry_ids.is_empty() {
            return Ok(0);
        }
        let sql = format!("UPDATE log_entry SET {} = 1 WHERE id = ?1", flag.column());
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut updated = 0;
            {
                let mut stmt = tx.prepare_cached(&sql)?;
                for id in entry_ids {
                    updated += stmt.execute(params![id])?;
                }
            }
            tx.commit()?;
            Ok(updated)
        })
    }

    /// 상세 레코드를 기록합니다. 이미 있으면 교체합니다.
    pub fn insert_detail(&self, entry_id: i64, detail: &LogDetail) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            write_detail(&tx, entry_id, detail)?;
            tx.commit()?;
            Ok(())
        })
    }

    /// 조건에 맞는 로그를 최신 순으로 조회합니다.
    pub fn query_logs(&self, filter: &LogFilter) -> Result<Vec<StoredEntry>, StoreError> {
        let mut sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM log_entry e JOIN host h ON h.id = e.host_id WHERE 1 = 1"
        );
        let mut values: Vec<Value> = Vec::new();
        if let Some(kind) = filter.kind {
            sql.push_str(" AND e.kind = ?");
            values.push(Value::Text(kind.as_str().to_owned()));
        }
        if let Some(host_id) = filter.host_id {
            sql.push_str(" AND e.host_id = ?");
            values.push(Value::Integer(host_id));
        }
        if let Some(since) = filter.since {
            sql.push_str(" AND e.received_at >= ?");
            values.push(Value::Integer(to_millis(since)));
        }
        if let Some(until) = filter.until {
            sql.push_str(" AND e.received_at <= ?");
            values.push(Value::Integer(to_millis(until)));
        }
        sql.push_str(" ORDER BY e.received_at DESC, e.id DESC LIMIT ? OFFSET ?");
        values.push(Value::Integer(clamp_limit(filter.limit)));
        values.push(Value::Integer(
            i64::try_from(filter.offset).unwrap_or(i64::MAX),
        ));

        self.with_conn(|conn| query_entries(conn, &sql, values))
    }

    /// id로 엔트리 하나를 조회합니다.
    pub fn get_entry(&self, entry_id: i64) -> Result<Option<StoredEntry>, StoreError> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM log_entry e JOIN host h ON h.id = e.host_id WHERE e.id = ?"
        );
        self.with_conn(|conn| {
            let mut entries = query_entries(conn, &sql, vec![Value::Integer(entry_id)])?;
            Ok(entries.pop())
        })
    }
}

fn query_entries(
    conn: &Connection,
    sql: &str,
    values: Vec<Value>,
) -> Result<Vec<StoredEntry>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params_from_iter(values), read_entry_row)?;

    let mut entries = Vec::new();
    for row in rows {
        let (mut entry, fields_json) = row?;
        entry.fields = serde_json::from_str(&fields_json).unwrap_or_default();
        entry.detail = read_detail(conn, entry.id, entry.kind)?;
        entries.push(entry);
    }
    Ok(entries)
}

fn read_entry_row(row: &Row<'_>) -> rusqlite::Result<(StoredEntry, String)> {
    let entry = StoredEntry {
        id: row.get(0)?,
        host_id: row.get(1)?,
        hostname: row.get(2)?,
        kind: kind_from_column(&row.get::<_, String>(3)?),
        source_ip: row.get(4)?,
        event_time: from_millis(row.get(5)?),
        received_at: from_millis(row.get(6)?),
        raw: row.get(7)?,
        fields: Vec::new(),
        detail: None,
        processed: row.get(9)?,
        extracted: row.get(10)?,
    };
    Ok((entry, row.get(8)?))
}

pub(crate) fn write_detail(
    conn: &Connection,
    entry_id: i64,
    detail: &LogDetail,
) -> Result<(), StoreError> {
    match detail {
        LogDetail::Linux(d) => {
            conn.execute(
                "INSERT OR REPLACE INTO linux_log_detail
                    (log_entry_id, app_name, pid, message, ssh_action, ssh_user, ssh_ip)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entry_id,
                    d.app_name,
                    d.pid,
                    d.message,
                    d.ssh_action,
                    d.ssh_user,
                    d.ssh_ip
                ],
            )?;
        }
        LogDetail::Nginx(d) => {
            conn.execute(
                "INSERT OR REPLACE INTO nginx_log_detail
                    (log_entry_id, remote_addr, remote_user, time_local, method, uri,
                     protocol, status, body_bytes, referer, user_agent)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    entry_id,
                    d.remote_addr,
                    d.remote_user,
                    d.time_local,
                    d.method,
                    d.uri,
                    d.protocol,
                    d.status,
                    i64::try_from(d.body_bytes).unwrap_or(i64::MAX),
                    d.referer,
                    d.user_agent
                ],
            )?;
        }
        LogDetail::Windows(d) => {
            conn.execute(
                "INSERT OR REPLACE INTO windows_log_detail
                    (log_entry_id, channel, event_id, body)
                 VALUES (?1, ?2, ?3, ?4)",
                params![entry_id, d.channel, d.event_id, d.body],
            )?;
        }
    }
    Ok(())
}

fn read_detail(
    conn: &Connection,
    entry_id: i64,
    kind: LogKind,
) -> Result<Option<LogDetail>, StoreError> {
    let detail = match kind {
        LogKind::Linux => conn
            .query_row(
                "SELECT app_name, pid, message, ssh_action, ssh_user, ssh_ip
                 FROM linux_log_detail WHERE log_entry_id = ?1",
                params![entry_id],
                |row| {
                    Ok(LogDetail::Linux(LinuxDetail {
                        app_name: row.get(0)?,
                        pid: row.get(1)?,
                        message: row.get(2)?,
                        ssh_action: row.get(3)?,
                        ssh_user: row.get(4)?,
                        ssh_ip: row.get(5)?,
                    }))
                },
            )
            .optional()?,
        LogKind::Nginx => conn
            .query_row(
                "SELECT remote_addr, remote_user, time_local, method, uri, protocol,
                        status, body_bytes, referer, user_agent
                 FROM nginx_log_detail WHERE log_entry_id = ?1",
                params![entry_id],
                |row| {
                    Ok(LogDetail::Nginx(NginxDetail {
                        remote_addr: row.get(0)?,
                        remote_user: row.get(1)?,
                        time_local: row.get(2)?,
                        method: row.get(3)?,
                        uri: row.get(4)?,
                        protocol: row.get(5)?,
                        status: row.get(6)?,
                        body_bytes: row.get::<_, i64>(7)?.max(0) as u64,
                        referer: row.get(8)?,
                        user_agent: row.get(9)?,
                    }))
                },
            )
            .optional()?,
        LogKind::Windows => conn
            .query_row(
                "SELECT channel, event_id, body FROM windows_log_detail WHERE log_entry_id = ?1",
                params![entry_id],
                |row| {
                    Ok(LogDetail::Windows(WindowsDetail {
                        channel: row.get(0)?,
                        event_id: row.get(1)?,
                        body: row.get(2)?,
                    }))
                },
            )
            .optional()?,
        LogKind::Unknown => None,
    };
    Ok(detail)
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;

    fn entry(kind: LogKind, hostname: &str, ip: &str, raw: &str, at_ms: u64) -> LogEntry {
        let at = UNIX_EPOCH + Duration::from_millis(at_ms);
        LogEntry {
            kind,
            hostname: hostname.to_owned(),
            source_ip: ip.parse::<IpAddr>().unwrap(),
            event_time: at,
            received_at: at,
            raw: raw.to_owned(),
            fields: vec![("message".to_owned(), raw.to_owned())],
            detail: None,
        }
    }

    #[test]
    fn insert_then_fetch_unprocessed_returns_all_until_marked() {
        let storage = Storage::open_in_memory().unwrap();
        let batch = vec![
            entry(LogKind::Linux, "a", "10.0.0.1", "one", 1_000),
            entry(LogKind::Linux, "a", "10.0.0.1", "two", 2_000),
            entry(LogKind::Unknown, "unknown", "10.0.0.2", "three", 3_000),
        ];
        assert_eq!(storage.insert_entries(&batch).unwrap(), 3);

        let pending = storage
            .fetch_unprocessed(ProcessingFlag::Processed, None, 100)
            .unwrap();
        assert_eq!(pending.len(), 3);
        // 오래된 순
        let raws: Vec<_> = pending.iter().map(|e| e.raw.as_str()).collect();
        assert_eq!(raws, vec!["one", "two", "three"]);
        assert_eq!(pending[0].field("message"), Some("one"));

        let ids: Vec<i64> = pending.iter().map(|e| e.id).collect();
        assert_eq!(storage.mark_processed(&ids).unwrap(), 3);
        assert!(
            storage
                .fetch_unprocessed(ProcessingFlag::Processed, None, 100)
                .unwrap()
                .is_empty()
        );

        // 추출 커서는 독립적
        let unextracted = storage
            .fetch_unprocessed(ProcessingFlag::Extracted, Some(LogKind::Linux), 100)
            .unwrap();
        assert_eq!(unextracted.len(), 2);
    }

    #[test]
    fn insert_entries_links_hosts_and_updates_last_seen() {
        let storage = Storage::open_in_memory().unwrap();
        let batch = vec![
            entry(LogKind::Linux, "Hp-lap704", "192.168.0.7", "x", 1_000),
            entry(LogKind::Linux, "Hp-lap704", "192.168.0.7", "y", 4_000),
        ];
        storage.insert_entries(&batch).unwrap();

        let hosts = storage.list_hosts().unwrap();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].hostname, "Hp-lap704");
        assert_eq!(hosts[0].log_count, 2);
        assert_eq!(hosts[0].last_seen, from_millis(4_000));
    }

    #[test]
    fn inline_detail_is_stored_and_marks_extracted() {
        let storage = Storage::open_in_memory().unwrap();
        let mut web = entry(LogKind::Nginx, "unknown", "10.0.0.3", "GET /", 1_000);
        web.detail = Some(LogDetail::Nginx(NginxDetail {
            remote_addr: "10.0.0.3".to_owned(),
            time_local: "06/Dec/2024:04:17:07 +0000".to_owned(),
            method: "GET".to_owned(),
            uri: "/".to_owned(),
            protocol: "HTTP/1.1".to_owned(),
            status: 200,
            body_bytes: 512,
            ..Default::default()
        }));
        storage.insert_entries(&[web]).unwrap();

        let stored = storage
            .fetch_unprocessed(ProcessingFlag::Processed, Some(LogKind::Nginx), 10)
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].extracted);
        match &stored[0].detail {
            Some(LogDetail::Nginx(d)) => assert_eq!(d.status, 200),
            other => panic!("unexpected detail: {other:?}"),
        }
    }

    #[test]
    fn insert_detail_backfills_linux_entry() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .insert_entries(&[entry(LogKind::Linux, "a", "10.0.0.1", "sshd line", 1_000)])
            .unwrap();
        let id = storage
            .fetch_unprocessed(ProcessingFlag::Extracted, Some(LogKind::Linux), 1)
            .unwrap()[0]
            .id;

        let detail = LogDetail::Linux(LinuxDetail {
            app_name: Some("sshd".to_owned()),
            pid: Some(22),
            message: "Failed password for root from 1.2.3.4 port 22 ssh2".to_owned(),
            ssh_action: Some("Failed".to_owned()),
            ssh_user: Some("root".to_owned()),
            ssh_ip: Some("1.2.3.4".to_owned()),
        });
        storage.insert_detail(id, &detail).unwrap();
        storage.mark_extracted(&[id]).unwrap();

        let loaded = storage.get_entry(id).unwrap().unwrap();
        assert_eq!(loaded.detail, Some(detail));
        assert!(loaded.extracted);
    }

    #[test]
    fn insert_detail_for_missing_entry_fails() {
        let storage = Storage::open_in_memory().unwrap();
        let detail = LogDetail::Windows(WindowsDetail {
            body: "{}".to_owned(),
            ..Default::default()
        });
        assert!(storage.insert_detail(12345, &detail).is_err());
    }

    #[test]
    fn fetch_unprocessed_honors_limit() {
        let storage = Storage::open_in_memory().unwrap();
        let batch: Vec<_> = (0..10)
            .map(|i| entry(LogKind::Linux, "a", "10.0.0.1", &format!("line {i}"), i * 10))
            .collect();
        storage.insert_entries(&batch).unwrap();
        let first = storage
            .fetch_unprocessed(ProcessingFlag::Processed, None, 4)
            .unwrap();
        assert_eq!(first.len(), 4);
        assert_eq!(first[0].raw, "line 0");
    }

    #[test]
    fn query_logs_filters_by_kind_host_and_time() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .insert_entries(&[
                entry(LogKind::Linux, "a", "10.0.0.1", "l1", 1_000),
                entry(LogKind::Nginx, "b", "10.0.0.2", "n1", 2_000),
                entry(LogKind::Linux, "a", "10.0.0.1", "l2", 3_000),
                entry(LogKind::Linux, "c", "10.0.0.3", "l3", 4_000),
            ])
            .unwrap();

        let linux = storage
            .query_logs(&LogFilter {
                kind: Some(LogKind::Linux),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(linux.len(), 3);
        // 최신 순
        assert_eq!(linux[0].raw, "l3");

        let host_a = storage.list_hosts().unwrap();
        let a_id = host_a.iter().find(|h| h.hostname == "a").unwrap().id;
        let in_range = storage
            .query_logs(&LogFilter {
                host_id: Some(a_id),
                since: Some(UNIX_EPOCH + Duration::from_millis(2_000)),
                until: Some(UNIX_EPOCH + Duration::from_millis(3_000)),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(in_range.len(), 1);
        assert_eq!(in_range[0].raw, "l2");

        let paged = storage
            .query_logs(&LogFilter {
                limit: 2,
                offset: 2,
                ..Default::default()
            })
            .unwrap();
        let raws: Vec<_> = paged.iter().map(|e| e.raw.as_str()).collect();
        assert_eq!(raws, vec!["n1", "l1"]);
    }

    #[test]
    fn empty_batch_is_noop() {
        let storage = Storage::open_in_memory().unwrap();
        assert_eq!(storage.insert_entries(&[]).unwrap(), 0);
        assert_eq!(storage.mark_processed(&[]).unwrap(), 0);
    }
}
