//! 스키마 정의와 초기화
//!
//! 범용 로그 테이블 하나, 종류별 상세 테이블, 호스트 테이블, 룰 테이블, 알림 테이블.
//! 시각은 모두 Unix epoch 밀리초(INTEGER)로 저장합니다.

use rusqlite::Connection;

/// 현재 스키마 버전 (`PRAGMA user_version`)
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS host (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    hostname TEXT NOT NULL,
    ip_address TEXT NOT NULL,
    kind TEXT NOT NULL,
    first_seen INTEGER NOT NULL,
    last_seen INTEGER NOT NULL,
    UNIQUE (hostname, ip_address)
);

CREATE TABLE IF NOT EXISTS log_entry (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    host_id INTEGER NOT NULL REFERENCES host(id),
    kind TEXT NOT NULL,
    event_time INTEGER NOT NULL,
    received_at INTEGER NOT NULL,
    source_ip TEXT NOT NULL,
    raw TEXT NOT NULL,
    fields TEXT NOT NULL DEFAULT '[]',
    processed INTEGER NOT NULL DEFAULT 0,
    extracted INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_log_entry_processed ON log_entry(processed, id);
CREATE INDEX IF NOT EXISTS idx_log_entry_extracted ON log_entry(kind, extracted, id);
CREATE INDEX IF NOT EXISTS idx_log_entry_host ON log_entry(host_id, received_at);
CREATE INDEX IF NOT EXISTS idx_log_entry_received ON log_entry(received_at);

CREATE TABLE IF NOT EXISTS linux_log_detail (
    log_entry_id INTEGER PRIMARY KEY REFERENCES log_entry(id),
    app_name TEXT,
    pid INTEGER,
    message TEXT NOT NULL,
    ssh_action TEXT,
    ssh_user TEXT,
    ssh_ip TEXT
);

CREATE TABLE IF NOT EXISTS nginx_log_detail (
    log_entry_id INTEGER PRIMARY KEY REFERENCES log_entry(id),
    remote_addr TEXT NOT NULL,
    remote_user TEXT,
    time_local TEXT NOT NULL,
    method TEXT NOT NULL,
    uri TEXT NOT NULL,
    protocol TEXT NOT NULL,
    status INTEGER NOT NULL,
    body_bytes INTEGER NOT NULL,
    referer TEXT,
    user_agent TEXT
);

CREATE TABLE IF NOT EXISTS windows_log_detail (
    log_entry_id INTEGER PRIMARY KEY REFERENCES log_entry(id),
    channel TEXT,
    event_id INTEGER,
    body TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS alert_rule (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    source_kind TEXT,
    severity TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    matcher_spec TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS alert (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    log_entry_id INTEGER NOT NULL REFERENCES log_entry(id),
    host_id INTEGER NOT NULL REFERENCES host(id),
    rule_id INTEGER REFERENCES alert_rule(id) ON DELETE SET NULL,
    severity TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    resolved INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    UNIQUE (log_entry_id, rule_id)
);
CREATE INDEX IF NOT EXISTS idx_alert_created ON alert(created_at);
CREATE INDEX IF NOT EXISTS idx_alert_host ON alert(host_id, resolved);
";

/// 연결 설정과 스키마를 적용합니다. 여러 번 호출해도 안전합니다.
pub(crate) fn initialize(conn: &Connection, file_backed: bool) -> rusqlite::Result<()> {
    if file_backed {
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            ",
        )?;
    }
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;

    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version < SCHEMA_VERSION {
        conn.execute_batch(SCHEMA)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }
    Ok(())
}
