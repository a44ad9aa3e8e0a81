//! 알림 저장소 연산
//!
//! (log_entry_id, rule_id) 쌍에 UNIQUE 제약이 있어 같은 엔트리를 다시 평가해도
//! 알림이 중복 생성되지 않습니다.

use std::time::SystemTime;

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter};

use crate::error::StoreError;
use crate::models::{
    AlertFilter, AlertRecord, NewAlert, clamp_limit, from_millis, severity_from_column, to_millis,
};
use crate::store::Storage;

impl Storage {
    /// 알림을 생성합니다.
    ///
    /// 같은 (엔트리, 룰) 알림이 이미 있으면 `Ok(None)`을 돌려줍니다.
    /// 존재하지 않는 엔트리/호스트/룰을 참조하면 외래 키 위반으로 실패합니다.
    pub fn create_alert(&self, alert: &NewAlert) -> Result<Option<i64>, StoreError> {
        let metadata = serde_json::to_string(&alert.metadata)?;
        let now = to_millis(SystemTime::now());
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO alert
                    (log_entry_id, host_id, rule_id, severity, title, description, metadata,
                     resolved, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8)",
                params![
                    alert.log_entry_id,
                    alert.host_id,
                    alert.rule_id,
                    alert.severity.as_str(),
                    alert.title,
                    alert.description,
                    metadata,
                    now
                ],
            )?;
            if changed == 0 {
                Ok(None)
            } else {
                Ok(Some(conn.last_insert_rowid()))
            }
        })
    }

    /// 조건에 맞는 알림을 최신 순으로 조회합니다.
    pub fn query_alerts(&self, filter: &AlertFilter) -> Result<Vec<AlertRecord>, StoreError> {
        let mut sql = String::from(
            "SELECT a.id, a.log_entry_id, a.host_id, h.hostname, a.rule_id, a.severity,
                    a.title, a.description, a.metadata, a.resolved, a.created_at
             FROM alert a LEFT JOIN host h ON h.id = a.host_id
             WHERE 1 = 1",
        );
        let mut values: Vec<Value> = Vec::new();
        if let Some(severity) = filter.severity {
            sql.push_str(" AND a.severity = ?");
            values.push(Value::Text(severity.as_str().to_owned()));
        }
        if let Some(resolved) = filter.resolved {
            sql.push_str(" AND a.resolved = ?");
            values.push(Value::Integer(i64::from(resolved)));
        }
        if let Some(host_id) = filter.host_id {
            sql.push_str(" AND a.host_id = ?");
            values.push(Value::Integer(host_id));
        }
        sql.push_str(" ORDER BY a.created_at DESC, a.id DESC LIMIT ? OFFSET ?");
        values.push(Value::Integer(clamp_limit(filter.limit)));
        values.push(Value::Integer(
            i64::try_from(filter.offset).unwrap_or(i64::MAX),
        ));

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values), |row| {
                Ok((
                    AlertRecord {
                        id: row.get(0)?,
                        log_entry_id: row.get(1)?,
                        host_id: row.get(2)?,
                        hostname: row.get(3)?,
                        rule_id: row.get(4)?,
                        severity: severity_from_column(&row.get::<_, String>(5)?),
                        title: row.get(6)?,
                        description: row.get(7)?,
                        metadata: serde_json::Value::Null,
                        resolved: row.get(9)?,
                        created_at: from_millis(row.get(10)?),
                    },
                    row.get::<_, String>(8)?,
                ))
            })?;

            let mut alerts = Vec::new();
            for row in rows {
                let (mut alert, metadata) = row?;
                alert.metadata = serde_json::from_str(&metadata)?;
                alerts.push(alert);
            }
            Ok(alerts)
        })
    }

    /// 알림을 해결 처리합니다. 알림이 없으면 false.
    pub fn resolve_alert(&self, alert_id: i64) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE alert SET resolved = 1 WHERE id = ?1",
                params![alert_id],
            )?;
            Ok(changed > 0)
        })
    }
}
