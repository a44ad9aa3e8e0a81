//! 룰 테이블 연산

use std::time::SystemTime;

use rusqlite::{OptionalExtension, params};

use crate::error::StoreError;
use crate::models::{
    NewRule, RuleRecord, from_millis, kind_from_column, severity_from_column, to_millis,
};
use crate::store::Storage;

impl Storage {
    /// 이름 기준으로 룰을 등록하거나 갱신합니다. 룰 id를 돌려줍니다.
    pub fn upsert_rule(&self, rule: &NewRule) -> Result<i64, StoreError> {
        if rule.name.trim().is_empty() {
            return Err(StoreError::InvalidArgument(
                "rule name must not be empty".to_owned(),
            ));
        }
        let now = to_millis(SystemTime::now());
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO alert_rule
                    (name, description, source_kind, severity, enabled, matcher_spec,
                     created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                 ON CONFLICT(name) DO UPDATE SET
                    description = excluded.description,
                    source_kind = excluded.source_kind,
                    severity = excluded.severity,
                    enabled = excluded.enabled,
                    matcher_spec = excluded.matcher_spec,
                    updated_at = excluded.updated_at",
                params![
                    rule.name,
                    rule.description,
                    rule.source_kind.map(|k| k.as_str()),
                    rule.severity.as_str(),
                    rule.enabled,
                    rule.matcher_spec,
                    now
                ],
            )?;
            let id: i64 = tx.query_row(
                "SELECT id FROM alert_rule WHERE name = ?1",
                params![rule.name],
                |row| row.get(0),
            )?;
            tx.commit()?;
            Ok(id)
        })
    }

    /// 모든 룰을 id 순으로 조회합니다 (비활성 포함).
    pub fn list_rules(&self) -> Result<Vec<RuleRecord>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, description, source_kind, severity, enabled, matcher_spec,
                        created_at, updated_at
                 FROM alert_rule ORDER BY id ASC",
            )?;
            let rows = stmt.query_map([], |row| {
                let source_kind: Option<String> = row.get(3)?;
                Ok(RuleRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    source_kind: source_kind.as_deref().map(kind_from_column),
                    severity: severity_from_column(&row.get::<_, String>(4)?),
                    enabled: row.get(5)?,
                    matcher_spec: row.get(6)?,
                    created_at: from_millis(row.get(7)?),
                    updated_at: from_millis(row.get(8)?),
                })
            })?;

            let mut rules = Vec::new();
            for row in rows {
                rules.push(row?);
            }
            Ok(rules)
        })
    }

    /// 룰 활성 여부를 바꿉니다. 룰이 없으면 false.
    pub fn set_rule_enabled(&self, rule_id: i64, enabled: bool) -> Result<bool, StoreError> {
        let now = to_millis(SystemTime::now());
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE alert_rule SET enabled = ?1, updated_at = ?2 WHERE id = ?3",
                params![enabled, now, rule_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// 이름으로 룰 id를 찾습니다.
    pub fn find_rule_id(&self, name: &str) -> Result<Option<i64>, StoreError> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id FROM alert_rule WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    /// 룰을 삭제합니다. 기존 알림의 rule_id는 NULL이 됩니다.
    pub fn delete_rule(&self, rule_id: i64) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM alert_rule WHERE id = ?1", params![rule_id])?;
            Ok(changed > 0)
        })
    }
}
