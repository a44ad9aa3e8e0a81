//! 오버플로우 파일 -- 저장하지 못한 레코드의 NDJSON 보관소
//!
//! 한 줄에 [`OverflowRecord`] 하나를 JSON으로 기록합니다. 원문 페이로드를
//! 그대로 담으므로 `ironwatch replay`로 다시 디스패치할 수 있습니다.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use ironwatch_core::metrics as m;
use ironwatch_core::types::LogEntry;

use crate::collector::RawRecord;
use crate::error::LogPipelineError;

/// 오버플로우 레코드 한 줄
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverflowRecord {
    /// 수신 시각 (RFC 3339)
    pub received_at: String,
    pub source_ip: String,
    /// 디스패치 당시 판별된 종류
    pub kind: String,
    /// 기록 사유 (파싱 실패, 저장 실패 등)
    pub reason: String,
    /// 원문 페이로드
    pub payload: String,
}

impl OverflowRecord {
    pub fn from_entry(entry: &LogEntry, reason: &str) -> Self {
        Self {
            received_at: DateTime::<Utc>::from(entry.received_at)
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            source_ip: entry.source_ip.to_string(),
            kind: entry.kind.as_str().to_owned(),
            reason: reason.to_owned(),
            payload: entry.raw.clone(),
        }
    }

    /// 재처리를 위한 원시 레코드로 되돌립니다.
    ///
    /// 수신 시각이나 IP를 해석할 수 없으면 에러입니다.
    pub fn to_raw_record(&self) -> Result<RawRecord, LogPipelineError> {
        let ip: IpAddr = self.source_ip.parse().map_err(|_| LogPipelineError::Overflow {
            path: String::new(),
            reason: format!("invalid source ip '{}'", self.source_ip),
        })?;
        let received_at = DateTime::parse_from_rfc3339(&self.received_at)
            .map(SystemTime::from)
            .map_err(|e| LogPipelineError::Overflow {
                path: String::new(),
                reason: format!("invalid received_at '{}': {e}", self.received_at),
            })?;
        Ok(
            RawRecord::new(Bytes::from(self.payload.clone().into_bytes()), ip)
                .with_received_at(received_at),
        )
    }
}

/// 오버플로우 파일 한 줄 읽기 결과
#[derive(Debug)]
pub struct OverflowLine {
    /// 1부터 시작하는 줄 번호
    pub line_no: usize,
    pub record: Result<OverflowRecord, LogPipelineError>,
}

/// 추가 전용 오버플로우 파일
#[derive(Debug, Clone)]
pub struct OverflowFile {
    path: PathBuf,
}

impl OverflowFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 엔트리들을 한 번의 쓰기로 추가하고 디스크에 동기화합니다.
    pub async fn append(&self, entries: &[LogEntry], reason: &str) -> Result<usize, LogPipelineError> {
        if entries.is_empty() {
            return Ok(0);
        }

        let mut buf = Vec::with_capacity(entries.len() * 256);
        for entry in entries {
            serde_json::to_writer(&mut buf, &OverflowRecord::from_entry(entry, reason))?;
            buf.push(b'\n');
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.error(e))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.error(e))?;
        file.write_all(&buf).await.map_err(|e| self.error(e))?;
        file.sync_data().await.map_err(|e| self.error(e))?;

        metrics::counter!(m::OVERFLOW_RECORDS_TOTAL).increment(entries.len() as u64);
        tracing::warn!(
            path = %self.path.display(),
            count = entries.len(),
            reason,
            "records written to overflow file"
        );
        Ok(entries.len())
    }

    /// 파일 전체를 읽습니다. 해석할 수 없는 줄은 에러로 표시된 채 포함됩니다.
    pub async fn read_all(&self) -> Result<Vec<OverflowLine>, LogPipelineError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.error(e))?;

        Ok(content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| OverflowLine {
                line_no: idx + 1,
                record: serde_json::from_str(line).map_err(LogPipelineError::from),
            })
            .collect())
    }

    fn error(&self, e: std::io::Error) -> LogPipelineError {
        LogPipelineError::Overflow {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        }
    }
}
