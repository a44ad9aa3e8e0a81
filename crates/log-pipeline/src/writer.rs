//! 배치 저장 -- 정규화된 엔트리를 모아 한 번의 트랜잭션으로 저장합니다.
//!
//! 플러시 조건 (먼저 도달하는 쪽):
//! - 버퍼 크기가 `batch_size`에 도달
//! - 가장 오래된 미저장 엔트리가 `batch_timeout`보다 오래됨 (주기적 tick에서 확인)
//!
//! 저장이 실패하면 배치 전체를 오버플로우 파일로 보냅니다. 둘 다 실패하면
//! 배치를 버퍼에 되돌려 다음 tick에 다시 시도합니다.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use ironwatch_core::metrics as m;
use ironwatch_core::types::LogEntry;
use ironwatch_storage::Storage;

use crate::error::LogPipelineError;
use crate::overflow::OverflowFile;
use crate::parser::Dispatched;
use crate::stats::IngestStats;

/// 메모리 내 배치 버퍼
#[derive(Debug)]
pub struct BatchBuffer {
    entries: Vec<LogEntry>,
    /// 가장 오래된 미저장 엔트리의 적재 시각
    oldest: Option<Instant>,
    max_size: usize,
    timeout: Duration,
}

impl BatchBuffer {
    pub fn new(max_size: usize, timeout: Duration) -> Self {
        let max_size = max_size.max(1);
        Self {
            entries: Vec::with_capacity(max_size),
            oldest: None,
            max_size,
            timeout,
        }
    }

    /// 엔트리를 추가하고, 크기 조건으로 플러시가 필요한지 반환합니다.
    pub fn push(&mut self, entry: LogEntry, now: Instant) -> bool {
        self.oldest.get_or_insert(now);
        self.entries.push(entry);
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.max_size
    }

    /// 크기 또는 시간 조건 중 하나라도 만족하는지
    pub fn is_due(&self, now: Instant) -> bool {
        self.is_full()
            || self
                .oldest
                .is_some_and(|oldest| now.saturating_duration_since(oldest) >= self.timeout)
    }

    /// 버퍼를 비우고 내용을 가져갑니다.
    pub fn take(&mut self) -> (Vec<LogEntry>, Option<Instant>) {
        let oldest = self.oldest.take();
        (std::mem::take(&mut self.entries), oldest)
    }

    /// 저장에 실패한 배치를 앞쪽에 되돌립니다.
    pub fn restore(&mut self, mut batch: Vec<LogEntry>, oldest: Option<Instant>) {
        batch.append(&mut self.entries);
        self.entries = batch;
        self.oldest = match (oldest, self.oldest) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 플러시 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// 버퍼가 비어 있었음
    Empty,
    /// 저장소에 커밋됨
    Saved(usize),
    /// 저장 실패로 오버플로우 파일에 기록됨
    Overflowed(usize),
}

/// 배치 저장기
///
/// 디스패처 태스크가 단독으로 소유합니다. 저장 호출은 블로킹 스레드에서 실행됩니다.
pub struct BatchWriter {
    storage: Storage,
    overflow: OverflowFile,
    buffer: BatchBuffer,
    stats: Arc<IngestStats>,
}

impl BatchWriter {
    pub fn new(
        storage: Storage,
        overflow: OverflowFile,
        batch_size: usize,
        batch_timeout: Duration,
        stats: Arc<IngestStats>,
    ) -> Self {
        Self {
            storage,
            overflow,
            buffer: BatchBuffer::new(batch_size, batch_timeout),
            stats,
        }
    }

    /// 디스패치 결과 하나를 받아들입니다.
    ///
    /// 정상 엔트리는 버퍼에 넣고, 거부된 레코드는 즉시 오버플로우 파일에 기록합니다.
    pub async fn accept(&mut self, dispatched: Dispatched) -> Result<(), LogPipelineError> {
        match dispatched {
            Dispatched::Entry(entry) => {
                self.stats.record_parsed();
                if self.buffer.push(entry, Instant::now()) {
                    self.flush().await?;
                }
            }
            Dispatched::Rejected { entry, reason, .. } => {
                self.stats.record_errors(1);
                metrics::counter!(m::ENTRIES_ERRORED_TOTAL).increment(1);
                let written = self
                    .overflow
                    .append(std::slice::from_ref(&entry), &reason)
                    .await?;
                self.stats.record_overflow(written);
            }
        }
        Ok(())
    }

    /// 시간 조건이 충족되었으면 플러시합니다. tick마다 호출됩니다.
    pub async fn flush_if_due(&mut self) -> Result<FlushOutcome, LogPipelineError> {
        if self.buffer.is_due(Instant::now()) {
            self.flush().await
        } else {
            Ok(FlushOutcome::Empty)
        }
    }

    /// 버퍼 전체를 플러시합니다.
    pub async fn flush(&mut self) -> Result<FlushOutcome, LogPipelineError> {
        let (taken, oldest) = self.buffer.take();
        if taken.is_empty() {
            return Ok(FlushOutcome::Empty);
        }

        let batch = Arc::new(taken);
        let started = std::time::Instant::now();
        let storage = self.storage.clone();
        let to_insert = Arc::clone(&batch);
        let result = tokio::task::spawn_blocking(move || storage.insert_entries(&to_insert))
            .await
            .map_err(LogPipelineError::from)
            .and_then(|r| r.map_err(LogPipelineError::from));

        match result {
            Ok(saved) => {
                metrics::histogram!(m::BATCH_FLUSH_DURATION_SECONDS)
                    .record(started.elapsed().as_secs_f64());
                metrics::counter!(m::ENTRIES_SAVED_TOTAL).increment(saved as u64);
                metrics::counter!(m::BATCHES_FLUSHED_TOTAL).increment(1);
                self.stats.record_flush(saved);
                tracing::debug!(saved, "batch committed");
                Ok(FlushOutcome::Saved(saved))
            }
            Err(e) => {
                tracing::warn!(error = %e, count = batch.len(), "batch commit failed, writing overflow");
                let reason = format!("storage write failed: {e}");
                match self.overflow.append(&batch, &reason).await {
                    Ok(written) => {
                        metrics::counter!(m::ENTRIES_ERRORED_TOTAL).increment(written as u64);
                        self.stats.record_errors(written);
                        self.stats.record_overflow(written);
                        Ok(FlushOutcome::Overflowed(written))
                    }
                    Err(overflow_err) => {
                        let batch = Arc::try_unwrap(batch).unwrap_or_else(|shared| (*shared).clone());
                        self.buffer.restore(batch, oldest);
                        tracing::error!(
                            error = %overflow_err,
                            buffered = self.buffer.len(),
                            "overflow write failed, batch kept in memory"
                        );
                        Err(overflow_err)
                    }
                }
            }
        }
    }

    /// 버퍼에 남은 엔트리 수
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> &Arc<IngestStats> {
        &self.stats
    }
}
