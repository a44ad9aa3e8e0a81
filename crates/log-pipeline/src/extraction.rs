//! 필드 추출 워커 -- 상세 레코드가 없는 엔트리를 원문에서 채웁니다.
//!
//! 종류별로 `extracted = 0` 엔트리를 가져와 상세 레코드를 기록하고 추출 완료로 표시합니다.
//! 탐지 엔진과는 다른 플래그를 사용하므로 두 루프는 독립적으로 진행됩니다.
//! 탐지 엔진은 아직 추출되지 않은 엔트리를 평가하기 전에 같은 추출 루틴을 직접 실행하므로,
//! 두 루프가 같은 엔트리를 추출하더라도 상세 레코드는 교체될 뿐입니다.

use std::sync::Arc;

use ironwatch_core::config::ExtractionConfig;
use ironwatch_core::metrics as m;
use ironwatch_core::types::LogKind;
use ironwatch_storage::{ProcessingFlag, Storage, StoredEntry};

use crate::error::LogPipelineError;
use crate::extract::FieldExtractor;
use crate::stats::ExtractionStats;
use crate::worker::PollCycle;

/// 필드 추출 워커
pub struct ExtractionWorker {
    storage: Storage,
    extractor: Arc<FieldExtractor>,
    batch_size: usize,
    stats: Arc<ExtractionStats>,
}

impl ExtractionWorker {
    pub fn new(storage: Storage, config: &ExtractionConfig) -> Self {
        Self {
            storage,
            extractor: Arc::new(FieldExtractor::new()),
            batch_size: config.batch_size.max(1),
            stats: Arc::new(ExtractionStats::default()),
        }
    }

    /// 한 사이클을 실행하고 추출 완료로 표시한 엔트리 수를 돌려줍니다.
    ///
    /// 원문이 해당 형식으로 해석되지 않는 엔트리는 경고 후 완료로 표시되어
    /// 매 사이클 다시 시도되지 않습니다. 상세 기록 자체가 실패한 엔트리는
    /// 다음 사이클에 재시도됩니다.
    pub async fn backfill(&self) -> Result<usize, LogPipelineError> {
        self.stats.record_cycle();

        let storage = self.storage.clone();
        let extractor = Arc::clone(&self.extractor);
        let stats = Arc::clone(&self.stats);
        let limit = self.batch_size;

        let marked = tokio::task::spawn_blocking(move || {
            let mut marked = 0usize;
            for kind in LogKind::ALL.into_iter().filter(LogKind::supports_extraction) {
                let mut entries =
                    storage.fetch_unprocessed(ProcessingFlag::Extracted, Some(kind), limit)?;
                let done = backfill_entries(&storage, &extractor, &stats, &mut entries);
                marked += storage.mark_extracted(&done)?;
            }
            Ok::<_, LogPipelineError>(marked)
        })
        .await??;

        if marked > 0 {
            tracing::debug!(marked, "field extraction cycle finished");
        }
        Ok(marked)
    }
}

/// 엔트리마다 상세를 기록하고, 완료로 표시할 id 목록을 돌려줍니다.
///
/// 이미 추출된 엔트리와 추출 대상이 아닌 종류는 건너뜁니다.
/// 기록에 성공한 엔트리는 `detail`이 채워지고 `extracted`가 참이 됩니다.
pub(crate) fn backfill_entries(
    storage: &Storage,
    extractor: &FieldExtractor,
    stats: &ExtractionStats,
    entries: &mut [StoredEntry],
) -> Vec<i64> {
    let mut done = Vec::with_capacity(entries.len());
    for entry in entries.iter_mut() {
        if entry.extracted || !entry.kind.supports_extraction() {
            continue;
        }
        match extractor.extract(entry.kind, &entry.raw, &entry.fields) {
            Ok(Some(detail)) => match storage.insert_detail(entry.id, &detail) {
                Ok(()) => {
                    stats.record_extracted();
                    metrics::counter!(m::EXTRACTION_ENTRIES_TOTAL, m::LABEL_KIND => entry.kind.as_str())
                        .increment(1);
                    entry.detail = Some(detail);
                    entry.extracted = true;
                    done.push(entry.id);
                }
                Err(e) => {
                    stats.record_error();
                    metrics::counter!(m::EXTRACTION_ERRORS_TOTAL).increment(1);
                    tracing::warn!(entry_id = entry.id, error = %e, "failed to store detail record");
                }
            },
            Ok(None) => {
                stats.record_skipped();
                entry.extracted = true;
                done.push(entry.id);
            }
            Err(e) => {
                stats.record_error();
                metrics::counter!(m::EXTRACTION_ERRORS_TOTAL).increment(1);
                tracing::warn!(
                    entry_id = entry.id,
                    kind = %entry.kind,
                    error = %e,
                    "raw text could not be re-parsed, marking as extracted"
                );
                entry.extracted = true;
                done.push(entry.id);
            }
        }
    }
    done
}

impl PollCycle for ExtractionWorker {
    type Stats = ExtractionStats;

    fn name(&self) -> &'static str {
        "extraction"
    }

    async fn run_cycle(&mut self) -> Result<usize, LogPipelineError> {
        self.backfill().await
    }

    fn stats(&self) -> Arc<ExtractionStats> {
        Arc::clone(&self.stats)
    }
}
