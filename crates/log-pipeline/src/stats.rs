//! 루프별 누적 카운터
//!
//! 각 루프는 자신의 카운터 구조체를 `Arc`로 공유하고, 상태 조회는
//! [`snapshot`](IngestStats::snapshot)으로 순서가 고정된 목록을 얻습니다.

use std::sync::atomic::{AtomicU64, Ordering};

fn load(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

fn bump(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

/// 수신/디스패치/배치 저장 카운터
#[derive(Debug, Default)]
pub struct IngestStats {
    received: AtomicU64,
    parsed: AtomicU64,
    saved: AtomicU64,
    errored: AtomicU64,
    batches_flushed: AtomicU64,
    overflowed: AtomicU64,
    dropped: AtomicU64,
}

impl IngestStats {
    pub fn record_received(&self) {
        bump(&self.received, 1);
    }

    pub fn record_parsed(&self) {
        bump(&self.parsed, 1);
    }

    /// 저장된 엔트리 수와 배치 하나를 기록합니다.
    pub fn record_flush(&self, saved: usize) {
        bump(&self.saved, saved as u64);
        bump(&self.batches_flushed, 1);
    }

    pub fn record_errors(&self, n: usize) {
        bump(&self.errored, n as u64);
    }

    pub fn record_overflow(&self, n: usize) {
        bump(&self.overflowed, n as u64);
    }

    /// 큐에서 누적된 드롭 수로 갱신합니다.
    pub fn set_dropped(&self, total: u64) {
        self.dropped.store(total, Ordering::Relaxed);
    }

    pub fn received(&self) -> u64 {
        load(&self.received)
    }

    pub fn parsed(&self) -> u64 {
        load(&self.parsed)
    }

    pub fn saved(&self) -> u64 {
        load(&self.saved)
    }

    pub fn errored(&self) -> u64 {
        load(&self.errored)
    }

    pub fn batches_flushed(&self) -> u64 {
        load(&self.batches_flushed)
    }

    pub fn overflowed(&self) -> u64 {
        load(&self.overflowed)
    }

    pub fn dropped(&self) -> u64 {
        load(&self.dropped)
    }

    pub fn snapshot(&self) -> Vec<(String, u64)> {
        vec![
            ("received".to_owned(), self.received()),
            ("parsed".to_owned(), self.parsed()),
            ("saved".to_owned(), self.saved()),
            ("errors".to_owned(), self.errored()),
            ("batches_flushed".to_owned(), self.batches_flushed()),
            ("overflowed".to_owned(), self.overflowed()),
            ("dropped".to_owned(), self.dropped()),
        ]
    }
}

/// 탐지 엔진 카운터
#[derive(Debug, Default)]
pub struct DetectionStats {
    cycles: AtomicU64,
    processed: AtomicU64,
    extracted: AtomicU64,
    alerts_created: AtomicU64,
    duplicates: AtomicU64,
    errors: AtomicU64,
}

impl DetectionStats {
    pub fn record_cycle(&self) {
        bump(&self.cycles, 1);
    }

    pub fn record_processed(&self, n: usize) {
        bump(&self.processed, n as u64);
    }

    /// 평가 전에 탐지 사이클이 직접 추출한 엔트리
    pub fn record_extracted(&self, n: usize) {
        bump(&self.extracted, n as u64);
    }

    pub fn record_alert(&self) {
        bump(&self.alerts_created, 1);
    }

    /// 같은 (엔트리, 룰) 알림이 이미 있어 생성하지 않은 경우
    pub fn record_duplicate(&self) {
        bump(&self.duplicates, 1);
    }

    pub fn record_error(&self) {
        bump(&self.errors, 1);
    }

    pub fn cycles(&self) -> u64 {
        load(&self.cycles)
    }

    pub fn processed(&self) -> u64 {
        load(&self.processed)
    }

    pub fn alerts_created(&self) -> u64 {
        load(&self.alerts_created)
    }

    pub fn errors(&self) -> u64 {
        load(&self.errors)
    }

    pub fn snapshot(&self) -> Vec<(String, u64)> {
        vec![
            ("cycles".to_owned(), self.cycles()),
            ("processed".to_owned(), self.processed()),
            ("extracted".to_owned(), load(&self.extracted)),
            ("alerts_created".to_owned(), self.alerts_created()),
            ("duplicates".to_owned(), load(&self.duplicates)),
            ("errors".to_owned(), self.errors()),
        ]
    }
}

/// 필드 추출 워커 카운터
#[derive(Debug, Default)]
pub struct ExtractionStats {
    cycles: AtomicU64,
    extracted: AtomicU64,
    skipped: AtomicU64,
    errors: AtomicU64,
}

impl ExtractionStats {
    pub fn record_cycle(&self) {
        bump(&self.cycles, 1);
    }

    pub fn record_extracted(&self) {
        bump(&self.extracted, 1);
    }

    /// 원문에서 상세를 만들 수 없어 추출 완료로만 표시한 경우
    pub fn record_skipped(&self) {
        bump(&self.skipped, 1);
    }

    pub fn record_error(&self) {
        bump(&self.errors, 1);
    }

    pub fn extracted(&self) -> u64 {
        load(&self.extracted)
    }

    pub fn skipped(&self) -> u64 {
        load(&self.skipped)
    }

    pub fn errors(&self) -> u64 {
        load(&self.errors)
    }

    pub fn snapshot(&self) -> Vec<(String, u64)> {
        vec![
            ("cycles".to_owned(), load(&self.cycles)),
            ("extracted".to_owned(), self.extracted()),
            ("skipped".to_owned(), self.skipped()),
            ("errors".to_owned(), self.errors()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_snapshot_order_is_stable() {
        let stats = IngestStats::default();
        stats.record_received();
        stats.record_parsed();
        stats.record_flush(3);
        stats.set_dropped(2);

        let names: Vec<_> = stats.snapshot().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            names,
            vec![
                "received",
                "parsed",
                "saved",
                "errors",
                "batches_flushed",
                "overflowed",
                "dropped"
            ]
        );
        assert_eq!(stats.saved(), 3);
        assert_eq!(stats.batches_flushed(), 1);
        assert_eq!(stats.dropped(), 2);
    }

    #[test]
    fn detection_counts_accumulate() {
        let stats = DetectionStats::default();
        stats.record_processed(4);
        stats.record_processed(1);
        stats.record_alert();
        stats.record_duplicate();
        assert_eq!(stats.processed(), 5);
        assert_eq!(stats.alerts_created(), 1);
        assert!(stats.snapshot().contains(&("duplicates".to_owned(), 1)));
    }
}
