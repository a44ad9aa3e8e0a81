//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `ironwatch_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 로그 종류 레이블 키 (linux, nginx, windows, unknown)
pub const LABEL_KIND: &str = "kind";

/// 심각도 레이블 키 (info, low, medium, high, critical)
pub const LABEL_SEVERITY: &str = "severity";

/// 모듈 레이블 키
pub const LABEL_MODULE: &str = "module";

// ─── 수집 경로 메트릭 ───────────────────────────────────────────────

/// 수신한 데이터그램 수 (counter)
pub const DATAGRAMS_RECEIVED_TOTAL: &str = "ironwatch_datagrams_received_total";

/// 큐 포화로 버려진 데이터그램 수 (counter)
pub const DATAGRAMS_DROPPED_TOTAL: &str = "ironwatch_datagrams_dropped_total";

/// 파싱된 엔트리 수 (counter, label: kind)
pub const ENTRIES_PARSED_TOTAL: &str = "ironwatch_entries_parsed_total";

/// 저장소에 커밋된 엔트리 수 (counter)
pub const ENTRIES_SAVED_TOTAL: &str = "ironwatch_entries_saved_total";

/// 파싱 또는 저장에 실패한 엔트리 수 (counter)
pub const ENTRIES_ERRORED_TOTAL: &str = "ironwatch_entries_errored_total";

/// 플러시된 배치 수 (counter)
pub const BATCHES_FLUSHED_TOTAL: &str = "ironwatch_batches_flushed_total";

/// 오버플로 파일에 기록된 레코드 수 (counter)
pub const OVERFLOW_RECORDS_TOTAL: &str = "ironwatch_overflow_records_total";

/// 수신 큐 깊이 (gauge)
pub const INTAKE_QUEUE_DEPTH: &str = "ironwatch_intake_queue_depth";

/// 배치 플러시 소요 시간 (histogram, 초)
pub const BATCH_FLUSH_DURATION_SECONDS: &str = "ironwatch_batch_flush_duration_seconds";

// ─── 탐지 메트릭 ────────────────────────────────────────────────────

/// 탐지 엔진이 평가한 엔트리 수 (counter)
pub const DETECTION_ENTRIES_PROCESSED_TOTAL: &str = "ironwatch_detection_entries_processed_total";

/// 생성된 알림 수 (counter, label: severity)
pub const ALERTS_CREATED_TOTAL: &str = "ironwatch_alerts_created_total";

/// 탐지 사이클 오류 수 (counter)
pub const DETECTION_ERRORS_TOTAL: &str = "ironwatch_detection_errors_total";

// ─── 필드 추출 메트릭 ───────────────────────────────────────────────

/// 상세 레코드를 채운 엔트리 수 (counter)
pub const EXTRACTION_ENTRIES_TOTAL: &str = "ironwatch_extraction_entries_total";

/// 필드 추출 오류 수 (counter)
pub const EXTRACTION_ERRORS_TOTAL: &str = "ironwatch_extraction_errors_total";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "ironwatch_uptime_seconds";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 배치 플러시 히스토그램 버킷 (초)
///
/// 100us ~ 10s 범위, 단일 트랜잭션 커밋 분포
pub const FLUSH_DURATION_BUCKETS: [f64; 10] = [
    0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 10.0,
];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `ironwatch-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // 수집 경로
    describe_counter!(
        DATAGRAMS_RECEIVED_TOTAL,
        "Total number of UDP datagrams received"
    );
    describe_counter!(
        DATAGRAMS_DROPPED_TOTAL,
        "Total number of datagrams dropped because the intake queue was full"
    );
    describe_counter!(
        ENTRIES_PARSED_TOTAL,
        "Total number of records normalized by the dispatcher, per kind"
    );
    describe_counter!(
        ENTRIES_SAVED_TOTAL,
        "Total number of log entries committed to storage"
    );
    describe_counter!(
        ENTRIES_ERRORED_TOTAL,
        "Total number of records that failed parsing or storage"
    );
    describe_counter!(BATCHES_FLUSHED_TOTAL, "Total number of batch flushes");
    describe_counter!(
        OVERFLOW_RECORDS_TOTAL,
        "Total number of records written to the overflow file"
    );
    describe_gauge!(
        INTAKE_QUEUE_DEPTH,
        "Current number of records waiting in the intake queue"
    );
    describe_histogram!(
        BATCH_FLUSH_DURATION_SECONDS,
        "Time to commit a single batch in seconds"
    );

    // 탐지
    describe_counter!(
        DETECTION_ENTRIES_PROCESSED_TOTAL,
        "Total number of log entries evaluated by the detection engine"
    );
    describe_counter!(ALERTS_CREATED_TOTAL, "Total number of alerts created");
    describe_counter!(
        DETECTION_ERRORS_TOTAL,
        "Total number of detection cycle errors"
    );

    // 필드 추출
    describe_counter!(
        EXTRACTION_ENTRIES_TOTAL,
        "Total number of entries backfilled with detail records"
    );
    describe_counter!(
        EXTRACTION_ERRORS_TOTAL,
        "Total number of field extraction errors"
    );

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "Ironwatch daemon uptime in seconds");
}
