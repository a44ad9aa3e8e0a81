//! 수신 큐 -- 수신 루프와 디스패처 사이의 유한 큐
//!
//! [`IntakeQueue`]는 수신된 원시 레코드를 인메모리에 보관하고
//! 디스패처 태스크가 하나씩 꺼내 갑니다.
//!
//! # 포화 정책
//! 큐가 가득 찬 경우:
//! - [`BackpressurePolicy::DropOldest`]: 가장 오래된 레코드를 드롭하고 새 레코드를 넣음
//! - [`BackpressurePolicy::Block`]: `send_timeout`까지 공간을 기다리고, 시간 초과 시 새 레코드를 드롭

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use ironwatch_core::metrics as m;

use crate::collector::RawRecord;
use crate::config::BackpressurePolicy;

/// `push` 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// 정상 적재
    Queued,
    /// 가장 오래된 레코드를 버리고 적재
    DroppedOldest,
    /// 대기 시간 초과로 새 레코드를 버림
    Rejected,
    /// 큐가 닫혀 있음
    Closed,
}

impl PushOutcome {
    /// 레코드 하나가 손실되었는지
    pub fn is_drop(&self) -> bool {
        !matches!(self, Self::Queued)
    }
}

/// 유한 수신 큐 (다중 생산자, 단일 소비자)
pub struct IntakeQueue {
    buffer: Mutex<VecDeque<RawRecord>>,
    capacity: usize,
    policy: BackpressurePolicy,
    send_timeout: Duration,
    /// 소비자 깨움 (레코드 도착, 닫힘)
    items: Notify,
    /// 생산자 깨움 (공간 생김)
    space: Notify,
    closed: AtomicBool,
    len: AtomicUsize,
    dropped: AtomicU64,
    total_received: AtomicU64,
}

impl IntakeQueue {
    /// 새 수신 큐를 생성합니다.
    pub fn new(capacity: usize, policy: BackpressurePolicy, send_timeout: Duration) -> Self {
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(capacity.min(10_000))),
            capacity: capacity.max(1),
            policy,
            send_timeout,
            items: Notify::new(),
            space: Notify::new(),
            closed: AtomicBool::new(false),
            len: AtomicUsize::new(0),
            dropped: AtomicU64::new(0),
            total_received: AtomicU64::new(0),
        }
    }

    /// 레코드를 큐에 넣습니다.
    ///
    /// `Block` 정책에서만 대기할 수 있으며, 대기 시간은 `send_timeout`으로 제한됩니다.
    pub async fn push(&self, record: RawRecord) -> PushOutcome {
        if self.is_closed() {
            return PushOutcome::Closed;
        }
        self.total_received.fetch_add(1, Ordering::Relaxed);

        let deadline = Instant::now() + self.send_timeout;
        let mut record = Some(record);
        loop {
            let notified = self.space.notified();
            {
                let mut buffer = self.buffer.lock().await;
                if buffer.len() < self.capacity {
                    if let Some(r) = record.take() {
                        buffer.push_back(r);
                    }
                    self.publish_len(buffer.len());
                    drop(buffer);
                    self.items.notify_one();
                    return PushOutcome::Queued;
                }

                if self.policy == BackpressurePolicy::DropOldest {
                    buffer.pop_front();
                    if let Some(r) = record.take() {
                        buffer.push_back(r);
                    }
                    self.publish_len(buffer.len());
                    drop(buffer);
                    let dropped = self.record_drop();
                    tracing::warn!(
                        dropped,
                        capacity = self.capacity,
                        "intake queue full, dropped oldest record"
                    );
                    self.items.notify_one();
                    return PushOutcome::DroppedOldest;
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                let dropped = self.record_drop();
                tracing::warn!(
                    dropped,
                    capacity = self.capacity,
                    "intake queue full after send timeout, rejected new record"
                );
                return PushOutcome::Rejected;
            }
            if self.is_closed() {
                return PushOutcome::Closed;
            }
        }
    }

    /// 레코드를 하나 꺼냅니다. 비어있으면 도착할 때까지 대기합니다.
    ///
    /// 큐가 닫히고 비어있으면 `None`을 반환합니다.
    pub async fn pop(&self) -> Option<RawRecord> {
        loop {
            let notified = self.items.notified();
            if let Some(record) = self.try_pop().await {
                return Some(record);
            }
            if self.is_closed() {
                return None;
            }
            notified.await;
        }
    }

    /// 대기하지 않고 레코드를 하나 꺼냅니다.
    pub async fn try_pop(&self) -> Option<RawRecord> {
        let mut buffer = self.buffer.lock().await;
        let record = buffer.pop_front();
        if record.is_some() {
            self.publish_len(buffer.len());
            drop(buffer);
            self.space.notify_one();
        }
        record
    }

    /// 큐를 닫습니다. 남은 레코드는 `pop`으로 계속 꺼낼 수 있습니다.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.items.notify_one();
        self.space.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// 현재 적재된 레코드 수
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 지금까지 드롭된 레코드 수
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// 총 유입 레코드 수
    pub fn total_received(&self) -> u64 {
        self.total_received.load(Ordering::Relaxed)
    }

    /// 큐 사용률을 0.0~1.0 범위로 반환합니다.
    pub fn utilization(&self) -> f64 {
        f64::from(u32::try_from(self.len()).unwrap_or(u32::MAX))
            / f64::from(u32::try_from(self.capacity).unwrap_or(u32::MAX))
    }

    fn publish_len(&self, len: usize) {
        self.len.store(len, Ordering::Relaxed);
        metrics::gauge!(m::INTAKE_QUEUE_DEPTH).set(len as f64);
    }

    fn record_drop(&self) -> u64 {
        metrics::counter!(m::DATAGRAMS_DROPPED_TOTAL).increment(1);
        self.dropped.fetch_add(1, Ordering::Relaxed) + 1
    }
}
