//! 폴링 루프 -- 고정 주기로 한 사이클씩 실행하는 백그라운드 태스크
//!
//! 탐지 엔진과 필드 추출 워커가 공유합니다. 사이클 사이에서만 취소를 확인하므로
//! 진행 중인 저장소 트랜잭션은 항상 끝까지 실행됩니다.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use ironwatch_core::error::{IronwatchError, PipelineError};
use ironwatch_core::pipeline::{HealthStatus, Pipeline, WorkerStatus};

use crate::error::LogPipelineError;
use crate::stats::{DetectionStats, ExtractionStats, IngestStats};

/// 카운터 스냅샷을 제공하는 통계 타입
pub trait CounterSnapshot: Send + Sync + 'static {
    fn snapshot(&self) -> Vec<(String, u64)>;
}

impl CounterSnapshot for IngestStats {
    fn snapshot(&self) -> Vec<(String, u64)> {
        IngestStats::snapshot(self)
    }
}

impl CounterSnapshot for DetectionStats {
    fn snapshot(&self) -> Vec<(String, u64)> {
        DetectionStats::snapshot(self)
    }
}

impl CounterSnapshot for ExtractionStats {
    fn snapshot(&self) -> Vec<(String, u64)> {
        ExtractionStats::snapshot(self)
    }
}

/// 폴링 사이클 하나
pub trait PollCycle: Send + Sync + 'static {
    type Stats: CounterSnapshot;

    /// 로그에 쓰는 루프 이름
    fn name(&self) -> &'static str;

    /// 사이클 하나를 실행하고 처리한 엔트리 수를 돌려줍니다.
    fn run_cycle(&mut self) -> impl Future<Output = Result<usize, LogPipelineError>> + Send;

    fn stats(&self) -> Arc<Self::Stats>;
}

/// 폴링 워커
///
/// `start`/`stop`을 반복할 수 있습니다. 정지 시 사이클 상태(threshold 카운터 등)를
/// 돌려받아 다음 시작에 재사용합니다.
pub struct PollingWorker<C: PollCycle> {
    name: &'static str,
    cycle: Option<C>,
    interval: Duration,
    parent: CancellationToken,
    cancel: Option<CancellationToken>,
    handle: Option<JoinHandle<C>>,
    stats: Arc<C::Stats>,
    last_cycle_failed: Arc<AtomicBool>,
}

impl<C: PollCycle> PollingWorker<C> {
    /// `parent`가 취소되면 루프도 함께 종료됩니다.
    pub fn new(cycle: C, interval: Duration, parent: CancellationToken) -> Self {
        Self {
            name: cycle.name(),
            stats: cycle.stats(),
            cycle: Some(cycle),
            interval,
            parent,
            cancel: None,
            handle: None,
            last_cycle_failed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn stats(&self) -> &Arc<C::Stats> {
        &self.stats
    }
}

async fn run_loop<C: PollCycle>(
    mut cycle: C,
    interval: Duration,
    cancel: CancellationToken,
    last_cycle_failed: Arc<AtomicBool>,
) -> C {
    let name = cycle.name();
    tracing::info!(worker = name, interval_secs = interval.as_secs(), "polling loop started");

    loop {
        match cycle.run_cycle().await {
            Ok(processed) => {
                last_cycle_failed.store(false, Ordering::Relaxed);
                if processed > 0 {
                    tracing::debug!(worker = name, processed, "cycle finished");
                }
            }
            Err(e) => {
                last_cycle_failed.store(true, Ordering::Relaxed);
                tracing::warn!(worker = name, error = %e, "cycle failed, retrying next interval");
            }
        }

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }
    }

    tracing::info!(worker = name, "polling loop stopped");
    cycle
}

impl<C: PollCycle> Pipeline for PollingWorker<C> {
    async fn start(&mut self) -> Result<(), IronwatchError> {
        if self.is_running() {
            return Err(PipelineError::AlreadyRunning.into());
        }
        let cycle = self.cycle.take().ok_or_else(|| {
            PipelineError::InitFailed(format!("{} worker state was lost", self.name))
        })?;

        let cancel = self.parent.child_token();
        self.handle = Some(tokio::spawn(run_loop(
            cycle,
            self.interval,
            cancel.clone(),
            Arc::clone(&self.last_cycle_failed),
        )));
        self.cancel = Some(cancel);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), IronwatchError> {
        let Some(handle) = self.handle.take() else {
            return Err(PipelineError::NotRunning.into());
        };
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }

        let cycle = handle
            .await
            .map_err(|e| PipelineError::InitFailed(format!("{} worker task failed: {e}", self.name)))?;
        self.cycle = Some(cycle);
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match &self.handle {
            None => HealthStatus::Unhealthy("stopped".to_owned()),
            Some(h) if h.is_finished() => HealthStatus::Unhealthy("loop terminated".to_owned()),
            Some(_) if self.last_cycle_failed.load(Ordering::Relaxed) => {
                HealthStatus::Degraded("last cycle failed".to_owned())
            }
            Some(_) => HealthStatus::Healthy,
        }
    }

    fn status(&self) -> WorkerStatus {
        WorkerStatus {
            running: self.is_running(),
            counters: self.stats.snapshot(),
        }
    }
}
