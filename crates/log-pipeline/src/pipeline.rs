//! 수집 파이프라인 오케스트레이션 -- 수신/디스패치/배치 저장의 전체 흐름을 관리합니다.
//!
//! [`IngestionPipeline`]은 core의 [`Pipeline`](ironwatch_core::pipeline::Pipeline) trait을 구현하여
//! `ironwatch-daemon`에서 탐지 엔진, 필드 추출 워커와 동일한 생명주기로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! UdpListener -> IntakeQueue -> ParserRouter -> BatchWriter -> Storage
//!                                     |              |
//!                                     +--> overflow <+
//! ```
//!
//! 정지 시 수신 루프가 먼저 멈추고 큐를 닫습니다. 디스패처는 큐에 남은 레코드를
//! 모두 처리한 뒤 마지막 배치를 플러시하고 종료합니다.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use ironwatch_core::error::{IronwatchError, PipelineError};
use ironwatch_core::metrics as m;
use ironwatch_core::pipeline::{HealthStatus, Pipeline, WorkerStatus};
use ironwatch_storage::Storage;

use crate::buffer::IntakeQueue;
use crate::collector::UdpListener;
use crate::config::PipelineConfig;
use crate::error::LogPipelineError;
use crate::overflow::OverflowFile;
use crate::parser::ParserRouter;
use crate::stats::IngestStats;
use crate::writer::BatchWriter;

/// 큐 사용률이 이 값을 넘으면 Degraded
const QUEUE_DEGRADED_UTILIZATION: f64 = 0.9;

/// 파이프라인 실행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum PipelineState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 수집 파이프라인
///
/// # 사용 예시
/// ```ignore
/// use ironwatch_log_pipeline::IngestionPipelineBuilder;
///
/// let mut pipeline = IngestionPipelineBuilder::new()
///     .config(config)
///     .storage(storage)
///     .build()?;
///
/// pipeline.start().await?;
/// ```
pub struct IngestionPipeline {
    config: PipelineConfig,
    state: PipelineState,
    storage: Storage,
    router: Arc<ParserRouter>,
    /// 시작할 때마다 새로 만듭니다 (정지 시 닫히므로)
    queue: Arc<IntakeQueue>,
    stats: Arc<IngestStats>,
    parent: CancellationToken,
    listener_cancel: Option<CancellationToken>,
    listener_task: Option<JoinHandle<()>>,
    dispatcher_task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl IngestionPipeline {
    /// 현재 상태를 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            PipelineState::Initialized => "initialized",
            PipelineState::Running => "running",
            PipelineState::Stopped => "stopped",
        }
    }

    /// 실제 바인드된 주소 (실행 중일 때만)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn stats(&self) -> &Arc<IngestStats> {
        &self.stats
    }

    /// 수신 큐 사용률을 반환합니다.
    pub fn queue_utilization(&self) -> f64 {
        self.queue.utilization()
    }

    fn new_queue(config: &PipelineConfig) -> Arc<IntakeQueue> {
        Arc::new(IntakeQueue::new(
            config.queue_capacity,
            config.backpressure,
            config.send_timeout(),
        ))
    }

    fn dispatcher_alive(&self) -> bool {
        self.dispatcher_task
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

/// 큐가 닫히고 비워질 때까지 레코드를 디스패치합니다.
async fn run_dispatcher(
    queue: Arc<IntakeQueue>,
    router: Arc<ParserRouter>,
    mut writer: BatchWriter,
    tick: std::time::Duration,
) {
    let stats = Arc::clone(writer.stats());
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!("dispatcher started");

    loop {
        tokio::select! {
            record = queue.pop() => {
                let Some(record) = record else { break };
                stats.record_received();
                let dispatched = router.dispatch(&record);
                if let Err(e) = writer.accept(dispatched).await {
                    tracing::error!(error = %e, "failed to hand off dispatched record");
                }
            }
            _ = ticker.tick() => {
                metrics::gauge!(m::INTAKE_QUEUE_DEPTH).set(queue.len() as f64);
                stats.set_dropped(queue.dropped_count());
                if let Err(e) = writer.flush_if_due().await {
                    tracing::error!(error = %e, "timed flush failed");
                }
            }
        }
    }

    stats.set_dropped(queue.dropped_count());
    match writer.flush().await {
        Ok(outcome) => tracing::info!(?outcome, "final batch flushed"),
        Err(e) => tracing::error!(
            error = %e,
            lost = writer.pending(),
            "final flush failed, buffered entries are lost"
        ),
    }
    tracing::info!("dispatcher stopped");
}

impl Pipeline for IngestionPipeline {
    async fn start(&mut self) -> Result<(), IronwatchError> {
        if self.state == PipelineState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        tracing::info!(addr = %self.config.bind_addr, "starting ingestion pipeline");

        let queue = Self::new_queue(&self.config);
        let listener = UdpListener::bind(
            &self.config.bind_addr,
            self.config.max_datagram_size,
            Arc::clone(&queue),
        )
        .await?;
        self.local_addr = Some(listener.local_addr()?);

        let writer = BatchWriter::new(
            self.storage.clone(),
            OverflowFile::new(&self.config.overflow_path),
            self.config.batch_size,
            self.config.batch_timeout(),
            Arc::clone(&self.stats),
        );

        let cancel = self.parent.child_token();
        self.listener_task = Some(tokio::spawn(listener.run(cancel.clone())));
        self.dispatcher_task = Some(tokio::spawn(run_dispatcher(
            Arc::clone(&queue),
            Arc::clone(&self.router),
            writer,
            self.config.tick(),
        )));
        self.listener_cancel = Some(cancel);
        self.queue = queue;

        self.state = PipelineState::Running;
        tracing::info!(
            formats = ?self.router.registered_formats(),
            "ingestion pipeline started"
        );
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), IronwatchError> {
        if self.state != PipelineState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        tracing::info!("stopping ingestion pipeline");

        // 1. 수신 중단 (큐가 닫힘)
        if let Some(cancel) = self.listener_cancel.take() {
            cancel.cancel();
        }
        if let Some(task) = self.listener_task.take() {
            task.await.map_err(LogPipelineError::from)?;
        }
        // 리스너가 비정상 종료했어도 디스패처는 끝나야 함
        self.queue.close();

        // 2. 남은 레코드 처리 및 마지막 플러시
        if let Some(task) = self.dispatcher_task.take() {
            task.await.map_err(LogPipelineError::from)?;
        }

        self.local_addr = None;
        self.state = PipelineState::Stopped;
        tracing::info!(
            received = self.stats.received(),
            saved = self.stats.saved(),
            dropped = self.stats.dropped(),
            "ingestion pipeline stopped"
        );
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            PipelineState::Running => {
                if !self.dispatcher_alive() {
                    return HealthStatus::Unhealthy("dispatcher terminated".to_owned());
                }
                let utilization = self.queue.utilization();
                if utilization > QUEUE_DEGRADED_UTILIZATION {
                    HealthStatus::Degraded(format!(
                        "intake queue utilization high: {:.1}%",
                        utilization * 100.0
                    ))
                } else {
                    HealthStatus::Healthy
                }
            }
            PipelineState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            PipelineState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }

    fn status(&self) -> WorkerStatus {
        self.stats.set_dropped(self.queue.dropped_count());
        WorkerStatus {
            running: self.state == PipelineState::Running && self.dispatcher_alive(),
            counters: self.stats.snapshot(),
        }
    }
}

/// 수집 파이프라인 빌더
pub struct IngestionPipelineBuilder {
    config: PipelineConfig,
    storage: Option<Storage>,
    router: Option<ParserRouter>,
    cancel: Option<CancellationToken>,
}

impl IngestionPipelineBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            storage: None,
            router: None,
            cancel: None,
        }
    }

    /// 파이프라인 설정을 지정합니다.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// 배치를 기록할 저장소 (필수)
    pub fn storage(mut self, storage: Storage) -> Self {
        self.storage = Some(storage);
        self
    }

    /// 파서 우선순위 목록을 교체합니다. 지정하지 않으면 기본 목록을 사용합니다.
    pub fn router(mut self, router: ParserRouter) -> Self {
        self.router = Some(router);
        self
    }

    /// 상위 취소 토큰. 취소되면 수신 루프가 멈추고 디스패처가 정리 후 종료합니다.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// 파이프라인을 빌드합니다.
    pub fn build(self) -> Result<IngestionPipeline, LogPipelineError> {
        self.config.validate()?;
        let storage = self.storage.ok_or_else(|| LogPipelineError::Config {
            field: "storage".to_owned(),
            reason: "storage handle is required".to_owned(),
        })?;

        Ok(IngestionPipeline {
            queue: IngestionPipeline::new_queue(&self.config),
            config: self.config,
            state: PipelineState::Initialized,
            storage,
            router: Arc::new(self.router.unwrap_or_else(ParserRouter::with_defaults)),
            stats: Arc::new(IngestStats::default()),
            parent: self.cancel.unwrap_or_default(),
            listener_cancel: None,
            listener_task: None,
            dispatcher_task: None,
            local_addr: None,
        })
    }
}

impl Default for IngestionPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
