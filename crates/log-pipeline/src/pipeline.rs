//! 파이프라인 오케스트레이션 -- 수신기와 처리 단계의 생명주기를 관리합니다.
//!
//! [`LogPipeline`]은 core의 [`Pipeline`](watchtower_core::pipeline::Pipeline) trait을 구현하여
//! `watchtower-daemon`에서 다른 모듈과 동일한 생명주기로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! PacketReceiver -> bounded mpsc -> process loop -> spawn_blocking(PacketProcessor::process)
//!   (try_send)                        (timeout)
//! ```
//!
//! 정지 시 수신기가 먼저 끝나며 송신측이 닫힙니다. 처리 루프는 큐에 남은
//! 패킷을 모두 처리한 뒤 종료합니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use watchtower_core::error::WatchtowerError;
use watchtower_core::metrics as m;
use watchtower_core::pipeline::{HealthStatus, Pipeline};

use crate::alert::AlertExtractor;
use crate::catalog::{EmptyJobCatalog, FileJobCatalog, JobCatalog};
use crate::collector::{PacketReceiver, RawPacket, UdpReceiverConfig};
use crate::config::PipelineConfig;
use crate::error::LogPipelineError;
use crate::ledger::{DedupLedger, FileLedger};
use crate::processor::PacketProcessor;
use crate::router::{RouteTable, Router};
use crate::sink::SinkSet;
use crate::stats::{PipelineStats, StatsSnapshot};

/// 큐 사용률이 이 값을 넘으면 Degraded로 보고합니다.
const QUEUE_DEGRADED_RATIO: f64 = 0.9;

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

/// 로그 수집 파이프라인
///
/// # 사용 예시
/// ```ignore
/// use watchtower_log_pipeline::LogPipelineBuilder;
///
/// let mut pipeline = LogPipelineBuilder::new().config(config).build()?;
/// pipeline.start().await?;
/// // ...
/// pipeline.stop().await?;
/// ```
pub struct LogPipeline {
    /// 파이프라인 설정
    config: PipelineConfig,
    /// 현재 상태
    state: PipelineState,
    /// 공유 통계
    stats: Arc<PipelineStats>,
    /// 주입된 라우트 테이블 (없으면 파일에서 로드)
    route_table: Option<RouteTable>,
    /// 주입된 원장
    ledger: Option<Arc<dyn DedupLedger>>,
    /// 주입된 카탈로그
    catalog: Option<Arc<dyn JobCatalog>>,
    /// 주입된 싱크
    sinks: Option<SinkSet>,
    /// 종료 신호
    cancel_token: CancellationToken,
    /// 실제 바인드 주소
    local_addr: Option<SocketAddr>,
    /// 큐 사용률 확인용 약한 송신측
    queue: Option<mpsc::WeakSender<RawPacket>>,
    /// 수신 태스크
    receiver_task: Option<JoinHandle<Result<(), LogPipelineError>>>,
    /// 처리 태스크
    processor_task: Option<JoinHandle<()>>,
}

impl LogPipeline {
    /// 현재 상태를 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            PipelineState::Initialized => "initialized",
            PipelineState::Running => "running",
            PipelineState::Stopped => "stopped",
        }
    }

    /// 통계 스냅샷을 반환합니다.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// 실행 중인 수신기의 바인드 주소를 반환합니다.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// 파이프라인 설정
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 큐 사용률 (0.0-1.0). 실행 중이 아니면 0입니다.
    pub fn queue_utilization(&self) -> f64 {
        let Some(sender) = self.queue.as_ref().and_then(mpsc::WeakSender::upgrade) else {
            return 0.0;
        };
        let max = sender.max_capacity();
        let used = max.saturating_sub(sender.capacity());
        used as f64 / max as f64
    }

    async fn load_route_table(&self) -> Result<RouteTable, LogPipelineError> {
        match &self.route_table {
            Some(table) => Ok(table.clone()),
            None => RouteTable::load(&self.config.routes_path).await,
        }
    }

    async fn load_catalog(&self) -> Arc<dyn JobCatalog> {
        if let Some(catalog) = &self.catalog {
            return Arc::clone(catalog);
        }
        let Some(path) = self.config.job_catalog() else {
            info!("no job catalog configured, every job is unknown");
            return Arc::new(EmptyJobCatalog);
        };
        match FileJobCatalog::load(path).await {
            Ok(catalog) => Arc::new(catalog),
            Err(e) => {
                warn!(path, error = %e, "failed to load job catalog, every job is unknown");
                Arc::new(EmptyJobCatalog)
            }
        }
    }

    async fn open_ledger(&self) -> Result<Arc<dyn DedupLedger>, LogPipelineError> {
        if let Some(ledger) = &self.ledger {
            return Ok(Arc::clone(ledger));
        }
        let path = self.config.ledger_path.clone();
        let ledger = tokio::task::spawn_blocking({
            let path = path.clone();
            move || FileLedger::open(path)
        })
        .await
        .map_err(|e| LogPipelineError::Ledger {
            path,
            reason: e.to_string(),
        })??;
        Ok(Arc::new(ledger))
    }

    async fn open_sinks(&self) -> Result<SinkSet, LogPipelineError> {
        if let Some(sinks) = &self.sinks {
            return Ok(sinks.clone());
        }
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || SinkSet::open(&config))
            .await
            .map_err(|e| LogPipelineError::Sink {
                sink: "all".to_owned(),
                reason: e.to_string(),
            })?
    }

    async fn start_inner(&mut self) -> Result<(), LogPipelineError> {
        let table = self.load_route_table().await?;
        let catalog = self.load_catalog().await;
        let ledger = self.open_ledger().await?;
        let sinks = self.open_sinks().await?;

        let router = Router::new(table, self.config.alert_channels.clone());
        let extractor = AlertExtractor::new(ledger, catalog)?;
        let processor = Arc::new(PacketProcessor::new(
            router,
            extractor,
            sinks,
            Arc::clone(&self.stats),
        )?);

        self.cancel_token = CancellationToken::new();
        let receiver = PacketReceiver::bind(
            UdpReceiverConfig {
                bind_addr: self.config.bind_addr.clone(),
                recv_buffer_size: self.config.recv_buffer_size,
                max_message_size: self.config.max_message_size,
            },
            self.cancel_token.clone(),
            Arc::clone(&self.stats),
        )?;
        self.local_addr = Some(receiver.local_addr());

        let (tx, rx) = mpsc::channel(self.config.queue_capacity);
        self.queue = Some(tx.downgrade());
        self.receiver_task = Some(tokio::spawn(receiver.run(tx)));
        self.processor_task = Some(tokio::spawn(process_loop(
            rx,
            processor,
            Arc::clone(&self.stats),
            self.config.handler_timeout(),
        )));
        Ok(())
    }
}

/// 큐가 닫힐 때까지 패킷을 하나씩 처리합니다.
///
/// 각 패킷은 블로킹 스레드에서 처리됩니다. 에러, 패닉, 시간 초과는 기록만
/// 하고 다음 패킷으로 넘어갑니다. 시간 초과된 핸들러도 끝날 때까지 기다린 뒤
/// 다음 패킷을 꺼내므로 핸들러는 항상 하나만 실행됩니다.
async fn process_loop(
    mut rx: mpsc::Receiver<RawPacket>,
    processor: Arc<PacketProcessor>,
    stats: Arc<PipelineStats>,
    handler_timeout: Duration,
) {
    debug!("processing loop started");

    while let Some(packet) = rx.recv().await {
        metrics::gauge!(m::RECEIVER_QUEUE_DEPTH).set(rx.len() as f64);
        let started = Instant::now();
        let source_ip = packet.source_ip;

        let mut task = tokio::task::spawn_blocking({
            let processor = Arc::clone(&processor);
            move || processor.process(&packet)
        });

        let failure = match tokio::time::timeout(handler_timeout, &mut task).await {
            Ok(Ok(Ok(outcome))) => {
                debug!(
                    %source_ip,
                    channel = %outcome.channel,
                    outcome = outcome.extraction.as_ref().map(|o| o.reason()),
                    "packet processed"
                );
                None
            }
            Ok(Ok(Err(e))) => {
                error!(%source_ip, error = %e, "packet handler failed");
                Some("error")
            }
            Ok(Err(e)) => {
                error!(%source_ip, error = %e, "packet handler panicked");
                Some("panic")
            }
            Err(_) => {
                error!(
                    %source_ip,
                    timeout_secs = handler_timeout.as_secs(),
                    "packet handler timed out, waiting for it to finish"
                );
                if let Err(e) = task.await {
                    error!(%source_ip, error = %e, "timed-out packet handler panicked");
                }
                Some("timeout")
            }
        };

        if let Some(kind) = failure {
            stats.record_handler_failure();
            metrics::counter!(m::PIPELINE_HANDLER_FAILURES_TOTAL, m::LABEL_FAILURE => kind)
                .increment(1);
        }
        stats.record_processed();
        metrics::counter!(m::PIPELINE_PACKETS_PROCESSED_TOTAL).increment(1);
        metrics::histogram!(m::PIPELINE_PROCESSING_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
    }

    metrics::gauge!(m::RECEIVER_QUEUE_DEPTH).set(0.0);
    debug!("processing loop drained and stopped");
}

impl Pipeline for LogPipeline {
    async fn start(&mut self) -> Result<(), WatchtowerError> {
        if self.state == PipelineState::Running {
            return Err(watchtower_core::error::PipelineError::AlreadyRunning.into());
        }

        info!(bind_addr = %self.config.bind_addr, "starting log pipeline");
        self.start_inner().await.map_err(WatchtowerError::from)?;

        self.state = PipelineState::Running;
        info!(
            local_addr = ?self.local_addr,
            alert_channels = ?self.config.alert_channels,
            "log pipeline started"
        );
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), WatchtowerError> {
        if self.state != PipelineState::Running {
            return Err(watchtower_core::error::PipelineError::NotRunning.into());
        }

        info!("stopping log pipeline");

        // 1. 수신 중단 (소켓 닫힘, 큐 송신측 해제)
        self.cancel_token.cancel();
        if let Some(task) = self.receiver_task.take() {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "receiver had already terminated"),
                Err(e) => warn!(error = %e, "receiver task join failed"),
            }
        }

        // 2. 큐에 남은 패킷 처리
        if let Some(task) = self.processor_task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "processing task join failed");
            }
        }

        self.queue = None;
        self.state = PipelineState::Stopped;
        info!(stats = ?self.stats.snapshot(), "log pipeline stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            PipelineState::Running => {
                let receiver_down = self
                    .receiver_task
                    .as_ref()
                    .is_none_or(JoinHandle::is_finished);
                if receiver_down {
                    return HealthStatus::Unhealthy("receiver terminated".to_owned());
                }

                let utilization = self.queue_utilization();
                if utilization > QUEUE_DEGRADED_RATIO {
                    HealthStatus::Degraded(format!(
                        "queue utilization high: {:.1}%",
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
}

/// 로그 파이프라인 빌더
///
/// 라우트 테이블, 원장, 카탈로그, 싱크를 주입하지 않으면 `start()`에서
/// 설정된 경로로부터 로드합니다.
#[derive(Default)]
pub struct LogPipelineBuilder {
    config: PipelineConfig,
    route_table: Option<RouteTable>,
    ledger: Option<Arc<dyn DedupLedger>>,
    catalog: Option<Arc<dyn JobCatalog>>,
    sinks: Option<SinkSet>,
}

impl LogPipelineBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 파이프라인 설정을 지정합니다.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// 라우트 테이블을 주입합니다.
    pub fn route_table(mut self, table: RouteTable) -> Self {
        self.route_table = Some(table);
        self
    }

    /// 중복 제거 원장을 주입합니다.
    pub fn ledger(mut self, ledger: Arc<dyn DedupLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// 작업 카탈로그를 주입합니다.
    pub fn catalog(mut self, catalog: Arc<dyn JobCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// 출력 싱크를 주입합니다.
    pub fn sinks(mut self, sinks: SinkSet) -> Self {
        self.sinks = Some(sinks);
        self
    }

    /// 설정을 검증하고 파이프라인을 빌드합니다.
    pub fn build(self) -> Result<LogPipeline, LogPipelineError> {
        self.config.validate()?;

        Ok(LogPipeline {
            config: self.config,
            state: PipelineState::Initialized,
            stats: Arc::new(PipelineStats::new()),
            route_table: self.route_table,
            ledger: self.ledger,
            catalog: self.catalog,
            sinks: self.sinks,
            cancel_token: CancellationToken::new(),
            local_addr: None,
            queue: None,
            receiver_task: None,
            processor_task: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::alert::JobAlert;
    use crate::config::PipelineConfigBuilder;
    use crate::ledger::MemoryLedger;
    use crate::sink::{AlertSink, ArchivedEvent, EventSink};

    fn test_pipeline(dir: &std::path::Path) -> LogPipeline {
        let config = PipelineConfigBuilder::new()
            .bind_addr("127.0.0.1:0")
            .data_dir(dir)
            .build()
            .unwrap();
        LogPipelineBuilder::new()
            .config(config)
            .route_table(RouteTable::new("raw"))
            .ledger(Arc::new(MemoryLedger::new()))
            .build()
            .unwrap()
    }

    #[test]
    fn builder_creates_pipeline() {
        let pipeline = LogPipelineBuilder::new().build().unwrap();
        assert_eq!(pipeline.state_name(), "initialized");
        assert_eq!(pipeline.stats(), StatsSnapshot::default());
        assert!(pipeline.local_addr().is_none());
    }

    #[test]
    fn builder_with_invalid_config_fails() {
        let config = PipelineConfig {
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(LogPipelineBuilder::new().config(config).build().is_err());
    }

    #[tokio::test]
    async fn stop_before_start_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = test_pipeline(dir.path());
        assert!(pipeline.health_check().await.is_unhealthy());
        assert!(pipeline.stop().await.is_err());
    }

    #[tokio::test]
    async fn pipeline_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = test_pipeline(dir.path());

        pipeline.start().await.unwrap();
        assert_eq!(pipeline.state_name(), "running");
        assert!(pipeline.local_addr().unwrap().port() > 0);
        assert!(pipeline.health_check().await.is_healthy());
        assert!(pipeline.start().await.is_err());

        pipeline.stop().await.unwrap();
        assert_eq!(pipeline.state_name(), "stopped");
        assert!(pipeline.health_check().await.is_unhealthy());
        assert_eq!(pipeline.queue_utilization(), 0.0);
    }

    #[tokio::test]
    async fn missing_route_table_fails_start() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfigBuilder::new()
            .bind_addr("127.0.0.1:0")
            .routes_path(dir.path().join("missing.json").display().to_string())
            .data_dir(dir.path())
            .build()
            .unwrap();
        let mut pipeline = LogPipelineBuilder::new().config(config).build().unwrap();
        assert!(pipeline.start().await.is_err());
        assert_eq!(pipeline.state_name(), "initialized");
    }

    #[tokio::test]
    async fn restart_after_stop() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = test_pipeline(dir.path());

        pipeline.start().await.unwrap();
        pipeline.stop().await.unwrap();
        pipeline.start().await.unwrap();
        assert!(pipeline.health_check().await.is_healthy());
        pipeline.stop().await.unwrap();
    }

    /// 모든 쓰기가 실패하는 원장
    struct BrokenLedger;

    impl DedupLedger for BrokenLedger {
        fn contains(&self, _id: &str) -> Result<bool, LogPipelineError> {
            Ok(false)
        }

        fn append(&self, id: &str) -> Result<(), LogPipelineError> {
            Err(LogPipelineError::Ledger {
                path: "broken".to_owned(),
                reason: format!("cannot append {id}"),
            })
        }

        fn check_and_insert(&self, id: &str) -> Result<bool, LogPipelineError> {
            self.append(id).map(|()| true)
        }

        fn len(&self) -> usize {
            0
        }
    }

    #[tokio::test]
    async fn ledger_failure_counts_as_handler_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfigBuilder::new()
            .bind_addr("127.0.0.1:0")
            .alert_channels(vec!["controlm".to_owned()])
            .data_dir(dir.path())
            .build()
            .unwrap();
        let mut pipeline = LogPipelineBuilder::new()
            .config(config)
            .route_table(RouteTable::new("raw").with_ip("127.0.0.1", "controlm"))
            .ledger(Arc::new(BrokenLedger))
            .build()
            .unwrap();
        pipeline.start().await.unwrap();

        let today = chrono::Local::now().date_naive();
        let line = format!(
            "<13>Feb  9 07:09:52 ctm01 ctmlog: {} 07:09:52 call_type: I alert_id: 77 \
             data_center: dc memname: m.ksh order_id: 1 severity: V status: x run_counter: 1",
            today.format("%Y-%m-%d")
        );
        let sender = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        sender
            .send_to(line.as_bytes(), pipeline.local_addr().unwrap())
            .unwrap();

        for _ in 0..100 {
            if pipeline.stats().packets_processed == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        pipeline.stop().await.unwrap();

        let stats = pipeline.stats();
        assert_eq!(stats.packets_processed, 1);
        assert_eq!(stats.handler_failures, 1);
        assert_eq!(stats.alerts_accepted, 0);
        assert!(pipeline.health_check().await.is_unhealthy());
    }

    /// 느리게 기록하면서 동시 실행 수의 최댓값을 재는 싱크
    #[derive(Default)]
    struct SlowSink {
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl EventSink for SlowSink {
        fn record(&self, _event: &ArchivedEvent<'_>) -> Result<(), LogPipelineError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(1500));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl AlertSink for SlowSink {
        fn write(&self, _alert: &JobAlert) -> Result<(), LogPipelineError> {
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn timed_out_handler_blocks_next_packet() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfigBuilder::new()
            .bind_addr("127.0.0.1:0")
            .handler_timeout_secs(1)
            .data_dir(dir.path())
            .build()
            .unwrap();
        let sink = Arc::new(SlowSink::default());
        let mut pipeline = LogPipelineBuilder::new()
            .config(config)
            .route_table(RouteTable::new("raw"))
            .ledger(Arc::new(MemoryLedger::new()))
            .sinks(SinkSet {
                archive: Arc::clone(&sink) as Arc<dyn EventSink>,
                channel_log: Arc::clone(&sink) as Arc<dyn EventSink>,
                alerts: Arc::clone(&sink) as Arc<dyn AlertSink>,
            })
            .build()
            .unwrap();
        pipeline.start().await.unwrap();

        let sender = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = pipeline.local_addr().unwrap();
        for i in 0..3 {
            sender.send_to(format!("msg-{i}").as_bytes(), addr).unwrap();
        }

        for _ in 0..500 {
            if pipeline.stats().packets_processed == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        pipeline.stop().await.unwrap();

        let stats = pipeline.stats();
        assert_eq!(stats.packets_processed, 3);
        assert_eq!(stats.handler_failures, 3);
        assert_eq!(sink.max_active.load(Ordering::SeqCst), 1);
    }
}
