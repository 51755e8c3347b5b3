//! 캡처 모니터 — 수신 루프와 생명주기 관리
//!
//! [`CaptureMonitor`]는 패킷 소스를 바인딩하고, 수신 루프를 돌리고,
//! 모든 종료 경로에서 언바인드를 보장합니다. 빌더 패턴
//! ([`CaptureMonitorBuilder`])으로 생성하며 core의
//! [`Pipeline`](netwarden_core::pipeline::Pipeline) trait을 구현합니다.
//!
//! # 상태 전이
//! ```text
//! Initialized ──start()──▶ Running ──stop()──▶ Stopped
//!                             │
//!                             └─ 소스 에러 / 소스 종료 → 루프 탈출 → unbind (항상)
//! ```
//!
//! # 종료 보장
//! 루프에서 이미 꺼낸 패킷은 언바인드 전에 반드시 verdict를 받습니다.
//! `next()`가 루프의 유일한 블로킹 지점이므로 shutdown 플래그는 매
//! 패킷 사이에서 확인됩니다. 트래픽이 전혀 없으면 루프는 다음 패킷
//! 또는 소스 에러까지 `recv`에 머무를 수 있습니다. 루프는 분리된 OS
//! 스레드에서 돌므로 이 경우에도 런타임 종료와 프로세스 종료는
//! 지연되지 않습니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use metrics::gauge;
use tokio::sync::{mpsc, oneshot};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use netwarden_core::config::CaptureConfig;
use netwarden_core::error::{NetwardenError, PipelineError};
use netwarden_core::event::AccessEvent;
use netwarden_core::metrics as m;
use netwarden_core::pipeline::{HealthStatus, Pipeline};

use crate::engine::VerdictEngine;
use crate::ledger::AccessLedger;
use crate::source::{NfqueueSource, PacketSource};

/// 모니터 실행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum MonitorState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중 (바인딩 완료, 수신 루프 동작)
    Running,
    /// 정지됨
    Stopped,
}

/// 캡처 모니터 — NFQUEUE 수신 루프의 소유자
///
/// # 사용 예시
/// ```ignore
/// let (mut monitor, event_rx) = CaptureMonitor::builder()
///     .config(config.capture.clone())
///     .build()?;
///
/// monitor.start().await?;   // bind 실패는 여기서 치명적 에러
/// // event_rx에서 AccessEvent를 수신하여 싱크로 전달
/// monitor.stop().await?;    // shutdown 플래그 + unbind 보장
/// ```
pub struct CaptureMonitor {
    config: CaptureConfig,
    ledger: Arc<AccessLedger>,
    event_tx: mpsc::Sender<AccessEvent>,
    state: MonitorState,
    shutdown: Arc<AtomicBool>,
    loop_done: Arc<AtomicBool>,
    loop_result: Option<oneshot::Receiver<Result<(), NetwardenError>>>,
}

impl CaptureMonitor {
    /// 빌더를 반환합니다.
    pub fn builder() -> CaptureMonitorBuilder {
        CaptureMonitorBuilder::new()
    }

    /// 현재 상태 이름을 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            MonitorState::Initialized => "initialized",
            MonitorState::Running => "running",
            MonitorState::Stopped => "stopped",
        }
    }

    /// 접근 원장에 대한 공유 핸들을 반환합니다.
    ///
    /// 보고 경로는 이 핸들의 `snapshot()`만 사용해야 합니다.
    pub fn ledger(&self) -> Arc<AccessLedger> {
        Arc::clone(&self.ledger)
    }

    /// 현재 설정을 반환합니다.
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }
}

impl Pipeline for CaptureMonitor {
    /// NFQUEUE에 바인딩하고 수신 루프를 시작합니다.
    ///
    /// # 에러
    /// [`CaptureError::Bind`](netwarden_core::error::CaptureError::Bind) —
    /// 바인딩 실패. 시작 단계의 치명적 에러이며 루프는 스폰되지 않습니다.
    async fn start(&mut self) -> Result<(), NetwardenError> {
        if self.state == MonitorState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        info!(
            queue_id = self.config.queue_id,
            workers = self.config.workers,
            "starting capture monitor"
        );

        // bind 실패는 여기서 곧바로 전파됩니다 ("never started")
        let source = NfqueueSource::bind(self.config.queue_id)?;

        self.shutdown.store(false, Ordering::Relaxed);
        self.loop_done.store(false, Ordering::Relaxed);
        let result_rx = spawn_receive_loop(
            source,
            VerdictEngine::new(Arc::clone(&self.ledger)),
            self.event_tx.clone(),
            Arc::clone(&self.shutdown),
            self.config.workers,
            Arc::clone(&self.loop_done),
        )?;
        self.loop_result = Some(result_rx);

        self.state = MonitorState::Running;
        info!("capture monitor started");
        Ok(())
    }

    /// 수신 루프를 정지하고 언바인드를 보장합니다.
    ///
    /// 루프가 소스 에러로 먼저 죽어 있었다면 그 에러를 여기서
    /// 반환합니다 ("started then stopped").
    async fn stop(&mut self) -> Result<(), NetwardenError> {
        if self.state != MonitorState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping capture monitor");
        self.shutdown.store(true, Ordering::Relaxed);
        self.state = MonitorState::Stopped;

        let Some(result_rx) = self.loop_result.take() else {
            return Ok(());
        };

        let timeout = Duration::from_secs(self.config.shutdown_timeout_secs);
        match tokio::time::timeout(timeout, result_rx).await {
            Ok(Ok(loop_result)) => {
                info!("capture monitor stopped");
                loop_result
            }
            Ok(Err(_recv_error)) => Err(PipelineError::TaskFailed(
                "receive loop panicked before reporting a result".to_owned(),
            )
            .into()),
            Err(_elapsed) => {
                // 트래픽이 없어 recv에 묶여 있는 경우. 루프는 분리 스레드라
                // 런타임/프로세스 종료를 막지 않으며, 큐 소켓은 프로세스
                // 종료 시 커널이 회수하고 그 시점에 언바인드됩니다.
                warn!(
                    timeout_secs = self.config.shutdown_timeout_secs,
                    "receive loop still blocked in recv; unbind deferred to process exit"
                );
                Ok(())
            }
        }
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            MonitorState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            MonitorState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
            MonitorState::Running => {
                if self.loop_done.load(Ordering::Relaxed) {
                    HealthStatus::Unhealthy("receive loop exited".to_owned())
                } else {
                    HealthStatus::Healthy
                }
            }
        }
    }
}

/// 캡처 모니터 빌더
pub struct CaptureMonitorBuilder {
    config: CaptureConfig,
    event_tx: Option<mpsc::Sender<AccessEvent>>,
}

impl CaptureMonitorBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: CaptureConfig::default(),
            event_tx: None,
        }
    }

    /// 캡처 설정을 지정합니다.
    pub fn config(mut self, config: CaptureConfig) -> Self {
        self.config = config;
        self
    }

    /// 외부 이벤트 채널의 송신자를 지정합니다.
    ///
    /// 지정하지 않으면 `build()`가 설정된 용량으로 채널을 생성합니다.
    pub fn event_sender(mut self, tx: mpsc::Sender<AccessEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// 모니터를 빌드합니다.
    ///
    /// # Returns
    /// - `CaptureMonitor`: 모니터 인스턴스
    /// - `Option<mpsc::Receiver<AccessEvent>>`: 이벤트 수신 채널
    ///   (외부 event_sender를 설정한 경우 None)
    pub fn build(
        self,
    ) -> Result<(CaptureMonitor, Option<mpsc::Receiver<AccessEvent>>), NetwardenError> {
        if self.config.workers == 0 {
            return Err(PipelineError::InitFailed("workers must be at least 1".to_owned()).into());
        }

        let (event_tx, event_rx) = if let Some(tx) = self.event_tx {
            (tx, None)
        } else {
            let (tx, rx) = mpsc::channel(self.config.event_channel_capacity.max(1));
            (tx, Some(rx))
        };

        let ledger = Arc::new(AccessLedger::with_max_history(
            self.config.max_history_per_source,
        ));

        let monitor = CaptureMonitor {
            config: self.config,
            ledger,
            event_tx,
            state: MonitorState::Initialized,
            shutdown: Arc::new(AtomicBool::new(false)),
            loop_done: Arc::new(AtomicBool::new(false)),
            loop_result: None,
        };

        Ok((monitor, event_rx))
    }
}

impl Default for CaptureMonitorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 수신 루프를 분리된 OS 스레드로 띄웁니다.
///
/// 루프는 `recv`에 무기한 블로킹될 수 있으므로 런타임 블로킹 풀이 아닌
/// 분리 스레드를 사용합니다. 런타임은 블로킹 풀의 태스크가 끝나기를
/// 기다리며 종료되지만 분리 스레드는 기다리지 않으므로, 트래픽이 없는
/// 상태의 인터럽트에서도 프로세스가 즉시 끝날 수 있습니다. 루프 결과는
/// oneshot으로 전달되고, 스레드가 끝나면 `done` 플래그가 설정됩니다.
pub fn spawn_receive_loop<S>(
    source: S,
    engine: VerdictEngine,
    event_tx: mpsc::Sender<AccessEvent>,
    shutdown: Arc<AtomicBool>,
    workers: usize,
    done: Arc<AtomicBool>,
) -> std::io::Result<oneshot::Receiver<Result<(), NetwardenError>>>
where
    S: PacketSource + 'static,
{
    let (result_tx, result_rx) = oneshot::channel();
    std::thread::Builder::new()
        .name("netwarden-capture".to_owned())
        .spawn(move || {
            let result = run_loop(source, &engine, &event_tx, &shutdown, workers);
            done.store(true, Ordering::Relaxed);
            let _ = result_tx.send(result);
        })?;
    Ok(result_rx)
}

/// 수신 루프 본체 — 모든 종료 경로에서 소스를 언바인드합니다.
///
/// `workers`가 1이면 단일 루프, 2 이상이면 소스를 뮤텍스로 공유하는
/// 병렬 워커로 동작합니다. verdict 경로 에러가 언바인드 실패보다
/// 우선 보고됩니다.
pub fn run_loop<S>(
    source: S,
    engine: &VerdictEngine,
    event_tx: &mpsc::Sender<AccessEvent>,
    shutdown: &AtomicBool,
    workers: usize,
) -> Result<(), NetwardenError>
where
    S: PacketSource,
{
    let source = Mutex::new(source);

    let serve_result = if workers <= 1 {
        serve(&mut *lock(&source), engine, event_tx, shutdown)
    } else {
        serve_parallel(&source, engine, event_tx, shutdown, workers)
    };

    // 언바인드는 정상 종료, 소스 종료, 에러 전파 모두에서 수행됩니다
    let unbind_result = lock(&source).unbind();

    match (serve_result, unbind_result) {
        (Err(serve_err), _) => Err(serve_err),
        (Ok(()), Err(unbind_err)) => Err(unbind_err.into()),
        (Ok(()), Ok(())) => Ok(()),
    }
}

/// 단일 워커 수신 루프.
///
/// 꺼낸 패킷은 다음 `next()` 호출 전에 반드시 verdict를 받습니다.
fn serve<S>(
    source: &mut S,
    engine: &VerdictEngine,
    event_tx: &mpsc::Sender<AccessEvent>,
    shutdown: &AtomicBool,
) -> Result<(), NetwardenError>
where
    S: PacketSource,
{
    while !shutdown.load(Ordering::Relaxed) {
        let Some((raw, handle)) = source.next()? else {
            debug!("packet source terminated");
            break;
        };

        let (event, verdict) = engine.handle(&raw);
        if let Some(event) = event {
            publish(event_tx, event);
        }
        source.verdict(handle, verdict)?;

        gauge!(m::CAPTURE_SOURCES).set(engine.ledger().source_count() as f64);
    }
    Ok(())
}

/// 병렬 워커 수신 루프.
///
/// 원래 구현의 락 규율을 따릅니다: recv 동안 소스 락을 잡고, 해제한 뒤
/// 파싱/기록을 수행하고, verdict를 위해 다시 잡습니다. 이 모드에서는
/// 같은 출발지의 기록 순서가 도착 순서와 다를 수 있습니다.
fn serve_parallel<S>(
    source: &Mutex<S>,
    engine: &VerdictEngine,
    event_tx: &mpsc::Sender<AccessEvent>,
    shutdown: &AtomicBool,
    workers: usize,
) -> Result<(), NetwardenError>
where
    S: PacketSource,
{
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                scope.spawn(move || {
                    let result = serve_one_of(source, engine, event_tx, shutdown);
                    if let Err(error) = &result {
                        warn!(worker, %error, "capture worker exiting on error");
                        // 다른 워커도 내려서 언바인드로 진행합니다
                        shutdown.store(true, Ordering::Relaxed);
                    }
                    result
                })
            })
            .collect();

        let mut first_error = None;
        for handle in handles {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    first_error.get_or_insert(error);
                }
                Err(_) => {
                    first_error.get_or_insert(
                        PipelineError::TaskFailed("worker panicked".to_owned()).into(),
                    );
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    })
}

/// 병렬 모드의 워커 하나.
fn serve_one_of<S>(
    source: &Mutex<S>,
    engine: &VerdictEngine,
    event_tx: &mpsc::Sender<AccessEvent>,
    shutdown: &AtomicBool,
) -> Result<(), NetwardenError>
where
    S: PacketSource,
{
    while !shutdown.load(Ordering::Relaxed) {
        let next = lock(source).next()?;
        let Some((raw, handle)) = next else {
            break;
        };

        let (event, verdict) = engine.handle(&raw);
        if let Some(event) = event {
            publish(event_tx, event);
        }
        lock(source).verdict(handle, verdict)?;
    }
    Ok(())
}

/// 이벤트를 싱크 채널에 비블로킹으로 전달합니다.
///
/// verdict 경로가 느린 싱크에 막히면 안 되므로 `try_send`를 사용하며,
/// 채널이 가득 찬 경우 이벤트를 버리고 카운터만 올립니다.
fn publish(event_tx: &mpsc::Sender<AccessEvent>, event: AccessEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => {
            warn!(%event, "sink channel full, dropping access event");
            metrics::counter!(m::CAPTURE_EVENTS_DROPPED_TOTAL).increment(1);
        }
        Err(TrySendError::Closed(event)) => {
            // 싱크가 내려가도 verdict는 계속되어야 합니다
            debug!(%event, "sink channel closed, discarding access event");
        }
    }
}

fn lock<'a, S>(source: &'a Mutex<S>) -> MutexGuard<'a, S> {
    source.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_creates_monitor_with_internal_channel() {
        let (monitor, event_rx) = CaptureMonitorBuilder::new().build().unwrap();
        assert_eq!(monitor.state_name(), "initialized");
        assert!(event_rx.is_some());
        assert!(monitor.ledger().is_empty());
    }

    #[test]
    fn builder_with_external_sender_returns_no_receiver() {
        let (event_tx, _event_rx) = mpsc::channel(8);
        let (_monitor, rx) = CaptureMonitorBuilder::new()
            .event_sender(event_tx)
            .build()
            .unwrap();
        assert!(rx.is_none());
    }

    #[test]
    fn builder_rejects_zero_workers() {
        let mut config = CaptureConfig::default();
        config.workers = 0;
        let result = CaptureMonitorBuilder::new().config(config).build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_passes_history_cap_to_ledger() {
        let mut config = CaptureConfig::default();
        config.max_history_per_source = 1;
        let (monitor, _rx) = CaptureMonitorBuilder::new().config(config).build().unwrap();

        let ledger = monitor.ledger();
        ledger.record("10.0.0.1".parse().unwrap(), "1.1.1.1".parse().unwrap());
        ledger.record("10.0.0.1".parse().unwrap(), "2.2.2.2".parse().unwrap());
        let snapshot = ledger.snapshot();
        assert_eq!(snapshot[&"10.0.0.1".parse::<std::net::IpAddr>().unwrap()].len(), 1);
    }

    #[tokio::test]
    async fn stop_before_start_fails() {
        let (mut monitor, _rx) = CaptureMonitorBuilder::new().build().unwrap();
        assert!(monitor.stop().await.is_err());
    }

    #[tokio::test]
    async fn health_unhealthy_before_start() {
        let (monitor, _rx) = CaptureMonitorBuilder::new().build().unwrap();
        assert!(monitor.health_check().await.is_unhealthy());
    }
}
