use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use netwarden_capture::CaptureMonitor;
use netwarden_core::{NetwardenConfig, Pipeline};
use netwarden_daemon::{AccessLogSink, DaemonCli, DaemonError, run_access_log};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = DaemonCli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            // tracing 초기화 전에 실패할 수 있으므로 stderr에도 남깁니다
            eprintln!("netwarden-daemon: {error}");
            ExitCode::from(error.exit_code() as u8)
        }
    }
}

async fn run(cli: DaemonCli) -> Result<(), DaemonError> {
    // 설정 로드: 파일 -> 환경변수 -> CLI 순서로 오버라이드
    let mut config = NetwardenConfig::load(&cli.config)
        .await
        .map_err(|e| DaemonError::Config(e.to_string()))?;
    cli.apply_to(&mut config);
    config
        .validate()
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    if cli.validate {
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    netwarden_daemon::logging::init_tracing(&config.general)
        .map_err(|e| DaemonError::Config(e.to_string()))?;
    info!("netwarden-daemon starting");

    if config.metrics.enabled {
        netwarden_daemon::metrics_server::install_metrics_recorder(&config.metrics)
            .map_err(|e| DaemonError::Runtime(e.to_string()))?;
    }

    // 캡처 모니터와 접근 로그 싱크를 채널로 연결합니다
    let (mut monitor, event_rx) = CaptureMonitor::builder()
        .config(config.capture.clone())
        .build()
        .map_err(|e| DaemonError::Config(e.to_string()))?;
    let event_rx = event_rx.ok_or_else(|| {
        DaemonError::Runtime("monitor built without an event receiver".to_owned())
    })?;

    let cancel = CancellationToken::new();
    let sink_task = tokio::spawn(run_access_log(
        event_rx,
        AccessLogSink::new(),
        cancel.clone(),
    ));

    // bind 실패는 고유한 종료 코드로 구분됩니다 ("never started")
    if let Err(error) = monitor.start().await {
        cancel.cancel();
        let _ = sink_task.await;
        return Err(DaemonError::from_start_failure(error));
    }
    info!(
        queue_id = config.capture.queue_id,
        "netwarden-daemon running -- packet interception active"
    );

    // 종료 시그널 대기
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| DaemonError::Runtime(e.to_string()))?;
    info!("shutdown signal received");

    // 우아한 종료: shutdown 플래그 -> 루프 종료 -> unbind
    let stop_result = monitor.stop().await;

    // 송신 측을 닫고 싱크가 버퍼된 이벤트를 전부 기록하게 합니다.
    // 수신 루프가 아직 recv에 묶여 송신자 클론을 쥐고 있을 수 있으므로
    // 취소 토큰도 함께 발동합니다 (취소 경로 역시 버퍼를 비웁니다).
    let ledger = monitor.ledger();
    drop(monitor);
    cancel.cancel();
    if let Ok(written) = sink_task.await {
        info!(written, "access log drained");
    }

    let snapshot = ledger.snapshot();
    info!(sources = snapshot.len(), "final access ledger summary");

    stop_result.map_err(|e| DaemonError::Runtime(e.to_string()))?;
    info!("netwarden-daemon shut down");
    Ok(())
}
