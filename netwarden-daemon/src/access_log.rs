//! 접근 로그 싱크 — AccessEvent를 안정적인 텍스트 라인으로 기록
//!
//! 캡처 모니터가 발행한 [`AccessEvent`]를 채널에서 수신하여
//! `netwarden::access` 타깃의 tracing 라인으로 내보냅니다. 라인 형식은
//! 항상 `<source> accessed <destination>`이며 타임스탬프 prefix는
//! subscriber가 붙입니다 — grep 가능한 안정적인 형식입니다.
//!
//! # 아키텍처 원칙
//! 싱크는 verdict 경로와 채널로만 연결됩니다. 싱크가 느리거나 죽어도
//! 캡처 쪽은 이벤트를 버릴 뿐 verdict를 멈추지 않습니다.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use netwarden_core::error::NetwardenError;
use netwarden_core::event::AccessEvent;
use netwarden_core::pipeline::EventSink;

/// tracing 기반 접근 로그 싱크
///
/// 영속 파일 기록/로테이션은 이 컴포넌트의 범위 밖입니다. 운영 환경에서는
/// subscriber의 출력(파일, 로그 수집기)이 영속화를 담당합니다.
#[derive(Debug, Default)]
pub struct AccessLogSink {
    written: u64,
}

impl AccessLogSink {
    /// 새 싱크를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 지금까지 기록한 라인 수를 반환합니다.
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl EventSink for AccessLogSink {
    fn append(&mut self, event: &AccessEvent) -> Result<(), NetwardenError> {
        // 안정적인 형식: "<source> accessed <destination>"
        info!(
            target: "netwarden::access",
            source = %event.source(),
            destination = %event.destination(),
            "{}",
            event.access,
        );
        self.written += 1;
        Ok(())
    }
}

/// 이벤트 채널을 소비하여 싱크에 기록하는 태스크 본체.
///
/// 송신 측이 닫히면 종료하고 기록한 라인 수를 반환합니다.
/// cancellation token이 발동된 경우에도 채널에 이미 버퍼된 이벤트는
/// 모두 기록한 뒤 종료합니다 — 취소는 "새 이벤트를 기다리지 말라"는
/// 뜻이지 "버퍼를 버리라"는 뜻이 아닙니다.
pub async fn run_access_log(
    mut event_rx: mpsc::Receiver<AccessEvent>,
    mut sink: impl EventSink,
    cancel: CancellationToken,
) -> u64 {
    let mut written = 0u64;
    loop {
        tokio::select! {
            event = event_rx.recv() => {
                match event {
                    Some(event) => written += append(&mut sink, &event),
                    None => break,
                }
            }
            () = cancel.cancelled() => {
                // 버퍼된 이벤트를 비운 뒤에만 종료합니다
                while let Ok(event) = event_rx.try_recv() {
                    written += append(&mut sink, &event);
                }
                break;
            }
        }
    }
    debug!(written, "access log task exiting");
    written
}

fn append(sink: &mut impl EventSink, event: &AccessEvent) -> u64 {
    match sink.append(event) {
        Ok(()) => 1,
        Err(error) => {
            debug!(%error, "access log sink rejected event");
            0
        }
    }
}
