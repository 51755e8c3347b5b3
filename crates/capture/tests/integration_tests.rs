//! 통합 테스트 — 수신 루프의 핸들/verdict/언바인드 계약 검증
//!
//! 실제 NFQUEUE 대신 스크립트된 패킷 시퀀스를 재생하는 mock 소스로
//! 루프 전체를 구동합니다. 검증 대상:
//! - `next()`로 꺼낸 모든 핸들이 정확히 한 번 verdict를 받는다
//! - 파싱 실패 패킷도 forward된다
//! - 언바인드는 정상 종료/소스 종료/소스 에러 모두에서 정확히 한 번 수행된다

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::mpsc;

use netwarden_capture::monitor::{run_loop, spawn_receive_loop};
use netwarden_capture::{AccessLedger, PacketSource, VerdictEngine};
use netwarden_core::error::CaptureError;
use netwarden_core::types::Verdict;

/// mock 소스가 공유하는 기록 장부
#[derive(Debug, Default)]
struct SourceLog {
    /// (핸들 id, verdict) 기록, 호출 순서대로
    verdicts: Vec<(u64, Verdict)>,
    /// unbind 호출 횟수
    unbind_calls: usize,
}

/// 스크립트된 패킷 시퀀스를 재생하는 mock 패킷 소스
struct MockSource {
    /// 남은 (패킷, 핸들 id) — 소진되면 `Ok(None)` (소스 종료)
    packets: Vec<(Vec<u8>, u64)>,
    cursor: usize,
    /// `Some(n)`이면 n번째 `next()` 호출에서 수신 에러를 일으킵니다
    fail_at: Option<usize>,
    log: Arc<Mutex<SourceLog>>,
}

impl MockSource {
    fn new(packets: Vec<Vec<u8>>) -> (Self, Arc<Mutex<SourceLog>>) {
        let log = Arc::new(Mutex::new(SourceLog::default()));
        let packets = packets
            .into_iter()
            .enumerate()
            .map(|(i, p)| (p, i as u64))
            .collect();
        (
            Self {
                packets,
                cursor: 0,
                fail_at: None,
                log: Arc::clone(&log),
            },
            log,
        )
    }

    fn failing_at(mut self, call: usize) -> Self {
        self.fail_at = Some(call);
        self
    }

    fn log(log: &Arc<Mutex<SourceLog>>) -> MutexGuard<'_, SourceLog> {
        log.lock().unwrap()
    }
}

impl PacketSource for MockSource {
    type Handle = u64;

    fn next(&mut self) -> Result<Option<(Bytes, Self::Handle)>, CaptureError> {
        if self.fail_at == Some(self.cursor) {
            return Err(CaptureError::Recv("mock receive failure".to_owned()));
        }
        let Some((raw, handle)) = self.packets.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;
        Ok(Some((Bytes::copy_from_slice(raw), *handle)))
    }

    fn verdict(&mut self, handle: Self::Handle, verdict: Verdict) -> Result<(), CaptureError> {
        let mut log = self.log.lock().unwrap();
        if log.verdicts.iter().any(|(h, _)| *h == handle) {
            return Err(CaptureError::InvalidHandle(format!(
                "handle {handle} already used"
            )));
        }
        log.verdicts.push((handle, verdict));
        Ok(())
    }

    fn unbind(&mut self) -> Result<(), CaptureError> {
        self.log.lock().unwrap().unbind_calls += 1;
        Ok(())
    }
}

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

/// 20바이트 최소 IPv4 헤더
fn ipv4_packet(src: &str, dst: &str) -> Vec<u8> {
    let src: Ipv4Addr = src.parse().unwrap();
    let dst: Ipv4Addr = dst.parse().unwrap();
    let mut buf = vec![0u8; 20];
    buf[0] = 0x45;
    buf[12..16].copy_from_slice(&src.octets());
    buf[16..20].copy_from_slice(&dst.octets());
    buf
}

fn run(
    source: MockSource,
    engine: &VerdictEngine,
    capacity: usize,
    workers: usize,
) -> (
    Result<(), netwarden_core::NetwardenError>,
    mpsc::Receiver<netwarden_core::AccessEvent>,
) {
    let (event_tx, event_rx) = mpsc::channel(capacity);
    let shutdown = AtomicBool::new(false);
    let result = run_loop(source, engine, &event_tx, &shutdown, workers);
    (result, event_rx)
}

#[test]
fn every_handle_gets_exactly_one_verdict() {
    let packets = vec![
        ipv4_packet("10.0.0.5", "93.184.216.34"),
        vec![0x45, 0, 0, 0, 0], // truncated
        ipv4_packet("10.0.0.5", "8.8.8.8"),
    ];
    let (source, log) = MockSource::new(packets);
    let engine = VerdictEngine::new(Arc::new(AccessLedger::new()));

    let (result, _rx) = run(source, &engine, 16, 1);
    assert!(result.is_ok());

    let log = MockSource::log(&log);
    let handles: Vec<u64> = log.verdicts.iter().map(|(h, _)| *h).collect();
    assert_eq!(handles, vec![0, 1, 2]);
    assert!(log.verdicts.iter().all(|(_, v)| *v == Verdict::Forward));
    assert_eq!(log.unbind_calls, 1);
}

#[test]
fn ledger_reflects_arrival_order_with_duplicates() {
    let packets = vec![
        ipv4_packet("10.0.0.5", "93.184.216.34"),
        ipv4_packet("10.0.0.5", "8.8.8.8"),
        ipv4_packet("10.0.0.5", "8.8.8.8"),
        ipv4_packet("10.0.0.6", "1.1.1.1"),
    ];
    let (source, _log) = MockSource::new(packets);
    let engine = VerdictEngine::new(Arc::new(AccessLedger::new()));

    let (result, _rx) = run(source, &engine, 16, 1);
    assert!(result.is_ok());

    let snapshot = engine.ledger().snapshot();
    assert_eq!(
        snapshot[&ip("10.0.0.5")],
        vec![ip("93.184.216.34"), ip("8.8.8.8"), ip("8.8.8.8")]
    );
    assert_eq!(snapshot[&ip("10.0.0.6")], vec![ip("1.1.1.1")]);
}

#[test]
fn one_event_per_parsed_packet_reaches_the_sink() {
    let packets = vec![
        ipv4_packet("10.0.0.5", "93.184.216.34"),
        vec![0x45, 0, 0, 0, 0], // truncated — 이벤트 없음
    ];
    let (source, _log) = MockSource::new(packets);
    let engine = VerdictEngine::new(Arc::new(AccessLedger::new()));

    let (result, mut rx) = run(source, &engine, 16, 1);
    assert!(result.is_ok());

    let event = rx.try_recv().expect("one access event");
    assert_eq!(event.source(), ip("10.0.0.5"));
    assert_eq!(event.destination(), ip("93.184.216.34"));
    assert!(rx.try_recv().is_err());
}

#[test]
fn truncated_packet_forwards_and_leaves_ledger_unchanged() {
    let (source, log) = MockSource::new(vec![vec![0x45, 0, 0, 0, 0]]);
    let engine = VerdictEngine::new(Arc::new(AccessLedger::new()));

    let (result, _rx) = run(source, &engine, 16, 1);
    assert!(result.is_ok());

    assert!(engine.ledger().is_empty());
    let log = MockSource::log(&log);
    assert_eq!(log.verdicts, vec![(0, Verdict::Forward)]);
}

#[test]
fn source_error_propagates_but_still_unbinds() {
    let packets = vec![ipv4_packet("10.0.0.5", "8.8.8.8")];
    let (source, log) = MockSource::new(packets);
    let source = source.failing_at(1); // 두 번째 next()에서 실패
    let engine = VerdictEngine::new(Arc::new(AccessLedger::new()));

    let (result, _rx) = run(source, &engine, 16, 1);
    assert!(result.is_err());

    let log = MockSource::log(&log);
    // 에러 전에 꺼낸 패킷은 verdict를 받았고, 언바인드도 수행되었습니다
    assert_eq!(log.verdicts.len(), 1);
    assert_eq!(log.unbind_calls, 1);
}

#[test]
fn immediate_source_error_still_unbinds() {
    let (source, log) = MockSource::new(vec![]);
    let source = source.failing_at(0);
    let engine = VerdictEngine::new(Arc::new(AccessLedger::new()));

    let (result, _rx) = run(source, &engine, 16, 1);
    assert!(result.is_err());
    assert_eq!(MockSource::log(&log).unbind_calls, 1);
}

#[test]
fn shutdown_flag_stops_loop_before_next_packet() {
    let packets = vec![ipv4_packet("10.0.0.5", "8.8.8.8")];
    let (source, log) = MockSource::new(packets);
    let engine = VerdictEngine::new(Arc::new(AccessLedger::new()));
    let (event_tx, _event_rx) = mpsc::channel(16);

    let shutdown = AtomicBool::new(true); // 시작 전에 이미 요청됨
    let result = run_loop(source, &engine, &event_tx, &shutdown, 1);
    assert!(result.is_ok());

    let log = MockSource::log(&log);
    // 패킷을 꺼내지 않았으므로 verdict도 없지만 언바인드는 수행됩니다
    assert!(log.verdicts.is_empty());
    assert_eq!(log.unbind_calls, 1);
    assert!(shutdown.load(Ordering::Relaxed));
}

#[test]
fn full_sink_channel_never_blocks_verdicts() {
    let packets = vec![
        ipv4_packet("10.0.0.5", "1.1.1.1"),
        ipv4_packet("10.0.0.5", "2.2.2.2"),
        ipv4_packet("10.0.0.5", "3.3.3.3"),
    ];
    let (source, log) = MockSource::new(packets);
    let engine = VerdictEngine::new(Arc::new(AccessLedger::new()));

    // 용량 1 채널: 두 번째 이벤트부터는 버려지지만 verdict는 계속됩니다
    let (result, _rx) = run(source, &engine, 1, 1);
    assert!(result.is_ok());
    assert_eq!(MockSource::log(&log).verdicts.len(), 3);
}

/// `next()`에서 영원히 블로킹되는 소스. 트래픽 없는 큐를 흉내냅니다.
struct ParkedSource {
    wake: std::sync::mpsc::Receiver<()>,
}

impl PacketSource for ParkedSource {
    type Handle = u64;

    fn next(&mut self) -> Result<Option<(Bytes, Self::Handle)>, CaptureError> {
        // 송신자가 살아 있는 한 여기서 무기한 블로킹됩니다
        let _ = self.wake.recv();
        Ok(None)
    }

    fn verdict(&mut self, _handle: Self::Handle, _verdict: Verdict) -> Result<(), CaptureError> {
        Ok(())
    }

    fn unbind(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }
}

#[test]
fn blocked_receive_thread_does_not_stall_runtime_shutdown() {
    let (wake_tx, wake_rx) = std::sync::mpsc::channel();
    let engine = VerdictEngine::new(Arc::new(AccessLedger::new()));
    let (event_tx, _event_rx) = mpsc::channel(4);
    let shutdown = Arc::new(AtomicBool::new(false));
    let done = Arc::new(AtomicBool::new(false));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();

    // start()와 같은 방식: 런타임 컨텍스트 안에서 수신 루프를 띄웁니다
    let _result_rx = runtime.block_on(async {
        spawn_receive_loop(
            ParkedSource { wake: wake_rx },
            engine,
            event_tx,
            Arc::clone(&shutdown),
            1,
            Arc::clone(&done),
        )
        .unwrap()
    });

    // 패킷이 도착하지 않아 루프가 recv에 묶인 상태에서 종료를 요청합니다
    shutdown.store(true, Ordering::Relaxed);
    let started = Instant::now();
    drop(runtime);
    // 런타임 종료가 묶인 수신 스레드를 기다리면 안 됩니다
    assert!(started.elapsed() < Duration::from_secs(2));

    // 스레드를 깨워 정리합니다
    drop(wake_tx);
}

#[test]
fn parallel_workers_verdict_every_packet_once() {
    let packets: Vec<Vec<u8>> = (0..32)
        .map(|i| ipv4_packet(&format!("10.0.0.{}", i % 4), &format!("192.0.2.{i}")))
        .collect();
    let count = packets.len();
    let (source, log) = MockSource::new(packets);
    let engine = VerdictEngine::new(Arc::new(AccessLedger::new()));

    let (result, _rx) = run(source, &engine, 64, 4);
    assert!(result.is_ok());

    let log = MockSource::log(&log);
    assert_eq!(log.verdicts.len(), count);
    // 핸들 중복 없음 (중복이면 mock이 InvalidHandle을 반환해 루프가 실패)
    let mut handles: Vec<u64> = log.verdicts.iter().map(|(h, _)| *h).collect();
    handles.sort_unstable();
    handles.dedup();
    assert_eq!(handles.len(), count);
    assert_eq!(log.unbind_calls, 1);

    // 모든 기록이 원장에 남아 있습니다 (순서는 병렬 모드에서 비보장)
    let snapshot = engine.ledger().snapshot();
    let total: usize = snapshot.values().map(Vec::len).sum();
    assert_eq!(total, count);
}
