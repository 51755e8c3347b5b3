//! verdict 엔진 — 패킷 하나를 이벤트와 verdict로 변환
//!
//! 파싱 → 원장 기록 → 이벤트 생성 → verdict 반환의 패킷 단위
//! 시퀀스를 수행합니다. 이 시퀀스는 원장 관점에서 원자적이며 다른
//! 패킷의 시퀀스와 순서 의존성이 없습니다.
//!
//! # 정책
//! 관찰된 동작은 모든 패킷을 무조건 forward합니다. 파싱 실패를
//! 포함한 어떤 내부 조건도 verdict를 바꾸지 않습니다. 이 동작은
//! 의미 보존을 위해 의도적으로 유지됩니다 (허용/차단 목록은 비목표).

use std::sync::Arc;
use std::time::SystemTime;

use metrics::counter;
use tracing::trace;

use netwarden_core::event::AccessEvent;
use netwarden_core::metrics as m;
use netwarden_core::types::{AccessRecord, Verdict};

use crate::ledger::AccessLedger;
use crate::parser;

/// 패킷별 verdict 엔진
///
/// 원장에 대한 공유 핸들만 들고 있으며, 여러 워커가 동시에 호출해도
/// 안전합니다 (원장이 내부 동기화를 담당).
#[derive(Debug, Clone)]
pub struct VerdictEngine {
    ledger: Arc<AccessLedger>,
}

impl VerdictEngine {
    /// 원장을 공유하는 엔진을 생성합니다.
    pub fn new(ledger: Arc<AccessLedger>) -> Self {
        Self { ledger }
    }

    /// 원장 핸들을 반환합니다.
    pub fn ledger(&self) -> &Arc<AccessLedger> {
        &self.ledger
    }

    /// 패킷 하나를 처리하고 (이벤트, verdict)를 반환합니다.
    ///
    /// 파싱 성공 시: 원장에 기록하고 새 타임스탬프의 [`AccessEvent`]를
    /// 생성합니다. 파싱 실패 시: 이벤트 없이 Forward를 반환하며 원장은
    /// 변경되지 않습니다. 실패는 운영자에게 노출되지 않습니다
    /// (대응 로그 라인의 부재가 유일한 흔적).
    pub fn handle(&self, raw: &[u8]) -> (Option<AccessEvent>, Verdict) {
        match parser::parse_header(raw) {
            Ok(header) => {
                self.ledger.record(header.source, header.destination);
                let event = AccessEvent::new(AccessRecord {
                    source: header.source,
                    destination: header.destination,
                    timestamp: SystemTime::now(),
                });
                counter!(m::CAPTURE_PACKETS_TOTAL, m::LABEL_IP_VERSION => header.version.to_string())
                    .increment(1);
                (Some(event), Verdict::Forward)
            }
            Err(error) => {
                // 회복 가능 — verdict에는 영향 없음
                trace!(%error, len = raw.len(), "forwarding unparseable packet");
                counter!(m::CAPTURE_PACKETS_TOTAL).increment(1);
                counter!(m::CAPTURE_PARSE_ERRORS_TOTAL).increment(1);
                (None, Verdict::Forward)
            }
        }
    }
}
