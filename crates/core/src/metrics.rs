//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`,
//! `metrics::gauge!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//! - 접두어: `netwarden_`
//! - 접미어: `_total` (counter), 없음 (gauge)

// --- 레이블 키 상수 ---

/// IP 버전 레이블 키 ("4", "6")
pub const LABEL_IP_VERSION: &str = "ip_version";

// --- Capture 메트릭 ---

/// 처리된 전체 패킷 수 (counter)
pub const CAPTURE_PACKETS_TOTAL: &str = "netwarden_capture_packets_total";

/// 파싱에 실패한 패킷 수 (counter)
pub const CAPTURE_PARSE_ERRORS_TOTAL: &str = "netwarden_capture_parse_errors_total";

/// 싱크 채널이 가득 차서 버려진 이벤트 수 (counter)
pub const CAPTURE_EVENTS_DROPPED_TOTAL: &str = "netwarden_capture_events_dropped_total";

/// 원장에 기록된 고유 출발지 수 (gauge)
pub const CAPTURE_SOURCES: &str = "netwarden_capture_sources";

/// 모든 메트릭 설명을 등록합니다.
///
/// 메트릭 레코더 설치 직후 한 번 호출합니다.
pub fn describe_all() {
    metrics::describe_counter!(
        CAPTURE_PACKETS_TOTAL,
        "Total packets pulled from the queue and given a verdict"
    );
    metrics::describe_counter!(
        CAPTURE_PARSE_ERRORS_TOTAL,
        "Packets forwarded without an access event due to a malformed IP header"
    );
    metrics::describe_counter!(
        CAPTURE_EVENTS_DROPPED_TOTAL,
        "Access events dropped because the sink channel was full"
    );
    metrics::describe_gauge!(
        CAPTURE_SOURCES,
        "Distinct source addresses currently tracked by the access ledger"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_follow_convention() {
        for name in [
            CAPTURE_PACKETS_TOTAL,
            CAPTURE_PARSE_ERRORS_TOTAL,
            CAPTURE_EVENTS_DROPPED_TOTAL,
            CAPTURE_SOURCES,
        ] {
            assert!(name.starts_with("netwarden_"));
        }
    }

    #[test]
    fn describe_all_does_not_panic_without_recorder() {
        describe_all();
    }
}
