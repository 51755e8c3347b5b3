//! 이벤트 시스템 — 모듈 간 통신의 기본 단위
//!
//! 캡처 모듈과 이벤트 싱크 사이의 통신은 이벤트 기반 메시지 패싱으로
//! 수행됩니다. [`EventMetadata`]는 모든 이벤트에 공통으로 포함되는
//! 메타데이터이며, [`Event`] trait은 모든 이벤트 타입이 구현해야 하는
//! 인터페이스입니다.

use std::fmt;
use std::net::IpAddr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::types::AccessRecord;

// --- 모듈명 상수 ---

/// 패킷 캡처 모듈명
pub const MODULE_CAPTURE: &str = "capture";

// --- 이벤트 타입 상수 ---

/// 접근 이벤트 타입
pub const EVENT_TYPE_ACCESS: &str = "access";

/// 이벤트 메타데이터 — 모든 이벤트에 공통으로 포함되는 추적 정보
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// 이벤트 발생 시각
    pub timestamp: SystemTime,
    /// 이벤트를 생성한 모듈명 (예: "capture")
    pub source_module: String,
    /// 추적 ID — 같은 흐름의 이벤트를 연결합니다
    pub trace_id: String,
}

impl EventMetadata {
    /// 기존 trace_id를 사용하여 새 메타데이터를 생성합니다.
    pub fn new(source_module: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            source_module: source_module.into(),
            trace_id: trace_id.into(),
        }
    }

    /// 새로운 UUID v4 trace_id를 생성하여 메타데이터를 만듭니다.
    pub fn with_new_trace(source_module: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            source_module: source_module.into(),
            trace_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl fmt::Display for EventMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] source={} trace={}",
            unix_timestamp_str(self.timestamp),
            self.source_module,
            self.trace_id,
        )
    }
}

/// 모든 이벤트가 구현해야 하는 기본 trait
///
/// `Send + Sync + 'static` 바운드로 `tokio::mpsc` 채널을 통한
/// 안전한 전송을 보장합니다.
pub trait Event: Send + Sync + 'static {
    /// 이벤트 고유 ID (UUID v4)
    fn event_id(&self) -> &str;

    /// 이벤트 메타데이터 (timestamp, source_module, trace_id)
    fn metadata(&self) -> &EventMetadata;

    /// 이벤트 타입명 (로깅 및 라우팅에 사용)
    fn event_type(&self) -> &str;
}

/// 디바이스 접근 이벤트
///
/// 성공적으로 파싱된 패킷 하나당 정확히 한 번 생성되는 불변 레코드입니다.
/// verdict 엔진이 생성하고 이벤트 싱크가 소비합니다.
#[derive(Debug, Clone)]
pub struct AccessEvent {
    /// 이벤트 고유 ID
    pub id: String,
    /// 이벤트 메타데이터
    pub metadata: EventMetadata,
    /// 접근 기록 (출발지, 목적지, 시각)
    pub access: AccessRecord,
}

impl AccessEvent {
    /// 새로운 trace를 시작하는 접근 이벤트를 생성합니다.
    pub fn new(access: AccessRecord) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: EventMetadata::with_new_trace(MODULE_CAPTURE),
            access,
        }
    }

    /// 출발지 주소를 반환합니다.
    pub fn source(&self) -> IpAddr {
        self.access.source
    }

    /// 목적지 주소를 반환합니다.
    pub fn destination(&self) -> IpAddr {
        self.access.destination
    }
}

impl Event for AccessEvent {
    fn event_id(&self) -> &str {
        &self.id
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn event_type(&self) -> &str {
        EVENT_TYPE_ACCESS
    }
}

impl fmt::Display for AccessEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AccessEvent[{}] {}",
            &self.id[..8.min(self.id.len())],
            self.access,
        )
    }
}

/// SystemTime을 사람이 읽을 수 있는 형태로 변환합니다.
fn unix_timestamp_str(time: SystemTime) -> String {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(duration) => format!("{}", duration.as_secs()),
        Err(_) => "unknown".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> AccessRecord {
        AccessRecord {
            source: "10.0.0.5".parse().unwrap(),
            destination: "93.184.216.34".parse().unwrap(),
            timestamp: SystemTime::now(),
        }
    }

    #[test]
    fn event_metadata_new_preserves_trace_id() {
        let meta = EventMetadata::new("test-module", "trace-abc-123");
        assert_eq!(meta.source_module, "test-module");
        assert_eq!(meta.trace_id, "trace-abc-123");
        assert!(meta.timestamp <= SystemTime::now());
    }

    #[test]
    fn event_metadata_with_new_trace_generates_uuid() {
        let meta = EventMetadata::with_new_trace("test-module");
        // UUID v4 형식 확인: 8-4-4-4-12
        assert_eq!(meta.trace_id.len(), 36);
        assert_eq!(meta.trace_id.chars().filter(|c| *c == '-').count(), 4);
    }

    #[test]
    fn access_event_implements_event_trait() {
        let event = AccessEvent::new(sample_record());
        assert_eq!(event.event_type(), "access");
        assert!(!event.event_id().is_empty());
        assert_eq!(event.metadata().source_module, "capture");
    }

    #[test]
    fn access_event_display() {
        let event = AccessEvent::new(sample_record());
        let display = event.to_string();
        assert!(display.contains("AccessEvent"));
        assert!(display.contains("10.0.0.5 accessed 93.184.216.34"));
    }

    #[test]
    fn access_event_accessors() {
        let event = AccessEvent::new(sample_record());
        assert_eq!(event.source(), "10.0.0.5".parse::<IpAddr>().unwrap());
        assert_eq!(
            event.destination(),
            "93.184.216.34".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn events_are_send_sync() {
        fn assert_send_sync<T: Send + Sync + 'static>() {}
        assert_send_sync::<AccessEvent>();
    }
}
