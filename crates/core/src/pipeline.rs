//! 파이프라인 trait — 모듈 생명주기와 확장 포인트 정의
//!
//! [`Pipeline`]은 데몬이 모든 모듈을 동일한 생명주기
//! (start/stop/health_check)로 관리하기 위한 인터페이스입니다.
//! [`EventSink`]는 접근 이벤트를 소비하는 쪽의 append 전용 seam입니다.

use crate::error::NetwardenError;
use crate::event::AccessEvent;

/// 모듈 상태 점검 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// 정상 동작 중
    Healthy,
    /// 동작 중이지만 주의 필요
    Degraded(String),
    /// 동작하지 않음
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 상태인지 확인합니다.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 비정상 상태인지 확인합니다.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

/// 데몬이 관리하는 모듈의 생명주기 trait
///
/// `start`는 외부 리소스 획득(NFQUEUE 바인딩 등)과 백그라운드 태스크
/// 스폰을 수행하고, `stop`은 획득한 리소스를 모든 종료 경로에서
/// 해제해야 합니다.
pub trait Pipeline: Send {
    /// 모듈을 시작합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), NetwardenError>> + Send;

    /// 모듈을 정지하고 리소스를 정리합니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), NetwardenError>> + Send;

    /// 모듈의 현재 상태를 확인합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

/// 접근 이벤트를 소비하는 쓰기 전용 싱크
///
/// 영속 로그 기록 등 이벤트의 최종 목적지는 이 trait 뒤에 있습니다.
/// verdict 경로는 싱크의 지연에 영향받지 않아야 하므로, 구현체는
/// `append`에서 블로킹하지 않아야 합니다.
pub trait EventSink: Send {
    /// 이벤트 하나를 싱크에 추가합니다.
    fn append(&mut self, event: &AccessEvent) -> Result<(), NetwardenError>;
}
