//! 에러 타입 — 도메인별 에러 정의
//!
//! 패킷 파싱 실패([`ParseError`])만이 회복 가능한 에러이며 verdict 엔진
//! 내부에서 흡수됩니다. 나머지는 모두 모니터 루프까지 전파되어
//! unbind 이후 운영자에게 노출됩니다.

/// netwarden 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum NetwardenError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 패킷 캡처(NFQUEUE) 에러
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    /// IP 헤더 파싱 에러
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// 파이프라인 생명주기 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 패킷 캡처 에러
///
/// `Bind`는 시작 시점에만 발생하는 치명적 에러입니다.
/// `Recv`/`Verdict`/`Unbind`는 bind 성공 이후 발생하면 해당 실행의
/// 치명적 에러로 취급됩니다 (§모니터 루프의 Stopping 전이).
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// NFQUEUE 바인딩 실패 — 시설이 없거나 큐가 이미 점유됨
    #[error("failed to bind nfqueue {queue_id}: {reason}")]
    Bind { queue_id: u16, reason: String },

    /// 패킷 수신 실패
    #[error("packet receive failed: {0}")]
    Recv(String),

    /// verdict 전달 실패
    #[error("verdict delivery failed: {0}")]
    Verdict(String),

    /// 이미 사용되었거나 알 수 없는 패킷 핸들
    ///
    /// 정상적인 배선에서는 발생할 수 없습니다. 발생했다면 핸들이
    /// 이중으로 verdict되었거나 유실된 것이므로 치명적으로 취급합니다.
    #[error("invalid packet handle: {0}")]
    InvalidHandle(String),

    /// 언바인드 실패
    #[error("failed to unbind nfqueue: {0}")]
    Unbind(String),

    /// 현재 플랫폼에서 NFQUEUE를 지원하지 않음
    #[error("nfqueue is not supported on this platform: {0}")]
    Unsupported(String),
}

/// IP 헤더 파싱 에러 — 패킷 단위로 회복 가능
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    /// 버퍼가 해당 버전의 최소 헤더 길이보다 짧음
    #[error("truncated packet: {len} bytes, need at least {need}")]
    Truncated { len: usize, need: usize },

    /// 첫 바이트 상위 4비트가 4도 6도 아님
    #[error("unsupported ip version: {0}")]
    UnsupportedVersion(u8),

    /// 빈 버퍼
    #[error("empty packet buffer")]
    Empty,
}

/// 파이프라인 생명주기 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 이미 실행 중인 파이프라인을 다시 시작함
    #[error("pipeline already running")]
    AlreadyRunning,

    /// 실행 중이 아닌 파이프라인을 정지함
    #[error("pipeline not running")]
    NotRunning,

    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 백그라운드 태스크 비정상 종료 (패닉 등)
    #[error("background task failed: {0}")]
    TaskFailed(String),
}
