//! 설정 관리 — netwarden.toml 파싱 및 런타임 설정
//!
//! [`NetwardenConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선, 데몬에서 적용)
//! 2. 환경변수 (`NETWARDEN_CAPTURE_QUEUE_ID=1` 형식)
//! 3. 설정 파일 (`netwarden.toml`)
//! 4. 기본값 (`Default` 구현)

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, NetwardenError};

/// netwarden 통합 설정
///
/// `netwarden.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetwardenConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 패킷 캡처 설정
    #[serde(default)]
    pub capture: CaptureConfig,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl NetwardenConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, NetwardenError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, NetwardenError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                NetwardenError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                NetwardenError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, NetwardenError> {
        toml::from_str(toml_str).map_err(|e| {
            NetwardenError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `NETWARDEN_{SECTION}_{FIELD}`
    /// 예: `NETWARDEN_CAPTURE_QUEUE_ID=1`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "NETWARDEN_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "NETWARDEN_GENERAL_LOG_FORMAT");

        // Capture
        override_u16(&mut self.capture.queue_id, "NETWARDEN_CAPTURE_QUEUE_ID");
        override_usize(&mut self.capture.workers, "NETWARDEN_CAPTURE_WORKERS");
        override_usize(
            &mut self.capture.event_channel_capacity,
            "NETWARDEN_CAPTURE_EVENT_CHANNEL_CAPACITY",
        );
        override_usize(
            &mut self.capture.max_history_per_source,
            "NETWARDEN_CAPTURE_MAX_HISTORY_PER_SOURCE",
        );
        override_u64(
            &mut self.capture.shutdown_timeout_secs,
            "NETWARDEN_CAPTURE_SHUTDOWN_TIMEOUT_SECS",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "NETWARDEN_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "NETWARDEN_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "NETWARDEN_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), NetwardenError> {
        self.general.validate()?;
        self.capture.validate()?;
        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

impl GeneralConfig {
    fn validate(&self) -> Result<(), NetwardenError> {
        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("'{}' is not 'json' or 'pretty'", self.log_format),
            }
            .into());
        }
        Ok(())
    }
}

/// 패킷 캡처 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// 바인딩할 NFQUEUE 큐 번호
    pub queue_id: u16,
    /// verdict 워커 수 — 1이면 단일 루프, 2 이상이면 병렬 처리.
    ///
    /// 병렬 모드에서는 같은 출발지의 목적지 기록 순서가 도착 순서와
    /// 다를 수 있습니다 (문서화된 완화).
    pub workers: usize,
    /// 접근 이벤트 채널 용량
    pub event_channel_capacity: usize,
    /// 출발지당 보관할 최대 목적지 수 (0 = 무제한)
    pub max_history_per_source: usize,
    /// stop() 시 수신 루프 종료를 기다리는 최대 시간 (초)
    pub shutdown_timeout_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            queue_id: 0,
            workers: 1,
            event_channel_capacity: 1024,
            max_history_per_source: 0,
            shutdown_timeout_secs: 5,
        }
    }
}

impl CaptureConfig {
    fn validate(&self) -> Result<(), NetwardenError> {
        if self.workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "capture.workers".to_owned(),
                reason: "must be at least 1".to_owned(),
            }
            .into());
        }
        if self.event_channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "capture.event_channel_capacity".to_owned(),
                reason: "must be at least 1".to_owned(),
            }
            .into());
        }
        Ok(())
    }
}

/// 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus 엔드포인트 활성화 여부
    pub enabled: bool,
    /// 리슨 주소
    pub listen_addr: String,
    /// 리슨 포트
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9590,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, var: &str) {
    if let Ok(value) = std::env::var(var) {
        *target = value;
    }
}

fn override_bool(target: &mut bool, var: &str) {
    if let Ok(value) = std::env::var(var) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(var, value, "ignoring non-boolean environment override"),
        }
    }
}

fn override_u16(target: &mut u16, var: &str) {
    if let Ok(value) = std::env::var(var) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(var, value, "ignoring non-numeric environment override"),
        }
    }
}

fn override_u64(target: &mut u64, var: &str) {
    if let Ok(value) = std::env::var(var) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(var, value, "ignoring non-numeric environment override"),
        }
    }
}

fn override_usize(target: &mut usize, var: &str) {
    if let Ok(value) = std::env::var(var) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(var, value, "ignoring non-numeric environment override"),
        }
    }
}
