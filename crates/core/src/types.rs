//! 도메인 타입 — 시스템 전역에서 사용되는 공통 타입
//!
//! 패킷 하나가 verdict를 받기까지 거치는 데이터 형태를 정의합니다.
//! 주소는 표준 라이브러리의 [`IpAddr`]를 그대로 사용합니다 — IPv4/IPv6
//! 고정 크기 값이며 `Eq + Hash`가 보장되어 원장(ledger)의 키로 적합합니다.

use std::fmt;
use std::net::IpAddr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// 패킷 포워딩 verdict
///
/// 패킷 핸들 하나당 정확히 하나의 verdict가 대응합니다.
/// 관찰된 정책은 무조건 Forward이며, 파싱 실패를 포함한 어떤 내부 상태도
/// verdict를 Drop으로 바꾸지 않습니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    /// 패킷을 커널 포워딩 경로로 되돌려 보냅니다
    #[default]
    Forward,
    /// 패킷을 폐기합니다
    Drop,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forward => write!(f, "forward"),
            Self::Drop => write!(f, "drop"),
        }
    }
}

/// IP 버전 — 첫 바이트의 상위 4비트에서 판별됩니다
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IpVersion {
    /// IPv4 (최소 헤더 20바이트)
    V4,
    /// IPv6 (고정 헤더 40바이트)
    V6,
}

impl IpVersion {
    /// 해당 버전의 최소 헤더 길이 (바이트)
    pub const fn min_header_len(self) -> usize {
        match self {
            Self::V4 => 20,
            Self::V6 => 40,
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4 => write!(f, "4"),
            Self::V6 => write!(f, "6"),
        }
    }
}

/// 최소 파싱된 IP 헤더
///
/// 모니터가 필요로 하는 필드만 담습니다. 체크섬, 옵션, 상위 프로토콜은
/// 의도적으로 파싱하지 않습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedHeader {
    /// 출발지 주소 (디바이스)
    pub source: IpAddr,
    /// 목적지 주소
    pub destination: IpAddr,
    /// IP 버전
    pub version: IpVersion,
}

impl fmt::Display for ParsedHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} (v{})", self.source, self.destination, self.version)
    }
}

/// 접근 기록 — 성공적으로 파싱된 패킷 하나당 정확히 한 번 생성됩니다
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRecord {
    /// 출발지 주소 (디바이스)
    pub source: IpAddr,
    /// 목적지 주소
    pub destination: IpAddr,
    /// 패킷 처리 시각
    pub timestamp: SystemTime,
}

impl fmt::Display for AccessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 접근 로그의 안정적인 텍스트 형식 — grep 가능해야 합니다
        write!(f, "{} accessed {}", self.source, self.destination)
    }
}
