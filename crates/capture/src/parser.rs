//! IP 헤더 최소 파서
//!
//! 모니터가 필요로 하는 필드(출발지/목적지 주소, 버전)만 추출합니다.
//! 체크섬, 옵션, 확장 헤더, 상위 프로토콜은 의도적으로 검사하지
//! 않습니다 — 이 최소 파싱 정책이 verdict 경로의 지연 상한을 지킵니다.
//!
//! 순수 함수이며 공유 상태가 없어 단독으로 테스트할 수 있습니다.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use netwarden_core::error::ParseError;
use netwarden_core::types::{IpVersion, ParsedHeader};

/// IPv4 출발지 주소 오프셋
const IPV4_SRC_OFFSET: usize = 12;
/// IPv4 목적지 주소 오프셋
const IPV4_DST_OFFSET: usize = 16;
/// IPv6 출발지 주소 오프셋
const IPV6_SRC_OFFSET: usize = 8;
/// IPv6 목적지 주소 오프셋
const IPV6_DST_OFFSET: usize = 24;

/// 원시 바이트 버퍼에서 IP 헤더를 파싱합니다.
///
/// 버전은 첫 바이트의 상위 4비트에서 판별합니다.
///
/// # 에러
/// - [`ParseError::Empty`]: 빈 버퍼
/// - [`ParseError::UnsupportedVersion`]: 버전이 4도 6도 아님
/// - [`ParseError::Truncated`]: 판별된 버전의 최소 헤더 길이 미달
pub fn parse_header(raw: &[u8]) -> Result<ParsedHeader, ParseError> {
    let first = *raw.first().ok_or(ParseError::Empty)?;
    let version = match first >> 4 {
        4 => IpVersion::V4,
        6 => IpVersion::V6,
        other => return Err(ParseError::UnsupportedVersion(other)),
    };

    let need = version.min_header_len();
    if raw.len() < need {
        return Err(ParseError::Truncated {
            len: raw.len(),
            need,
        });
    }

    let (source, destination) = match version {
        IpVersion::V4 => (
            IpAddr::V4(Ipv4Addr::from(read_4(raw, IPV4_SRC_OFFSET))),
            IpAddr::V4(Ipv4Addr::from(read_4(raw, IPV4_DST_OFFSET))),
        ),
        IpVersion::V6 => (
            IpAddr::V6(Ipv6Addr::from(read_16(raw, IPV6_SRC_OFFSET))),
            IpAddr::V6(Ipv6Addr::from(read_16(raw, IPV6_DST_OFFSET))),
        ),
    };

    Ok(ParsedHeader {
        source,
        destination,
        version,
    })
}

fn read_4(raw: &[u8], offset: usize) -> [u8; 4] {
    // 호출 전 길이 검사가 끝났으므로 실패하지 않습니다
    raw[offset..offset + 4].try_into().unwrap_or([0; 4])
}

fn read_16(raw: &[u8], offset: usize) -> [u8; 16] {
    raw[offset..offset + 16].try_into().unwrap_or([0; 16])
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 20바이트 최소 IPv4 헤더를 만듭니다.
    pub(crate) fn ipv4_packet(src: Ipv4Addr, dst: Ipv4Addr) -> Vec<u8> {
        let mut buf = vec![0u8; 20];
        buf[0] = 0x45; // version 4, IHL 5
        buf[IPV4_SRC_OFFSET..IPV4_SRC_OFFSET + 4].copy_from_slice(&src.octets());
        buf[IPV4_DST_OFFSET..IPV4_DST_OFFSET + 4].copy_from_slice(&dst.octets());
        buf
    }

    /// 40바이트 고정 IPv6 헤더를 만듭니다.
    pub(crate) fn ipv6_packet(src: Ipv6Addr, dst: Ipv6Addr) -> Vec<u8> {
        let mut buf = vec![0u8; 40];
        buf[0] = 0x60;
        buf[IPV6_SRC_OFFSET..IPV6_SRC_OFFSET + 16].copy_from_slice(&src.octets());
        buf[IPV6_DST_OFFSET..IPV6_DST_OFFSET + 16].copy_from_slice(&dst.octets());
        buf
    }

    #[test]
    fn parses_minimal_ipv4_header() {
        let src: Ipv4Addr = "10.0.0.5".parse().unwrap();
        let dst: Ipv4Addr = "93.184.216.34".parse().unwrap();
        let header = parse_header(&ipv4_packet(src, dst)).unwrap();
        assert_eq!(header.source, IpAddr::V4(src));
        assert_eq!(header.destination, IpAddr::V4(dst));
        assert_eq!(header.version, IpVersion::V4);
    }

    #[test]
    fn parses_ipv6_header() {
        let src: Ipv6Addr = "fe80::1".parse().unwrap();
        let dst: Ipv6Addr = "2606:4700::1111".parse().unwrap();
        let header = parse_header(&ipv6_packet(src, dst)).unwrap();
        assert_eq!(header.source, IpAddr::V6(src));
        assert_eq!(header.destination, IpAddr::V6(dst));
        assert_eq!(header.version, IpVersion::V6);
    }

    #[test]
    fn extracted_fields_roundtrip() {
        // 추출한 필드로 버퍼를 재구성하면 동일한 주소가 나와야 합니다
        let src: Ipv4Addr = "192.168.1.77".parse().unwrap();
        let dst: Ipv4Addr = "8.8.8.8".parse().unwrap();
        let header = parse_header(&ipv4_packet(src, dst)).unwrap();

        let (IpAddr::V4(s), IpAddr::V4(d)) = (header.source, header.destination) else {
            panic!("expected v4 addresses");
        };
        let reparsed = parse_header(&ipv4_packet(s, d)).unwrap();
        assert_eq!(reparsed, header);
    }

    #[test]
    fn empty_buffer_fails() {
        assert_eq!(parse_header(&[]), Err(ParseError::Empty));
    }

    #[test]
    fn five_byte_buffer_is_truncated() {
        let result = parse_header(&[0x45, 0, 0, 0, 0]);
        assert_eq!(result, Err(ParseError::Truncated { len: 5, need: 20 }));
    }

    #[test]
    fn nineteen_byte_ipv4_is_truncated() {
        let mut buf = vec![0u8; 19];
        buf[0] = 0x45;
        assert_eq!(
            parse_header(&buf),
            Err(ParseError::Truncated { len: 19, need: 20 })
        );
    }

    #[test]
    fn short_ipv6_is_truncated() {
        let mut buf = vec![0u8; 39];
        buf[0] = 0x60;
        assert_eq!(
            parse_header(&buf),
            Err(ParseError::Truncated { len: 39, need: 40 })
        );
    }

    #[test]
    fn unknown_version_fails() {
        let mut buf = vec![0u8; 20];
        buf[0] = 0x95; // version 9
        assert_eq!(parse_header(&buf), Err(ParseError::UnsupportedVersion(9)));
    }

    #[test]
    fn version_comes_from_top_nibble_only() {
        // 하위 4비트(IHL)는 버전 판별에 영향을 주지 않습니다
        let src: Ipv4Addr = "1.2.3.4".parse().unwrap();
        let dst: Ipv4Addr = "5.6.7.8".parse().unwrap();
        let mut buf = ipv4_packet(src, dst);
        buf[0] = 0x4F;
        assert!(parse_header(&buf).is_ok());
    }
}
