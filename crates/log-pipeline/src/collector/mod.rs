//! 패킷 수집 모듈 -- UDP 소켓에서 원시 데이터그램을 수집합니다.
//!
//! [`PacketReceiver`]는 자체 tokio 태스크에서 실행되며, 수신한 데이터그램을
//! [`RawPacket`]으로 감싸 `tokio::mpsc::Sender<RawPacket>` 큐로 넘깁니다.
//! 수신 루프는 큐 너머의 처리 지연을 기다리지 않습니다.

pub mod syslog_udp;

pub use syslog_udp::{PacketReceiver, UdpReceiverConfig};

use std::net::{IpAddr, SocketAddr};

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// 수신된 데이터그램 한 개
///
/// 수신기가 생성하고 처리 단계가 소비합니다. 생성 후 변경되지 않습니다.
#[derive(Debug, Clone)]
pub struct RawPacket {
    /// 수신 시각 (UTC)
    pub received_at: DateTime<Utc>,
    /// 송신자 IP
    pub source_ip: IpAddr,
    /// 송신자 포트
    pub source_port: u16,
    /// 원시 바이트
    pub data: Bytes,
    /// UTF-8 디코딩 결과 (잘못된 바이트는 U+FFFD로 대체)
    pub text: String,
}

impl RawPacket {
    /// 수신 바이트와 송신자 주소로 새 패킷을 생성합니다.
    ///
    /// IPv4-mapped IPv6 주소는 IPv4로 정규화하여 라우트 테이블과 비교할 수 있게 합니다.
    pub fn new(data: Bytes, peer: SocketAddr) -> Self {
        let text = String::from_utf8_lossy(&data).into_owned();
        let source_ip = match peer.ip() {
            IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(IpAddr::V6(v6), IpAddr::V4),
            v4 => v4,
        };
        Self {
            received_at: Utc::now(),
            source_ip,
            source_port: peer.port(),
            data,
            text,
        }
    }

    /// 텍스트로 패킷을 생성합니다 (테스트, 재처리용).
    pub fn from_text(text: impl Into<String>, peer: SocketAddr) -> Self {
        let text = text.into();
        Self::new(Bytes::from(text), peer)
    }
}
