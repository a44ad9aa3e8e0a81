//! 로그 수신 모듈 -- 네트워크에서 원시 레코드를 받아 수신 큐로 넘깁니다.
//!
//! # 수신 소스
//! - [`UdpListener`]: UDP 데이터그램 하나를 레코드 하나로 취급
//!
//! # 아키텍처
//! 수신 루프는 자체 tokio 태스크에서 실행되며, 파싱 없이 수신 시각과 송신 IP만
//! 붙여 [`IntakeQueue`](crate::buffer::IntakeQueue)로 전달합니다.

pub mod udp;

pub use udp::UdpListener;

use std::net::IpAddr;
use std::time::SystemTime;

use bytes::Bytes;

/// 수신된 원시 레코드
///
/// 수신 루프가 생성하고 디스패처가 소비합니다. 생성 후 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// 수신한 바이트 그대로
    pub data: Bytes,
    /// 송신 IP
    pub source_ip: IpAddr,
    /// 수신 시각
    pub received_at: SystemTime,
}

impl RawRecord {
    /// 현재 시각으로 새 레코드를 생성합니다.
    pub fn new(data: Bytes, source_ip: IpAddr) -> Self {
        Self {
            data,
            source_ip,
            received_at: SystemTime::now(),
        }
    }

    /// 수신 시각을 지정합니다 (리플레이, 테스트용).
    pub fn with_received_at(mut self, received_at: SystemTime) -> Self {
        self.received_at = received_at;
        self
    }

    /// 페이로드가 비어있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
