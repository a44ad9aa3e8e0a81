//! UDP 수신기
//!
//! 설정된 주소에 바인드하고 데이터그램 하나를 원시 레코드 하나로 취급합니다.
//! 파싱은 하지 않으며, 빈 데이터그램도 그대로 전달합니다 (판단은 디스패처 몫).

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use ironwatch_core::metrics as m;

use super::RawRecord;
use crate::buffer::IntakeQueue;
use crate::error::LogPipelineError;

/// UDP 수신기
///
/// 바인드 실패는 시작 시점의 치명적 에러이고, 수신 에러는 로그만 남기고
/// 루프를 계속합니다.
pub struct UdpListener {
    socket: UdpSocket,
    max_datagram_size: usize,
    queue: Arc<IntakeQueue>,
}

impl UdpListener {
    /// 주소에 바인드합니다.
    pub async fn bind(
        addr: &str,
        max_datagram_size: usize,
        queue: Arc<IntakeQueue>,
    ) -> Result<Self, LogPipelineError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| LogPipelineError::Transport {
                addr: addr.to_owned(),
                reason: e.to_string(),
            })?;
        tracing::info!(addr = %addr, "udp listener bound");
        Ok(Self {
            socket,
            max_datagram_size: max_datagram_size.max(1),
            queue,
        })
    }

    /// 실제 바인드된 주소 (포트 0 바인드 시 할당된 포트 확인용)
    pub fn local_addr(&self) -> Result<SocketAddr, LogPipelineError> {
        Ok(self.socket.local_addr()?)
    }

    /// 취소될 때까지 수신 루프를 실행합니다.
    ///
    /// 반환 시 수신 큐를 닫아 소비자가 남은 레코드를 비우고 종료하도록 합니다.
    pub async fn run(self, cancel: CancellationToken) {
        let mut buf = vec![0u8; self.max_datagram_size];
        tracing::info!("udp receive loop started");

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                result = self.socket.recv_from(&mut buf) => match result {
                    Ok((len, peer)) => {
                        metrics::counter!(m::DATAGRAMS_RECEIVED_TOTAL).increment(1);
                        let record = RawRecord::new(Bytes::copy_from_slice(&buf[..len]), peer.ip());
                        if record.is_empty() {
                            tracing::debug!(peer = %peer, "empty datagram received");
                        }
                        let outcome = tokio::select! {
                            () = cancel.cancelled() => break,
                            outcome = self.queue.push(record) => outcome,
                        };
                        if outcome.is_drop() {
                            tracing::debug!(peer = %peer, ?outcome, "datagram not queued as-is");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "udp receive failed, continuing");
                    }
                },
            }
        }

        self.queue.close();
        tracing::info!("udp receive loop stopped");
    }
}
