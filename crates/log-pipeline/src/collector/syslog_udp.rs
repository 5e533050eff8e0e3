//! UDP 패킷 수신기
//!
//! 설정된 주소의 UDP 소켓에서 데이터그램을 받아 처리 큐로 넘깁니다.
//! 각 데이터그램은 하나의 로그 메시지로 취급합니다.
//!
//! 수신 루프는 처리 단계의 에러나 지연 때문에 종료되지 않습니다.
//! 큐가 가득 차면 새로 들어온 패킷을 버리고 카운터를 올립니다.
//! 루프가 끝나는 경우는 취소 토큰이 취소되었거나 복구할 수 없는 소켓 에러가
//! 발생했을 때뿐이며, 재시작은 외부 감독자의 몫입니다.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use watchtower_core::metrics as m;

use super::RawPacket;
use crate::error::LogPipelineError;
use crate::stats::PipelineStats;

/// UDP 수신기 설정
#[derive(Debug, Clone)]
pub struct UdpReceiverConfig {
    /// 바인드 주소 (예: "0.0.0.0:1514")
    pub bind_addr: String,
    /// SO_RCVBUF 힌트 (바이트). 0이면 OS 기본값을 유지합니다.
    pub recv_buffer_size: usize,
    /// 데이터그램당 읽기 버퍼 크기 (바이트). 더 긴 데이터그램은 잘립니다.
    pub max_message_size: usize,
}

impl Default for UdpReceiverConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:1514".to_owned(),
            recv_buffer_size: 256 * 1024, // 256KB
            max_message_size: 8192,
        }
    }
}

/// UDP 패킷 수신기
///
/// [`bind`](Self::bind)에서 소켓을 열고, [`run`](Self::run)이 취소될 때까지
/// 데이터그램을 수신합니다. `run`은 `self`를 소비하므로 루프가 끝나면 소켓이 닫힙니다.
pub struct PacketReceiver {
    /// 바인드된 소켓
    socket: UdpSocket,
    /// 실제 바인드 주소 (포트 0 바인드 시 커널이 고른 포트 포함)
    local_addr: SocketAddr,
    /// 수신기 설정
    config: UdpReceiverConfig,
    /// 종료 신호
    cancel_token: CancellationToken,
    /// 공유 통계
    stats: Arc<PipelineStats>,
}

impl PacketReceiver {
    /// 소켓을 생성하고 바인드합니다.
    ///
    /// SO_REUSEADDR을 켜고, 설정된 경우 SO_RCVBUF 크기를 요청합니다.
    /// tokio 런타임 안에서 호출해야 합니다.
    pub fn bind(
        config: UdpReceiverConfig,
        cancel_token: CancellationToken,
        stats: Arc<PipelineStats>,
    ) -> Result<Self, LogPipelineError> {
        let receiver_err = |reason: String| LogPipelineError::Receiver {
            bind_addr: config.bind_addr.clone(),
            reason,
        };

        let addr: SocketAddr = config
            .bind_addr
            .parse()
            .map_err(|e| receiver_err(format!("invalid bind address: {e}")))?;

        let std_socket = open_socket(addr, config.recv_buffer_size)
            .map_err(|e| receiver_err(format!("failed to bind: {e}")))?;
        let socket = UdpSocket::from_std(std_socket)
            .map_err(|e| receiver_err(format!("failed to register socket: {e}")))?;
        let local_addr = socket
            .local_addr()
            .map_err(|e| receiver_err(format!("failed to read local address: {e}")))?;

        info!(bind_addr = %local_addr, "UDP receiver bound");

        Ok(Self {
            socket,
            local_addr,
            config,
            cancel_token,
            stats,
        })
    }

    /// 실제 바인드된 주소를 반환합니다.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 수신 루프를 중단시킵니다. 여러 번 호출해도 안전합니다.
    pub fn stop(&self) {
        self.cancel_token.cancel();
    }

    /// 취소될 때까지 데이터그램을 수신하여 `tx`로 넘깁니다.
    ///
    /// 정상 종료 시 `Ok(())`, 복구할 수 없는 소켓 에러 시 `Err`를 반환합니다.
    pub async fn run(self, tx: mpsc::Sender<RawPacket>) -> Result<(), LogPipelineError> {
        let mut buf = vec![0u8; self.config.max_message_size];
        info!(bind_addr = %self.local_addr, "UDP receiver started");

        loop {
            tokio::select! {
                biased;

                _ = self.cancel_token.cancelled() => {
                    info!(bind_addr = %self.local_addr, "UDP receiver received shutdown signal");
                    break;
                }
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, peer)) => {
                            let packet = RawPacket::new(Bytes::copy_from_slice(&buf[..len]), peer);
                            self.dispatch(&tx, packet);
                        }
                        Err(e) if is_transient(&e) => {
                            self.stats.record_recv_error();
                            metrics::counter!(m::RECEIVER_RECV_ERRORS_TOTAL).increment(1);
                            debug!(error = %e, "transient UDP receive error, continuing");
                        }
                        Err(e) => {
                            error!(bind_addr = %self.local_addr, error = %e, "UDP receive loop terminated");
                            return Err(LogPipelineError::Receiver {
                                bind_addr: self.local_addr.to_string(),
                                reason: e.to_string(),
                            });
                        }
                    }
                }
            }
        }

        info!(bind_addr = %self.local_addr, "UDP receiver stopped");
        Ok(())
    }

    /// 패킷을 큐에 넣습니다. 대기하지 않습니다.
    fn dispatch(&self, tx: &mpsc::Sender<RawPacket>, packet: RawPacket) {
        self.stats.record_received();
        metrics::counter!(m::RECEIVER_PACKETS_TOTAL).increment(1);

        match tx.try_send(packet) {
            Ok(()) => {}
            Err(TrySendError::Full(packet)) => {
                self.stats.record_dropped();
                metrics::counter!(m::RECEIVER_PACKETS_DROPPED_TOTAL).increment(1);
                warn!(
                    source_ip = %packet.source_ip,
                    capacity = tx.max_capacity(),
                    "processing queue full, dropping packet"
                );
            }
            Err(TrySendError::Closed(packet)) => {
                self.stats.record_dropped();
                metrics::counter!(m::RECEIVER_PACKETS_DROPPED_TOTAL).increment(1);
                warn!(
                    source_ip = %packet.source_ip,
                    "processing queue closed, dropping packet"
                );
            }
        }
    }
}

/// SO_REUSEADDR과 SO_RCVBUF를 설정한 논블로킹 UDP 소켓을 엽니다.
fn open_socket(addr: SocketAddr, recv_buffer_size: usize) -> io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    if recv_buffer_size > 0 {
        if let Err(e) = socket.set_recv_buffer_size(recv_buffer_size) {
            warn!(requested = recv_buffer_size, error = %e, "failed to set SO_RCVBUF, using OS default");
        }
    }
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    Ok(socket.into())
}

/// 루프를 끝내지 않아도 되는 수신 에러인지 판단합니다.
///
/// 연결되지 않은 UDP 소켓에서도 이전 송신의 ICMP 응답이 ConnectionReset/Refused로
/// 보고될 수 있습니다.
fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock
            | io::ErrorKind::Interrupted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
    )
}
