//! 패킷 전송 — 개행 구분 JSON, best-effort
//!
//! [`PacketTransport`]는 패킷 하나를 한 번의 `write_all`로 내보냅니다.
//! 전송 실패는 호출자에게 에러로 전파되지 않습니다. 성공 여부만
//! 반환하고, 실패는 공유 카운터에 기록되어 헬스 폴러가 다음 사이클에서
//! 연결을 정리하게 합니다.
//!
//! 전송 경로에 락이 없습니다. 링크 핸들을 복제해 쓰기 때문에, 쓰기가
//! 소켓 버퍼에 막혀도 연결 해제와 폴러는 영향을 받지 않습니다.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use metrics::counter;
use tracing::{debug, warn};

use logpost_core::metrics::{AGENT_PACKETS_SENT_TOTAL, AGENT_TRANSPORT_ERRORS_TOTAL};
use logpost_core::types::Packet;

use crate::conn::ConnShared;

/// 수집기로의 best-effort 패킷 전송기
///
/// [`ConnectionController`](crate::conn::ConnectionController)와 상태를
/// 공유하는 가벼운 핸들입니다. 자유롭게 복제할 수 있습니다.
#[derive(Clone)]
pub struct PacketTransport {
    shared: Arc<ConnShared>,
}

impl PacketTransport {
    pub(crate) fn new(shared: Arc<ConnShared>) -> Self {
        Self { shared }
    }

    /// 패킷 하나를 전송합니다.
    ///
    /// 전송이 비활성 상태거나 클라이언트가 없으면 조용히 `false`를
    /// 반환합니다. 직렬화 실패와 쓰기 실패도 `false`입니다. 쓰기 실패는
    /// 전송 에러 카운터를 올려 재연결 사이클을 유발합니다.
    pub async fn send_packet(&self, packet: &Packet) -> bool {
        if !self.shared.enabled.load(Ordering::SeqCst) {
            return false;
        }

        let wire = match packet.to_wire() {
            Ok(w) => w,
            Err(e) => {
                warn!(kind = %packet.kind, error = %e, "packet serialization failed");
                return false;
            }
        };

        let Some(link) = self.shared.client.load_full() else {
            return false;
        };

        match link.write_all(&wire).await {
            Ok(()) => {
                self.shared.packets_sent.fetch_add(1, Ordering::SeqCst);
                counter!(AGENT_PACKETS_SENT_TOTAL).increment(1);
                true
            }
            Err(e) => {
                self.shared.transport_errors.fetch_add(1, Ordering::SeqCst);
                counter!(AGENT_TRANSPORT_ERRORS_TOTAL).increment(1);
                debug!(addr = %link.addr, error = %e, "packet write failed");
                false
            }
        }
    }
}
