//! 수집기 연결 제어 — unix socket 우선, TCP 폴백
//!
//! [`ConnectionController`]는 수집기와의 링크 생명주기를 관리합니다.
//! 연결은 항상 best-effort입니다: 수집기가 없으면 에이전트는 조용히
//! 비연결 상태로 동작하고, 헬스 폴러가 주기적으로 재연결을 시도합니다.
//!
//! 죽은 피어는 쓰기 실패로만 감지됩니다. 전송 계층이 에러 카운터를
//! 올리면 다음 폴에서 연결을 끊고 재연결 사이클로 돌아갑니다.

use std::os::fd::AsRawFd;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::{ArcSwap, ArcSwapOption};
use metrics::counter;
use tokio::net::{TcpStream, UnixStream};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use logpost_core::config::{AgentConfig, Endpoint};
use logpost_core::metrics::AGENT_RECONNECTS_TOTAL;
use logpost_core::types::{Packet, SessionInfo};

/// 수집기로의 활성 링크
///
/// 스트림 종류와 연결 당시의 대상 주소를 함께 보관합니다.
/// 쓰기는 readiness 기반으로 `&self`에서 수행되므로 전송 경로에 락이
/// 없고, [`shutdown`](Self::shutdown)은 진행 중인 쓰기와 무관하게
/// 소켓을 닫을 수 있습니다.
pub(crate) struct CollectorLink {
    stream: LinkStream,
    pub(crate) addr: String,
}

/// unix socket 또는 TCP 스트림
enum LinkStream {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl CollectorLink {
    /// 버퍼 전체를 쓰거나 에러를 반환합니다.
    ///
    /// 소켓 버퍼가 가득 차면 writable 대기 상태로 멈추는데, 이 대기는
    /// [`shutdown`](Self::shutdown)이 소켓을 닫으면 에러로 깨어납니다.
    pub(crate) async fn write_all(&self, buf: &[u8]) -> std::io::Result<()> {
        let mut written = 0;
        while written < buf.len() {
            self.writable().await?;
            match self.try_write(&buf[written..]) {
                Ok(0) => return Err(std::io::ErrorKind::WriteZero.into()),
                Ok(n) => written += n,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn writable(&self) -> std::io::Result<()> {
        match &self.stream {
            LinkStream::Unix(s) => s.writable().await,
            LinkStream::Tcp(s) => s.writable().await,
        }
    }

    fn try_write(&self, buf: &[u8]) -> std::io::Result<usize> {
        match &self.stream {
            LinkStream::Unix(s) => s.try_write(buf),
            LinkStream::Tcp(s) => s.try_write(buf),
        }
    }

    /// 소켓을 양방향으로 닫습니다.
    ///
    /// 다른 태스크가 이 링크에 쓰기 대기 중이어도 즉시 적용되며,
    /// 대기 중이던 쓰기는 에러로 깨어납니다.
    pub(crate) fn shutdown(&self) {
        let fd = match &self.stream {
            LinkStream::Unix(s) => s.as_raw_fd(),
            LinkStream::Tcp(s) => s.as_raw_fd(),
        };
        // SAFETY: fd는 아직 드롭되지 않은 소켓의 것입니다. 이미 닫힌
        // 소켓에 대한 shutdown 실패는 무시해도 됩니다.
        unsafe { libc::shutdown(fd, libc::SHUT_RDWR) };
    }
}

/// 컨트롤러와 전송 계층이 공유하는 상태
///
/// 플래그 순서 규약: 연결 수립 시 `enabled`를 먼저 올리고 `connected`를
/// 올립니다. 해제 시에는 `connected`를 먼저 내리고 `enabled`를 내립니다.
/// 따라서 `connected`가 참이면 `enabled`도 참입니다.
pub(crate) struct ConnShared {
    pub(crate) enabled: AtomicBool,
    pub(crate) connected: AtomicBool,
    pub(crate) force_disabled: AtomicBool,
    pub(crate) transport_errors: AtomicU64,
    pub(crate) packets_sent: AtomicU64,
    /// 활성 링크. 전송 경로는 락 없이 핸들을 복제해 쓰고, 해제는
    /// 슬롯을 비운 뒤 소켓을 직접 닫으므로 서로를 기다리지 않습니다.
    pub(crate) client: ArcSwapOption<CollectorLink>,
}

impl ConnShared {
    fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            force_disabled: AtomicBool::new(false),
            transport_errors: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            client: ArcSwapOption::empty(),
        }
    }
}

type ConnectHook = Arc<dyn Fn() + Send + Sync>;

/// 수집기 연결 상태 기계
///
/// unix socket을 먼저 시도하고 실패하면 TCP로 폴백합니다.
/// 각 시도에는 dial 타임아웃이 적용됩니다. 연결 성공 시 세션 hello
/// 패킷을 best-effort로 전송하고 on-connect 훅을 실행합니다.
pub struct ConnectionController {
    config: ArcSwap<AgentConfig>,
    shared: Arc<ConnShared>,
    session: SessionInfo,
    poller_started: AtomicBool,
    on_connect: std::sync::Mutex<Option<ConnectHook>>,
}

impl ConnectionController {
    /// 주어진 설정으로 컨트롤러를 생성합니다. 아직 연결하지 않습니다.
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
            shared: Arc::new(ConnShared::new()),
            session: SessionInfo::current(),
            poller_started: AtomicBool::new(false),
            on_connect: std::sync::Mutex::new(None),
        }
    }

    /// 설정을 교체합니다. 다음 연결 시도부터 반영됩니다.
    pub fn set_config(&self, config: AgentConfig) {
        self.config.store(Arc::new(config));
    }

    /// 연결 성공 시 실행할 훅을 등록합니다.
    ///
    /// 훅은 첫 연결을 포함한 매 연결 성공 직후 동기적으로 호출됩니다.
    /// 일회성 초기화는 훅 쪽에서 가드해야 합니다.
    pub fn set_on_connect(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self
            .on_connect
            .lock()
            .expect("on_connect lock poisoned") = Some(Arc::new(hook));
    }

    /// 전송 계층과 공유할 상태 핸들
    pub(crate) fn shared(&self) -> Arc<ConnShared> {
        Arc::clone(&self.shared)
    }

    /// 수집기 연결을 시도합니다.
    ///
    /// 이미 연결되어 있거나 강제 비활성화 상태면 아무것도 하지 않습니다.
    /// unix socket 경로가 설정되어 있고 파일이 존재하면 먼저 시도하고,
    /// 실패하거나 건너뛰면 TCP 주소를 시도합니다. 모두 실패하면 조용히
    /// 비연결 상태로 남습니다.
    pub async fn try_connect(&self) {
        if self.shared.force_disabled.load(Ordering::SeqCst)
            || self.shared.enabled.load(Ordering::SeqCst)
        {
            return;
        }

        let config = self.config.load();
        let dial_timeout = Duration::from_millis(config.collector.dial_timeout_ms);

        // 새 연결 사이클은 깨끗한 에러 카운터로 시작
        self.shared.transport_errors.store(0, Ordering::SeqCst);

        let link = match self.dial(&config, dial_timeout).await {
            Some(link) => link,
            None => return,
        };

        info!(addr = %link.addr, "collector connected");
        let link = Arc::new(link);
        self.shared.client.store(Some(Arc::clone(&link)));
        // enabled 먼저, connected 나중 (해제 시 역순)
        self.shared.enabled.store(true, Ordering::SeqCst);
        self.shared.connected.store(true, Ordering::SeqCst);
        counter!(AGENT_RECONNECTS_TOTAL).increment(1);

        self.send_hello(&link).await;

        let hook = self
            .on_connect
            .lock()
            .expect("on_connect lock poisoned")
            .clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    async fn dial(&self, config: &AgentConfig, dial_timeout: Duration) -> Option<CollectorLink> {
        // 1. unix socket (파일이 있을 때만)
        if let Endpoint::Path(path) = config.collector.socket_endpoint() {
            if Path::new(&path).exists() {
                match tokio::time::timeout(dial_timeout, UnixStream::connect(&path)).await {
                    Ok(Ok(stream)) => {
                        return Some(CollectorLink {
                            stream: LinkStream::Unix(stream),
                            addr: path.display().to_string(),
                        });
                    }
                    Ok(Err(e)) => {
                        debug!(path = %path.display(), error = %e, "unix socket connect failed");
                    }
                    Err(_) => {
                        debug!(path = %path.display(), "unix socket connect timed out");
                    }
                }
            } else {
                debug!(path = %path.display(), "unix socket file not present, skipping");
            }
        }

        // 2. TCP 폴백
        if let Endpoint::Addr(addr) = config.collector.tcp_endpoint() {
            match tokio::time::timeout(dial_timeout, TcpStream::connect(&addr)).await {
                Ok(Ok(stream)) => {
                    return Some(CollectorLink {
                        stream: LinkStream::Tcp(stream),
                        addr,
                    });
                }
                Ok(Err(e)) => {
                    debug!(addr = %addr, error = %e, "tcp connect failed");
                }
                Err(_) => {
                    debug!(addr = %addr, "tcp connect timed out");
                }
            }
        }

        None
    }

    /// 연결 직후 세션 식별 패킷을 best-effort로 전송합니다.
    async fn send_hello(&self, link: &CollectorLink) {
        let packet = match Packet::hello(&self.session) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "failed to serialize hello packet");
                return;
            }
        };
        let wire = match packet.to_wire() {
            Ok(w) => w,
            Err(e) => {
                warn!(error = %e, "failed to serialize hello packet");
                return;
            }
        };

        if let Err(e) = link.write_all(&wire).await {
            debug!(addr = %link.addr, error = %e, "hello packet write failed");
            self.shared.transport_errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// 수집기 연결을 해제합니다. 멱등합니다.
    ///
    /// `connected`를 먼저 내려 전송 계층이 새 쓰기를 중단하게 하고,
    /// 짧은 유예 시간 뒤 소켓을 닫습니다. 유예 시간은 이미 진행 중인
    /// 쓰기가 끝날 여지를 줍니다. 쓰기가 소켓 버퍼에 막혀 있더라도
    /// 닫기는 기다리지 않고 적용되며, 막힌 쓰기는 에러로 깨어납니다.
    pub async fn disconnect(&self) {
        self.shared.connected.store(false, Ordering::SeqCst);
        self.shared.enabled.store(false, Ordering::SeqCst);

        let Some(link) = self.shared.client.swap(None) else {
            return;
        };

        let grace = Duration::from_millis(self.config.load().collector.disconnect_grace_ms);
        tokio::time::sleep(grace).await;

        link.shutdown();
        info!(addr = %link.addr, "collector disconnected");
    }

    /// 헬스 폴 한 사이클을 실행합니다.
    ///
    /// 연결 상태에서 전송 에러가 쌓였거나 강제 비활성화되면 해제하고,
    /// 비연결 상태면 재연결을 시도합니다.
    pub async fn poll_conn(&self) {
        if self.shared.enabled.load(Ordering::SeqCst) {
            let errored = self.shared.transport_errors.load(Ordering::SeqCst) > 0;
            let forced = self.shared.force_disabled.load(Ordering::SeqCst);
            if errored || forced {
                debug!(errored, forced, "dropping collector link");
                self.disconnect().await;
            }
        } else {
            self.try_connect().await;
        }
    }

    /// 헬스 폴러 태스크를 시작합니다. 프로세스당 한 번만 시작됩니다.
    ///
    /// 토큰이 취소되면 루프는 조용히 종료합니다.
    pub fn spawn_poller(self: &Arc<Self>, cancel: CancellationToken) {
        if self.poller_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let controller = Arc::clone(self);
        tokio::spawn(async move {
            let interval_ms = controller.config.load().collector.poll_interval_ms;
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        controller.poll_conn().await;
                    }
                    _ = cancel.cancelled() => {
                        debug!("connection poller stopped");
                        break;
                    }
                }
            }
        });
    }

    /// 강제 비활성화 플래그를 설정합니다.
    ///
    /// 참이면 연결 시도가 중단되고 다음 폴에서 기존 연결이 해제됩니다.
    pub fn force_disable(&self, disabled: bool) {
        self.shared.force_disabled.store(disabled, Ordering::SeqCst);
    }

    /// 전송 활성 여부 (연결 사이클이 살아 있는지)
    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::SeqCst)
    }

    /// 연결 여부
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// 현재 사이클의 전송 에러 수
    pub fn transport_errors(&self) -> u64 {
        self.shared.transport_errors.load(Ordering::SeqCst)
    }

    /// 누적 전송 성공 패킷 수
    pub fn packets_sent(&self) -> u64 {
        self.shared.packets_sent.load(Ordering::SeqCst)
    }

    /// 현재 연결 대상 주소
    pub fn peer_addr(&self) -> Option<String> {
        self.shared
            .client
            .load()
            .as_ref()
            .map(|link| link.addr.clone())
    }

    /// 세션 정보
    pub fn session(&self) -> &SessionInfo {
        &self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logpost_core::config::DISABLED_SENTINEL;

    fn offline_config() -> AgentConfig {
        let mut config = AgentConfig::default();
        config.collector.socket_path = DISABLED_SENTINEL.to_owned();
        config.collector.tcp_addr = DISABLED_SENTINEL.to_owned();
        config.collector.disconnect_grace_ms = 1;
        config
    }

    #[tokio::test]
    async fn try_connect_with_no_endpoints_stays_disabled() {
        let controller = ConnectionController::new(offline_config());
        controller.try_connect().await;
        assert!(!controller.is_enabled());
        assert!(!controller.is_connected());
        assert!(controller.peer_addr().is_none());
    }

    #[tokio::test]
    async fn try_connect_skips_missing_socket_file() {
        let mut config = offline_config();
        config.collector.socket_path = "/tmp/logpost-test-no-such-socket-9f2a.sock".to_owned();
        let controller = ConnectionController::new(config);
        controller.try_connect().await;
        assert!(!controller.is_enabled());
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let controller = ConnectionController::new(offline_config());
        controller.disconnect().await;
        controller.disconnect().await;
        assert!(!controller.is_enabled());
    }

    #[tokio::test]
    async fn force_disable_blocks_connect_attempts() {
        let controller = ConnectionController::new(offline_config());
        controller.force_disable(true);
        controller.try_connect().await;
        assert!(!controller.is_enabled());

        controller.force_disable(false);
        // 엔드포인트가 없으므로 여전히 비연결이지만 시도 자체는 허용됨
        controller.try_connect().await;
        assert!(!controller.is_enabled());
    }

    #[tokio::test]
    async fn poller_spawns_only_once() {
        let controller = Arc::new(ConnectionController::new(offline_config()));
        let cancel = CancellationToken::new();
        controller.spawn_poller(cancel.clone());
        controller.spawn_poller(cancel.clone());
        assert!(controller.poller_started.load(Ordering::SeqCst));
        cancel.cancel();
    }

    #[tokio::test]
    async fn set_config_applies_to_next_attempt() {
        let controller = ConnectionController::new(offline_config());
        let mut updated = offline_config();
        updated.collector.tcp_addr = "127.0.0.1:1".to_owned();
        updated.collector.dial_timeout_ms = 50;
        controller.set_config(updated);
        // 127.0.0.1:1은 연결 거부가 즉시 오므로 조용히 실패해야 함
        controller.try_connect().await;
        assert!(!controller.is_enabled());
    }
}
