//! 로그 캡처 파이프라인 — 시퀀스 부여, 큐잉, 직렬 전달
//!
//! 모든 캡처 소스(직접 이벤트, stdout/stderr 가로채기)는 여기로
//! 모입니다. 전송이 활성 상태일 때만 라인에 전역 시퀀스 번호와
//! 타임스탬프를 부여하고, 유계 큐에 밀어 넣습니다. 큐가 가득 차면
//! 생산자는 블로킹됩니다(백프레셔).
//!
//! 전달 워커는 단 하나이며 큐를 순서대로 비우므로, 수집기는 라인을
//! 캡처 순서 그대로 받습니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use logpost_core::metrics::{
    AGENT_LINES_CAPTURED_TOTAL, AGENT_LINES_DROPPED_TOTAL, AGENT_QUEUE_DEPTH, LABEL_SOURCE,
};
use logpost_core::types::{LogLine, Packet, now_millis};

use crate::conn::ConnShared;
use crate::transport::PacketTransport;
use crate::writer::BufferedLogWriter;

/// 로그 캡처 파이프라인
///
/// 생산자 쪽 `submit`/`submit_blocking`과 소비자 쪽 전달 워커로
/// 구성됩니다. 워커는 [`arm`](Self::arm)으로 프로세스당 한 번만
/// 시작됩니다.
pub struct LogCapturePipeline {
    shared: Arc<ConnShared>,
    transport: PacketTransport,
    seq: AtomicI64,
    tx: mpsc::Sender<LogLine>,
    rx: std::sync::Mutex<Option<mpsc::Receiver<LogLine>>>,
    worker_armed: AtomicBool,
    cancel: CancellationToken,
    writer: Option<Arc<BufferedLogWriter>>,
    lines_captured: AtomicU64,
    lines_dropped: AtomicU64,
    queue_capacity: usize,
}

impl LogCapturePipeline {
    /// 파이프라인을 생성합니다. 워커는 아직 시작되지 않습니다.
    pub(crate) fn new(
        shared: Arc<ConnShared>,
        transport: PacketTransport,
        writer: Option<Arc<BufferedLogWriter>>,
        queue_capacity: usize,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity);
        Self {
            shared,
            transport,
            seq: AtomicI64::new(0),
            tx,
            rx: std::sync::Mutex::new(Some(rx)),
            worker_armed: AtomicBool::new(false),
            cancel,
            writer,
            lines_captured: AtomicU64::new(0),
            lines_dropped: AtomicU64::new(0),
            queue_capacity,
        }
    }

    /// 라인 하나를 캡처합니다 (async 컨텍스트용).
    ///
    /// 전송이 비활성 상태면 시퀀스 번호를 소비하지 않고 버립니다.
    /// 활성 상태면 시퀀스와 타임스탬프를 부여하고, 디스크 기록기에
    /// 넘긴 뒤 큐에 넣습니다. 큐가 가득 차면 자리가 날 때까지
    /// 대기합니다.
    pub async fn submit(&self, message: impl Into<String>, source: &str) {
        let Some(line) = self.stamp(message.into(), source) else {
            return;
        };
        if self.tx.send(line).await.is_err() {
            warn!("forwarding queue closed, line lost");
        }
        self.update_queue_gauge();
    }

    /// 라인 하나를 캡처합니다 (일반 스레드용).
    ///
    /// stdio 리더 스레드처럼 런타임 밖에서 호출할 때 사용합니다.
    /// 블로킹 백프레셔 동작은 [`submit`](Self::submit)과 같습니다.
    pub fn submit_blocking(&self, message: impl Into<String>, source: &str) {
        let Some(line) = self.stamp(message.into(), source) else {
            return;
        };
        if self.tx.blocking_send(line).is_err() {
            warn!("forwarding queue closed, line lost");
        }
        self.update_queue_gauge();
    }

    /// 시퀀스/타임스탬프를 부여합니다. 비활성 상태면 `None`.
    fn stamp(&self, message: String, source: &str) -> Option<LogLine> {
        if !self.shared.enabled.load(Ordering::SeqCst) {
            self.lines_dropped.fetch_add(1, Ordering::SeqCst);
            counter!(AGENT_LINES_DROPPED_TOTAL, LABEL_SOURCE => source.to_owned()).increment(1);
            return None;
        }

        let line_num = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let line = LogLine::new(line_num, now_millis(), message, source);

        if let Some(writer) = &self.writer {
            writer.write(line.clone());
        }

        self.lines_captured.fetch_add(1, Ordering::SeqCst);
        counter!(AGENT_LINES_CAPTURED_TOTAL, LABEL_SOURCE => source.to_owned()).increment(1);
        Some(line)
    }

    /// 전달 워커를 시작합니다. 프로세스당 한 번만 시작됩니다.
    ///
    /// 보통 첫 연결 성공 시 on-connect 훅에서 호출됩니다. 이후의
    /// 재연결에서는 이미 도는 워커가 그대로 쓰입니다.
    pub fn arm(&self) {
        if self.worker_armed.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut rx = self
            .rx
            .lock()
            .expect("receiver lock poisoned")
            .take()
            .expect("receiver already taken");
        let transport = self.transport.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            debug!("forwarding worker started");
            loop {
                tokio::select! {
                    line = rx.recv() => {
                        let Some(line) = line else {
                            debug!("forwarding queue closed");
                            break;
                        };
                        match Packet::log(&line) {
                            Ok(packet) => {
                                // best-effort: 실패는 카운터에만 기록됨
                                transport.send_packet(&packet).await;
                            }
                            Err(e) => {
                                warn!(line_num = line.line_num, error = %e, "log packet serialization failed");
                            }
                        }
                    }
                    _ = cancel.cancelled() => {
                        debug!("forwarding worker stopped");
                        break;
                    }
                }
            }
        });
    }

    fn update_queue_gauge(&self) {
        gauge!(AGENT_QUEUE_DEPTH).set(self.queue_depth() as f64);
    }

    /// 큐에 대기 중인 라인 수
    pub fn queue_depth(&self) -> usize {
        self.queue_capacity - self.tx.capacity()
    }

    /// 큐 용량
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// 캡처된 라인 수
    pub fn lines_captured(&self) -> u64 {
        self.lines_captured.load(Ordering::SeqCst)
    }

    /// 비활성 상태에서 버려진 라인 수
    pub fn lines_dropped(&self) -> u64 {
        self.lines_dropped.load(Ordering::SeqCst)
    }

    /// 워커 시작 여부
    pub fn is_armed(&self) -> bool {
        self.worker_armed.load(Ordering::SeqCst)
    }
}
