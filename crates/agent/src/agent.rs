//! 에이전트 핸들 — 서브시스템 조립과 생명주기
//!
//! [`LogpostAgent`]는 연결 컨트롤러, 캡처 파이프라인, stdio 가로채기,
//! 디스크 기록기를 하나로 묶는 핸들입니다. [`LogpostAgentBuilder`]로
//! 생성하고 [`Service`] 생명주기로 구동합니다.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use logpost_core::config::AgentConfig;
use logpost_core::error::LogpostError;
use logpost_core::service::{HealthStatus, Service, ServiceState};

use crate::capture::LogCapturePipeline;
use crate::conn::ConnectionController;
use crate::error::AgentError;
use crate::stdio::{StdStream, StdioCapture};
use crate::transport::PacketTransport;
use crate::writer::BufferedLogWriter;

/// 큐 사용률이 이 비율을 넘으면 health가 degraded로 보고됩니다.
const QUEUE_DEGRADED_RATIO: f64 = 0.9;

/// 런타임 카운터 스냅샷
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentStats {
    pub packets_sent: u64,
    pub transport_errors: u64,
    pub lines_captured: u64,
    pub lines_dropped: u64,
    pub queue_depth: usize,
    pub enabled: bool,
    pub connected: bool,
}

/// Logpost 에이전트
///
/// 호스트 애플리케이션당 하나를 생성해 사용합니다. `start` 후에는
/// 헬스 폴러가 수집기 연결을 알아서 유지하며, 호스트는
/// [`log_event`](Self::log_event)로 이벤트를 넘기기만 하면 됩니다.
pub struct LogpostAgent {
    config: AgentConfig,
    state: ServiceState,
    controller: Arc<ConnectionController>,
    pipeline: Arc<LogCapturePipeline>,
    stdio: StdioCapture,
    writer: Option<Arc<BufferedLogWriter>>,
    cancel: CancellationToken,
}

impl LogpostAgent {
    /// 빌더를 생성합니다.
    pub fn builder(config: AgentConfig) -> LogpostAgentBuilder {
        LogpostAgentBuilder::new(config)
    }

    /// 직접 이벤트 하나를 캡처합니다.
    ///
    /// 수집기와 연결되어 있지 않으면 라인은 버려집니다 (카운터에만 기록).
    pub async fn log_event(&self, message: impl Into<String>, source: &str) {
        self.pipeline.submit(message, source).await;
    }

    /// 전송을 다시 허용합니다. 다음 폴에서 재연결이 시도됩니다.
    pub fn enable(&self) {
        self.controller.force_disable(false);
    }

    /// 전송을 중단합니다.
    ///
    /// `drop_connection`이 참이면 기존 연결을 즉시 끊고, 거짓이면
    /// 다음 헬스 폴에서 정리되도록 둡니다.
    pub async fn disable(&self, drop_connection: bool) {
        self.controller.force_disable(true);
        if drop_connection {
            self.controller.disconnect().await;
        }
    }

    /// stdout/stderr 가로채기를 수동으로 시작합니다.
    pub fn enable_stdio(&self, stream: StdStream) -> Result<(), AgentError> {
        self.stdio.enable(stream).map_err(AgentError::Capture)
    }

    /// stdout/stderr 가로채기를 해제합니다.
    pub fn disable_stdio(&self, stream: StdStream) {
        self.stdio.disable(stream);
    }

    /// 런타임 카운터 스냅샷을 반환합니다.
    pub fn stats(&self) -> AgentStats {
        AgentStats {
            packets_sent: self.controller.packets_sent(),
            transport_errors: self.controller.transport_errors(),
            lines_captured: self.pipeline.lines_captured(),
            lines_dropped: self.pipeline.lines_dropped(),
            queue_depth: self.pipeline.queue_depth(),
            enabled: self.controller.is_enabled(),
            connected: self.controller.is_connected(),
        }
    }

    /// 연결 컨트롤러 핸들
    pub fn controller(&self) -> &Arc<ConnectionController> {
        &self.controller
    }

    /// 디스크 기록기 핸들 (writer가 활성화된 경우)
    pub fn writer(&self) -> Option<&Arc<BufferedLogWriter>> {
        self.writer.as_ref()
    }

    async fn start_inner(&mut self) -> Result<(), AgentError> {
        if self.state == ServiceState::Running {
            return Err(AgentError::AlreadyRunning);
        }

        // 첫 연결 성공 시 전달 워커를 시동 (이후 재연결에서는 no-op)
        let pipeline = Arc::clone(&self.pipeline);
        self.controller.set_on_connect(move || pipeline.arm());

        self.controller.try_connect().await;
        self.controller.spawn_poller(self.cancel.clone());

        if self.config.capture.capture_stdout {
            self.stdio.enable(StdStream::Stdout)?;
        }
        if self.config.capture.capture_stderr {
            self.stdio.enable(StdStream::Stderr)?;
        }

        self.state = ServiceState::Running;
        info!(
            connected = self.controller.is_connected(),
            "logpost agent started"
        );
        Ok(())
    }

    async fn stop_inner(&mut self) -> Result<(), AgentError> {
        if self.state != ServiceState::Running {
            return Err(AgentError::NotRunning);
        }

        // 생산자부터 멈춰야 소비자가 잔여 라인을 드레인할 수 있음
        self.stdio.disable_all();
        self.cancel.cancel();

        if let Some(writer) = &self.writer {
            writer.dispose().await;
        }
        self.controller.disconnect().await;

        self.state = ServiceState::Stopped;
        info!("logpost agent stopped");
        Ok(())
    }
}

impl Service for LogpostAgent {
    fn name(&self) -> &str {
        "logpost-agent"
    }

    fn state(&self) -> ServiceState {
        self.state
    }

    async fn start(&mut self) -> Result<(), LogpostError> {
        self.start_inner().await.map_err(Into::into)
    }

    async fn stop(&mut self) -> Result<(), LogpostError> {
        self.stop_inner().await.map_err(Into::into)
    }

    async fn health_check(&self) -> HealthStatus {
        if self.state != ServiceState::Running {
            return HealthStatus::Unhealthy(format!("agent is {}", self.state));
        }

        if !self.controller.is_connected() {
            return HealthStatus::Degraded("collector not connected".to_owned());
        }

        let depth = self.pipeline.queue_depth();
        let capacity = self.pipeline.queue_capacity();
        if (depth as f64) > (capacity as f64) * QUEUE_DEGRADED_RATIO {
            return HealthStatus::Degraded(format!(
                "forwarding queue almost full ({depth}/{capacity})"
            ));
        }

        HealthStatus::Healthy
    }
}

/// [`LogpostAgent`] 빌더
///
/// 설정 검증은 `build()`에서 수행됩니다.
pub struct LogpostAgentBuilder {
    config: AgentConfig,
    writer_path: Option<String>,
    queue_capacity: Option<usize>,
}

impl LogpostAgentBuilder {
    /// 주어진 설정으로 빌더를 생성합니다.
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            writer_path: None,
            queue_capacity: None,
        }
    }

    /// 실행 모드 기본 설정으로 빌더를 생성합니다.
    pub fn for_mode(dev: bool) -> Self {
        Self::new(AgentConfig::for_mode(dev))
    }

    /// 디스크 기록 파일 경로를 덮어씁니다.
    pub fn writer_path(mut self, path: impl Into<String>) -> Self {
        self.writer_path = Some(path.into());
        self
    }

    /// 전달 큐 용량을 덮어씁니다.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// 설정을 검증하고 에이전트를 조립합니다.
    ///
    /// writer가 활성화되어 있으면 기록 파일을 열고 플러시 태스크를
    /// 시작합니다. 연결은 아직 시도하지 않습니다.
    pub async fn build(self) -> Result<LogpostAgent, AgentError> {
        let mut config = self.config;
        if let Some(path) = self.writer_path {
            config.writer.path = path;
        }
        if let Some(capacity) = self.queue_capacity {
            config.capture.queue_capacity = capacity;
        }
        config.validate().map_err(|e| match e {
            LogpostError::Config(e) => AgentError::Config(e),
            other => AgentError::Channel(other.to_string()),
        })?;

        let writer = if config.writer.enabled {
            Some(BufferedLogWriter::create(&config.writer.path, config.writer.flush_interval_ms).await?)
        } else {
            None
        };

        let cancel = CancellationToken::new();
        let controller = Arc::new(ConnectionController::new(config.clone()));
        let transport = PacketTransport::new(controller.shared());
        let pipeline = Arc::new(LogCapturePipeline::new(
            controller.shared(),
            transport,
            writer.clone(),
            config.capture.queue_capacity,
            cancel.clone(),
        ));
        let stdio = StdioCapture::new(Arc::clone(&pipeline), config.capture.max_line_length);

        debug!(
            queue_capacity = config.capture.queue_capacity,
            writer_enabled = config.writer.enabled,
            "logpost agent built"
        );
        Ok(LogpostAgent {
            config,
            state: ServiceState::Created,
            controller,
            pipeline,
            stdio,
            writer,
            cancel,
        })
    }
}
