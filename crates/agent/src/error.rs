//! 에이전트 에러 타입
//!
//! [`AgentError`]는 에이전트 런타임 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<AgentError> for LogpostError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use logpost_core::error::{CaptureError, ConfigError, LogpostError, RecordError, ServiceError};

/// 에이전트 도메인 에러
///
/// 설정, 스트림 가로채기, 레코드 디코딩, 채널 통신, 생명주기 등
/// 런타임 내부의 모든 에러 상황을 포괄합니다. 패킷 전송 실패는
/// 에러가 아니라 카운터로 기록됩니다.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// 설정 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 스트림 가로채기 에러
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    /// 영속 레코드 디코딩 에러
    #[error("record error: {0}")]
    Record(#[from] RecordError),

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// 이미 실행 중인 에이전트를 다시 시작하려 함
    #[error("agent already running")]
    AlreadyRunning,

    /// 실행 중이 아닌 에이전트를 정지하려 함
    #[error("agent not running")]
    NotRunning,

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<AgentError> for LogpostError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Config(e) => LogpostError::Config(e),
            AgentError::Capture(e) => LogpostError::Capture(e),
            AgentError::Record(e) => LogpostError::Record(e),
            AgentError::Io(e) => LogpostError::Io(e),
            AgentError::AlreadyRunning => LogpostError::Service(ServiceError::AlreadyRunning),
            AgentError::NotRunning => LogpostError::Service(ServiceError::NotRunning),
            other => LogpostError::Service(ServiceError::InitFailed(other.to_string())),
        }
    }
}
