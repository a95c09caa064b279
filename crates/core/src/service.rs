//! 서비스 trait — 런타임 컴포넌트 생명주기 정의
//!
//! # 생명주기
//! ```text
//! Created → start() → Running → stop() → Stopped
//! ```

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::LogpostError;

/// 서비스 생명주기 상태
///
/// 상태 전환:
/// - `Created` → `start()` → `Running`
/// - `Running` → `stop()` → `Stopped`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceState {
    /// 생성됨 (start 전)
    Created,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// 서비스 건강 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 기능 저하 (이유 포함)
    Degraded(String),
    /// 비정상 (이유 포함)
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 여부
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 기능 저하 여부
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }

    /// 비정상 여부
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// 런타임 컴포넌트가 구현하는 생명주기 trait
///
/// # 구현 예시
/// ```ignore
/// impl Service for MyAgent {
///     fn name(&self) -> &str { "my-agent" }
///
///     async fn start(&mut self) -> Result<(), LogpostError> {
///         // 백그라운드 태스크 스폰
///         Ok(())
///     }
///     async fn stop(&mut self) -> Result<(), LogpostError> {
///         // 취소 토큰 발화 + 드레인
///         Ok(())
///     }
///     async fn health_check(&self) -> HealthStatus {
///         HealthStatus::Healthy
///     }
/// }
/// ```
pub trait Service: Send + Sync {
    /// 서비스 이름
    fn name(&self) -> &str;

    /// 현재 서비스 상태를 반환합니다.
    fn state(&self) -> ServiceState;

    /// 서비스를 시작합니다.
    ///
    /// `Created` 상태에서만 호출 가능합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), LogpostError>> + Send;

    /// 서비스를 정지합니다.
    ///
    /// `Running` 상태에서만 호출 가능합니다.
    /// Graceful shutdown을 수행합니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), LogpostError>> + Send;

    /// 서비스의 건강 상태를 확인합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}
