//! Logpost 공통 크레이트 — 타입, trait, 에러, 설정
//!
//! 에이전트 런타임(`logpost-agent`)과 임베딩 애플리케이션이 공유하는
//! 도메인 타입과 공통 인프라를 정의합니다.
//!
//! # 모듈 구성
//!
//! - [`types`]: [`LogLine`], [`Packet`] 등 데이터 플레인의 기본 단위
//! - [`config`]: logpost.toml 파싱, 환경변수 오버라이드, 개발/운영 모드 기본값
//! - [`error`]: 도메인별 에러 타입
//! - [`service`]: 생명주기 trait ([`Service`]) 및 헬스 상태
//! - [`metrics`]: Prometheus 메트릭 이름 상수

pub mod config;
pub mod error;
pub mod metrics;
pub mod service;
pub mod types;

// --- 주요 타입 re-export ---
// 각 모듈의 핵심 타입을 크레이트 루트에서 바로 사용할 수 있도록 합니다.

// 에러
pub use error::{CaptureError, ConfigError, LogpostError, RecordError, ServiceError};

// 설정
pub use config::{AgentConfig, Endpoint};

// 서비스 trait
pub use service::{HealthStatus, Service, ServiceState};

// 도메인 타입
pub use types::{LogLine, Packet, SessionInfo};
