//! Logpost 에이전트 런타임
//!
//! 개발 중인 애플리케이션에 임베드되어 로그를 캡처하고, 로컬 수집기로
//! 전달하며, 크래시에 대비해 디스크에 영속화하는 런타임입니다.
//!
//! # 모듈 구성
//!
//! - [`conn`]: 수집기 연결 상태 기계 (unix socket → TCP 폴백, 헬스 폴러)
//! - [`transport`]: 개행 구분 JSON 패킷 전송 (best-effort)
//! - [`capture`]: 로그 캡처 파이프라인 (직접 이벤트 + 전달 워커)
//! - [`stdio`]: stdout/stderr 가로채기 (pipe + dup2 tee)
//! - [`accum`]: 바이트 청크 → 완성 라인 상태 기계
//! - [`writer`]: 크래시 안전 버퍼드 디스크 기록
//! - [`agent`]: 전체를 묶는 [`LogpostAgent`] 핸들 및 빌더
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! stdout/stderr ─┐
//!                ├─> LineAccumulator ─> LogCapturePipeline ─> queue ─> worker ─> PacketTransport ─> collector
//! log_event() ───┘                           |
//!                                            └─> BufferedLogWriter ─> append-only file
//! ```

pub mod accum;
pub mod agent;
pub mod capture;
pub mod conn;
pub mod error;
pub mod stdio;
pub mod transport;
pub mod writer;

// --- 주요 타입 re-export ---

// 에이전트 핸들
pub use agent::{AgentStats, LogpostAgent, LogpostAgentBuilder};

// 연결 제어
pub use conn::ConnectionController;

// 전송
pub use transport::PacketTransport;

// 캡처
pub use capture::LogCapturePipeline;

// 라인 조립
pub use accum::LineAccumulator;

// stdio 가로채기
pub use stdio::{StdStream, StdioCapture};

// 디스크 기록
pub use writer::{BufferedLogWriter, read_log_file};

// 에러
pub use error::AgentError;
