//! 메트릭 상수 및 설명 등록
//!
//! 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `logpost_`
//! - 서브시스템: `agent_`, `writer_`
//! - 접미어: `_total` (counter), `_seconds` (histogram), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(logpost_core::metrics::AGENT_LINES_CAPTURED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 로그 소스 레이블 키 (stdout, stderr, app 등)
pub const LABEL_SOURCE: &str = "source";

// ─── Agent 메트릭 ───────────────────────────────────────────────────

/// Agent: 캡처된 로그 라인 수 (counter)
pub const AGENT_LINES_CAPTURED_TOTAL: &str = "logpost_agent_lines_captured_total";

/// Agent: 비활성 상태에서 버려진 라인 수 (counter)
pub const AGENT_LINES_DROPPED_TOTAL: &str = "logpost_agent_lines_dropped_total";

/// Agent: 수집기로 전송된 패킷 수 (counter)
pub const AGENT_PACKETS_SENT_TOTAL: &str = "logpost_agent_packets_sent_total";

/// Agent: 전송 실패 수 (counter)
pub const AGENT_TRANSPORT_ERRORS_TOTAL: &str = "logpost_agent_transport_errors_total";

/// Agent: 수집기 재연결 수 (counter)
pub const AGENT_RECONNECTS_TOTAL: &str = "logpost_agent_reconnects_total";

/// Agent: 전달 큐 내 라인 수 (gauge)
pub const AGENT_QUEUE_DEPTH: &str = "logpost_agent_queue_depth";

// ─── Writer 메트릭 ──────────────────────────────────────────────────

/// Writer: 플러시 실행 수 (counter)
pub const WRITER_FLUSHES_TOTAL: &str = "logpost_writer_flushes_total";

/// Writer: 디스크에 영속화된 라인 수 (counter)
pub const WRITER_LINES_PERSISTED_TOTAL: &str = "logpost_writer_lines_persisted_total";

/// Writer: 플러시 소요 시간 (histogram, 초)
pub const WRITER_FLUSH_DURATION_SECONDS: &str = "logpost_writer_flush_duration_seconds";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// `metrics::describe_counter!()`, `describe_gauge!()`, `describe_histogram!()`을
/// 호출하여 HELP 텍스트를 설정합니다.
///
/// 이 함수는 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 레코더 설치는 호스트 애플리케이션의 몫입니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Agent
    describe_counter!(
        AGENT_LINES_CAPTURED_TOTAL,
        "Total number of log lines captured from all sources"
    );
    describe_counter!(
        AGENT_LINES_DROPPED_TOTAL,
        "Total number of log lines dropped while capture was disabled"
    );
    describe_counter!(
        AGENT_PACKETS_SENT_TOTAL,
        "Total number of packets successfully written to the collector"
    );
    describe_counter!(
        AGENT_TRANSPORT_ERRORS_TOTAL,
        "Total number of failed packet writes to the collector"
    );
    describe_counter!(
        AGENT_RECONNECTS_TOTAL,
        "Total number of successful collector connections"
    );
    describe_gauge!(
        AGENT_QUEUE_DEPTH,
        "Current number of log lines waiting in the forwarding queue"
    );

    // Writer
    describe_counter!(WRITER_FLUSHES_TOTAL, "Total number of disk flush batches");
    describe_counter!(
        WRITER_LINES_PERSISTED_TOTAL,
        "Total number of log lines persisted to the local log file"
    );
    describe_histogram!(
        WRITER_FLUSH_DURATION_SECONDS,
        "Time to flush one batch to disk in seconds"
    );
}
