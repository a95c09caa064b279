//! 에러 타입 — 도메인별 에러 정의

/// Logpost 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum LogpostError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 스트림 캡처 에러
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    /// 영속 레코드 디코딩 에러
    #[error("record error: {0}")]
    Record(#[from] RecordError),

    /// 서비스 생명주기 에러
    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 스트림 캡처 에러
///
/// 표준 출력 리다이렉션(pipe/dup2) 단계에서만 발생합니다.
/// 캡처 핫 패스의 실패는 에러로 전파되지 않고 카운터로만 기록됩니다.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// 스트림 리다이렉션 실패
    #[error("failed to redirect {stream}: {reason}")]
    Redirect { stream: String, reason: String },
}

/// 영속 로그 레코드 디코딩 에러
///
/// `"<line_num> <timestamp_millis>:<message>"` 형식을 벗어난 레코드에 대해
/// 반환됩니다. 호출자에게 그대로 전달되며, 다른 레코드 읽기를 중단시키지 않습니다.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RecordError {
    /// ':' 구분자 없음
    #[error("missing ':' separator in record")]
    MissingSeparator,

    /// 숫자 프리픽스 필드 수 불일치
    #[error("expected 2 prefix fields, found {found}")]
    FieldCount { found: usize },

    /// 숫자 파싱 실패
    #[error("invalid number in field '{field}': {value}")]
    InvalidNumber { field: &'static str, value: String },
}

/// 서비스 생명주기 에러
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// 이미 실행 중인 서비스를 다시 시작하려 함
    #[error("service already running")]
    AlreadyRunning,

    /// 실행 중이 아닌 서비스를 정지하려 함
    #[error("service not running")]
    NotRunning,

    /// 초기화 실패
    #[error("service init failed: {0}")]
    InitFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_error_display() {
        let err = RecordError::InvalidNumber {
            field: "line_num",
            value: "abc".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("line_num"));
        assert!(msg.contains("abc"));
    }

    #[test]
    fn config_error_converts_to_logpost_error() {
        let err = ConfigError::InvalidValue {
            field: "capture.queue_capacity".to_owned(),
            reason: "must be greater than 0".to_owned(),
        };
        let top: LogpostError = err.into();
        assert!(matches!(top, LogpostError::Config(_)));
        assert!(top.to_string().contains("queue_capacity"));
    }

    #[test]
    fn capture_error_display() {
        let err = CaptureError::Redirect {
            stream: "stdout".to_owned(),
            reason: "pipe failed".to_owned(),
        };
        assert!(err.to_string().contains("stdout"));
    }
}
