//! 설정 관리 — logpost.toml 파싱 및 런타임 설정
//!
//! [`AgentConfig`]는 에이전트의 모든 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. 환경변수 (`LOGPOST_COLLECTOR_TCP_ADDR=127.0.0.1:7601` 형식)
//! 2. 설정 파일 (`logpost.toml`)
//! 3. 기본값 (`Default` 구현 또는 [`AgentConfig::for_mode`])
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), logpost_core::error::LogpostError> {
//! use logpost_core::config::AgentConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = AgentConfig::load("logpost.toml").await?;
//!
//! // 개발 모드 기본값 사용
//! let config = AgentConfig::for_mode(true);
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, LogpostError};

/// 수집기 비활성화 센티널 값
///
/// 설정 파일 경계에서만 사용됩니다. 파싱 직후 [`Endpoint::Disabled`]로
/// 변환되며 런타임 코드는 이 문자열을 비교하지 않습니다.
pub const DISABLED_SENTINEL: &str = "-";

/// 수집기 연결 대상
///
/// 설정 파일의 문자열 값을 타입 수준으로 끌어올린 표현입니다.
/// `"-"` 센티널은 [`Endpoint::Disabled`]가 됩니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// 이 전송 경로를 사용하지 않음
    Disabled,
    /// Unix 도메인 소켓 경로
    Path(PathBuf),
    /// TCP 주소 (`host:port`)
    Addr(String),
}

impl Endpoint {
    /// 소켓 경로 설정 값에서 Endpoint를 생성합니다.
    pub fn from_path_value(value: &str) -> Self {
        if value == DISABLED_SENTINEL || value.is_empty() {
            Self::Disabled
        } else {
            Self::Path(PathBuf::from(value))
        }
    }

    /// TCP 주소 설정 값에서 Endpoint를 생성합니다.
    pub fn from_addr_value(value: &str) -> Self {
        if value == DISABLED_SENTINEL || value.is_empty() {
            Self::Disabled
        } else {
            Self::Addr(value.to_owned())
        }
    }

    /// 비활성화 여부
    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled)
    }
}

/// Logpost 에이전트 통합 설정
///
/// `logpost.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 서브시스템은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 수집기 연결 설정
    #[serde(default)]
    pub collector: CollectorConfig,
    /// 로그 캡처 설정
    #[serde(default)]
    pub capture: CaptureConfig,
    /// 디스크 기록 설정
    #[serde(default)]
    pub writer: WriterConfig,
}

impl AgentConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LogpostError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, LogpostError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LogpostError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                LogpostError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, LogpostError> {
        toml::from_str(toml_str).map_err(|e| {
            LogpostError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 실행 모드에 맞는 기본 설정을 생성합니다.
    ///
    /// 운영 모드와 개발 모드는 소켓 경로와 TCP 포트만 다릅니다.
    /// 두 모드의 에이전트가 한 호스트에서 동시에 돌아도 서로의
    /// 수집기에 연결되지 않습니다.
    pub fn for_mode(dev: bool) -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_owned());
        let mut config = Self::default();
        if dev {
            config.collector.socket_path = format!("{home}/.logpost-dev/collector.sock");
            config.collector.tcp_addr = "127.0.0.1:7611".to_owned();
        } else {
            config.collector.socket_path = format!("{home}/.logpost/collector.sock");
            config.collector.tcp_addr = "127.0.0.1:7601".to_owned();
        }
        config.writer.path = format!("{home}/.logpost/agent.log");
        config
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `LOGPOST_{SECTION}_{FIELD}`
    /// 예: `LOGPOST_COLLECTOR_TCP_ADDR=127.0.0.1:7601`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "LOGPOST_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LOGPOST_GENERAL_LOG_FORMAT");

        // Collector
        override_string(
            &mut self.collector.socket_path,
            "LOGPOST_COLLECTOR_SOCKET_PATH",
        );
        override_string(&mut self.collector.tcp_addr, "LOGPOST_COLLECTOR_TCP_ADDR");
        override_u64(
            &mut self.collector.dial_timeout_ms,
            "LOGPOST_COLLECTOR_DIAL_TIMEOUT_MS",
        );
        override_u64(
            &mut self.collector.poll_interval_ms,
            "LOGPOST_COLLECTOR_POLL_INTERVAL_MS",
        );
        override_u64(
            &mut self.collector.disconnect_grace_ms,
            "LOGPOST_COLLECTOR_DISCONNECT_GRACE_MS",
        );

        // Capture
        override_usize(
            &mut self.capture.queue_capacity,
            "LOGPOST_CAPTURE_QUEUE_CAPACITY",
        );
        override_usize(
            &mut self.capture.max_line_length,
            "LOGPOST_CAPTURE_MAX_LINE_LENGTH",
        );
        override_bool(
            &mut self.capture.capture_stdout,
            "LOGPOST_CAPTURE_CAPTURE_STDOUT",
        );
        override_bool(
            &mut self.capture.capture_stderr,
            "LOGPOST_CAPTURE_CAPTURE_STDERR",
        );

        // Writer
        override_bool(&mut self.writer.enabled, "LOGPOST_WRITER_ENABLED");
        override_string(&mut self.writer.path, "LOGPOST_WRITER_PATH");
        override_u64(
            &mut self.writer.flush_interval_ms,
            "LOGPOST_WRITER_FLUSH_INTERVAL_MS",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LogpostError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        // 두 전송 경로가 모두 비활성화된 설정도 유효함 (에이전트는
        // 연결 없이 동작할 수 있음). 활성화된 값만 형식을 검증합니다.
        if let Endpoint::Path(path) = self.collector.socket_endpoint()
            && !path.is_absolute()
        {
            return Err(ConfigError::InvalidValue {
                field: "collector.socket_path".to_owned(),
                reason: "must be an absolute path".to_owned(),
            }
            .into());
        }

        if let Endpoint::Addr(addr) = self.collector.tcp_endpoint()
            && addr.parse::<std::net::SocketAddr>().is_err()
        {
            return Err(ConfigError::InvalidValue {
                field: "collector.tcp_addr".to_owned(),
                reason: format!("'{addr}' is not a valid socket address"),
            }
            .into());
        }

        if self.collector.dial_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "collector.dial_timeout_ms".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.collector.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "collector.poll_interval_ms".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.capture.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "capture.queue_capacity".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.capture.max_line_length == 0 {
            return Err(ConfigError::InvalidValue {
                field: "capture.max_line_length".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.writer.enabled {
            if self.writer.path.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "writer.path".to_owned(),
                    reason: "must not be empty when writer is enabled".to_owned(),
                }
                .into());
            }

            if self.writer.flush_interval_ms == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "writer.flush_interval_ms".to_owned(),
                    reason: "must be greater than 0".to_owned(),
                }
                .into());
            }
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 수집기 연결 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Unix 도메인 소켓 경로 (`"-"`이면 비활성화)
    pub socket_path: String,
    /// TCP 폴백 주소 (`"-"`이면 비활성화)
    pub tcp_addr: String,
    /// 연결 시도 타임아웃 (밀리초)
    pub dial_timeout_ms: u64,
    /// 헬스 폴러 주기 (밀리초)
    pub poll_interval_ms: u64,
    /// 연결 해제 전 유예 시간 (밀리초)
    pub disconnect_grace_ms: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            socket_path: DISABLED_SENTINEL.to_owned(),
            tcp_addr: "127.0.0.1:7601".to_owned(),
            dial_timeout_ms: 2_000,
            poll_interval_ms: 1_000,
            disconnect_grace_ms: 100,
        }
    }
}

impl CollectorConfig {
    /// Unix 소켓 설정 값을 [`Endpoint`]로 변환합니다.
    pub fn socket_endpoint(&self) -> Endpoint {
        Endpoint::from_path_value(&self.socket_path)
    }

    /// TCP 주소 설정 값을 [`Endpoint`]로 변환합니다.
    pub fn tcp_endpoint(&self) -> Endpoint {
        Endpoint::from_addr_value(&self.tcp_addr)
    }
}

/// 로그 캡처 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// 전달 큐 용량 (라인 수)
    pub queue_capacity: usize,
    /// 라인 최대 길이 (바이트, 초과분은 잘림)
    pub max_line_length: usize,
    /// stdout 캡처 여부
    pub capture_stdout: bool,
    /// stderr 캡처 여부
    pub capture_stderr: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 2_000,
            max_line_length: 64 * 1024, // 64KiB
            capture_stdout: true,
            capture_stderr: true,
        }
    }
}

/// 디스크 기록 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// append 전용 로그 파일 경로
    pub path: String,
    /// 플러시 주기 (밀리초)
    pub flush_interval_ms: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/tmp/logpost-agent.log".to_owned(),
            flush_interval_ms: 1_000,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = AgentConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.collector.dial_timeout_ms, 2_000);
        assert_eq!(config.collector.poll_interval_ms, 1_000);
        assert_eq!(config.collector.disconnect_grace_ms, 100);
        assert_eq!(config.capture.queue_capacity, 2_000);
        assert_eq!(config.capture.max_line_length, 64 * 1024);
        assert!(config.writer.enabled);
    }

    #[test]
    fn default_config_passes_validation() {
        let config = AgentConfig::default();
        config.validate().unwrap();
    }

    #[test]
    fn for_mode_dev_and_prod_never_collide() {
        let prod = AgentConfig::for_mode(false);
        let dev = AgentConfig::for_mode(true);
        assert_ne!(prod.collector.socket_path, dev.collector.socket_path);
        assert_ne!(prod.collector.tcp_addr, dev.collector.tcp_addr);
        prod.validate().unwrap();
        dev.validate().unwrap();
    }

    #[test]
    fn endpoint_sentinel_maps_to_disabled() {
        assert_eq!(Endpoint::from_path_value("-"), Endpoint::Disabled);
        assert_eq!(Endpoint::from_addr_value("-"), Endpoint::Disabled);
        assert_eq!(Endpoint::from_path_value(""), Endpoint::Disabled);
        assert_eq!(
            Endpoint::from_path_value("/tmp/collector.sock"),
            Endpoint::Path(PathBuf::from("/tmp/collector.sock"))
        );
        assert_eq!(
            Endpoint::from_addr_value("127.0.0.1:7601"),
            Endpoint::Addr("127.0.0.1:7601".to_owned())
        );
    }

    #[test]
    fn from_str_empty_toml_uses_defaults() {
        let config = AgentConfig::parse("").unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.capture.queue_capacity, 2_000);
    }

    #[test]
    fn from_str_partial_toml_merges_with_defaults() {
        let toml = r#"
[general]
log_level = "debug"

[collector]
tcp_addr = "127.0.0.1:9999"
"#;
        let config = AgentConfig::parse(toml).unwrap();
        assert_eq!(config.general.log_level, "debug");
        // log_format은 기본값 유지
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.collector.tcp_addr, "127.0.0.1:9999");
        assert_eq!(config.collector.dial_timeout_ms, 2_000);
    }

    #[test]
    fn from_str_full_toml() {
        let toml = r#"
[general]
log_level = "warn"
log_format = "pretty"

[collector]
socket_path = "/run/logpost/collector.sock"
tcp_addr = "127.0.0.1:7601"
dial_timeout_ms = 3000
poll_interval_ms = 500
disconnect_grace_ms = 50

[capture]
queue_capacity = 4000
max_line_length = 32768
capture_stdout = true
capture_stderr = false

[writer]
enabled = true
path = "/var/log/logpost/agent.log"
flush_interval_ms = 2000
"#;
        let config = AgentConfig::parse(toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.general.log_format, "pretty");
        assert_eq!(
            config.collector.socket_endpoint(),
            Endpoint::Path(PathBuf::from("/run/logpost/collector.sock"))
        );
        assert_eq!(config.capture.queue_capacity, 4000);
        assert!(!config.capture.capture_stderr);
        assert_eq!(config.writer.flush_interval_ms, 2000);
    }

    #[test]
    fn from_str_invalid_toml_returns_error() {
        let result = AgentConfig::parse("invalid = [[[toml");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(
            err,
            LogpostError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = AgentConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_relative_socket_path() {
        let mut config = AgentConfig::default();
        config.collector.socket_path = "relative/collector.sock".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("socket_path"));
    }

    #[test]
    fn validate_rejects_malformed_tcp_addr() {
        let mut config = AgentConfig::default();
        config.collector.tcp_addr = "not-an-addr".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("tcp_addr"));
    }

    #[test]
    fn validate_accepts_both_endpoints_disabled() {
        let mut config = AgentConfig::default();
        config.collector.socket_path = DISABLED_SENTINEL.to_owned();
        config.collector.tcp_addr = DISABLED_SENTINEL.to_owned();
        // 연결 없이 동작하는 구성도 유효함
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_zero_queue_capacity() {
        let mut config = AgentConfig::default();
        config.capture.queue_capacity = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("queue_capacity"));
    }

    #[test]
    fn validate_skips_writer_path_when_disabled() {
        let mut config = AgentConfig::default();
        config.writer.enabled = false;
        config.writer.path = String::new();
        config.validate().unwrap();
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = AgentConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = AgentConfig::parse(&toml_str).unwrap();
        assert_eq!(config.general.log_level, parsed.general.log_level);
        assert_eq!(config.collector.tcp_addr, parsed.collector.tcp_addr);
        assert_eq!(config.capture.queue_capacity, parsed.capture.queue_capacity);
    }

    #[test]
    #[serial_test::serial]
    fn env_override_collector_fields() {
        // SAFETY: serial 테스트 안에서만 환경변수를 조작합니다.
        unsafe {
            std::env::set_var("LOGPOST_COLLECTOR_TCP_ADDR", "127.0.0.1:7611");
            std::env::set_var("LOGPOST_COLLECTOR_DIAL_TIMEOUT_MS", "500");
        }
        let mut config = AgentConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.collector.tcp_addr, "127.0.0.1:7611");
        assert_eq!(config.collector.dial_timeout_ms, 500);
        unsafe {
            std::env::remove_var("LOGPOST_COLLECTOR_TCP_ADDR");
            std::env::remove_var("LOGPOST_COLLECTOR_DIAL_TIMEOUT_MS");
        }
    }

    #[test]
    #[serial_test::serial]
    fn env_override_invalid_number_keeps_original() {
        // SAFETY: serial 테스트 안에서만 환경변수를 조작합니다.
        unsafe { std::env::set_var("LOGPOST_CAPTURE_QUEUE_CAPACITY", "lots") };
        let mut config = AgentConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.capture.queue_capacity, 2_000); // 원래 값 유지
        unsafe { std::env::remove_var("LOGPOST_CAPTURE_QUEUE_CAPACITY") };
    }

    #[test]
    fn env_override_missing_var_keeps_original() {
        let mut val = "original".to_owned();
        override_string(&mut val, "LOGPOST_TEST_NONEXISTENT_12345");
        assert_eq!(val, "original");
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let result = AgentConfig::from_file("/nonexistent/path/logpost.toml").await;
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(
            err,
            LogpostError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
