//! 도메인 타입 — 데이터 플레인의 기본 단위
//!
//! [`LogLine`]은 캡처된 로그 한 줄을, [`Packet`]은 전송로를 타는
//! 타입 지정 봉투를 나타냅니다. 두 타입 모두 생성 이후 불변입니다.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::RecordError;

// --- 패킷 타입 상수 ---

/// 로그 패킷 타입
pub const PACKET_TYPE_LOG: &str = "log";
/// 세션 식별(hello) 패킷 타입
pub const PACKET_TYPE_HELLO: &str = "hello";

/// 시퀀스 번호와 타임스탬프가 부여된 로그 한 줄
///
/// `line_num`은 프로세스 전역 단조 증가 카운터에서 캡처 시점에 할당되며,
/// 시스템 전체의 순서 기준이 됩니다. 캡처 파이프라인이 생성하고
/// 전송/영속화 경로가 읽기만 합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    /// 전역 시퀀스 번호 (1부터 시작, 단조 증가)
    pub line_num: i64,
    /// 캡처 시각 (Unix epoch, 밀리초)
    pub timestamp_millis: i64,
    /// 로그 메시지 (종단 개행 제외)
    pub message: String,
    /// 캡처 소스 식별자 (예: "stdout", "stderr", "app")
    pub source: String,
}

impl LogLine {
    /// 새 로그 라인을 생성합니다.
    pub fn new(
        line_num: i64,
        timestamp_millis: i64,
        message: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            line_num,
            timestamp_millis,
            message: message.into(),
            source: source.into(),
        }
    }

    /// 디스크 영속 형식 한 레코드로 인코딩합니다.
    ///
    /// 형식: `"<line_num> <timestamp_millis>:<message>\n"`.
    /// 메시지가 이미 개행으로 끝나면 개행을 추가하지 않습니다.
    pub fn encode_record(&self) -> String {
        let mut record = format!("{} {}:{}", self.line_num, self.timestamp_millis, self.message);
        if !record.ends_with('\n') {
            record.push('\n');
        }
        record
    }

    /// 디스크 영속 레코드 한 줄을 디코딩합니다.
    ///
    /// 첫 번째 `:`를 기준으로 `"<line_num> <timestamp_millis>"` 프리픽스와
    /// 메시지를 분리하고, 두 정수를 엄격하게 파싱합니다.
    /// 디스크 레코드는 소스 정보를 담지 않으므로 `source`는 빈 문자열입니다.
    pub fn decode_record(line: &str) -> Result<Self, RecordError> {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let (prefix, message) = line.split_once(':').ok_or(RecordError::MissingSeparator)?;

        let fields: Vec<&str> = prefix.split_whitespace().collect();
        if fields.len() != 2 {
            return Err(RecordError::FieldCount {
                found: fields.len(),
            });
        }

        let line_num = fields[0]
            .parse::<i64>()
            .map_err(|_| RecordError::InvalidNumber {
                field: "line_num",
                value: fields[0].to_owned(),
            })?;
        let timestamp_millis =
            fields[1]
                .parse::<i64>()
                .map_err(|_| RecordError::InvalidNumber {
                    field: "timestamp_millis",
                    value: fields[1].to_owned(),
                })?;

        Ok(Self {
            line_num,
            timestamp_millis,
            message: message.to_owned(),
            source: String::new(),
        })
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LogLine[{}] source={} message={}",
            self.line_num, self.source, self.message,
        )
    }
}

/// 전송로를 타는 타입 지정 봉투
///
/// 어떤 페이로드든 담을 수 있으며, 전송 직전에 생성되어 직렬화 후
/// 버려집니다. 와이어 형식은 개행으로 구분된 self-describing JSON입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Packet {
    /// 패킷 타입 (예: "log", "hello")
    #[serde(rename = "type")]
    pub kind: String,
    /// 페이로드
    pub data: serde_json::Value,
}

impl Packet {
    /// 임의 페이로드를 담은 패킷을 생성합니다.
    pub fn new(
        kind: impl Into<String>,
        data: &impl Serialize,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            kind: kind.into(),
            data: serde_json::to_value(data)?,
        })
    }

    /// 로그 라인 패킷을 생성합니다.
    pub fn log(line: &LogLine) -> Result<Self, serde_json::Error> {
        Self::new(PACKET_TYPE_LOG, line)
    }

    /// 세션 hello 패킷을 생성합니다.
    pub fn hello(session: &SessionInfo) -> Result<Self, serde_json::Error> {
        Self::new(PACKET_TYPE_HELLO, session)
    }

    /// 와이어 형식(JSON + 개행 종단자)으로 직렬화합니다.
    pub fn to_wire(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut bytes = serde_json::to_vec(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

/// 연결 시 수집기에 전달하는 세션 식별 정보
///
/// 수집기가 링크를 에이전트 인스턴스에 귀속시킬 수 있도록
/// 매 연결 성공 직후 hello 패킷으로 전송됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    /// 세션 고유 ID (UUID v4)
    pub session_id: String,
    /// 에이전트 프로세스 PID
    pub pid: u32,
    /// 에이전트 버전
    pub agent_version: String,
    /// 에이전트 시작 시각 (Unix epoch, 밀리초)
    pub started_at_millis: i64,
}

impl SessionInfo {
    /// 현재 프로세스에 대한 세션 정보를 생성합니다.
    pub fn current() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            pid: std::process::id(),
            agent_version: env!("CARGO_PKG_VERSION").to_owned(),
            started_at_millis: now_millis(),
        }
    }
}

/// 현재 시각을 Unix epoch 밀리초로 반환합니다.
pub fn now_millis() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => i64::try_from(duration.as_millis()).unwrap_or(i64::MAX),
        Err(_) => 0,
    }
}
