//! 라인 조립기 — 바이트 청크를 완성된 라인으로 변환
//!
//! 파이프에서 읽은 청크는 라인 경계와 무관하게 잘려 들어옵니다.
//! [`LineAccumulator`]는 청크를 누적하다가 개행을 만나면 라인을 방출하고,
//! 상한을 넘는 라인은 잘라서 방출한 뒤 다음 개행까지 버립니다.
//!
//! 동일한 바이트열은 어떤 단위로 쪼개 넣어도 같은 라인열을 만듭니다.

use bytes::BytesMut;

/// 기본 라인 길이 상한 (64KiB)
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// 바이트 청크 → 완성 라인 상태 기계
///
/// 상태는 두 가지입니다: 누적 중이거나, 초과분 스킵 중이거나.
/// 스킵 상태에서는 다음 개행까지의 모든 바이트를 버립니다.
#[derive(Debug)]
pub struct LineAccumulator {
    buf: BytesMut,
    max_line_length: usize,
    skipping_overlong: bool,
    overlong_count: u64,
}

impl LineAccumulator {
    /// 기본 상한(64KiB)으로 조립기를 생성합니다.
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_LENGTH)
    }

    /// 지정한 라인 길이 상한으로 조립기를 생성합니다.
    pub fn with_max_length(max_line_length: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
            max_line_length,
            skipping_overlong: false,
            overlong_count: 0,
        }
    }

    /// 청크 하나를 처리하고 완성된 라인들을 반환합니다.
    ///
    /// 반환되는 라인은 종단 개행을 포함합니다. 상한을 넘어 잘린 라인만
    /// 개행 없이 반환되며, 그 라인의 나머지 바이트는 다음 개행까지
    /// 버려집니다. 유효하지 않은 UTF-8은 대체 문자로 치환됩니다.
    pub fn process_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        for &byte in chunk {
            if self.skipping_overlong {
                if byte == b'\n' {
                    self.skipping_overlong = false;
                }
                continue;
            }

            self.buf.extend_from_slice(&[byte]);

            if byte == b'\n' {
                lines.push(String::from_utf8_lossy(&self.buf).into_owned());
                self.buf.clear();
            } else if self.buf.len() >= self.max_line_length {
                // 상한 도달: 잘린 라인을 방출하고 나머지는 버림
                lines.push(String::from_utf8_lossy(&self.buf).into_owned());
                self.buf.clear();
                self.skipping_overlong = true;
                self.overlong_count += 1;
            }
        }

        lines
    }

    /// 누적 중인 미완성 라인을 비우고 반환합니다.
    ///
    /// 스트림 종료(EOF) 시 개행 없이 끝난 마지막 라인을 회수할 때
    /// 사용합니다. 누적된 바이트가 없으면 `None`을 반환합니다.
    pub fn drain_partial(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        Some(line)
    }

    /// 누적 중인 바이트 수
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    /// 초과분 스킵 상태 여부
    pub fn is_skipping(&self) -> bool {
        self.skipping_overlong
    }

    /// 상한 초과로 잘린 라인 수
    pub fn overlong_count(&self) -> u64 {
        self.overlong_count
    }
}

impl Default for LineAccumulator {
    fn default() -> Self {
        Self::new()
    }
}
