//! stdout/stderr 가로채기 — pipe + dup2 tee
//!
//! 대상 fd를 파이프의 쓰기 끝으로 바꿔치기하고, 원본 fd의 복제본으로
//! 출력을 그대로 흘려보냅니다(tee). 호스트 애플리케이션의 출력은
//! 항상 원래 목적지에 먼저 도달하고, 그 다음에 캡처 파이프라인으로
//! 들어갑니다.
//!
//! 리더는 스트림당 하나의 전용 스레드입니다. [`disable`]이 원본 fd를
//! 복원하면 파이프 쓰기 끝이 닫혀 리더가 EOF를 받고, 남은 미완성
//! 라인을 드레인한 뒤 종료합니다.
//!
//! [`disable`]: StdioCapture::disable

use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{FromRawFd, RawFd};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use logpost_core::error::CaptureError;

use crate::accum::LineAccumulator;
use crate::capture::LogCapturePipeline;

const READ_CHUNK_SIZE: usize = 8192;

/// 가로챌 표준 스트림
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdStream {
    Stdout,
    Stderr,
}

impl StdStream {
    /// 대상 fd 번호
    fn raw_fd(self) -> RawFd {
        match self {
            Self::Stdout => libc::STDOUT_FILENO,
            Self::Stderr => libc::STDERR_FILENO,
        }
    }

    /// 캡처 소스 이름
    pub fn name(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }

    fn slot(self) -> usize {
        match self {
            Self::Stdout => 0,
            Self::Stderr => 1,
        }
    }
}

/// 활성화된 리다이렉션 하나의 상태
struct ActiveRedirect {
    saved_fd: RawFd,
    reader: Option<std::thread::JoinHandle<()>>,
}

/// stdout/stderr 가로채기 관리자
///
/// 스트림별로 독립적으로 활성화/비활성화할 수 있으며 두 동작 모두
/// 멱등합니다.
pub struct StdioCapture {
    pipeline: Arc<LogCapturePipeline>,
    max_line_length: usize,
    active: std::sync::Mutex<[Option<ActiveRedirect>; 2]>,
}

impl StdioCapture {
    pub(crate) fn new(pipeline: Arc<LogCapturePipeline>, max_line_length: usize) -> Self {
        Self {
            pipeline,
            max_line_length,
            active: std::sync::Mutex::new([None, None]),
        }
    }

    /// 스트림 가로채기를 시작합니다. 이미 활성 상태면 아무것도 하지 않습니다.
    pub fn enable(&self, stream: StdStream) -> Result<(), CaptureError> {
        let mut active = self.active.lock().expect("stdio state lock poisoned");
        if active[stream.slot()].is_some() {
            return Ok(());
        }

        let target = stream.raw_fd();

        // pipe[0] = 읽기 끝, pipe[1] = 쓰기 끝
        let mut pipe_fds: [RawFd; 2] = [-1, -1];
        // SAFETY: 유효한 길이 2 배열 포인터를 넘깁니다.
        if unsafe { libc::pipe(pipe_fds.as_mut_ptr()) } == -1 {
            return Err(redirect_error(stream, "pipe"));
        }
        let (read_fd, write_fd) = (pipe_fds[0], pipe_fds[1]);

        // 복원용 복제본과 tee용 복제본
        // SAFETY: target은 살아 있는 표준 스트림 fd입니다.
        let saved_fd = unsafe { libc::dup(target) };
        if saved_fd == -1 {
            unsafe {
                libc::close(read_fd);
                libc::close(write_fd);
            }
            return Err(redirect_error(stream, "dup (save)"));
        }
        // SAFETY: 위와 동일
        let tee_fd = unsafe { libc::dup(target) };
        if tee_fd == -1 {
            unsafe {
                libc::close(read_fd);
                libc::close(write_fd);
                libc::close(saved_fd);
            }
            return Err(redirect_error(stream, "dup (tee)"));
        }

        // 대상 fd를 파이프 쓰기 끝으로 교체
        // SAFETY: write_fd와 target 모두 유효한 fd입니다.
        if unsafe { libc::dup2(write_fd, target) } == -1 {
            unsafe {
                libc::close(read_fd);
                libc::close(write_fd);
                libc::close(saved_fd);
                libc::close(tee_fd);
            }
            return Err(redirect_error(stream, "dup2"));
        }
        // 파이프 쓰기 끝은 이제 target이 유일하게 들고 있어야 함
        // SAFETY: write_fd는 방금 dup2로 복제되어 더 이상 필요 없습니다.
        unsafe { libc::close(write_fd) };

        // SAFETY: read_fd/tee_fd의 소유권이 File로 이전됩니다.
        let reader_file = unsafe { File::from_raw_fd(read_fd) };
        let tee_file = unsafe { File::from_raw_fd(tee_fd) };

        let pipeline = Arc::clone(&self.pipeline);
        let max_line_length = self.max_line_length;
        let handle = std::thread::Builder::new()
            .name(format!("logpost-{}", stream.name()))
            .spawn(move || {
                let mut accum = LineAccumulator::with_max_length(max_line_length);
                run_tee_loop(reader_file, tee_file, &mut accum, |line| {
                    pipeline.submit_blocking(line, stream.name());
                });
                debug!(stream = stream.name(), "stdio reader exited");
            })
            .map_err(|e| CaptureError::Redirect {
                stream: stream.name().to_owned(),
                reason: format!("reader thread spawn failed: {e}"),
            })?;

        active[stream.slot()] = Some(ActiveRedirect {
            saved_fd,
            reader: Some(handle),
        });
        info!(stream = stream.name(), "stdio capture enabled");
        Ok(())
    }

    /// 스트림 가로채기를 해제하고 원본 fd를 복원합니다. 멱등합니다.
    ///
    /// 리더 스레드가 잔여 출력을 드레인하고 종료할 때까지 기다립니다.
    pub fn disable(&self, stream: StdStream) {
        let redirect = {
            let mut active = self.active.lock().expect("stdio state lock poisoned");
            active[stream.slot()].take()
        };
        let Some(mut redirect) = redirect else {
            return;
        };

        let target = stream.raw_fd();
        // 원본 복원. 파이프 쓰기 끝이 닫히면서 리더는 EOF를 받음
        // SAFETY: saved_fd는 enable에서 만든 유효한 복제본입니다.
        if unsafe { libc::dup2(redirect.saved_fd, target) } == -1 {
            warn!(
                stream = stream.name(),
                error = %std::io::Error::last_os_error(),
                "failed to restore original fd"
            );
        }
        // SAFETY: 복원이 끝나 saved_fd는 더 이상 필요 없습니다.
        unsafe { libc::close(redirect.saved_fd) };

        if let Some(handle) = redirect.reader.take()
            && handle.join().is_err()
        {
            error!(stream = stream.name(), "stdio reader thread panicked");
        }
        info!(stream = stream.name(), "stdio capture disabled");
    }

    /// 활성화된 모든 스트림을 해제합니다.
    pub fn disable_all(&self) {
        self.disable(StdStream::Stdout);
        self.disable(StdStream::Stderr);
    }

    /// 해당 스트림이 가로채기 중인지 여부
    pub fn is_enabled(&self, stream: StdStream) -> bool {
        self.active.lock().expect("stdio state lock poisoned")[stream.slot()].is_some()
    }
}

fn redirect_error(stream: StdStream, op: &str) -> CaptureError {
    CaptureError::Redirect {
        stream: stream.name().to_owned(),
        reason: format!("{op} failed: {}", std::io::Error::last_os_error()),
    }
}

/// tee 루프 본체 — fd와 분리되어 있어 단위 테스트가 가능합니다.
///
/// 읽은 청크를 먼저 tee로 흘려보낸 뒤(호스트 출력이 지연되지 않도록)
/// 라인 조립기에 넘깁니다. 라인 처리 중의 패닉은 잡아서 기록만 하고
/// 루프를 계속합니다. EOF 시 미완성 라인을 드레인합니다.
pub(crate) fn run_tee_loop<R: Read, W: Write>(
    mut reader: R,
    mut tee: W,
    accum: &mut LineAccumulator,
    mut sink: impl FnMut(&str),
) {
    let mut buf = [0u8; READ_CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(error = %e, "stdio pipe read failed");
                break;
            }
        };

        // 호스트 출력이 먼저
        if let Err(e) = tee.write_all(&buf[..n]) {
            debug!(error = %e, "tee write failed");
        }

        let chunk = &buf[..n];
        let result = catch_unwind(AssertUnwindSafe(|| {
            for line in accum.process_chunk(chunk) {
                sink(line.trim_end_matches('\n'));
            }
        }));
        if result.is_err() {
            error!("panic while processing captured output, chunk skipped");
        }
    }

    if let Some(rest) = accum.drain_partial() {
        let result = catch_unwind(AssertUnwindSafe(|| {
            sink(rest.trim_end_matches('\n'));
        }));
        if result.is_err() {
            error!("panic while draining captured output");
        }
    }
}
