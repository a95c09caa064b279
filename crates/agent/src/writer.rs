//! 크래시 안전 디스크 기록 — 버퍼링 + 주기 플러시
//!
//! [`BufferedLogWriter`]는 캡처된 라인을 인메모리 버퍼에 모았다가
//! 주기적으로 append 전용 파일에 한 번의 쓰기로 내립니다. 에이전트가
//! 비정상 종료해도 마지막 플러시 이전의 라인은 디스크에 남습니다.
//!
//! 기록 형식은 한 줄에 한 레코드,
//! `"<line_num> <timestamp_millis>:<message>\n"`입니다.
//! [`read_log_file`]이 읽기 측 동반자입니다.

use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use logpost_core::error::RecordError;
use logpost_core::metrics::{
    WRITER_FLUSH_DURATION_SECONDS, WRITER_FLUSHES_TOTAL, WRITER_LINES_PERSISTED_TOTAL,
};
use logpost_core::types::LogLine;

use crate::error::AgentError;

/// 버퍼드 append 전용 로그 기록기
///
/// `write`는 락을 잡고 버퍼에 밀어 넣기만 하므로 캡처 핫 패스에서
/// 호출해도 안전합니다. 실제 I/O는 전용 플러시 태스크가 수행합니다.
pub struct BufferedLogWriter {
    pending: std::sync::Mutex<Vec<LogLine>>,
    cancel: CancellationToken,
    flush_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
    flushed_lines: AtomicU64,
    path: PathBuf,
}

impl BufferedLogWriter {
    /// 기록기를 생성하고 플러시 태스크를 시작합니다.
    ///
    /// 파일은 append 모드로 열리며 없으면 생성됩니다.
    pub async fn create(
        path: impl AsRef<Path>,
        flush_interval_ms: u64,
    ) -> Result<Arc<Self>, AgentError> {
        let path = path.as_ref().to_path_buf();
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .await?;

        let writer = Arc::new(Self {
            pending: std::sync::Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
            flush_task: tokio::sync::Mutex::new(None),
            disposed: AtomicBool::new(false),
            flushed_lines: AtomicU64::new(0),
            path: path.clone(),
        });

        let task_writer = Arc::clone(&writer);
        let cancel = writer.cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(flush_interval_ms));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        task_writer.flush_to(&mut file).await;
                    }
                    _ = cancel.cancelled() => {
                        // 마지막 플러시 후 디스크 동기화
                        task_writer.flush_to(&mut file).await;
                        if let Err(e) = file.sync_all().await {
                            warn!(path = %task_writer.path.display(), error = %e, "final sync failed");
                        }
                        debug!(path = %task_writer.path.display(), "writer flush task stopped");
                        break;
                    }
                }
            }
        });

        *writer.flush_task.lock().await = Some(handle);
        info!(path = %path.display(), flush_interval_ms, "log writer started");
        Ok(writer)
    }

    /// 라인을 버퍼에 추가합니다. I/O는 수행하지 않습니다.
    pub fn write(&self, line: LogLine) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        self.pending
            .lock()
            .expect("writer buffer lock poisoned")
            .push(line);
    }

    /// 버퍼를 비워 파일에 한 번의 쓰기로 내립니다.
    async fn flush_to(&self, file: &mut File) {
        let batch = {
            let mut pending = self.pending.lock().expect("writer buffer lock poisoned");
            mem::take(&mut *pending)
        };
        if batch.is_empty() {
            return;
        }

        let started = Instant::now();
        let mut payload = String::new();
        for line in &batch {
            payload.push_str(&line.encode_record());
        }

        match file.write_all(payload.as_bytes()).await {
            Ok(()) => {
                self.flushed_lines
                    .fetch_add(batch.len() as u64, Ordering::SeqCst);
                counter!(WRITER_FLUSHES_TOTAL).increment(1);
                counter!(WRITER_LINES_PERSISTED_TOTAL).increment(batch.len() as u64);
                histogram!(WRITER_FLUSH_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    lines = batch.len(),
                    error = %e,
                    "flush failed, batch lost"
                );
            }
        }
    }

    /// 기록기를 종료합니다. 멱등합니다.
    ///
    /// 플러시 태스크를 멈추고 남은 버퍼를 마지막으로 플러시한 뒤
    /// 파일을 동기화합니다.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        let handle = self.flush_task.lock().await.take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!(error = %e, "writer flush task join failed");
        }
        info!(path = %self.path.display(), "log writer disposed");
    }

    /// 지금까지 디스크에 내려간 라인 수
    pub fn flushed_lines(&self) -> u64 {
        self.flushed_lines.load(Ordering::SeqCst)
    }

    /// 아직 버퍼에 남아 있는 라인 수
    pub fn pending_lines(&self) -> usize {
        self.pending
            .lock()
            .expect("writer buffer lock poisoned")
            .len()
    }

    /// 기록 대상 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// 영속 로그 파일을 라인 단위로 디코딩합니다.
///
/// 잘못된 레코드는 `Err`로 보고할 뿐 나머지 레코드 읽기를 중단시키지
/// 않습니다. 빈 줄은 건너뜁니다.
pub async fn read_log_file(
    path: impl AsRef<Path>,
) -> Result<Vec<Result<LogLine, RecordError>>, std::io::Error> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(content
        .lines()
        .filter(|line| !line.is_empty())
        .map(LogLine::decode_record)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_line(n: i64, msg: &str) -> LogLine {
        LogLine::new(n, 1_700_000_000_000 + n, msg, "app")
    }

    #[tokio::test]
    async fn write_then_dispose_persists_all_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.log");

        // 플러시 주기를 길게 잡아 dispose의 최종 플러시만 검증
        let writer = BufferedLogWriter::create(&path, 60_000).await.unwrap();
        writer.write(sample_line(1, "first"));
        writer.write(sample_line(2, "second"));
        writer.write(sample_line(3, "third"));
        assert_eq!(writer.pending_lines(), 3);

        writer.dispose().await;
        assert_eq!(writer.flushed_lines(), 3);

        let records = read_log_file(&path).await.unwrap();
        assert_eq!(records.len(), 3);
        let decoded: Vec<LogLine> = records.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(decoded[0].line_num, 1);
        assert_eq!(decoded[1].message, "second");
        assert_eq!(decoded[2].line_num, 3);
    }

    #[tokio::test]
    async fn timer_flush_persists_without_dispose() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.log");

        let writer = BufferedLogWriter::create(&path, 20).await.unwrap();
        writer.write(sample_line(1, "timed"));

        // 타이머 플러시를 기다림
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if writer.flushed_lines() == 1 {
                break;
            }
        }
        assert_eq!(writer.flushed_lines(), 1);
        assert_eq!(writer.pending_lines(), 0);

        writer.dispose().await;
    }

    #[tokio::test]
    async fn dispose_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.log");

        let writer = BufferedLogWriter::create(&path, 60_000).await.unwrap();
        writer.write(sample_line(1, "only"));
        writer.dispose().await;
        writer.dispose().await;
        assert_eq!(writer.flushed_lines(), 1);
    }

    #[tokio::test]
    async fn write_after_dispose_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.log");

        let writer = BufferedLogWriter::create(&path, 60_000).await.unwrap();
        writer.dispose().await;
        writer.write(sample_line(1, "too late"));
        assert_eq!(writer.pending_lines(), 0);
    }

    #[tokio::test]
    async fn appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.log");

        let writer = BufferedLogWriter::create(&path, 60_000).await.unwrap();
        writer.write(sample_line(1, "run one"));
        writer.dispose().await;

        let writer = BufferedLogWriter::create(&path, 60_000).await.unwrap();
        writer.write(sample_line(2, "run two"));
        writer.dispose().await;

        let records = read_log_file(&path).await.unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn read_log_file_reports_malformed_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.log");
        tokio::fs::write(&path, "1 100:good\nthis is garbage\n2 200:also good\n")
            .await
            .unwrap();

        let records = read_log_file(&path).await.unwrap();
        assert_eq!(records.len(), 3);
        assert!(records[0].is_ok());
        assert!(records[1].is_err());
        assert!(records[2].is_ok());
        assert_eq!(records[2].as_ref().unwrap().message, "also good");
    }

    #[tokio::test]
    async fn read_log_file_missing_file_errors() {
        let result = read_log_file("/tmp/logpost-test-missing-writer-file.log").await;
        assert!(result.is_err());
    }
}
