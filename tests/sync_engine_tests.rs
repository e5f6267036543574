use async_trait::async_trait;
use logrelay::config::BasicConfig;
use logrelay::error::SinkError;
use logrelay::sink::{ConsoleWriter, LogWriter};
use logrelay::source::PageSource;
use logrelay::sync::{StateFile, SyncEngine, SyncOptions};
use logrelay::{Log, RelayError};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

fn log(text: &str) -> Log {
    serde_json::from_value(json!({
        "uuid": uuid::Uuid::new_v4(),
        "app": 42,
        "text": text,
        "time": "2024-03-01T10:00:00Z"
    }))
    .expect("valid log")
}

enum Fetch {
    Logs(usize),
    Fail,
    /// Returns a batch and fires the shutdown token, as if a signal arrived mid-request.
    LogsThenCancel(usize),
}

/// What to do once the script is exhausted.
enum WhenDone {
    WaitForCancel,
    KeepReturning(usize),
    KeepFailing,
}

struct FakeSource {
    script: VecDeque<Fetch>,
    when_done: WhenDone,
    cancel: CancellationToken,
    fetches: Arc<AtomicUsize>,
    state_reads: Arc<AtomicUsize>,
    cursor: usize,
}

impl FakeSource {
    fn new(script: Vec<Fetch>, when_done: WhenDone, cancel: &CancellationToken) -> Self {
        Self {
            script: script.into(),
            when_done,
            cancel: cancel.clone(),
            fetches: Arc::default(),
            state_reads: Arc::default(),
            cursor: 0,
        }
    }

    fn batch(&mut self, n: usize) -> Vec<Log> {
        self.cursor += 1;
        (0..n).map(|i| log(&format!("page {} line {i}", self.cursor))).collect()
    }
}

fn upstream_error() -> RelayError {
    RelayError::UpstreamStatus {
        status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
        body: "maintenance".to_string(),
    }
}

#[async_trait]
impl PageSource for FakeSource {
    async fn next_page(&mut self, cancel: &CancellationToken) -> Result<Vec<Log>, RelayError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match self.script.pop_front() {
            Some(Fetch::Logs(n)) => Ok(self.batch(n)),
            Some(Fetch::Fail) => Err(upstream_error()),
            Some(Fetch::LogsThenCancel(n)) => {
                self.cancel.cancel();
                Ok(self.batch(n))
            }
            None => match self.when_done {
                WhenDone::WaitForCancel => {
                    cancel.cancelled().await;
                    Err(RelayError::Cancelled)
                }
                WhenDone::KeepReturning(n) => {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    Ok(self.batch(n))
                }
                WhenDone::KeepFailing => Err(upstream_error()),
            },
        }
    }

    fn state(&self) -> Result<Vec<u8>, RelayError> {
        self.state_reads.fetch_add(1, Ordering::SeqCst);
        Ok(format!("cursor-{}", self.cursor).into_bytes())
    }
}

#[derive(Default)]
struct FakeWriter {
    fail: bool,
    attempts: usize,
    written: Vec<usize>,
}

#[async_trait]
impl LogWriter for FakeWriter {
    async fn write_logs(
        &mut self,
        _cancel: &CancellationToken,
        logs: &[Log],
    ) -> Result<(), SinkError> {
        self.attempts += 1;
        if self.fail {
            return Err(SinkError::Status {
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                body: "index closed".to_string(),
            });
        }
        self.written.push(logs.len());
        Ok(())
    }
}

fn options(max_consecutive_failures: u32, backoff: Duration) -> SyncOptions {
    SyncOptions {
        checkpoint_interval: Duration::from_secs(300),
        max_consecutive_failures,
        retry_backoff_initial: backoff,
        retry_backoff_max: backoff * 4,
    }
}

#[tokio::test]
async fn persistent_write_failure_is_fatal_at_the_limit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state_file = StateFile::new(dir.path().join("state"));
    let cancel = CancellationToken::new();
    let source = FakeSource::new(Vec::new(), WhenDone::KeepReturning(2), &cancel);
    let state_reads = source.state_reads.clone();
    let writer = FakeWriter {
        fail: true,
        ..FakeWriter::default()
    };

    let mut engine = SyncEngine::new(
        source,
        writer,
        Some(state_file.clone()),
        options(3, Duration::from_millis(10)),
    );
    let err = engine.run(&cancel).await.expect_err("fatal after 3 failures");

    assert!(matches!(
        err,
        RelayError::Sink(SinkError::Status { status, .. })
            if status == reqwest::StatusCode::SERVICE_UNAVAILABLE
    ));
    let (source, writer) = engine.into_parts();
    assert_eq!(writer.attempts, 3);
    assert_eq!(source.fetches.load(Ordering::SeqCst), 3);
    // the startup checkpoint plus one final save
    assert_eq!(state_reads.load(Ordering::SeqCst), 2);
    assert_eq!(
        state_file.load().await.expect("load"),
        Some(b"cursor-3".to_vec())
    );
}

#[tokio::test]
async fn failures_below_the_limit_are_retried() {
    let cancel = CancellationToken::new();
    let source = FakeSource::new(
        vec![
            Fetch::Fail,
            Fetch::Fail,
            Fetch::Logs(4),
            Fetch::Fail,
            Fetch::Fail,
            Fetch::Logs(1),
        ],
        WhenDone::WaitForCancel,
        &cancel,
    );
    let mut engine = SyncEngine::new(
        source,
        FakeWriter::default(),
        None,
        options(3, Duration::from_millis(10)),
    );

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.cancel();
    });

    engine.run(&cancel).await.expect("clean shutdown");
    let (_, writer) = engine.into_parts();
    assert_eq!(writer.written, vec![4, 1]);
}

#[tokio::test]
async fn cancel_during_backoff_exits_cleanly_with_final_checkpoint() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state_file = StateFile::new(dir.path().join("state"));
    let cancel = CancellationToken::new();
    let source = FakeSource::new(vec![Fetch::Logs(3)], WhenDone::KeepFailing, &cancel);
    let state_reads = source.state_reads.clone();

    let mut engine = SyncEngine::new(
        source,
        FakeWriter::default(),
        Some(state_file.clone()),
        options(10, Duration::from_secs(60)),
    );

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    engine.run(&cancel).await.expect("cancellation is not a failure");

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(state_reads.load(Ordering::SeqCst), 2);
    assert_eq!(
        state_file.load().await.expect("load"),
        Some(b"cursor-1".to_vec())
    );
    let (_, writer) = engine.into_parts();
    assert_eq!(writer.written, vec![3]);
}

#[tokio::test]
async fn batch_fetched_before_shutdown_is_still_written() {
    let cancel = CancellationToken::new();
    let source = FakeSource::new(
        vec![Fetch::Logs(1), Fetch::LogsThenCancel(5), Fetch::Logs(9)],
        WhenDone::WaitForCancel,
        &cancel,
    );
    let mut engine = SyncEngine::new(
        source,
        FakeWriter::default(),
        None,
        options(3, Duration::from_millis(10)),
    );

    engine.run(&cancel).await.expect("clean shutdown");

    let (source, writer) = engine.into_parts();
    assert_eq!(writer.written, vec![1, 5]);
    assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unwritable_state_file_is_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state_file = StateFile::new(dir.path().join("no-such-dir").join("state"));
    let cancel = CancellationToken::new();
    let source = FakeSource::new(Vec::new(), WhenDone::KeepReturning(1), &cancel);
    let fetches = source.fetches.clone();

    let mut engine = SyncEngine::new(
        source,
        FakeWriter::default(),
        Some(state_file),
        options(3, Duration::from_millis(10)),
    );
    let err = engine.run(&cancel).await.expect_err("persistence error");

    assert!(matches!(err, RelayError::Persistence { .. }));
    assert_eq!(fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn periodic_checkpoints_follow_the_interval() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state_file = StateFile::new(dir.path().join("state"));
    let cancel = CancellationToken::new();
    let source = FakeSource::new(Vec::new(), WhenDone::KeepReturning(1), &cancel);
    let state_reads = source.state_reads.clone();

    let mut engine = SyncEngine::new(
        source,
        FakeWriter::default(),
        Some(state_file),
        SyncOptions {
            checkpoint_interval: Duration::from_secs(3600),
            ..options(3, Duration::from_millis(10))
        },
    );

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });
    engine.run(&cancel).await.expect("clean shutdown");

    let (source, _) = engine.into_parts();
    assert!(source.fetches.load(Ordering::SeqCst) > 1);
    // one at startup, none until the hour is up, one on exit
    assert_eq!(state_reads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn console_sink_receives_every_batch() {
    let cancel = CancellationToken::new();
    let source = FakeSource::new(
        vec![Fetch::Logs(2), Fetch::Logs(3)],
        WhenDone::WaitForCancel,
        &cancel,
    );
    let mut engine = SyncEngine::new(
        source,
        ConsoleWriter::new(Vec::<u8>::new()),
        None,
        SyncOptions::from_config(&BasicConfig::default()),
    );

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });
    engine.run(&cancel).await.expect("clean shutdown");

    let (_, writer) = engine.into_parts();
    let out = String::from_utf8(writer.into_inner()).expect("utf-8");
    assert_eq!(out.lines().count(), 5);
    for line in out.lines() {
        let value: serde_json::Value = serde_json::from_str(line).expect("json line");
        assert_eq!(value["app"], 42);
    }
}
