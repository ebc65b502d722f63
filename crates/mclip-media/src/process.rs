//! External process runner.
//!
//! Spawns a program, drains stdout and stderr concurrently into line
//! handlers, and races the whole thing against a timeout and an optional
//! cancellation signal. On timeout or cancellation the process is killed,
//! not just abandoned.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{MediaError, MediaResult};

/// Diagnostic lines attached to a timeout failure.
pub const TIMEOUT_TAIL_LINES: usize = 20;
/// Diagnostic lines attached to a non-zero exit failure.
pub const FAILURE_TAIL_LINES: usize = 30;
/// Upper bound on attached diagnostic text.
pub const MAX_TAIL_BYTES: usize = 4096;

/// Bounded ring of the most recent diagnostic lines.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl DiagnosticTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: &str) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The last `n` lines joined with newlines, cut to [`MAX_TAIL_BYTES`].
    pub fn last(&self, n: usize) -> String {
        let skip = self.lines.len().saturating_sub(n);
        let joined = self
            .lines
            .iter()
            .skip(skip)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n");
        truncate_front(joined, MAX_TAIL_BYTES)
    }
}

/// Keep the last `max` bytes of `text`, on a char boundary.
fn truncate_front(text: String, max: usize) -> String {
    if text.len() <= max {
        return text;
    }
    let mut cut = text.len() - max;
    while !text.is_char_boundary(cut) {
        cut += 1;
    }
    text[cut..].to_string()
}

/// Result of a process that ran to exit.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub diagnostics: DiagnosticTail,
}

/// Sender side of a cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Receiver to hand to runners.
    pub fn receiver(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Force-kill every process watching this handle.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Runs one external program with two line-oriented output channels.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: PathBuf,
    cancel_rx: Option<watch::Receiver<bool>>,
    tail_capacity: usize,
}

impl ProcessRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            cancel_rx: None,
            tail_capacity: FAILURE_TAIL_LINES,
        }
    }

    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    pub fn with_tail_capacity(mut self, lines: usize) -> Self {
        self.tail_capacity = lines;
        self
    }

    /// Run to exit, timeout, or cancellation.
    ///
    /// `on_stdout` and `on_stderr` see every line of their stream. Stderr
    /// lines are also kept in a bounded tail returned with the exit status
    /// or attached to a [`MediaError::Timeout`].
    pub async fn run(
        &self,
        args: &[String],
        timeout: Duration,
        on_stdout: &mut (dyn FnMut(&str) + Send),
        on_stderr: &mut (dyn FnMut(&str) + Send),
    ) -> MediaResult<ProcessOutput> {
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("stderr not captured"))?;

        let mut tail = DiagnosticTail::new(self.tail_capacity);
        let mut cancel_rx = self.cancel_rx.clone();

        let outcome = {
            let tail_ref = &mut tail;
            let child_ref = &mut child;
            let work = async move {
                let mut record = |line: &str| {
                    tail_ref.push(line);
                    on_stderr(line);
                };
                tokio::join!(
                    drain_lines(stdout, on_stdout),
                    drain_lines(stderr, &mut record)
                );
                child_ref.wait().await
            };

            tokio::select! {
                status = work => Outcome::Exited(status),
                _ = tokio::time::sleep(timeout) => Outcome::TimedOut,
                _ = wait_for_cancel(&mut cancel_rx) => Outcome::Cancelled,
            }
        };

        match outcome {
            Outcome::Exited(status) => Ok(ProcessOutput {
                status: status?,
                diagnostics: tail,
            }),
            Outcome::TimedOut => {
                warn!(
                    program = %self.program.display(),
                    "Process timed out after {} seconds, killing process",
                    timeout.as_secs()
                );
                kill(&mut child).await;
                Err(MediaError::Timeout {
                    secs: timeout.as_secs(),
                    tail: Some(tail.last(TIMEOUT_TAIL_LINES)),
                })
            }
            Outcome::Cancelled => {
                info!(program = %self.program.display(), "Process cancelled, killing process");
                kill(&mut child).await;
                Err(MediaError::Cancelled)
            }
        }
    }
}

async fn drain_lines<R>(stream: R, handler: &mut (dyn FnMut(&str) + Send))
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                while matches!(buf.last(), Some(b'\n' | b'\r')) {
                    buf.pop();
                }
                // Not every line is UTF-8; FFmpeg echoes paths as raw bytes
                handler(&String::from_utf8_lossy(&buf));
            }
            Err(e) => {
                warn!("Stopped reading process output: {}", e);
                break;
            }
        }
    }
}

async fn wait_for_cancel(cancel_rx: &mut Option<watch::Receiver<bool>>) {
    let Some(rx) = cancel_rx else {
        return std::future::pending().await;
    };
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone without cancelling; nothing can cancel us any more
            return std::future::pending().await;
        }
    }
}

async fn kill(child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!("Failed to kill process: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_keeps_most_recent_lines() {
        let mut tail = DiagnosticTail::new(3);
        for i in 0..5 {
            tail.push(&format!("line {i}"));
        }
        assert_eq!(tail.len(), 3);
        assert_eq!(tail.last(2), "line 3\nline 4");
        assert_eq!(tail.last(10), "line 2\nline 3\nline 4");
    }

    #[test]
    fn test_tail_is_byte_bounded() {
        let mut tail = DiagnosticTail::new(10);
        for _ in 0..10 {
            tail.push(&"x".repeat(1000));
        }
        assert!(tail.last(10).len() <= MAX_TAIL_BYTES);
    }

    #[test]
    fn test_cancel_handle() {
        let handle = CancelHandle::new();
        let rx = handle.receiver();
        assert!(!*rx.borrow());
        handle.cancel();
        assert!(*rx.borrow());
        assert!(handle.is_cancelled());
    }

    #[cfg(unix)]
    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_drains_both_streams() {
        let runner = ProcessRunner::new("sh");
        let mut out = Vec::new();
        let mut err = Vec::new();
        let output = runner
            .run(
                &sh("echo out1; echo err1 >&2; echo out2"),
                Duration::from_secs(10),
                &mut |l: &str| out.push(l.to_string()),
                &mut |l: &str| err.push(l.to_string()),
            )
            .await
            .unwrap();

        assert!(output.status.success());
        assert_eq!(out, vec!["out1", "out2"]);
        assert_eq!(err, vec!["err1"]);
        assert_eq!(output.diagnostics.last(5), "err1");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_utf8_output_keeps_draining() {
        let runner = ProcessRunner::new("sh");
        let mut seen = 0usize;
        let output = runner
            .run(
                &sh("printf '\\377\\376 bad\\n' >&2; i=0; while [ $i -lt 2000 ]; do echo \"line $i\" >&2; i=$((i+1)); done; exit 0"),
                Duration::from_secs(30),
                &mut |_: &str| {},
                &mut |_: &str| seen += 1,
            )
            .await
            .unwrap();

        assert!(output.status.success());
        assert_eq!(seen, 2001);
        assert!(output.diagnostics.last(1).contains("line 1999"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_reported_with_tail() {
        let runner = ProcessRunner::new("sh");
        let output = runner
            .run(
                &sh("echo broken pipe >&2; exit 3"),
                Duration::from_secs(10),
                &mut |_: &str| {},
                &mut |_: &str| {},
            )
            .await
            .unwrap();

        assert_eq!(output.status.code(), Some(3));
        assert!(output.diagnostics.last(FAILURE_TAIL_LINES).contains("broken pipe"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_and_reports_tail() {
        let runner = ProcessRunner::new("sh");
        let started = std::time::Instant::now();
        let err = runner
            .run(
                &sh("echo warming up >&2; exec sleep 30"),
                Duration::from_millis(500),
                &mut |_: &str| {},
                &mut |_: &str| {},
            )
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(10));
        match err {
            MediaError::Timeout { tail, .. } => {
                assert!(tail.unwrap_or_default().contains("warming up"));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancellation_kills_process() {
        let handle = CancelHandle::new();
        let runner = ProcessRunner::new("sleep").with_cancel(handle.receiver());

        let canceller = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let err = runner
            .run(
                &["30".to_string()],
                Duration::from_secs(60),
                &mut |_: &str| {},
                &mut |_: &str| {},
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Cancelled));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_io() {
        let runner = ProcessRunner::new("/nonexistent/binary/for/tests");
        let err = runner
            .run(&[], Duration::from_secs(1), &mut |_: &str| {}, &mut |_: &str| {})
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Io(_)));
    }
}
