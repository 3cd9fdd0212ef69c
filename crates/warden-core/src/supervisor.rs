//! Extraction subprocess launch and supervision.
//!
//! The extractor is an opaque executable: it receives the working-directory
//! path of the file and reports back through its exit code and text streams.
//! Supervision races two completion signals, process exit and timeout, and
//! whichever finishes first decides the outcome.  The loser is dropped
//! before the outcome is returned, so a late exit can never produce a second
//! result.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Bytes kept per stream.  The ledger stores far less; the rest is drained
/// and discarded so the child never blocks on a full pipe.
const CAPTURE_LIMIT: usize = 64 * 1024;

/// How long to wait for the output pipes to close after the process ended.
/// A grandchild that inherited a pipe can keep it open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// How the extractor is launched.
///
/// Invocation: `<program> <args...> --file <target>` in `cwd`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
}

impl ExtractorCommand {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Start the extractor against `target`.
    pub fn spawn(&self, target: &Path) -> std::io::Result<RunningExtractor> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("--file")
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn()?;
        let pid = child.id().unwrap_or(0);
        let stdout = StreamCapture::start(child.stdout.take());
        let stderr = StreamCapture::start(child.stderr.take());

        debug!(pid, program = %self.program.display(), target = %target.display(), "extractor spawned");

        Ok(RunningExtractor {
            child,
            pid,
            stdout,
            stderr,
            started: Instant::now(),
        })
    }
}

/// How the extractor run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorExit {
    /// The process exited on its own.  Signal deaths report `-1`.
    Exited { code: i32 },
    /// The wall-clock budget elapsed; the process was killed.
    TimedOut,
}

/// Everything the governor needs to record a terminal entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorReport {
    pub exit: ExtractorExit,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// A launched extractor awaiting supervision.
#[derive(Debug)]
pub struct RunningExtractor {
    child: Child,
    pid: u32,
    stdout: StreamCapture,
    stderr: StreamCapture,
    started: Instant,
}

impl RunningExtractor {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Wait for the process to exit or for `timeout` to elapse, whichever
    /// comes first.  On timeout the process is killed without a grace period.
    pub async fn supervise(mut self, timeout: Duration) -> ExtractorReport {
        let exit = tokio::select! {
            status = self.child.wait() => match status {
                Ok(status) => ExtractorExit::Exited { code: status.code().unwrap_or(-1) },
                Err(e) => {
                    warn!(pid = self.pid, error = %e, "failed to wait on extractor");
                    ExtractorExit::Exited { code: -1 }
                }
            },
            _ = tokio::time::sleep(timeout) => ExtractorExit::TimedOut,
        };

        if exit == ExtractorExit::TimedOut {
            warn!(pid = self.pid, timeout_ms = timeout.as_millis() as u64, "extractor timed out, killing");
            if let Err(e) = self.child.kill().await {
                warn!(pid = self.pid, error = %e, "failed to kill extractor");
            }
        }

        let elapsed = self.started.elapsed();
        let stdout = self.stdout.finish().await;
        let stderr = self.stderr.finish().await;

        ExtractorReport {
            exit,
            stdout,
            stderr,
            elapsed,
        }
    }

    /// Kill the process immediately and discard its output.
    pub async fn abort(mut self) {
        if let Err(e) = self.child.kill().await {
            warn!(pid = self.pid, error = %e, "failed to kill extractor");
        }
    }
}

/// Background reader accumulating one output stream.
#[derive(Debug)]
struct StreamCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl StreamCapture {
    fn start<R>(reader: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let task = reader.map(|mut reader| {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    match reader.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            let mut buf = buffer.lock().unwrap_or_else(PoisonError::into_inner);
                            let room = CAPTURE_LIMIT.saturating_sub(buf.len());
                            buf.extend_from_slice(&chunk[..n.min(room)]);
                        }
                    }
                }
            })
        });
        Self { buffer, task }
    }

    async fn finish(mut self) -> String {
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(DRAIN_GRACE, &mut task).await.is_err() {
                task.abort();
            }
        }
        let buf = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        let text = String::from_utf8_lossy(&buf).into_owned();
        text
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str, timeout: Duration) -> ExtractorCommand {
        // `sh -c <script> --file <target>`: the trailing pair becomes $0/$1.
        ExtractorCommand::new("sh", timeout).with_args(["-c", script])
    }

    #[tokio::test]
    async fn successful_run_captures_streams() {
        let cmd = sh("echo extracted; echo warn >&2", Duration::from_secs(5));
        let running = cmd.spawn(Path::new("/tmp/doc.pdf")).unwrap();
        assert!(running.pid() > 0);

        let report = running.supervise(cmd.timeout).await;
        assert_eq!(report.exit, ExtractorExit::Exited { code: 0 });
        assert_eq!(report.stdout.trim(), "extracted");
        assert_eq!(report.stderr.trim(), "warn");
    }

    #[tokio::test]
    async fn target_path_is_passed_after_file_flag() {
        let cmd = sh("echo \"$0 $1\"", Duration::from_secs(5));
        let report = cmd
            .spawn(Path::new("/work/doc.pdf"))
            .unwrap()
            .supervise(cmd.timeout)
            .await;
        assert_eq!(report.stdout.trim(), "--file /work/doc.pdf");
    }

    #[tokio::test]
    async fn non_zero_exit_is_reported() {
        let cmd = sh("exit 3", Duration::from_secs(5));
        let report = cmd.spawn(Path::new("/tmp/x")).unwrap().supervise(cmd.timeout).await;
        assert_eq!(report.exit, ExtractorExit::Exited { code: 3 });
    }

    #[tokio::test]
    async fn timeout_kills_process() {
        let cmd = sh("exec sleep 30", Duration::from_millis(200));
        let started = Instant::now();
        let report = cmd.spawn(Path::new("/tmp/x")).unwrap().supervise(cmd.timeout).await;

        assert_eq!(report.exit, ExtractorExit::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(10), "supervision must not wait for the child");
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let cmd = ExtractorCommand::new("/nonexistent/extractor", Duration::from_secs(1));
        assert!(cmd.spawn(Path::new("/tmp/x")).is_err());
    }
}
