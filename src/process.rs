//! Subprocess lifecycle: spawn, concurrent stream capture, timeout kill.

use crate::backend::types::DownloadError;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;

/// Bounded wait for the stream readers to finish after the process exits;
/// a reader can lag slightly behind process exit.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Captured outcome of one subprocess run.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Exit code; on Unix, signal-terminated processes report 128 + signal
    pub exit_code: Option<i32>,

    /// Captured stdout, split into lines
    pub stdout: Vec<String>,

    /// Captured stderr, split into lines
    pub stderr: Vec<String>,

    /// True when the wall-clock budget expired and the process was killed
    pub timed_out: bool,
}

fn exit_status_code_parts(code: Option<i32>, _signal: Option<i32>) -> Option<i32> {
    if let Some(code) = code {
        return Some(code);
    }
    #[cfg(unix)]
    {
        if let Some(signal) = _signal {
            return Some(128 + signal);
        }
    }
    None
}

/// Extract exit code from ExitStatus, using 128+signal for signal-terminated
/// processes on Unix.
fn exit_status_code(status: &std::process::ExitStatus) -> Option<i32> {
    let code = status.code();
    #[cfg(unix)]
    let signal = status.signal();
    #[cfg(not(unix))]
    let signal = None;
    exit_status_code_parts(code, signal)
}

/// A reader task paired with the channel its lines arrive on.
type StreamReader = (JoinHandle<()>, mpsc::UnboundedReceiver<String>);

/// Spawn a reader task that publishes lines over a channel as they arrive
/// and closes the channel when the stream does. One task per stream; reading
/// either stream synchronously while the other fills its OS buffer can
/// deadlock the child. The channel is unbounded for the same reason: a
/// blocked send would stop the drain.
fn drain_lines<R>(reader: R) -> StreamReader
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    (handle, rx)
}

/// Drain a reader's channel, giving up after `DRAIN_GRACE`. Lines already
/// published survive even when a grandchild keeps the pipe open past the
/// kill and the stream never closes.
async fn collect(reader: Option<StreamReader>) -> Vec<String> {
    let Some((handle, mut rx)) = reader else {
        return Vec::new();
    };
    let deadline = tokio::time::Instant::now() + DRAIN_GRACE;
    let mut captured = Vec::new();
    loop {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(line)) => captured.push(line),
            Ok(None) => break,
            Err(_) => {
                handle.abort();
                // Keep anything the reader queued before the abort landed
                while let Ok(line) = rx.try_recv() {
                    captured.push(line);
                }
                break;
            }
        }
    }
    captured
}

/// Run one subprocess to completion or timeout.
///
/// Environment overrides apply to the child only; the parent environment is
/// never mutated. On timeout the process is killed outright (these tools are
/// not expected to handle graceful shutdown) and whatever output was already
/// captured is returned with `timed_out` set. No process handle outlives the
/// call.
pub async fn run(
    program: &str,
    args: &[String],
    env: &[(String, String)],
    timeout: Duration,
) -> Result<ProcessOutput, DownloadError> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in env {
        cmd.env(key, value);
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| DownloadError::launch(program, e.to_string()))?;

    let stdout_task = child.stdout.take().map(drain_lines);
    let stderr_task = child.stderr.take().map(drain_lines);

    let (exit_code, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => (exit_status_code(&status), false),
        Ok(Err(e)) => {
            let _ = child.kill().await;
            return Err(DownloadError::launch(
                program,
                format!("failed to wait for process: {}", e),
            ));
        }
        Err(_) => {
            let _ = child.kill().await;
            let code = child.wait().await.ok().and_then(|s| exit_status_code(&s));
            (code, true)
        }
    };

    // Killing the child closed its pipes, so the readers finish promptly.
    let stdout = collect(stdout_task).await;
    let stderr = collect(stderr_task).await;

    Ok(ProcessOutput {
        exit_code,
        stdout,
        stderr,
        timed_out,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn exit_code_passthrough() {
        assert_eq!(exit_status_code_parts(Some(0), None), Some(0));
        assert_eq!(exit_status_code_parts(Some(42), None), Some(42));
        assert_eq!(exit_status_code_parts(Some(255), None), Some(255));
    }

    #[cfg(unix)]
    #[test]
    fn signal_exit_code() {
        // SIGKILL (9) -> 137, SIGTERM (15) -> 143
        assert_eq!(exit_status_code_parts(None, Some(9)), Some(137));
        assert_eq!(exit_status_code_parts(None, Some(15)), Some(143));
    }

    #[tokio::test]
    async fn test_launch_failure_on_missing_binary() {
        let result = run(
            "definitely_not_a_real_command_12345",
            &[],
            &[],
            Duration::from_secs(5),
        )
        .await;
        assert!(matches!(result, Err(DownloadError::Launch { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_both_streams() {
        let output = run(
            "sh",
            &args(&["-c", "echo out1; echo err1 >&2; echo out2"]),
            &[],
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(output.exit_code, Some(0));
        assert!(!output.timed_out);
        assert_eq!(output.stdout, vec!["out1", "out2"]);
        assert_eq!(output.stderr, vec!["err1"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_code() {
        let output = run(
            "sh",
            &args(&["-c", "echo partial; exit 42"]),
            &[],
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(output.exit_code, Some(42));
        assert_eq!(output.stdout, vec!["partial"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_env_override_visible_to_child_only() {
        let output = run(
            "sh",
            &args(&["-c", "echo \"$FETCH_MUX_TEST_PROXY\""]),
            &[("FETCH_MUX_TEST_PROXY".into(), "http://proxy:3128".into())],
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(output.stdout, vec!["http://proxy:3128"]);
        assert!(std::env::var("FETCH_MUX_TEST_PROXY").is_err());
    }

    #[tokio::test]
    async fn test_collect_keeps_lines_when_stream_never_closes() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            tx.send("early".to_string()).unwrap();
            // Simulates a reader stuck on a pipe held open past the kill
            std::future::pending::<()>().await;
        });

        let lines = collect(Some((handle, rx))).await;
        assert_eq!(lines, vec!["early"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_and_returns_partial_output() {
        let started = Instant::now();
        let output = run(
            "sh",
            &args(&["-c", "echo early; sleep 30"]),
            &[],
            Duration::from_millis(300),
        )
        .await
        .unwrap();

        assert!(output.timed_out);
        assert_eq!(output.stdout, vec!["early"]);
        // Budget plus drain grace for both streams, with headroom for slow CI
        assert!(started.elapsed() < Duration::from_secs(8));
    }
}
