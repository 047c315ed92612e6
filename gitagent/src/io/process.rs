//! Child-process execution with a wall-clock timeout and bounded output.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// How long output readers may outlive the child before they are abandoned.
const READER_GRACE: Duration = Duration::from_millis(500);

type StreamResult = Result<(Vec<u8>, usize)>;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    pub fn stdout_text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).trim().to_string();
        if self.stdout_truncated > 0 {
            text.push_str(&format!("\n[output truncated {} bytes]", self.stdout_truncated));
        }
        text
    }

    pub fn stderr_text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stderr).trim().to_string();
        if self.stderr_truncated > 0 {
            text.push_str(&format!("\n[output truncated {} bytes]", self.stderr_truncated));
        }
        text
    }
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Stdin is closed so nothing can wait on terminal input. Output is read
/// concurrently while the child runs; bytes beyond `output_limit_bytes` are
/// drained and discarded. A child still running at `timeout` is killed and
/// reported with `timed_out` set. On unix the child leads its own process
/// group and the whole group is killed, so hooks, credential helpers and
/// aliases it started go down with it. Output readers still blocked on a pipe
/// held open by an escaped descendant are abandoned after a short grace.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let started = Instant::now();
    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_rx = spawn_reader(stdout, output_limit_bytes);
    let stderr_rx = spawn_reader(stderr, output_limit_bytes);

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            kill_tree(&mut child)?;
            child.wait().context("wait command after kill")?
        }
    };

    let deadline = (started + timeout).max(Instant::now()) + READER_GRACE;
    let (stdout, stdout_truncated) = collect_output(&stdout_rx, deadline).context("read stdout")?;
    let (stderr, stderr_truncated) = collect_output(&stderr_rx, deadline).context("read stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

/// Kill the child and, on unix, every process in its group.
fn kill_tree(child: &mut Child) -> Result<()> {
    #[cfg(unix)]
    {
        let group = format!("-{}", child.id());
        match Command::new("kill")
            .args(["-KILL", "--", &group])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) if status.success() => return Ok(()),
            Ok(status) => warn!(?status, "process group kill failed, killing child only"),
            Err(err) => warn!(err = %err, "could not run kill, killing child only"),
        }
    }
    child.kill().context("kill command")
}

fn spawn_reader<R: Read + Send + 'static>(reader: R, limit: usize) -> Receiver<StreamResult> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        // The receiver is gone only when the reader was abandoned.
        let _ = tx.send(read_stream_limited(reader, limit));
    });
    rx
}

/// Reader result, or empty output if the pipe is still held open at `deadline`.
fn collect_output(rx: &Receiver<StreamResult>, deadline: Instant) -> StreamResult {
    let wait = deadline.saturating_duration_since(Instant::now());
    match rx.recv_timeout(wait) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            warn!("output pipe still open after the child exited, abandoning reader");
            Ok((Vec::new(), 0))
        }
        Err(RecvTimeoutError::Disconnected) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_buffered_output() {
        let data = vec![b'x'; 20_000];
        let (buf, truncated) = read_stream_limited(&data[..], 1_000).expect("read");
        assert_eq!(buf.len(), 1_000);
        assert_eq!(truncated, 19_000);
    }

    #[test]
    fn captures_git_version() {
        let mut cmd = Command::new("git");
        cmd.arg("--version");
        let out = run_command_with_timeout(cmd, Duration::from_secs(10), 10_000).expect("run");
        assert!(out.success());
        assert!(out.stdout_text().starts_with("git version"));
    }

    #[cfg(unix)]
    #[test]
    fn timeout_kills_descendants_holding_the_pipes() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 6; echo done"]);
        let started = Instant::now();
        let out = run_command_with_timeout(cmd, Duration::from_millis(300), 1_000).expect("run");
        assert!(out.timed_out);
        assert!(started.elapsed() < Duration::from_secs(3), "took {:?}", started.elapsed());
    }

    #[cfg(unix)]
    #[test]
    fn kills_on_timeout() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let out = run_command_with_timeout(cmd, Duration::from_millis(200), 1_000).expect("run");
        assert!(out.timed_out);
        assert!(!out.success());
    }
}
