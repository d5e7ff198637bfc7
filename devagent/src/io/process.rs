//! Helpers for running child processes with timeouts and bounded output.

use std::io::{Read, Write};
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

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

    /// Render stdout/stderr as the text an oracle or log reader sees.
    pub fn render(&self) -> String {
        let mut buf = String::new();
        buf.push_str("=== stdout ===\n");
        buf.push_str(&String::from_utf8_lossy(&self.stdout));
        if self.stdout_truncated > 0 {
            buf.push_str(&format!("\n[stdout truncated {} bytes]", self.stdout_truncated));
        }
        buf.push_str("\n=== stderr ===\n");
        buf.push_str(&String::from_utf8_lossy(&self.stderr));
        if self.stderr_truncated > 0 {
            buf.push_str(&format!("\n[stderr truncated {} bytes]", self.stderr_truncated));
        }
        if self.timed_out {
            buf.push_str("\n[command timed out]");
        }
        buf.push('\n');
        buf
    }
}

/// Run `command` through `sh -c` in `workdir`.
pub fn run_shell(
    command: &str,
    workdir: &Path,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command).current_dir(workdir);
    run_command_with_timeout(cmd, None, timeout, output_limit_bytes)
        .with_context(|| format!("run `{command}`"))
}

/// How long to keep reading pipes after the child exits.
///
/// Background processes the command started may hold stdout/stderr open; their
/// output after this point is dropped.
const READER_GRACE: Duration = Duration::from_secs(2);

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Stdin is written and output is read concurrently while the child runs. On unix the child
/// leads its own process group and the whole group is killed on timeout. `output_limit_bytes`
/// bounds the amount of stdout/stderr stored in memory (bytes beyond this are discarded while
/// still draining the pipe).
#[instrument(
    skip_all,
    fields(timeout_secs = timeout.as_secs(), output_limit_bytes = output_limit_bytes)
)]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    #[cfg(unix)]
    cmd.process_group(0);

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
    let stdout_reader = StreamReader::spawn(stdout, output_limit_bytes);
    let stderr_reader = StreamReader::spawn(stderr, output_limit_bytes);

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        let input = input.to_vec();
        // Dropping the handle at the end of the thread closes the pipe so the child sees EOF.
        thread::spawn(move || {
            if let Err(err) = child_stdin.write_all(&input) {
                debug!(err = %err, "child stopped reading stdin");
            }
        });
    }

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            kill_process_group(&child);
            // Already covered by the group kill on unix.
            if let Err(err) = child.kill() {
                debug!(err = %err, "child already gone");
            }
            child.wait().context("wait command after kill")?
        }
    };

    let deadline = Instant::now() + READER_GRACE;
    let (stdout, stdout_truncated) = stdout_reader.finish(deadline).context("join stdout")?;
    let (stderr, stderr_truncated) = stderr_reader.finish(deadline).context("join stderr")?;

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

#[cfg(unix)]
fn kill_process_group(child: &Child) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(child.id()) else {
        return;
    };
    if let Err(err) = killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        debug!(err = %err, "kill process group");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}

#[derive(Default)]
struct Captured {
    buf: Vec<u8>,
    truncated: usize,
}

/// Background reader draining one pipe into a shared bounded buffer.
struct StreamReader {
    captured: Arc<Mutex<Captured>>,
    done: mpsc::Receiver<Result<()>>,
}

impl StreamReader {
    fn spawn<R: Read + Send + 'static>(reader: R, limit: usize) -> Self {
        let captured = Arc::new(Mutex::new(Captured::default()));
        let (tx, done) = mpsc::channel();
        let sink = Arc::clone(&captured);
        thread::spawn(move || {
            let _ = tx.send(read_stream_limited(reader, limit, &sink));
        });
        Self { captured, done }
    }

    /// Wait until the pipe closes or `deadline` passes, then take what was read.
    fn finish(self, deadline: Instant) -> Result<(Vec<u8>, usize)> {
        match self
            .done
            .recv_timeout(deadline.saturating_duration_since(Instant::now()))
        {
            Ok(result) => result?,
            Err(RecvTimeoutError::Timeout) => {
                warn!("output pipe still open after the command exited, keeping partial output");
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(anyhow!("output reader thread panicked"));
            }
        }
        let mut captured = self
            .captured
            .lock()
            .map_err(|_| anyhow!("output buffer poisoned"))?;
        let buf = std::mem::take(&mut captured.buf);
        Ok((buf, captured.truncated))
    }
}

fn read_stream_limited<R: Read>(
    mut reader: R,
    limit: usize,
    sink: &Mutex<Captured>,
) -> Result<()> {
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let mut captured = sink.lock().map_err(|_| anyhow!("output buffer poisoned"))?;
        let remaining = limit.saturating_sub(captured.buf.len());
        let keep = n.min(remaining);
        captured.buf.extend_from_slice(&chunk[..keep]);
        captured.truncated += n - keep;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_and_exit_status() {
        let temp = tempfile::tempdir().expect("tempdir");
        let output = run_shell("echo hello; exit 3", temp.path(), Duration::from_secs(5), 1000)
            .expect("run");
        assert_eq!(output.status.code(), Some(3));
        assert!(!output.success());
        assert!(output.render().contains("hello"));
    }

    #[test]
    fn bounds_captured_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let output = run_shell("printf 'abcdefghij'", temp.path(), Duration::from_secs(5), 4)
            .expect("run");
        assert_eq!(output.stdout, b"abcd");
        assert_eq!(output.stdout_truncated, 6);
        assert!(output.render().contains("[stdout truncated 6 bytes]"));
    }

    #[test]
    fn kills_commands_past_timeout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let output =
            run_shell("exec sleep 5", temp.path(), Duration::from_millis(200), 1000).expect("run");
        assert!(output.timed_out);
        assert!(!output.success());
    }

    #[test]
    fn timeout_kills_the_whole_shell_pipeline() {
        let temp = tempfile::tempdir().expect("tempdir");
        let started = Instant::now();
        let output = run_shell(
            "sleep 6; echo done",
            temp.path(),
            Duration::from_millis(300),
            1000,
        )
        .expect("run");
        assert!(output.timed_out);
        assert!(started.elapsed() < Duration::from_secs(3), "{:?}", started.elapsed());
        assert!(!String::from_utf8_lossy(&output.stdout).contains("done"));
    }

    #[test]
    fn background_children_do_not_hold_the_call_open() {
        let temp = tempfile::tempdir().expect("tempdir");
        let started = Instant::now();
        let output = run_shell(
            "sleep 6 & echo started",
            temp.path(),
            Duration::from_secs(5),
            1000,
        )
        .expect("run");
        assert!(output.success());
        assert!(started.elapsed() < Duration::from_secs(5), "{:?}", started.elapsed());
        assert_eq!(output.stdout, b"started\n");
    }

    #[test]
    fn large_stdin_does_not_block_a_chatty_child() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut cmd = Command::new("sh");
        // Writes more than a pipe buffer before reading stdin.
        cmd.arg("-c")
            .arg("head -c 200000 /dev/zero; wc -c")
            .current_dir(temp.path());
        let input = vec![b'x'; 200_000];
        let output =
            run_command_with_timeout(cmd, Some(&input), Duration::from_secs(10), 1_000_000)
                .expect("run");
        assert!(output.success());
        assert!(!output.timed_out);
        assert!(String::from_utf8_lossy(&output.stdout).trim_end().ends_with("200000"));
    }
}
