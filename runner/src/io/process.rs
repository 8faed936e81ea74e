//! Helpers for running child processes with streamed, bounded output.

use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, info, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn stdout_truncated_notice(&self, label: &str) -> String {
        if self.stdout_truncated > 0 {
            format!(
                "\n[{label} stdout truncated {} bytes]\n",
                self.stdout_truncated
            )
        } else {
            String::new()
        }
    }

    pub fn stderr_truncated_notice(&self, label: &str) -> String {
        if self.stderr_truncated > 0 {
            format!(
                "\n[{label} stderr truncated {} bytes]\n",
                self.stderr_truncated
            )
        } else {
            String::new()
        }
    }
}

/// Run a command to completion, streaming every output line to the log.
///
/// stdout and stderr are drained on reader threads so the child cannot block
/// on a full pipe; lines are handled on the calling thread in arrival order.
/// Each stdout line is passed to `on_stdout_line` before the capture limit is
/// applied, so callers can parse output of any size. `output_limit_bytes`
/// bounds what is kept in memory per stream.
///
/// On unix the child leads its own process group. When `timeout` expires the
/// whole group is killed and the call returns without waiting for pipes still
/// held open by descendants. With `timeout = None` the call waits indefinitely.
#[instrument(skip_all, fields(timeout_secs = timeout.map(|t| t.as_secs()), output_limit_bytes))]
pub fn run_command_streaming<F>(
    mut cmd: Command,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
    mut on_stdout_line: F,
) -> Result<CommandOutput>
where
    F: FnMut(&str),
{
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

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

    let (tx, rx) = mpsc::channel();
    spawn_reader(stdout, Stream::Stdout, tx.clone())?;
    spawn_reader(stderr, Stream::Stderr, tx)?;

    let deadline = timeout.map(|t| Instant::now() + t);
    let mut capture = Capture::new(output_limit_bytes);
    let drained = capture.drain(&rx, deadline, &mut on_stdout_line);

    let (status, timed_out) = if drained {
        wait_for_child(&mut child, deadline)?
    } else {
        (kill_after_timeout(&mut child, timeout)?, true)
    };
    if timed_out {
        // Keep whatever the readers delivered before the kill.
        while let Ok(line) = rx.try_recv() {
            capture.record(line, &mut on_stdout_line);
        }
    }

    let Capture {
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        ..
    } = capture;
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

/// Wait for a child whose output is fully drained, honouring what is left of
/// the deadline.
fn wait_for_child(child: &mut Child, deadline: Option<Instant>) -> Result<(ExitStatus, bool)> {
    let Some(deadline) = deadline else {
        return Ok((child.wait().context("wait for command")?, false));
    };
    let remaining = deadline.saturating_duration_since(Instant::now());
    match child.wait_timeout(remaining).context("wait for command")? {
        Some(status) => Ok((status, false)),
        None => Ok((kill_after_timeout(child, Some(remaining))?, true)),
    }
}

fn kill_after_timeout(child: &mut Child, timeout: Option<Duration>) -> Result<ExitStatus> {
    warn!(
        timeout_secs = timeout.map(|t| t.as_secs()),
        "command timed out, killing"
    );
    #[cfg(unix)]
    kill_process_group(child.id());
    child.kill().context("kill command")?;
    child.wait().context("wait command after kill")
}

/// SIGKILL every process in the group led by `pgid`.
#[cfg(unix)]
#[allow(unsafe_code)]
fn kill_process_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: kill(2) only takes integer arguments. The leader is not yet
    // reaped, so the group id cannot have been reused.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(err = %std::io::Error::last_os_error(), "failed to signal process group");
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// One output line, newline included.
struct Line {
    stream: Stream,
    text: String,
}

/// Forward `reader` line by line into `tx` on a detached thread.
///
/// Invalid UTF-8 is replaced rather than rejected; the tools print paths that
/// may not be valid UTF-8.
fn spawn_reader<R: Read + Send + 'static>(
    reader: R,
    stream: Stream,
    tx: Sender<Line>,
) -> Result<()> {
    thread::Builder::new()
        .name(format!("{stream:?}-reader").to_lowercase())
        .spawn(move || {
            let mut buf_reader = BufReader::new(reader);
            let mut raw = Vec::new();
            loop {
                raw.clear();
                match buf_reader.read_until(b'\n', &mut raw) {
                    Ok(0) => break,
                    Ok(_) => {
                        let text = String::from_utf8_lossy(&raw).into_owned();
                        if tx.send(Line { stream, text }).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(err = %err, ?stream, "failed to read command output");
                        break;
                    }
                }
            }
        })
        .context("spawn output reader")?;
    Ok(())
}

/// Per-stream output kept up to `limit` bytes, in whole lines.
struct Capture {
    limit: usize,
    stdout: String,
    stderr: String,
    stdout_truncated: usize,
    stderr_truncated: usize,
}

impl Capture {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            stdout: String::new(),
            stderr: String::new(),
            stdout_truncated: 0,
            stderr_truncated: 0,
        }
    }

    /// Handle lines until both readers finish (`true`) or `deadline` passes (`false`).
    fn drain(
        &mut self,
        rx: &Receiver<Line>,
        deadline: Option<Instant>,
        on_stdout_line: &mut impl FnMut(&str),
    ) -> bool {
        loop {
            let next = match deadline {
                None => rx.recv().ok(),
                Some(deadline) => {
                    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                        Ok(line) => Some(line),
                        Err(RecvTimeoutError::Disconnected) => None,
                        Err(RecvTimeoutError::Timeout) => return false,
                    }
                }
            };
            match next {
                Some(line) => self.record(line, on_stdout_line),
                None => return true,
            }
        }
    }

    fn record(&mut self, line: Line, on_stdout_line: &mut impl FnMut(&str)) {
        let trimmed = line.text.trim_end_matches(['\r', '\n']);
        let (collected, truncated) = match line.stream {
            Stream::Stdout => {
                info!(target: "output", "{trimmed}");
                on_stdout_line(trimmed);
                (&mut self.stdout, &mut self.stdout_truncated)
            }
            Stream::Stderr => {
                warn!(target: "outerr", "{trimmed}");
                (&mut self.stderr, &mut self.stderr_truncated)
            }
        };

        let remaining = self.limit.saturating_sub(collected.len());
        if line.text.len() <= remaining {
            collected.push_str(&line.text);
        } else {
            *truncated += line.text.len();
        }
    }
}
