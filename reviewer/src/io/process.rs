//! Running reviewer commands with a hard timeout and captured output.
//!
//! stdout and stderr are drained concurrently into one output file and one
//! bounded preview. On timeout the child gets a graceful terminate signal,
//! then a kill once the grace period passes.
//!
//! Descendants of the child can inherit its pipes and keep them open after
//! the child itself is gone. Readers get [`DRAIN_GRACE_PERIOD`] after the exit
//! to reach end of file; after that the capture is closed with whatever
//! arrived and the readers are left behind.

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use thiserror::Error;
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::run::{RunRequest, RunResult, tail_chars};

/// Time between the terminate signal and the forced kill.
pub const KILL_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Time the output pipes may stay open after the child has exited.
pub const DRAIN_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// The command could not be started at all.
#[derive(Debug, Error)]
#[error("failed to spawn `{command}`: {source}")]
pub struct SpawnError {
    pub command: String,
    #[source]
    pub source: std::io::Error,
}

impl SpawnError {
    /// The executable does not exist (or is not on `PATH`).
    pub fn is_not_found(&self) -> bool {
        self.source.kind() == ErrorKind::NotFound
    }
}

/// Abstraction over command execution.
///
/// Tests use scripted runners that write canned output instead of spawning.
pub trait CommandRunner {
    /// Run `request` to completion (or timeout). A command that cannot be
    /// spawned must fail with [`SpawnError`].
    fn run(&self, request: &RunRequest) -> Result<RunResult>;
}

/// Runner that spawns real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, request: &RunRequest) -> Result<RunResult> {
        run_command(request)
    }
}

/// Spawn `request.command`, capture combined output, and enforce the timeout.
#[instrument(skip_all, fields(command = %request.command, timeout_secs = request.timeout.as_secs()))]
pub fn run_command(request: &RunRequest) -> Result<RunResult> {
    let start = Instant::now();

    if let Some(parent) = request.output_file.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create output dir {}", parent.display()))?;
    }
    let file = File::create(&request.output_file)
        .with_context(|| format!("create output file {}", request.output_file.display()))?;

    let mut cmd = Command::new(&request.command);
    cmd.args(&request.args)
        .envs(&request.env)
        .current_dir(&request.workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(SpawnError {
                command: request.command.clone(),
                source: e,
            }
            .into());
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

    let sink = Arc::new(Mutex::new(CaptureSink::new(file, request.preview_limit)));
    let (done_tx, done_rx) = mpsc::channel();
    spawn_reader(stdout, Arc::clone(&sink), done_tx.clone());
    spawn_reader(stderr, Arc::clone(&sink), done_tx);

    let (status, timed_out) = wait_with_timeout(&mut child, request.timeout)?;

    if !await_readers(&done_rx, 2, DRAIN_GRACE_PERIOD)? {
        warn!(
            grace_secs = DRAIN_GRACE_PERIOD.as_secs(),
            "output pipes still open after exit, closing capture"
        );
    }

    let Captured { preview, bytes } = sink
        .lock()
        .map_err(|_| anyhow!("output capture lock poisoned"))?
        .close()
        .with_context(|| format!("write output file {}", request.output_file.display()))?;

    let result = RunResult {
        exit_code: status.code().unwrap_or(-1),
        signal: signal_name(&status),
        timed_out,
        elapsed_seconds: start.elapsed().as_secs_f64().round() as u64,
        output_bytes: bytes,
        preview,
    };
    debug!(
        exit_code = result.exit_code,
        signal = %result.signal,
        timed_out,
        output_bytes = result.output_bytes,
        "command finished"
    );
    Ok(result)
}

/// Wait for exit; on timeout terminate, wait out the grace period, then kill.
///
/// The returned flag is true whenever the timer fired.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<(ExitStatus, bool)> {
    if let Some(status) = child.wait_timeout(timeout).context("wait for command")? {
        return Ok((status, false));
    }

    warn!(timeout_secs = timeout.as_secs(), "command timed out, terminating");
    request_termination(child);
    if let Some(status) = child
        .wait_timeout(KILL_GRACE_PERIOD)
        .context("wait for command after terminate")?
    {
        return Ok((status, true));
    }

    warn!(
        grace_secs = KILL_GRACE_PERIOD.as_secs(),
        "command ignored terminate, killing"
    );
    if let Err(err) = child.kill() {
        warn!(err = %err, "kill failed");
    }
    let status = child.wait().context("wait command after kill")?;
    Ok((status, true))
}

#[cfg(unix)]
fn request_termination(child: &mut Child) {
    let pid = child.id().to_string();
    let sent = Command::new("kill")
        .args(["-TERM", &pid])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match sent {
        Ok(status) if status.success() => {}
        Ok(status) => {
            warn!(exit_code = ?status.code(), "kill -TERM failed, killing");
            let _ = child.kill();
        }
        Err(err) => {
            warn!(err = %err, "could not run kill -TERM, killing");
            let _ = child.kill();
        }
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) {
    if let Err(err) = child.kill() {
        warn!(err = %err, "terminate failed");
    }
}

#[cfg(unix)]
fn signal_name(status: &ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;

    match status.signal() {
        None => String::new(),
        Some(1) => "SIGHUP".to_string(),
        Some(2) => "SIGINT".to_string(),
        Some(9) => "SIGKILL".to_string(),
        Some(15) => "SIGTERM".to_string(),
        Some(other) => format!("SIG{other}"),
    }
}

#[cfg(not(unix))]
fn signal_name(_status: &ExitStatus) -> String {
    String::new()
}

fn spawn_reader<R: Read + Send + 'static>(
    reader: R,
    sink: Arc<Mutex<CaptureSink>>,
    done: Sender<Result<()>>,
) {
    thread::spawn(move || {
        let _ = done.send(pump(reader, &sink));
    });
}

fn pump<R: Read>(mut reader: R, sink: &Mutex<CaptureSink>) -> Result<()> {
    let mut chunk = [0u8; 8192];
    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err).context("read output"),
        };
        let mut guard = sink
            .lock()
            .map_err(|_| anyhow!("output capture lock poisoned"))?;
        guard.push(&chunk[..n]);
    }
    Ok(())
}

/// Wait for `readers` completions, at most `grace` in total.
///
/// Returns false when the grace period ran out first.
fn await_readers(done: &Receiver<Result<()>>, readers: usize, grace: Duration) -> Result<bool> {
    let deadline = Instant::now() + grace;
    for _ in 0..readers {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match done.recv_timeout(remaining) {
            Ok(result) => result?,
            Err(RecvTimeoutError::Timeout) => return Ok(false),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(anyhow!("output reader thread panicked"));
            }
        }
    }
    Ok(true)
}

/// Shared destination of both output streams.
struct CaptureSink {
    file: BufWriter<File>,
    preview: PreviewBuffer,
    bytes: u64,
    write_error: Option<std::io::Error>,
    closed: bool,
}

/// What a closed capture hands back.
struct Captured {
    preview: String,
    bytes: u64,
}

impl CaptureSink {
    fn new(file: File, preview_limit: usize) -> Self {
        Self {
            file: BufWriter::new(file),
            preview: PreviewBuffer::new(preview_limit),
            bytes: 0,
            write_error: None,
            closed: false,
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        // Late output from readers left behind after close is dropped.
        if self.closed {
            return;
        }
        self.bytes += chunk.len() as u64;
        self.preview.push(chunk);
        if self.write_error.is_some() {
            return;
        }
        // Flush per chunk so the file can be tailed while the reviewer runs.
        if let Err(err) = self
            .file
            .write_all(chunk)
            .and_then(|()| self.file.flush())
        {
            warn!(err = %err, "failed to write captured output");
            self.write_error = Some(err);
        }
    }

    /// Stop accepting output and return what was captured.
    fn close(&mut self) -> std::io::Result<Captured> {
        self.closed = true;
        if let Some(err) = self.write_error.take() {
            return Err(err);
        }
        self.file.flush()?;
        let preview = std::mem::replace(&mut self.preview, PreviewBuffer::new(0)).finish();
        Ok(Captured {
            preview,
            bytes: self.bytes,
        })
    }
}

/// Sliding window over the most recent output bytes.
///
/// Holds up to four bytes per requested character so the final text can
/// always supply `char_limit` characters of UTF-8.
struct PreviewBuffer {
    buf: Vec<u8>,
    byte_cap: usize,
    char_limit: usize,
}

impl PreviewBuffer {
    fn new(char_limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            byte_cap: char_limit.saturating_mul(4),
            char_limit,
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
        // Compact lazily to keep pushes amortised O(1).
        if self.buf.len() > self.byte_cap.saturating_mul(2).max(8192) {
            let excess = self.buf.len() - self.byte_cap;
            self.buf.drain(..excess);
        }
    }

    fn finish(self) -> String {
        let start = self.buf.len().saturating_sub(self.byte_cap);
        let mut window = &self.buf[start..];
        // Drop a partial character cut off by the window edge.
        while let Some((&first, rest)) = window.split_first() {
            if start == 0 || first & 0b1100_0000 != 0b1000_0000 {
                break;
            }
            window = rest;
        }
        let text = String::from_utf8_lossy(window);
        tail_chars(&text, self.char_limit).to_string()
    }
}
