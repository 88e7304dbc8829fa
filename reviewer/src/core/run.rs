//! Request/result records for a single external command run.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default size of the trailing output preview, in characters.
pub const DEFAULT_PREVIEW_LIMIT: usize = 24_000;

/// Parameters for one external command run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub command: String,
    pub args: Vec<String>,
    /// Variables set on top of the inherited environment.
    pub env: BTreeMap<String, String>,
    pub workdir: PathBuf,
    pub timeout: Duration,
    /// Receives the raw interleaved stdout/stderr bytes (truncated first).
    pub output_file: PathBuf,
    pub preview_limit: usize,
}

impl RunRequest {
    /// `command arg1 arg2 ...` for logs and reports.
    pub fn display_command(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.command.as_str());
        parts.extend(self.args.iter().map(String::as_str));
        parts.join(" ").trim().to_string()
    }
}

/// Observed result of a finished (or killed) command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    /// `-1` when the process ended without an observable exit code.
    pub exit_code: i32,
    /// Terminating signal name (e.g. `SIGTERM`), empty when none.
    pub signal: String,
    /// The timeout fired, even if the process exited during the grace window.
    pub timed_out: bool,
    pub elapsed_seconds: u64,
    pub output_bytes: u64,
    /// Trailing window of the combined output.
    pub preview: String,
}

impl RunResult {
    pub fn has_output(&self) -> bool {
        self.output_bytes > 0
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Keep only the last `limit` characters of `text`.
pub fn tail_chars(text: &str, limit: usize) -> &str {
    let count = text.chars().count();
    if count <= limit {
        return text;
    }
    let skip = count - limit;
    match text.char_indices().nth(skip) {
        Some((idx, _)) => &text[idx..],
        None => "",
    }
}
