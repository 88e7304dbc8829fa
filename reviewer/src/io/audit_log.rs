//! Append-only review ledger on disk.
//!
//! The log is read-then-appended without a lock: one invocation per plan id
//! at a time is a usage constraint. Each line goes out in a single
//! `write_all` on an append-mode handle so concurrent lines never interleave.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::debug;

use crate::core::audit::next_iteration;

/// UTC timestamp at second precision, e.g. `2026-10-16T09:30:00Z`.
pub fn timestamp_now() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Read the whole log; a missing log reads as empty.
pub fn read_log(path: &Path) -> Result<String> {
    match fs::read(path) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(err) => Err(err).with_context(|| format!("read audit log {}", path.display())),
    }
}

/// Next iteration number for `plan_id` derived from the log history.
pub fn detect_next_iteration(path: &Path, plan_id: &str) -> Result<u64> {
    let log = read_log(path)?;
    let next = next_iteration(&log, plan_id)?;
    debug!(path = %path.display(), plan_id, next, "detected next iteration");
    Ok(next)
}

/// Append one line (newline added) creating the log and its directory if needed.
pub fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create audit log dir {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open audit log {}", path.display()))?;
    let mut buf = String::with_capacity(line.len() + 1);
    buf.push_str(line);
    buf.push('\n');
    file.write_all(buf.as_bytes())
        .with_context(|| format!("append audit log {}", path.display()))?;
    Ok(())
}
