//! Terminal event reader over a captured output file.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::core::terminal_event::{TerminalEvent, scan_terminal_event};

/// Re-read `path` and return its last terminal event.
///
/// A missing or unreadable file yields `None`: classification must still
/// produce a label from the in-memory preview.
pub fn read_terminal_event(path: &Path) -> Option<TerminalEvent> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(path = %path.display(), err = %err, "could not read captured output");
            return None;
        }
    };
    let event = scan_terminal_event(&String::from_utf8_lossy(&bytes));
    debug!(path = %path.display(), found = event.is_some(), "scanned for terminal event");
    event
}
