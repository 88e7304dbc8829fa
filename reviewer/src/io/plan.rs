//! Plan document loading.
//!
//! The plan's own schema is opaque here: it is read as text and handed to the
//! reviewers verbatim.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Read the plan document as UTF-8 text.
pub fn read_plan(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read plan {}", path.display()))
}

/// Plan id derived from the file stem, each whitespace run replaced by `_`.
///
/// Leading and trailing runs are replaced too, so ` plan .json` and
/// `plan.json` get distinct audit identities.
pub fn default_plan_id(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut id = String::with_capacity(stem.len());
    let mut in_run = false;
    for ch in stem.chars() {
        if ch.is_whitespace() {
            if !in_run {
                id.push('_');
            }
            in_run = true;
        } else {
            id.push(ch);
            in_run = false;
        }
    }
    id
}
