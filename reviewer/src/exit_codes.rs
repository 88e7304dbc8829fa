//! Stable exit codes for the `plan-review` binary.

/// A reviewer approved the plan (or dry run finished).
pub const APPROVED: i32 = 0;
/// Both reviewers failed or the matrix escalated; also any internal error.
pub const HUMAN_REVIEW_NEEDED: i32 = 1;
/// Internal failure (spawn error, unwritable log); shares code 1.
pub const INTERNAL_ERROR: i32 = 1;
/// Bad flags, missing plan file or invalid config.
pub const INVALID_INVOCATION: i32 = 2;
