//! Automated plan review with a primary and a fallback reviewer CLI.
//!
//! A plan document is handed to a primary reviewer; its run is classified into
//! a fixed outcome label, a decision matrix picks between a fallback reviewer
//! and human escalation, and every attempt lands in an append-only audit log.
//!
//! - **[`core`]**: Pure, deterministic logic (labels, phrase policy, terminal
//!   event scanning, classification, decision matrix, audit lines).
//! - **[`io`]**: Side-effecting operations (process execution, files, config).
//!
//! Orchestration modules ([`review`], [`preflight`]) coordinate core logic with
//! I/O to implement the `plan-review` command.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod preflight;
pub mod review;
pub mod settings;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
