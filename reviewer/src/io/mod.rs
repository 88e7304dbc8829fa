//! I/O helpers for review commands.

pub mod agents;
pub mod audit_log;
pub mod config;
pub mod plan;
pub mod process;
pub mod transcript;
