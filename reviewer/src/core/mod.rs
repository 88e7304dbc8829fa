//! Deterministic, pure logic for plan review classification.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data (run results, transcripts, log text) and return deterministic outputs
//! suitable for tests.

pub mod audit;
pub mod classifier;
pub mod decision;
pub mod phrases;
pub mod run;
pub mod terminal_event;
pub mod types;
