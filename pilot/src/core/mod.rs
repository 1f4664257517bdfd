//! Deterministic, pure logic shared by the orchestrator.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod plan_parse;
pub mod policy;
pub mod screen;
pub mod shortcut;
pub mod transcript;
pub mod types;
