//! Policy-gated command orchestrator.
//!
//! Turns a natural-language goal into a plan of shell commands, screens every
//! command against an allow/deny policy, asks for confirmation, runs the
//! approved commands fail-fast and keeps an append-only session history.
//!
//! - **[`core`]**: Pure logic (policy, plan parsing, shortcuts, screening).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side effects (files, child processes, HTTP) behind traits
//!   that tests replace with scripted fakes.
//!
//! [`planner`], [`executor`], [`summarize`] and [`orchestrator`] combine the
//! two; [`cli`] is the command-line surface.

pub mod cli;
pub mod core;
pub mod executor;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod planner;
pub mod summarize;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
