//! Stable exit codes for the `pilot` CLI.

/// Goal handled: executed (even if a step failed), nothing to run, declined, or dry run.
pub const OK: i32 = 0;
/// Runtime failure outside the plan (config, I/O, planner transport).
pub const FAILURE: i32 = 1;
/// The planner credential environment variable is unset or empty.
pub const MISSING_CREDENTIAL: i32 = 1;
/// No goal words were given.
pub const MISSING_GOAL: i32 = 2;
/// The planner reply could not be read as a plan.
pub const PLAN_FAILED: i32 = 3;
/// A proposed command was rejected by the policy; nothing ran.
pub const POLICY_VIOLATION: i32 = 4;
