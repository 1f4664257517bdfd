//! Defensive parsing of the planning service's reply.
//!
//! The reply should be a single JSON object, but models often wrap it in
//! prose. Candidates are tried in order: the whole reply, then the span from
//! the first `{` to the last `}`. A candidate must parse as JSON and conform
//! to the plan output schema.

use std::sync::LazyLock;

use jsonschema::{Draft, Validator};
use serde::Deserialize;
use serde_json::Value;

use crate::core::transcript::truncate_chars;
use crate::core::types::{Command, Plan};

const PLAN_OUTPUT_SCHEMA: &str = include_str!("../../schemas/plan_output.schema.json");
const EXCERPT_CHARS: usize = 200;

static PLAN_VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    let schema: Value =
        serde_json::from_str(PLAN_OUTPUT_SCHEMA).expect("plan output schema should be json");
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .expect("plan output schema should compile")
});

/// The planner reply could not be turned into a plan.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("planner reply is not a valid plan ({})", .reasons.join("; "))]
pub struct PlanParseError {
    /// One reason per attempted candidate.
    pub reasons: Vec<String>,
    /// Leading part of the reply, for the error report.
    pub excerpt: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPlan {
    summary: String,
    commands: Vec<RawCommand>,
    notes: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCommand {
    cmd: String,
    rationale: Option<String>,
}

/// Parse a planner reply into a [`Plan`].
///
/// Commands with blank `cmd` are dropped; a `null` rationale becomes empty.
pub fn parse_plan_reply(reply: &str) -> Result<Plan, PlanParseError> {
    let trimmed = reply.trim();
    let mut reasons = Vec::new();

    match parse_candidate(trimmed) {
        Ok(plan) => return Ok(plan),
        Err(reason) => reasons.push(format!("whole reply: {reason}")),
    }

    match braced_span(trimmed) {
        Some(span) => match parse_candidate(span) {
            Ok(plan) => return Ok(plan),
            Err(reason) => reasons.push(format!("braced span: {reason}")),
        },
        None => reasons.push("braced span: no `{...}` found".to_string()),
    }

    Err(PlanParseError {
        reasons,
        excerpt: truncate_chars(trimmed, EXCERPT_CHARS).to_string(),
    })
}

/// Slice from the first `{` to the last `}` inclusive.
fn braced_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn parse_candidate(candidate: &str) -> Result<Plan, String> {
    let value: Value = serde_json::from_str(candidate).map_err(|err| format!("invalid json: {err}"))?;
    let violations: Vec<String> = PLAN_VALIDATOR
        .iter_errors(&value)
        .map(|err| err.to_string())
        .collect();
    if !violations.is_empty() {
        return Err(format!("schema violation: {}", violations.join(", ")));
    }
    let raw: RawPlan =
        serde_json::from_value(value).map_err(|err| format!("unexpected shape: {err}"))?;
    let commands = raw
        .commands
        .iter()
        .filter_map(|item| Command::new(&item.cmd, item.rationale.as_deref().unwrap_or_default()))
        .collect();
    Ok(Plan::new(raw.summary, commands, raw.notes))
}
