//! Short recap of a run's transcript from the collaborator.

use anyhow::{Context, Result};

use crate::io::llm::{CompletionClient, CompletionRequest};

const SUMMARIZER_SYSTEM: &str =
    "Summarize the terminal output and recommend next step. Be short and practical.";

pub fn summary_request(goal: &str, transcript: &str, temperature: f64) -> CompletionRequest {
    CompletionRequest {
        system: SUMMARIZER_SYSTEM.to_string(),
        user: format!("Goal: {goal}\n\nTerminal output:\n{transcript}"),
        temperature,
    }
}

/// Ask the collaborator for a recap. Callers treat failure as non-fatal.
pub fn summarize<C: CompletionClient + ?Sized>(
    client: &C,
    goal: &str,
    transcript: &str,
    temperature: f64,
) -> Result<String> {
    let reply = client
        .complete(&summary_request(goal, transcript, temperature))
        .context("request summary")?;
    Ok(reply.trim().to_string())
}
