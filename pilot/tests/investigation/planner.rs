//! Investigation tests for the live planner and summarizer.
//!
//! These check that a real model follows the plan reply format closely enough
//! for the parser and the policy, using the default model settings.
//!
//! # Prerequisites
//!
//! - Network access to the configured API base
//! - `OPENAI_API_KEY` set to a valid credential
//!
//! # Running
//!
//! ```bash
//! cargo test -p pilot --test investigation_llm -- --ignored
//! ```

use std::path::Path;
use std::time::Duration;

use pilot::core::policy::PolicyTable;
use pilot::core::screen::{ScreenContext, screen_plan};
use pilot::core::types::{PlanSource, Session};
use pilot::io::config::PilotConfig;
use pilot::io::llm::OpenAiClient;
use pilot::planner::Planner;
use pilot::summarize::summarize;

fn live_client(config: &PilotConfig) -> OpenAiClient {
    let key = std::env::var(&config.planner.api_key_env)
        .expect("set OPENAI_API_KEY to run investigation tests");
    OpenAiClient::new(
        &config.planner.api_base,
        key,
        &config.planner.model,
        Duration::from_secs(config.planner.request_timeout_secs),
    )
}

/// A plain listing goal yields a parseable plan whose commands pass the policy.
#[test]
#[ignore]
fn live_plan_parses_and_passes_policy() {
    let config = PilotConfig::default();
    let policy = PolicyTable::project_default();
    let client = live_client(&config);
    let planner = Planner::new(&client, &config, &policy, Path::new("."));

    let planned = planner
        .plan("list the files in the project root", &Session::default(), false)
        .expect("live plan");
    assert_eq!(planned.source, PlanSource::Delegated);
    println!("plan: {:#?}", planned.plan);

    let starts = config.server.start_commands.clone();
    let approved = screen_plan(
        &planned.plan,
        &policy,
        &ScreenContext {
            server_running: false,
            start_commands: &starts,
        },
    )
    .expect("live plan should pass the policy");
    assert!(!approved.is_empty(), "expected at least one command");
}

/// The summarizer returns non-empty text for a small transcript.
#[test]
#[ignore]
fn live_summary_is_non_empty() {
    let config = PilotConfig::default();
    let client = live_client(&config);
    let recap = summarize(
        &client,
        "run the tests",
        "$ make test\n(exit=2)\n\n[stderr]\nmake: *** No rule to make target 'test'.",
        config.planner.summary_temperature,
    )
    .expect("live summary");
    println!("recap: {recap}");
    assert!(!recap.is_empty());
}
