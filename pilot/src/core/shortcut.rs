//! Deterministic plans for recognized goal phrasings.
//!
//! A goal matches an intent when its lower-cased text contains every keyword of
//! one of the intent's rules. Matching never consults the planning service.

use crate::core::types::{Command, Plan};

/// A goal phrasing with a hard-coded plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// "start the server and run the smoke checks"
    StartServerAndSmoke,
}

struct IntentRule {
    intent: Intent,
    all_of: &'static [&'static str],
}

const INTENT_RULES: &[IntentRule] = &[
    IntentRule {
        intent: Intent::StartServerAndSmoke,
        all_of: &["start", "server", "smoke"],
    },
    IntentRule {
        intent: Intent::StartServerAndSmoke,
        all_of: &["run smoke", "server"],
    },
];

/// Settings the shortcut plans are built from.
#[derive(Debug, Clone)]
pub struct ShortcutSettings {
    pub health_url: String,
    pub smoke_command: String,
}

/// Return the first intent whose keywords all appear in `goal`.
pub fn match_intent(goal: &str) -> Option<Intent> {
    let lowered = goal.to_lowercase();
    INTENT_RULES
        .iter()
        .find(|rule| rule.all_of.iter().all(|kw| lowered.contains(kw)))
        .map(|rule| rule.intent)
}

/// Build the plan for `intent`.
///
/// The server start and health probe are included only when the server is not
/// already running.
pub fn shortcut_plan(intent: Intent, server_running: bool, settings: &ShortcutSettings) -> Plan {
    match intent {
        Intent::StartServerAndSmoke => {
            let mut commands = Vec::new();
            if !server_running {
                commands.push(Command::start_server(
                    "Start server in background via the configured start command",
                ));
                commands.push(Command {
                    text: health_probe_command(&settings.health_url),
                    rationale: "Healthcheck server returns 200".to_string(),
                });
            }
            commands.push(Command {
                text: settings.smoke_command.clone(),
                rationale: "Run the smoke tests".to_string(),
            });
            Plan::new(
                "Start server (if needed), verify health, run smoke tests.",
                commands,
                "Server start is handled in background to avoid blocking the terminal.",
            )
        }
    }
}

/// `curl` invocation that prints only the HTTP status code of `url`.
pub fn health_probe_command(url: &str) -> String {
    format!("curl -s -o /dev/null -w '%{{http_code}}' {url}")
}
