//! Goal → Plan, via a deterministic shortcut or the planning collaborator.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::core::plan_parse::parse_plan_reply;
use crate::core::policy::PolicyTable;
use crate::core::shortcut::{ShortcutSettings, match_intent, shortcut_plan};
use crate::core::types::{Plan, PlanSource, Session};
use crate::io::config::PilotConfig;
use crate::io::llm::{CompletionClient, CompletionRequest};
use crate::io::prompt::{PlannerPromptInputs, PromptBuilder};

/// A plan together with the path that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedGoal {
    pub plan: Plan,
    pub source: PlanSource,
}

/// Produces plans for goals. Holds no state between calls.
pub struct Planner<'a, C: CompletionClient + ?Sized> {
    client: &'a C,
    config: &'a PilotConfig,
    policy: &'a PolicyTable,
    root: &'a Path,
}

impl<'a, C: CompletionClient + ?Sized> Planner<'a, C> {
    pub fn new(client: &'a C, config: &'a PilotConfig, policy: &'a PolicyTable, root: &'a Path) -> Self {
        Self {
            client,
            config,
            policy,
            root,
        }
    }

    /// Plan `goal`. Recognized phrasings never reach the collaborator.
    ///
    /// A reply that cannot be read as a plan fails with
    /// [`PlanParseError`](crate::core::plan_parse::PlanParseError).
    #[instrument(skip(self, session), fields(history = session.history.len()))]
    pub fn plan(&self, goal: &str, session: &Session, server_running: bool) -> Result<PlannedGoal> {
        if let Some(intent) = match_intent(goal) {
            info!(?intent, "goal matched shortcut");
            let settings = ShortcutSettings {
                health_url: self.config.server.health_url(),
                smoke_command: self.config.execution.smoke_command.clone(),
            };
            return Ok(PlannedGoal {
                plan: shortcut_plan(intent, server_running, &settings),
                source: PlanSource::Shortcut,
            });
        }

        let system = self.planner_prompt(goal, session, server_running)?;
        let request = CompletionRequest {
            system,
            user: goal.to_string(),
            temperature: self.config.planner.temperature,
        };
        let reply = self
            .client
            .complete(&request)
            .context("request plan from planner")?;
        debug!(reply_bytes = reply.len(), "planner replied");

        let plan = parse_plan_reply(&reply)?;
        info!(commands = plan.commands().len(), "planner proposed plan");
        Ok(PlannedGoal {
            plan,
            source: PlanSource::Delegated,
        })
    }

    fn planner_prompt(&self, goal: &str, session: &Session, server_running: bool) -> Result<String> {
        let health_url = self.config.server.health_url();
        let inputs = PlannerPromptInputs {
            project_root: self.root.display().to_string(),
            goal,
            allowed_verbs: self.policy.allowed_verbs(),
            server_command: &self.config.server.command,
            smoke_command: &self.config.execution.smoke_command,
            health_url: &health_url,
            server_running,
            history: session.recent(self.config.planner.history_window),
        };
        PromptBuilder::new(self.config.planner.prompt_budget_bytes).build_planner(&inputs)
    }
}
