//! Apply the policy gate to a whole plan.
//!
//! [`ApprovedPlan`] can only be built here, so every command the executor sees
//! has passed [`PolicyTable::validate`] or is the start sentinel.

use serde::Serialize;

use crate::core::policy::{Decision, PolicyTable, Rejection};
use crate::core::types::{Command, Plan};

/// A proposed command failed the policy gate. Nothing may execute.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("blocked command `{command}`: {rejection}")]
pub struct PolicyViolationError {
    pub command: String,
    pub rejection: Rejection,
}

/// Why a command was dropped without failing the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The server is already up, so starting it again is pointless.
    ServerAlreadyRunning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedCommand {
    pub command: Command,
    pub reason: SkipReason,
}

/// Commands of a plan that passed screening, in original order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovedPlan {
    commands: Vec<Command>,
    #[serde(skip)]
    skipped: Vec<SkippedCommand>,
}

impl ApprovedPlan {
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn skipped(&self) -> &[SkippedCommand] {
        &self.skipped
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Inputs to screening besides the policy table.
#[derive(Debug, Clone)]
pub struct ScreenContext<'a> {
    pub server_running: bool,
    /// Commands that start the server in the foreground (e.g. `make run`).
    /// The start sentinel is never listed here; it always reaches the supervisor.
    pub start_commands: &'a [String],
}

/// Validate every command of `plan`; the first rejection fails the whole plan.
pub fn screen_plan(
    plan: &Plan,
    policy: &PolicyTable,
    ctx: &ScreenContext<'_>,
) -> Result<ApprovedPlan, PolicyViolationError> {
    let mut commands = Vec::new();
    let mut skipped = Vec::new();

    for command in plan.commands() {
        if ctx.server_running && ctx.start_commands.contains(&command.text) {
            skipped.push(SkippedCommand {
                command: command.clone(),
                reason: SkipReason::ServerAlreadyRunning,
            });
            continue;
        }
        if let Decision::Rejected(rejection) = policy.validate(&command.text) {
            return Err(PolicyViolationError {
                command: command.text.clone(),
                rejection,
            });
        }
        commands.push(command.clone());
    }

    Ok(ApprovedPlan { commands, skipped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{cmd, plan_of};

    fn start_commands() -> Vec<String> {
        vec!["make run".to_string(), "./scripts/dev.sh".to_string()]
    }

    #[test]
    fn approves_allowed_commands_in_order() {
        let plan = plan_of(&["ls", "__START_SERVER_BG__", "python3 scripts/smoke_test.py"]);
        let starts = start_commands();
        let approved = screen_plan(
            &plan,
            &PolicyTable::project_default(),
            &ScreenContext {
                server_running: false,
                start_commands: &starts,
            },
        )
        .expect("approved");
        let texts: Vec<&str> = approved.commands().iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["ls", "__START_SERVER_BG__", "python3 scripts/smoke_test.py"]);
        assert!(approved.skipped().is_empty());
    }

    #[test]
    fn first_rejection_fails_the_plan() {
        let plan = plan_of(&["ls", "rm -rf /", "git push"]);
        let starts = start_commands();
        let err = screen_plan(
            &plan,
            &PolicyTable::project_default(),
            &ScreenContext {
                server_running: false,
                start_commands: &starts,
            },
        )
        .unwrap_err();
        assert_eq!(err.command, "rm -rf /");
        assert!(err.to_string().contains("blocked command `rm -rf /`"));
    }

    #[test]
    fn start_commands_are_skipped_when_server_running() {
        let plan = plan_of(&["make run", "ls", "./scripts/dev.sh"]);
        let starts = start_commands();
        let approved = screen_plan(
            &plan,
            &PolicyTable::project_default(),
            &ScreenContext {
                server_running: true,
                start_commands: &starts,
            },
        )
        .expect("approved");
        assert_eq!(approved.commands(), &[cmd("ls")]);
        assert_eq!(approved.skipped().len(), 2);
        assert!(
            approved
                .skipped()
                .iter()
                .all(|s| s.reason == SkipReason::ServerAlreadyRunning)
        );
    }

    #[test]
    fn sentinel_is_kept_when_server_running() {
        let plan = Plan::new("s", vec![Command::start_server("boot"), cmd("make run")], "n");
        let starts = start_commands();
        let approved = screen_plan(
            &plan,
            &PolicyTable::project_default(),
            &ScreenContext {
                server_running: true,
                start_commands: &starts,
            },
        )
        .expect("approved");
        assert_eq!(approved.commands().len(), 1);
        assert!(approved.commands()[0].is_sentinel());
        assert_eq!(approved.skipped().len(), 1);
        assert_eq!(approved.skipped()[0].command.text, "make run");
    }

    #[test]
    fn start_commands_are_validated_when_server_down() {
        let plan = plan_of(&["./scripts/dev.sh"]);
        let starts = start_commands();
        let err = screen_plan(
            &plan,
            &PolicyTable::project_default(),
            &ScreenContext {
                server_running: false,
                start_commands: &starts,
            },
        )
        .unwrap_err();
        assert!(matches!(err.rejection, Rejection::VerbNotAllowed { .. }));
    }
}
