//! One goal, end to end: plan, screen, confirm, execute, summarize.

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::policy::PolicyTable;
use crate::core::screen::{ApprovedPlan, ScreenContext, screen_plan};
use crate::executor::{ExecutionReport, Executor, ExecutorSettings, StepEvent};
use crate::io::config::PilotConfig;
use crate::io::health::HealthProbe;
use crate::io::llm::CompletionClient;
use crate::io::paths::ProjectPaths;
use crate::io::process::CommandRunner;
use crate::io::session_store::SessionStore;
use crate::io::supervisor::ProcessSupervisor;
use crate::planner::{PlannedGoal, Planner};
use crate::summarize::summarize;

/// Progress reported while a goal is handled.
#[derive(Debug)]
pub enum RunEvent<'a> {
    /// Planning and screening succeeded; shown before confirmation.
    Planned {
        planned: &'a PlannedGoal,
        approved: &'a ApprovedPlan,
    },
    Step(StepEvent<'a>),
}

/// How handling a goal ended. Every variant is a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing left to run after screening.
    NoCommands { planned: PlannedGoal },
    /// The user answered no at the confirmation gate.
    Declined { planned: PlannedGoal },
    /// Plan shown, nothing executed.
    DryRun {
        planned: PlannedGoal,
        approved: ApprovedPlan,
    },
    Executed {
        planned: PlannedGoal,
        report: ExecutionReport,
        /// Recap from the collaborator, absent when it failed.
        summary: Option<String>,
    },
}

/// Per-goal switches from the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub server_running: bool,
    pub dry_run: bool,
}

/// Everything needed to handle goals for one project directory.
pub struct Orchestrator<'a, C, R, P>
where
    C: CompletionClient + ?Sized,
    R: CommandRunner + ?Sized,
    P: HealthProbe + ?Sized,
{
    pub paths: &'a ProjectPaths,
    pub config: &'a PilotConfig,
    pub policy: &'a PolicyTable,
    pub client: &'a C,
    pub runner: &'a R,
    pub probe: &'a P,
    pub supervisor: &'a mut ProcessSupervisor,
}

impl<C, R, P> Orchestrator<'_, C, R, P>
where
    C: CompletionClient + ?Sized,
    R: CommandRunner + ?Sized,
    P: HealthProbe + ?Sized,
{
    /// Handle `goal`.
    ///
    /// Errors are reserved for planner failures (including
    /// [`PlanParseError`](crate::core::plan_parse::PlanParseError)) and
    /// [`PolicyViolationError`](crate::core::screen::PolicyViolationError);
    /// in both cases nothing was executed.
    #[instrument(skip(self, confirm, on_event))]
    pub fn run_goal<Conf, Ev>(
        &mut self,
        goal: &str,
        options: RunOptions,
        confirm: Conf,
        mut on_event: Ev,
    ) -> Result<RunOutcome>
    where
        Conf: FnOnce(&ApprovedPlan) -> bool,
        Ev: FnMut(RunEvent<'_>),
    {
        let mut store = SessionStore::load(&self.paths.session_path);

        let planner = Planner::new(self.client, self.config, self.policy, &self.paths.root);
        let planned = planner.plan(goal, store.session(), options.server_running)?;

        let approved = screen_plan(
            &planned.plan,
            self.policy,
            &ScreenContext {
                server_running: options.server_running,
                start_commands: &self.config.server.start_commands,
            },
        )?;
        for skipped in approved.skipped() {
            info!(command = %skipped.command.text, "skipping server start, already running");
        }
        on_event(RunEvent::Planned {
            planned: &planned,
            approved: &approved,
        });

        if approved.is_empty() {
            return Ok(RunOutcome::NoCommands { planned });
        }
        if options.dry_run {
            return Ok(RunOutcome::DryRun { planned, approved });
        }
        if !confirm(&approved) {
            info!("plan declined");
            return Ok(RunOutcome::Declined { planned });
        }

        let settings = ExecutorSettings {
            goal: goal.to_string(),
            health_url: self.config.server.health_url(),
            health_attempts: self.config.server.health_attempts,
            health_interval: self.config.server.health_interval(),
            preview_chars: self.config.execution.preview_chars,
        };
        let mut report = Executor::new(self.runner, self.probe, &mut *self.supervisor, settings).run(
            &approved,
            &mut store,
            |event| on_event(RunEvent::Step(event)),
        );

        let summary = match summarize(
            self.client,
            goal,
            &report.transcript,
            self.config.planner.summary_temperature,
        ) {
            Ok(summary) => Some(summary),
            Err(err) => {
                warn!(err = %format!("{err:#}"), "summary unavailable");
                report.notices.push(format!("summary unavailable: {err:#}"));
                None
            }
        };

        Ok(RunOutcome::Executed {
            planned,
            report,
            summary,
        })
    }
}
