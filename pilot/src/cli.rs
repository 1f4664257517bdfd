//! Command-line surface: arguments, confirmation prompt, rendering, exit codes.

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;

use crate::core::plan_parse::PlanParseError;
use crate::core::policy::PolicyTable;
use crate::core::screen::{ApprovedPlan, PolicyViolationError};
use crate::core::transcript::truncate_chars;
use crate::executor::{ExecutionStop, StepEvent};
use crate::exit_codes;
use crate::io::config::{PilotConfig, load_config};
use crate::io::health::{HttpProbe, is_server_running};
use crate::io::llm::OpenAiClient;
use crate::io::paths::ProjectPaths;
use crate::io::process::ShellRunner;
use crate::io::supervisor::{ProcessSupervisor, ServerSpec};
use crate::orchestrator::{Orchestrator, RunEvent, RunOptions, RunOutcome};
use crate::planner::PlannedGoal;

#[derive(Debug, Parser)]
#[command(
    name = "pilot",
    version,
    about = "Plan, screen and run shell commands for a natural-language goal"
)]
pub struct Cli {
    /// Project directory the commands run in.
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
    /// Run the approved plan without asking for confirmation.
    #[arg(short = 'y', long)]
    pub yes: bool,
    /// Show the approved plan and exit without running anything.
    #[arg(long)]
    pub dry_run: bool,
    /// Stop a server started by this run instead of leaving it running.
    #[arg(long)]
    pub stop_server: bool,
    /// What you want done, in plain words.
    #[arg(trailing_var_arg = true)]
    pub goal: Vec<String>,
}

impl Cli {
    /// Goal words joined with single spaces and trimmed.
    pub fn goal_text(&self) -> String {
        self.goal.join(" ").trim().to_string()
    }
}

/// Run the CLI and return the process exit code.
pub fn run(cli: &Cli) -> i32 {
    match execute(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            exit_code_for(&err)
        }
    }
}

/// Map an error that ended a run to its exit code.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<PolicyViolationError>().is_some() {
        exit_codes::POLICY_VIOLATION
    } else if err.downcast_ref::<PlanParseError>().is_some() {
        exit_codes::PLAN_FAILED
    } else {
        exit_codes::FAILURE
    }
}

fn execute(cli: &Cli) -> Result<i32> {
    let root = cli
        .root
        .canonicalize()
        .with_context(|| format!("resolve project root {}", cli.root.display()))?;
    let paths = ProjectPaths::new(&root);
    let config = load_config(&paths.config_path)?;

    let api_key = match env::var(&config.planner.api_key_env) {
        Ok(key) if !key.trim().is_empty() => key,
        _ => {
            eprintln!("ERROR: {} is not set.", config.planner.api_key_env);
            return Ok(exit_codes::MISSING_CREDENTIAL);
        }
    };

    let goal = cli.goal_text();
    if goal.is_empty() {
        eprintln!("Usage: pilot [OPTIONS] <GOAL>...");
        return Ok(exit_codes::MISSING_GOAL);
    }

    let server_running = is_server_running(&config.server.host, config.server.port);
    println!("Goal: {goal}");
    println!("Project: {}", root.display());
    println!("Server running: {server_running}");

    let client = OpenAiClient::new(
        &config.planner.api_base,
        api_key,
        &config.planner.model,
        std::time::Duration::from_secs(config.planner.request_timeout_secs),
    );
    let runner = ShellRunner::new(
        &root,
        config.execution.output_limit_bytes,
        config.execution.command_timeout(),
    );
    let probe = HttpProbe::new();
    let policy = PolicyTable::project_default();
    let mut supervisor = ProcessSupervisor::new(ServerSpec {
        command: config.server.command.clone(),
        workdir: root.clone(),
        log_path: paths.server_log_path.clone(),
        stop_grace: config.server.stop_grace(),
    });

    let display_chars = config.execution.display_chars;
    let asks = !cli.yes && !cli.dry_run;
    let outcome = Orchestrator {
        paths: &paths,
        config: &config,
        policy: &policy,
        client: &client,
        runner: &runner,
        probe: &probe,
        supervisor: &mut supervisor,
    }
    .run_goal(
        &goal,
        RunOptions {
            server_running,
            dry_run: cli.dry_run,
        },
        |_| !asks || confirm_on_stdin("Execute these commands now?"),
        |event| print!("{}", render_event(&event, display_chars)),
    )?;

    report_outcome(&outcome);
    finish_server(&mut supervisor, &config, cli.stop_server);
    println!("Done.");
    Ok(exit_codes::OK)
}

fn report_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::NoCommands { .. } => println!("No commands to run."),
        RunOutcome::Declined { .. } => println!("Cancelled."),
        RunOutcome::DryRun { .. } => println!("Dry run: nothing executed."),
        RunOutcome::Executed {
            report, summary, ..
        } => {
            if let ExecutionStop::Failed { exit_code, .. } = &report.stop {
                println!("Command failed with exit code {exit_code}. Stopped.");
            }
            for notice in &report.notices {
                println!("Note: {notice}");
            }
            if let Some(summary) = summary {
                println!("\nRecap:\n{summary}");
            }
        }
    }
}

fn finish_server(supervisor: &mut ProcessSupervisor, config: &PilotConfig, stop: bool) {
    let Some(pid) = supervisor.handle().map(|h| h.pid) else {
        return;
    };
    if stop {
        supervisor.stop();
        println!("Stopped background server (pid={pid}).");
    } else {
        println!(
            "Server is running in the background (pid={pid}, `{}`), logging to .server.log.\nStop it with `kill {pid}`, or pass --stop-server next time.",
            config.server.command
        );
    }
}

fn confirm_on_stdin(prompt: &str) -> bool {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut stdout = io::stdout();
    match prompt_yes_no(&mut input, &mut stdout, prompt) {
        Ok(answer) => answer,
        Err(err) => {
            debug!(err = %err, "confirmation prompt failed, treating as no");
            false
        }
    }
}

/// Ask until the answer is yes or no. Empty input and end of input mean no.
pub fn prompt_yes_no<I: BufRead, W: Write>(input: &mut I, out: &mut W, prompt: &str) -> io::Result<bool> {
    loop {
        write!(out, "{prompt} [y/N] ")?;
        out.flush()?;
        let mut buf = String::new();
        if input.read_line(&mut buf)? == 0 {
            writeln!(out)?;
            return Ok(false);
        }
        match buf.trim().to_lowercase().as_str() {
            "" | "n" | "no" => return Ok(false),
            "y" | "yes" => return Ok(true),
            _ => writeln!(out, "Please answer 'y' or 'n'.")?,
        }
    }
}

/// Text shown for one orchestrator event.
pub fn render_event(event: &RunEvent<'_>, display_chars: usize) -> String {
    match event {
        RunEvent::Planned { planned, approved } => render_plan(planned, approved),
        RunEvent::Step(StepEvent::Started {
            index,
            total,
            command,
        }) => {
            let mut text = format!("\n[{}/{}] {}\n", index + 1, total, command.text);
            if !command.rationale.is_empty() {
                text.push_str(&format!("    {}\n", command.rationale));
            }
            text
        }
        RunEvent::Step(StepEvent::Finished {
            record,
            stdout,
            stderr,
            ..
        }) => {
            let mut text = String::new();
            if !stdout.is_empty() {
                text.push_str(&format!("--- stdout ---\n{}\n", truncate_chars(stdout, display_chars)));
            }
            if !stderr.is_empty() {
                text.push_str(&format!("--- stderr ---\n{}\n", truncate_chars(stderr, display_chars)));
            }
            text.push_str(&format!("(exit={})\n", record.exit_code));
            text
        }
    }
}

/// Plan summary, notes and the approved commands as JSON.
pub fn render_plan(planned: &PlannedGoal, approved: &ApprovedPlan) -> String {
    let plan = &planned.plan;
    let mut text = format!("\nPlan ({}): {}\n", planned.source.as_str(), plan.summary());
    if !plan.notes().is_empty() {
        text.push_str(&format!("Notes: {}\n", plan.notes()));
    }
    for skipped in approved.skipped() {
        text.push_str(&format!(
            "Skipped (server already running): {}\n",
            skipped.command.text
        ));
    }
    if !approved.is_empty() {
        let json = serde_json::to_string_pretty(approved.commands()).unwrap_or_default();
        text.push_str(&json);
        text.push('\n');
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::policy::Rejection;
    use crate::core::screen::{ScreenContext, screen_plan};
    use crate::core::types::PlanSource;
    use crate::test_support::{plan_of, record};

    #[test]
    fn goal_words_are_joined() {
        let cli = Cli::parse_from(["pilot", "--yes", "run", "the", "tests"]);
        assert!(cli.yes);
        assert_eq!(cli.goal_text(), "run the tests");

        let empty = Cli::parse_from(["pilot"]);
        assert_eq!(empty.goal_text(), "");
    }

    #[test]
    fn typed_errors_map_to_exit_codes() {
        let violation = anyhow::Error::new(PolicyViolationError {
            command: "rm -rf /".to_string(),
            rejection: Rejection::Empty,
        });
        assert_eq!(exit_code_for(&violation), exit_codes::POLICY_VIOLATION);

        let parse = anyhow::Error::new(PlanParseError {
            reasons: vec!["no json".to_string()],
            excerpt: "hello".to_string(),
        })
        .context("plan goal");
        assert_eq!(exit_code_for(&parse), exit_codes::PLAN_FAILED);

        assert_eq!(exit_code_for(&anyhow::anyhow!("boom")), exit_codes::FAILURE);
    }

    #[test]
    fn prompt_defaults_to_no() {
        let mut out = Vec::new();
        assert!(!prompt_yes_no(&mut "\n".as_bytes(), &mut out, "Go?").expect("prompt"));
        assert!(!prompt_yes_no(&mut "".as_bytes(), &mut out, "Go?").expect("prompt"));
        assert!(prompt_yes_no(&mut "maybe\nYes\n".as_bytes(), &mut out, "Go?").expect("prompt"));
        let shown = String::from_utf8(out).expect("utf8");
        assert!(shown.contains("Go? [y/N] "));
        assert!(shown.contains("Please answer"));
    }

    #[test]
    fn plan_rendering_lists_approved_commands_and_skips() {
        let planned = PlannedGoal {
            plan: plan_of(&["make run", "ls"]),
            source: PlanSource::Delegated,
        };
        let starts = vec!["make run".to_string()];
        let approved = screen_plan(
            &planned.plan,
            &PolicyTable::project_default(),
            &ScreenContext {
                server_running: true,
                start_commands: &starts,
            },
        )
        .expect("approved");

        let text = render_plan(&planned, &approved);
        assert!(text.contains("Plan (delegated): summary"));
        assert!(text.contains("Notes: notes"));
        assert!(text.contains("Skipped (server already running): make run"));
        assert!(text.contains("\"cmd\": \"ls\""));
        assert!(!text.contains("\"cmd\": \"make run\""));
    }

    #[test]
    fn step_output_is_bounded_for_display() {
        let record = record("cat big.log", 0);
        let stdout = "x".repeat(50);
        let text = render_event(
            &RunEvent::Step(StepEvent::Finished {
                index: 0,
                total: 1,
                record: &record,
                stdout: &stdout,
                stderr: "",
            }),
            10,
        );
        assert_eq!(text, format!("--- stdout ---\n{}\n(exit=0)\n", "x".repeat(10)));
    }
}
