//! End-to-end orchestrator scenarios with scripted collaborators.
//!
//! These drive `Orchestrator::run_goal` through planning, screening,
//! confirmation, execution, persistence and summarizing without touching the
//! network or a real shell.

use std::cell::Cell;
use std::time::Duration;

use pilot::core::policy::PolicyTable;
use pilot::core::screen::PolicyViolationError;
use pilot::core::types::{PlanSource, START_SERVER_SENTINEL};
use pilot::executor::ExecutionStop;
use pilot::io::config::PilotConfig;
use pilot::io::paths::ProjectPaths;
use pilot::io::session_store::SessionStore;
use pilot::io::supervisor::{ProcessSupervisor, ServerSpec};
use pilot::orchestrator::{Orchestrator, RunEvent, RunOptions, RunOutcome};
use pilot::test_support::{ScriptedClient, ScriptedProbe, ScriptedRunner, output};

struct Project {
    temp: tempfile::TempDir,
    paths: ProjectPaths,
    config: PilotConfig,
    policy: PolicyTable,
}

impl Project {
    fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProjectPaths::new(temp.path());
        let mut config = PilotConfig::default();
        config.server.command = "exec sleep 30".to_string();
        config.server.health_interval_ms = 1;
        config.server.health_attempts = 2;
        Self {
            temp,
            paths,
            config,
            policy: PolicyTable::project_default(),
        }
    }

    fn supervisor(&self) -> ProcessSupervisor {
        ProcessSupervisor::new(ServerSpec {
            command: self.config.server.command.clone(),
            workdir: self.temp.path().to_path_buf(),
            log_path: self.paths.server_log_path.clone(),
            stop_grace: Duration::from_secs(2),
        })
    }

    fn history_len(&self) -> usize {
        SessionStore::load(&self.paths.session_path)
            .session()
            .history
            .len()
    }
}

fn plan_reply(commands: &[&str]) -> Result<String, String> {
    let commands: Vec<_> = commands
        .iter()
        .map(|c| serde_json::json!({"cmd": c, "rationale": "because"}))
        .collect();
    Ok(serde_json::json!({"summary": "do it", "commands": commands, "notes": ""}).to_string())
}

/// Plan `[A ok, B fails, C]`: C never runs and exactly two records persist.
#[test]
fn fail_fast_keeps_prior_records_and_summarizes() {
    let project = Project::new();
    let client = ScriptedClient::new(vec![
        plan_reply(&["echo A", "echo B", "echo C"]),
        Ok("B failed. Fix B.".to_string()),
    ]);
    let runner = ScriptedRunner::new(vec![output(0, "A", ""), output(1, "", "B broke")]);
    let probe = ScriptedProbe::always(true);
    let mut supervisor = project.supervisor();
    let mut steps = 0;

    let outcome = Orchestrator {
        paths: &project.paths,
        config: &project.config,
        policy: &project.policy,
        client: &client,
        runner: &runner,
        probe: &probe,
        supervisor: &mut supervisor,
    }
    .run_goal(
        "echo some letters",
        RunOptions::default(),
        |_| true,
        |event| {
            if let RunEvent::Step(_) = event {
                steps += 1;
            }
        },
    )
    .expect("run");

    let RunOutcome::Executed {
        planned,
        report,
        summary,
    } = outcome
    else {
        panic!("expected executed outcome");
    };
    assert_eq!(planned.source, PlanSource::Delegated);
    assert_eq!(runner.commands(), vec!["echo A", "echo B"]);
    assert_eq!(report.records.len(), 2);
    assert_eq!(
        report.stop,
        ExecutionStop::Failed {
            command: "echo B".to_string(),
            exit_code: 1
        }
    );
    assert_eq!(summary.as_deref(), Some("B failed. Fix B."));
    assert_eq!(steps, 4);
    assert_eq!(project.history_len(), 2);

    let summary_request = &client.requests()[1];
    assert!(summary_request.user.starts_with("Goal: echo some letters\n\nTerminal output:\n$ echo A"));
}

#[test]
fn policy_violation_blocks_the_whole_plan() {
    let project = Project::new();
    let client = ScriptedClient::new(vec![plan_reply(&["ls", "sudo make install"])]);
    let runner = ScriptedRunner::new(Vec::new());
    let probe = ScriptedProbe::always(true);
    let mut supervisor = project.supervisor();
    let asked = Cell::new(false);

    let err = Orchestrator {
        paths: &project.paths,
        config: &project.config,
        policy: &project.policy,
        client: &client,
        runner: &runner,
        probe: &probe,
        supervisor: &mut supervisor,
    }
    .run_goal(
        "install it",
        RunOptions::default(),
        |_| {
            asked.set(true);
            true
        },
        |_| {},
    )
    .unwrap_err();

    let violation = err
        .downcast_ref::<PolicyViolationError>()
        .expect("policy violation");
    assert_eq!(violation.command, "sudo make install");
    assert!(!asked.get());
    assert!(runner.commands().is_empty());
    assert!(!project.paths.session_path.exists());
}

#[test]
fn shortcut_dry_run_never_calls_collaborator() {
    let project = Project::new();
    let client = ScriptedClient::new(Vec::new());
    let runner = ScriptedRunner::new(Vec::new());
    let probe = ScriptedProbe::always(true);
    let mut supervisor = project.supervisor();

    let outcome = Orchestrator {
        paths: &project.paths,
        config: &project.config,
        policy: &project.policy,
        client: &client,
        runner: &runner,
        probe: &probe,
        supervisor: &mut supervisor,
    }
    .run_goal(
        "start server and run smoke tests",
        RunOptions {
            server_running: false,
            dry_run: true,
        },
        |_| panic!("dry run must not ask"),
        |_| {},
    )
    .expect("run");

    let RunOutcome::DryRun { planned, approved } = outcome else {
        panic!("expected dry run");
    };
    assert_eq!(planned.source, PlanSource::Shortcut);
    let texts: Vec<_> = approved.commands().iter().map(|c| c.text.as_str()).collect();
    assert_eq!(
        texts,
        vec![
            START_SERVER_SENTINEL,
            "curl -s -o /dev/null -w '%{http_code}' http://127.0.0.1:8000/",
            "python3 scripts/smoke_test.py",
        ]
    );
    assert!(client.requests().is_empty());
    assert!(runner.commands().is_empty());
}

#[cfg(unix)]
#[test]
fn shortcut_run_starts_server_then_smoke_tests() {
    let project = Project::new();
    let client = ScriptedClient::new(vec![Ok("Server healthy, smoke passed.".to_string())]);
    let runner = ScriptedRunner::new(vec![output(0, "200", ""), output(0, "smoke ok", "")]);
    let probe = ScriptedProbe::new(vec![false, true]);
    let mut supervisor = project.supervisor();

    let outcome = Orchestrator {
        paths: &project.paths,
        config: &project.config,
        policy: &project.policy,
        client: &client,
        runner: &runner,
        probe: &probe,
        supervisor: &mut supervisor,
    }
    .run_goal("start the server and smoke test it", RunOptions::default(), |_| true, |_| {})
    .expect("run");
    supervisor.stop();

    let RunOutcome::Executed { report, .. } = outcome else {
        panic!("expected executed outcome");
    };
    assert_eq!(report.records.len(), 3);
    assert_eq!(report.records[0].command, "exec sleep 30 (background)");
    assert!(report.transcript.contains("Healthcheck: OK"));
    assert_eq!(
        runner.commands(),
        vec![
            "curl -s -o /dev/null -w '%{http_code}' http://127.0.0.1:8000/",
            "python3 scripts/smoke_test.py",
        ]
    );
    assert_eq!(client.requests().len(), 1);
}

#[cfg(unix)]
#[test]
fn running_server_skips_start_commands_but_not_the_sentinel() {
    let project = Project::new();
    let client = ScriptedClient::new(vec![
        plan_reply(&["make run", START_SERVER_SENTINEL, "make test"]),
        Ok("ok".to_string()),
    ]);
    let runner = ScriptedRunner::new(vec![output(0, "", "")]);
    let probe = ScriptedProbe::always(true);
    let mut supervisor = project.supervisor();

    let outcome = Orchestrator {
        paths: &project.paths,
        config: &project.config,
        policy: &project.policy,
        client: &client,
        runner: &runner,
        probe: &probe,
        supervisor: &mut supervisor,
    }
    .run_goal(
        "test the project",
        RunOptions {
            server_running: true,
            dry_run: false,
        },
        |approved| approved.skipped().len() == 1,
        |_| {},
    )
    .expect("run");

    let RunOutcome::Executed { report, .. } = outcome else {
        panic!("expected an executed plan");
    };
    assert_eq!(runner.commands(), vec!["make test"]);
    assert_eq!(report.records.len(), 2);
    assert_eq!(report.records[0].command, "exec sleep 30 (background)");
    assert!(supervisor.handle().is_some());
    supervisor.stop();
}

#[test]
fn declined_plan_runs_nothing() {
    let project = Project::new();
    let client = ScriptedClient::new(vec![plan_reply(&["ls"])]);
    let runner = ScriptedRunner::new(Vec::new());
    let probe = ScriptedProbe::always(true);
    let mut supervisor = project.supervisor();

    let outcome = Orchestrator {
        paths: &project.paths,
        config: &project.config,
        policy: &project.policy,
        client: &client,
        runner: &runner,
        probe: &probe,
        supervisor: &mut supervisor,
    }
    .run_goal("list", RunOptions::default(), |_| false, |_| {})
    .expect("run");

    assert!(matches!(outcome, RunOutcome::Declined { .. }));
    assert!(runner.commands().is_empty());
    assert_eq!(project.history_len(), 0);
}

#[test]
fn empty_plan_ends_without_confirmation() {
    let project = Project::new();
    let client = ScriptedClient::new(vec![plan_reply(&[])]);
    let runner = ScriptedRunner::new(Vec::new());
    let probe = ScriptedProbe::always(true);
    let mut supervisor = project.supervisor();

    let outcome = Orchestrator {
        paths: &project.paths,
        config: &project.config,
        policy: &project.policy,
        client: &client,
        runner: &runner,
        probe: &probe,
        supervisor: &mut supervisor,
    }
    .run_goal("", RunOptions::default(), |_| panic!("nothing to confirm"), |_| {})
    .expect("run");

    assert!(matches!(outcome, RunOutcome::NoCommands { .. }));
}

#[test]
fn summary_failure_is_a_notice_not_an_error() {
    let project = Project::new();
    let client = ScriptedClient::new(vec![plan_reply(&["pwd"]), Err("rate limited".to_string())]);
    let runner = ScriptedRunner::new(vec![output(0, "/srv", "")]);
    let probe = ScriptedProbe::always(true);
    let mut supervisor = project.supervisor();

    let outcome = Orchestrator {
        paths: &project.paths,
        config: &project.config,
        policy: &project.policy,
        client: &client,
        runner: &runner,
        probe: &probe,
        supervisor: &mut supervisor,
    }
    .run_goal("where am i", RunOptions::default(), |_| true, |_| {})
    .expect("run");

    let RunOutcome::Executed { report, summary, .. } = outcome else {
        panic!("expected executed outcome");
    };
    assert!(summary.is_none());
    assert_eq!(report.stop, ExecutionStop::Completed);
    assert!(report.notices.iter().any(|n| n.contains("rate limited")));
    assert_eq!(project.history_len(), 1);
}

#[test]
fn history_from_earlier_runs_reaches_the_planner() {
    let project = Project::new();
    let probe = ScriptedProbe::always(true);

    for (goal, command) in [("first", "echo first-run"), ("second", "echo second-run")] {
        let client = ScriptedClient::new(vec![plan_reply(&[command]), Ok("ok".to_string())]);
        let runner = ScriptedRunner::new(vec![output(0, "", "")]);
        let mut supervisor = project.supervisor();
        Orchestrator {
            paths: &project.paths,
            config: &project.config,
            policy: &project.policy,
            client: &client,
            runner: &runner,
            probe: &probe,
            supervisor: &mut supervisor,
        }
        .run_goal(goal, RunOptions::default(), |_| true, |_| {})
        .expect("run");

        if goal == "second" {
            assert!(client.requests()[0].system.contains("echo first-run"));
        }
    }
    assert_eq!(project.history_len(), 2);
}
