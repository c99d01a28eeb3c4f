//! Repair-loop tests driving full pipeline turns.
//!
//! Each test scripts the backend replies for the top-level turn and every
//! nested debug pass, then checks the terminal repair state, iteration count
//! and how many times the backend was consulted.

use mender::core::mode::Mode;
use mender::core::repair::RepairState;
use mender::pipeline::TurnOutcome;
use mender::test_support::{ScriptedConfirmer, TestWorkspace};

fn run_action(command: &str, purpose: &str) -> String {
    format!(r#"{{"actions": [{{"type": "run", "target": "{command}", "content": "{purpose}"}}]}}"#)
}

fn create_action(target: &str, content: &str) -> String {
    format!(r#"{{"actions": [{{"type": "create", "target": "{target}", "content": "{content}"}}]}}"#)
}

/// Verifies a nested pass that fixes the problem resolves after one iteration.
///
/// Turn 1 runs `test -f ready.txt` (fails). The debug pass creates the file,
/// and re-running the original command succeeds.
#[test]
fn first_iteration_fix_resolves() {
    let ws = TestWorkspace::new();
    ws.backend.push(run_action("test -f ready.txt", "check ready"));
    ws.backend.push(create_action("ready.txt", "ok"));

    let confirmer = ScriptedConfirmer::default();
    let mut session = ws.session(Mode::Code, &confirmer);
    let outcome = session.process("make it ready");

    let report = outcome.repair().expect("repair ran");
    assert_eq!(report.state, RepairState::Resolved);
    assert_eq!(report.iterations, 1);
    assert!(report.remaining.is_empty());
    assert_eq!(ws.backend.calls(), 2);
    assert!(ws.exists("ready.txt"));
    assert!(outcome.render().contains("Repair resolved"));

    let prompts = ws.backend.prompts();
    assert!(prompts[1].contains("The following commands failed"));
    assert!(prompts[1].contains("Command: test -f ready.txt"));
    assert!(prompts[1].contains("Purpose: check ready"));
}

/// Verifies an unfixable failure stops after exactly `max` iterations.
///
/// Every debug pass writes a new file (so the session keeps making progress)
/// and runs a failing command of its own, which must not start a deeper
/// repair: the backend sees exactly one call per iteration plus the first.
#[test]
fn unfixable_failure_exhausts_budget() {
    let mut ws = TestWorkspace::new();
    ws.settings.max_repair_iterations = 3;
    ws.backend.push(run_action("test -f never.txt", "check"));
    for n in 1..=3 {
        ws.backend.push(format!(
            r#"{{"actions": [
                {{"type": "create", "target": "note{n}.txt", "content": "try {n}"}},
                {{"type": "run", "target": "test -f never.txt", "content": "verify"}}
            ]}}"#
        ));
    }

    let confirmer = ScriptedConfirmer::default();
    let mut session = ws.session(Mode::Craft, &confirmer);
    let outcome = session.process("build it");

    let report = outcome.repair().expect("repair ran");
    assert_eq!(report.state, RepairState::Exhausted);
    assert_eq!(report.iterations, 3);
    assert_eq!(report.remaining.len(), 1);
    assert_eq!(report.remaining[0].command, "test -f never.txt");
    assert_eq!(ws.backend.calls(), 4);
    assert!(ws.exists("note3.txt"));
    assert!(outcome.render().contains("Repair exhausted after 3 iteration(s)"));
}

/// Verifies an iteration with no file changes and the same failures stalls.
#[test]
fn no_progress_stalls_before_budget() {
    let ws = TestWorkspace::new();
    ws.backend.push(run_action("test -f missing.txt", "check"));
    ws.backend
        .push(r#"{"actions": [{"type": "message", "content": "not sure what to do"}]}"#);

    let confirmer = ScriptedConfirmer::default();
    let mut session = ws.session(Mode::Code, &confirmer);
    let outcome = session.process("check the file");

    let report = outcome.repair().expect("repair ran");
    assert_eq!(report.state, RepairState::Stalled);
    assert_eq!(report.iterations, 1);
    assert_eq!(ws.backend.calls(), 2);
}

/// Verifies a turn at the depth limit never starts a repair session.
#[test]
fn turn_at_depth_limit_does_not_repair() {
    let ws = TestWorkspace::new();
    ws.backend.push(run_action("false", "fail on purpose"));

    let confirmer = ScriptedConfirmer::default();
    let mut session = ws.session(Mode::Code, &confirmer);
    let outcome = session.run_turn("fail", 1);

    assert!(outcome.repair().is_none());
    assert_eq!(ws.backend.calls(), 1);
}

/// Verifies modes without auto-repair leave failures unrepaired.
#[test]
fn debug_mode_reports_failures_without_repair() {
    let ws = TestWorkspace::new();
    ws.backend.push(run_action("false", "fail on purpose"));

    let confirmer = ScriptedConfirmer::default();
    let mut session = ws.session(Mode::Debug, &confirmer);
    let outcome = session.process("fail");

    match &outcome {
        TurnOutcome::Executed {
            outcomes, repair, ..
        } => {
            assert!(repair.is_none());
            assert_eq!(outcomes[0].summary, "✗ Command failed (exit 1): false");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(ws.backend.calls(), 1);
}

/// Verifies the nested pass's last exchange is merged into the parent history.
#[test]
fn repair_exchange_is_merged_into_history() {
    let ws = TestWorkspace::new();
    ws.backend.push(run_action("test -f ready.txt", "check ready"));
    ws.backend.push(create_action("ready.txt", "ok"));

    let confirmer = ScriptedConfirmer::default();
    let mut session = ws.session(Mode::Code, &confirmer);
    session.process("make it ready");

    let history = session.history();
    assert_eq!(history.len(), 2);
    assert!(history[0].user.starts_with("The following commands failed"));
    assert!(history[0].assistant.contains("✓ Created ready.txt"));
    assert_eq!(history[1].user, "make it ready");
}
