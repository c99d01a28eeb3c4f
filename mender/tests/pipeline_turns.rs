//! Single-turn pipeline tests: backend failures, parse failures, mode policy
//! and context refresh between turns.

use mender::core::mode::Mode;
use mender::core::normalize::NormalizeError;
use mender::pipeline::TurnOutcome;
use mender::test_support::{ScriptedConfirmer, TestWorkspace};

#[test]
fn backend_failure_skips_extraction() {
    let ws = TestWorkspace::new();
    ws.backend.push_failure(2, "model not found");

    let confirmer = ScriptedConfirmer::default();
    let outcome = ws.session(Mode::Code, &confirmer).process("hello");

    assert_eq!(
        outcome,
        TurnOutcome::BackendFailed {
            reason: "backend exited with status 2: model not found".to_string()
        }
    );
    assert!(outcome.render().contains("model not found"));
}

#[test]
fn prose_reply_is_reported_as_unparseable() {
    let ws = TestWorkspace::new();
    ws.backend.push("Sorry, I cannot help with that.");

    let confirmer = ScriptedConfirmer::default();
    let outcome = ws.session(Mode::Code, &confirmer).process("hello");

    match &outcome {
        TurnOutcome::Unparseable(failure) => {
            assert_eq!(failure.preview, "Sorry, I cannot help with that.");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(outcome.render().starts_with("Error: could not parse model response."));
}

/// Verifies design mode keeps `.design` writes and messages, rejecting the rest.
#[test]
fn design_mode_applies_extension_policy() {
    let ws = TestWorkspace::new();
    ws.backend.push(
        r#"```json
{"actions": [
  {"type": "create", "target": "a.design", "content": "x"},
  {"type": "create", "target": "b.py", "content": "y"},
  {"type": "message", "target": "", "content": "hi"}
]}
```"#,
    );

    let confirmer = ScriptedConfirmer::default();
    let outcome = ws.session(Mode::Design, &confirmer).process("draft it");

    assert!(ws.exists("a.design"));
    assert!(!ws.exists("b.py"));
    assert_eq!(ws.observer.messages(), vec!["hi".to_string()]);
    let rendered = outcome.render();
    assert!(rendered.contains("b.py"));
    assert!(rendered.contains("✓ Created a.design"));
}

#[test]
fn fully_rejected_batch_names_every_target() {
    let ws = TestWorkspace::new();
    ws.backend.push(
        r#"{"actions": [
            {"type": "create", "target": "main.py", "content": "x"},
            {"type": "edit", "target": "lib.py", "content": "y"}
        ]}"#,
    );

    let confirmer = ScriptedConfirmer::default();
    let outcome = ws.session(Mode::Test, &confirmer).process("plan tests");

    match &outcome {
        TurnOutcome::Rejected(NormalizeError::AllRejected { rejections }) => {
            assert_eq!(rejections.len(), 2);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    let rendered = outcome.render();
    assert!(rendered.contains("main.py"));
    assert!(rendered.contains("lib.py"));
    assert!(!ws.exists("main.py"));
}

/// Verifies files written in one turn and the exchange itself show up in the
/// next turn's prompt.
#[test]
fn next_prompt_sees_new_files_and_history() {
    let ws = TestWorkspace::new();
    ws.backend
        .push(r#"{"action": "write", "file_path": "hello.txt", "code": "hi there"}"#);
    ws.backend
        .push(r#"{"actions": [{"type": "say", "content": "done"}]}"#);

    let confirmer = ScriptedConfirmer::default();
    let mut session = ws.session(Mode::Code, &confirmer);
    session.process("first");
    session.process("second");

    let prompts = ws.backend.prompts();
    assert!(!prompts[0].contains("--- hello.txt ---"));
    assert!(prompts[1].contains("--- hello.txt ---\nhi there"));
    assert!(prompts[1].contains("User: first"));
    assert!(prompts[1].contains("Assistant: ✓ Created hello.txt"));
}
