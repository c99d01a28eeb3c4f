//! Bounded auto-repair of failed `run` actions.
//!
//! Each iteration asks a nested `debug` session (one level deeper, so it can
//! never start its own repair) to fix the failures, then re-runs every
//! original command. Only that re-run decides whether the session converged.

use tracing::{info, instrument, warn};

use crate::core::mode::Mode;
use crate::core::repair::{RepairReport, RepairSession, RepairState};
use crate::core::types::FailedCommand;
use crate::execute::failure_text;
use crate::io::context::{Fingerprint, ProjectContext};
use crate::io::shell::Shell;
use crate::pipeline::{PipelineSettings, Session};

/// Drive a repair session for `failed` on behalf of `parent`.
///
/// The nested pass runs at `depth + 1`; its last exchange is merged into the
/// parent's history when the session ends.
#[instrument(skip_all, fields(failed = failed.len(), depth = depth))]
pub fn run_repair(parent: &mut Session<'_>, failed: Vec<FailedCommand>, depth: u32) -> RepairReport {
    let settings = parent.settings;
    let observer = parent.tools.observer;
    let shell = parent.tools.shell;
    let mut session = RepairSession::new(failed, settings.max_repair_iterations);
    let max = session.max_iterations();
    let mut nested = parent.nested(Mode::Debug);
    let mut before = snapshot(nested.context_mut());

    while let Some(iteration) = session.next_iteration() {
        observer.diagnostic(&format!("\n🔧 Repair iteration {iteration}/{max}"));

        let request = match parent.prompts.render_repair(session.failed()) {
            Ok(request) => request,
            Err(e) => {
                warn!(err = %e, "repair prompt failed to render");
                fallback_request(session.failed())
            }
        };

        session.mark_repairing();
        let turn = nested.run_turn(&request, depth + 1);
        observer.diagnostic(&turn.render());

        session.mark_verifying();
        let still_failing = verify(shell, settings, session.originals());
        let after = snapshot(nested.context_mut());
        let files_changed = match (&before, &after) {
            (Some(before), Some(after)) => before != after,
            _ => true,
        };
        before = after;

        let state = session.conclude_iteration(still_failing, files_changed);
        info!(iteration, %state, files_changed, "repair iteration finished");
        match state {
            RepairState::Resolved => observer.diagnostic("✓ All failed commands now succeed"),
            RepairState::Probing => observer.diagnostic(&format!(
                "⚠ {} command(s) still failing, continuing",
                session.failed().len()
            )),
            _ => {}
        }
    }

    parent.absorb(nested);
    session.into_report()
}

/// Re-run every original command and keep the ones that still fail.
fn verify(
    shell: &dyn Shell,
    settings: &PipelineSettings,
    originals: &[FailedCommand],
) -> Vec<FailedCommand> {
    let timeout = settings.exec.command_timeout;
    originals
        .iter()
        .filter_map(|original| {
            let error_text = match shell.run(&original.command, &settings.exec.cwd, timeout) {
                Ok(output) if output.success() => return None,
                Ok(output) => failure_text(&output, timeout),
                Err(e) => format!("{e:#}"),
            };
            Some(FailedCommand {
                error_text,
                ..original.clone()
            })
        })
        .collect()
}

fn snapshot(context: &mut ProjectContext) -> Option<Fingerprint> {
    match context.fingerprint() {
        Ok(fingerprint) => Some(fingerprint),
        Err(e) => {
            warn!(err = %e, "could not fingerprint project files");
            None
        }
    }
}

fn fallback_request(failed: &[FailedCommand]) -> String {
    let mut request = String::from("The following commands failed. Fix them:\n");
    for f in failed {
        request.push_str(&format!("\nCommand: {}\nError: {}\n", f.command, f.error_text));
    }
    request
}
