//! Applies canonical actions through the collaborators, one at a time.
//!
//! Every failure is turned into an [`ExecutionOutcome`]; nothing here returns
//! an error to the pipeline.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::core::denylist::blocked_prefix;
use crate::core::plan::todo_list;
use crate::core::types::{Action, ActionKind, ExecutionOutcome, FailedCommand};
use crate::io::backend::Backend;
use crate::io::confirm::{Confirmer, is_confirmed};
use crate::io::context::ProjectContext;
use crate::io::diff;
use crate::io::files::FileStore;
use crate::io::observer::Observer;
use crate::io::shell::{Shell, ShellOutput};

/// Characters of new file content previewed on create.
pub const CREATE_PREVIEW_CHARS: usize = 500;

/// The collaborators one pipeline run talks to.
#[derive(Clone, Copy)]
pub struct Tools<'a> {
    pub backend: &'a dyn Backend,
    pub shell: &'a dyn Shell,
    pub files: &'a dyn FileStore,
    pub confirmer: &'a dyn Confirmer,
    pub observer: &'a dyn Observer,
}

/// Per-run execution settings.
#[derive(Debug, Clone)]
pub struct ExecSettings {
    /// Directory `run` actions execute in.
    pub cwd: PathBuf,
    pub command_timeout: Duration,
    /// Back up files before `edit` and `delete`.
    pub backup: bool,
}

/// Outcomes of one batch, in action order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub outcomes: Vec<ExecutionOutcome>,
    /// `run` actions that failed and can be handed to repair.
    pub failed_commands: Vec<FailedCommand>,
}

impl BatchReport {
    pub fn mutated_files(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| o.succeeded && o.kind.is_mutating())
    }
}

pub struct ActionExecutor<'a> {
    tools: Tools<'a>,
    settings: &'a ExecSettings,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(tools: Tools<'a>, settings: &'a ExecSettings) -> Self {
        Self { tools, settings }
    }

    /// Apply one action.
    pub fn execute(&self, action: &Action) -> ExecutionOutcome {
        self.apply(action).0
    }

    /// Apply actions strictly in order, invalidating `context` after every
    /// successful mutation.
    #[instrument(skip_all, fields(actions = actions.len()))]
    pub fn execute_batch(&self, actions: &[Action], context: &mut ProjectContext) -> BatchReport {
        let observer = self.tools.observer;
        observer.diagnostic("📋 Todo list:");
        for line in todo_list(actions) {
            observer.diagnostic(&format!("  {line}"));
        }

        let mut report = BatchReport::default();
        for action in actions {
            let (outcome, failed) = self.apply(action);
            if outcome.succeeded && action.kind.is_mutating() {
                context.invalidate();
            }
            debug!(kind = %action.kind, succeeded = outcome.succeeded, "action applied");
            report.outcomes.push(outcome);
            report.failed_commands.extend(failed);
        }
        info!(
            outcomes = report.outcomes.len(),
            failed_commands = report.failed_commands.len(),
            "batch executed"
        );
        report
    }

    fn apply(&self, action: &Action) -> (ExecutionOutcome, Option<FailedCommand>) {
        match action.kind {
            ActionKind::Create => (self.create(action), None),
            ActionKind::Edit => (self.edit(action), None),
            ActionKind::Delete => (self.delete(action), None),
            ActionKind::Run => self.run(action),
            ActionKind::Message => {
                self.tools.observer.message(&action.content);
                (
                    ExecutionOutcome::success(action, format!("Message: {}", action.content)),
                    None,
                )
            }
        }
    }

    fn create(&self, action: &Action) -> ExecutionOutcome {
        let target = &action.target;
        if self.tools.files.exists(target) {
            return ExecutionOutcome::failure(
                action,
                format!("✗ File already exists: {target} (use edit to change it)"),
                None,
            );
        }
        if let Err(e) = self.tools.files.write(target, &action.content, false) {
            warn!(err = %e, target, "create failed");
            return ExecutionOutcome::failure(
                action,
                format!("✗ Failed to create {target}"),
                Some(format!("{e:#}")),
            );
        }

        let preview: String = action.content.chars().take(CREATE_PREVIEW_CHARS).collect();
        let more = if action.content.chars().count() > CREATE_PREVIEW_CHARS {
            "\n..."
        } else {
            ""
        };
        self.tools
            .observer
            .diagnostic(&format!("📝 Created {target}:\n{preview}{more}"));
        ExecutionOutcome::success(action, format!("✓ Created {target}"))
    }

    fn edit(&self, action: &Action) -> ExecutionOutcome {
        let target = &action.target;
        let old = match self.tools.files.read(target) {
            Ok(Some(old)) => old,
            Ok(None) => {
                return ExecutionOutcome::failure(
                    action,
                    format!("✗ File not found: {target} (use create for new files)"),
                    None,
                );
            }
            Err(e) => {
                return ExecutionOutcome::failure(
                    action,
                    format!("✗ Failed to read {target}"),
                    Some(format!("{e:#}")),
                );
            }
        };

        let rendered = diff::unified(target, &old, &action.content);
        if rendered.is_empty() {
            self.tools
                .observer
                .diagnostic(&format!("📝 {target}: no changes"));
        } else {
            let (added, removed) = diff::line_stats(&old, &action.content);
            self.tools
                .observer
                .diagnostic(&format!("📝 {target} (+{added} -{removed}):\n{rendered}"));
        }

        if let Err(e) = self
            .tools
            .files
            .write(target, &action.content, self.settings.backup)
        {
            warn!(err = %e, target, "edit failed");
            return ExecutionOutcome::failure(
                action,
                format!("✗ Failed to edit {target}"),
                Some(format!("{e:#}")),
            );
        }
        ExecutionOutcome::success(action, format!("✓ Edited {target}"))
    }

    fn delete(&self, action: &Action) -> ExecutionOutcome {
        let target = &action.target;
        if !self.tools.files.exists(target) {
            return ExecutionOutcome::failure(
                action,
                format!("⚠ Cannot delete {target}: file not found"),
                None,
            );
        }

        let answer = match self
            .tools
            .confirmer
            .ask(&format!("⚠ Delete {target}? Type 'yes' to confirm:"))
        {
            Ok(answer) => answer,
            Err(e) => {
                warn!(err = %e, "confirmation prompt failed");
                None
            }
        };
        if !is_confirmed(answer.as_deref()) {
            info!(target, "deletion cancelled");
            return ExecutionOutcome::failure(
                action,
                format!("✗ Deletion of {target} cancelled"),
                None,
            );
        }

        if let Err(e) = self.tools.files.delete(target, self.settings.backup) {
            return ExecutionOutcome::failure(
                action,
                format!("✗ Failed to delete {target}"),
                Some(format!("{e:#}")),
            );
        }
        ExecutionOutcome::success(action, format!("✓ Deleted {target}"))
    }

    fn run(&self, action: &Action) -> (ExecutionOutcome, Option<FailedCommand>) {
        let command = action.target.trim();
        let observer = self.tools.observer;

        if let Some(prefix) = blocked_prefix(command) {
            warn!(command, prefix, "command blocked");
            return (
                ExecutionOutcome::failure(
                    action,
                    format!("✗ Command blocked by safety policy (matches '{prefix}'): {command}"),
                    None,
                ),
                None,
            );
        }

        observer.diagnostic(&format!("🔧 Running: {command}"));
        if !action.content.trim().is_empty() {
            observer.diagnostic(&format!("   Purpose: {}", action.content.trim()));
        }

        let timeout = self.settings.command_timeout;
        let output = match self.tools.shell.run(command, &self.settings.cwd, timeout) {
            Ok(output) => output,
            Err(e) => {
                let error_text = format!("{e:#}");
                return (
                    ExecutionOutcome::failure(
                        action,
                        format!("✗ Command could not be started: {command}"),
                        Some(error_text.clone()),
                    ),
                    Some(failed_command(action, error_text)),
                );
            }
        };

        if !output.stdout.trim().is_empty() {
            observer.diagnostic(output.stdout.trim_end());
        }
        if !output.stderr.trim().is_empty() {
            observer.diagnostic(output.stderr.trim_end());
        }

        if output.success() {
            return (
                ExecutionOutcome::success(action, format!("✓ Command succeeded: {command}")),
                None,
            );
        }

        let summary = if output.timed_out {
            format!(
                "✗ Command timed out after {}s: {command}",
                timeout.as_secs()
            )
        } else {
            format!("✗ Command failed (exit {}): {command}", exit_label(&output))
        };
        let detail = output.combined();
        (
            ExecutionOutcome::failure(action, summary, Some(detail)),
            Some(failed_command(action, failure_text(&output, timeout))),
        )
    }
}

fn exit_label(output: &ShellOutput) -> String {
    output
        .code
        .map_or_else(|| "signal".to_string(), |c| c.to_string())
}

/// Error text recorded for a failed command: exit status plus output.
pub fn failure_text(output: &ShellOutput, timeout: Duration) -> String {
    let status = if output.timed_out {
        format!("timed out after {}s", timeout.as_secs())
    } else {
        format!("exit code {}", exit_label(output))
    };
    let combined = output.combined();
    if combined.is_empty() {
        status
    } else {
        format!("{status}\n{combined}")
    }
}

fn failed_command(action: &Action, error_text: String) -> FailedCommand {
    FailedCommand {
        command: action.target.trim().to_string(),
        purpose: action.content.trim().to_string(),
        error_text,
    }
}
