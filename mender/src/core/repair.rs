//! Bounded repair session state machine.
//!
//! The session only records decisions; running the nested pass and
//! re-executing commands is done by the orchestrator in `crate::repair`.
//!
//! ```text
//! Probing -> Repairing -> Verifying -> Probing ...
//!                                   \-> Resolved | Exhausted | Stalled
//! ```

use std::fmt;

use crate::core::types::FailedCommand;

/// Default iteration budget for a repair session.
pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairState {
    /// Building the diagnostic request for the next iteration.
    Probing,
    /// Nested pipeline pass in flight.
    Repairing,
    /// Re-running the original failed commands.
    Verifying,
    /// Every original command now succeeds.
    Resolved,
    /// The iteration budget ran out with failures remaining.
    Exhausted,
    /// An iteration changed no files and left the failures unchanged.
    Stalled,
}

impl RepairState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RepairState::Resolved | RepairState::Exhausted | RepairState::Stalled
        )
    }
}

impl fmt::Display for RepairState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RepairState::Probing => "probing",
            RepairState::Repairing => "repairing",
            RepairState::Verifying => "verifying",
            RepairState::Resolved => "resolved",
            RepairState::Exhausted => "exhausted",
            RepairState::Stalled => "stalled",
        };
        f.write_str(label)
    }
}

/// One bounded retry loop. Owned by a single orchestrator call.
#[derive(Debug, Clone)]
pub struct RepairSession {
    iteration: u32,
    max_iterations: u32,
    /// Original commands, re-run on every verification.
    originals: Vec<FailedCommand>,
    /// Currently failing subset, replaced each iteration.
    failed: Vec<FailedCommand>,
    state: RepairState,
}

impl RepairSession {
    pub fn new(failed: Vec<FailedCommand>, max_iterations: u32) -> Self {
        let state = if failed.is_empty() {
            RepairState::Resolved
        } else {
            RepairState::Probing
        };
        Self {
            iteration: 0,
            max_iterations,
            originals: failed.clone(),
            failed,
            state,
        }
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn state(&self) -> RepairState {
        self.state
    }

    pub fn failed(&self) -> &[FailedCommand] {
        &self.failed
    }

    pub fn originals(&self) -> &[FailedCommand] {
        &self.originals
    }

    /// Start the next iteration, or settle on `Exhausted` when the budget is
    /// spent. Returns the 1-based iteration number.
    pub fn next_iteration(&mut self) -> Option<u32> {
        if self.state.is_terminal() {
            return None;
        }
        if self.iteration >= self.max_iterations {
            self.state = RepairState::Exhausted;
            return None;
        }
        self.iteration += 1;
        self.state = RepairState::Probing;
        Some(self.iteration)
    }

    pub fn mark_repairing(&mut self) {
        self.state = RepairState::Repairing;
    }

    pub fn mark_verifying(&mut self) {
        self.state = RepairState::Verifying;
    }

    /// Record the re-verified failing set and decide whether to continue.
    ///
    /// `files_changed` reports whether the iteration created, removed or
    /// modified any project file.
    pub fn conclude_iteration(
        &mut self,
        still_failing: Vec<FailedCommand>,
        files_changed: bool,
    ) -> RepairState {
        let failures_changed = still_failing != self.failed;
        self.failed = still_failing;

        self.state = if self.failed.is_empty() {
            RepairState::Resolved
        } else if self.iteration >= self.max_iterations {
            RepairState::Exhausted
        } else if !files_changed && !failures_changed {
            RepairState::Stalled
        } else {
            RepairState::Probing
        };
        self.state
    }

    pub fn into_report(self) -> RepairReport {
        RepairReport {
            state: self.state,
            iterations: self.iteration,
            remaining: self.failed,
        }
    }
}

/// Terminal summary of a repair session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairReport {
    pub state: RepairState,
    pub iterations: u32,
    pub remaining: Vec<FailedCommand>,
}

impl RepairReport {
    pub fn summary(&self) -> String {
        let iterations = self.iterations;
        match self.state {
            RepairState::Resolved => {
                format!("✓ Repair resolved all failures after {iterations} iteration(s)")
            }
            RepairState::Exhausted => format!(
                "⚠ Repair exhausted after {iterations} iteration(s); {} command(s) still failing: {}. Manual intervention may be needed.",
                self.remaining.len(),
                self.remaining_commands()
            ),
            RepairState::Stalled => format!(
                "⚠ Repair stalled after {iterations} iteration(s): no file changes and no change in failures ({})",
                self.remaining_commands()
            ),
            state => format!("Repair stopped in state {state} after {iterations} iteration(s)"),
        }
    }

    fn remaining_commands(&self) -> String {
        self.remaining
            .iter()
            .map(|f| f.command.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
