//! One pipeline turn: backend → extract → normalize → execute → repair.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use tracing::{debug, info, instrument, warn};

use crate::core::extract::{ExtractionFailure, extract};
use crate::core::mode::Mode;
use crate::core::normalize::{NormalizeError, Rejection, normalize};
use crate::core::repair::RepairReport;
use crate::core::types::{Exchange, ExecutionOutcome};
use crate::execute::{ActionExecutor, ExecSettings, Tools};
use crate::io::context::ProjectContext;
use crate::io::prompt::{DesignDoc, PromptBuilder, TurnInputs};
use crate::repair::run_repair;

/// Turns at this depth or deeper never start a repair session.
pub const REPAIR_DEPTH_LIMIT: u32 = 1;

/// Settings shared by a top-level session and its nested repair passes.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub exec: ExecSettings,
    pub max_repair_iterations: u32,
}

/// How a turn ended. Every variant renders to a user-facing summary.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The backend failed; extraction was skipped.
    BackendFailed { reason: String },
    /// No extraction strategy recovered an action list.
    Unparseable(ExtractionFailure),
    /// Nothing executable survived normalization.
    Rejected(NormalizeError),
    Executed {
        outcomes: Vec<ExecutionOutcome>,
        rejections: Vec<Rejection>,
        repair: Option<RepairReport>,
    },
}

impl TurnOutcome {
    pub fn render(&self) -> String {
        match self {
            TurnOutcome::BackendFailed { reason } => format!("Error running backend: {reason}"),
            TurnOutcome::Unparseable(failure) => {
                format!("Error: could not parse model response.\n{failure}")
            }
            TurnOutcome::Rejected(err) => format!("Error: {err}"),
            TurnOutcome::Executed {
                outcomes,
                rejections,
                repair,
            } => {
                let mut out = String::new();
                for rejection in rejections {
                    let _ = writeln!(out, "⚠ {rejection}");
                }
                for outcome in outcomes {
                    let _ = writeln!(out, "{}", outcome.render());
                }
                if let Some(repair) = repair {
                    let _ = writeln!(out, "{}", repair.summary());
                }
                out.trim_end().to_string()
            }
        }
    }

    pub fn repair(&self) -> Option<&RepairReport> {
        match self {
            TurnOutcome::Executed { repair, .. } => repair.as_ref(),
            _ => None,
        }
    }
}

/// Conversation state for one mode: project context, designs and history.
pub struct Session<'a> {
    pub(crate) tools: Tools<'a>,
    pub(crate) settings: &'a PipelineSettings,
    pub(crate) prompts: &'a PromptBuilder,
    mode: Mode,
    context: ProjectContext,
    designs: Vec<DesignDoc>,
    history: Vec<Exchange>,
}

impl<'a> Session<'a> {
    pub fn new(
        tools: Tools<'a>,
        settings: &'a PipelineSettings,
        prompts: &'a PromptBuilder,
        mode: Mode,
        context: ProjectContext,
    ) -> Self {
        Self {
            tools,
            settings,
            prompts,
            mode,
            context,
            designs: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn with_designs(mut self, designs: Vec<DesignDoc>) -> Self {
        self.designs = designs;
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn history(&self) -> &[Exchange] {
        &self.history
    }

    /// Handle one top-level request.
    pub fn process(&mut self, request: &str) -> TurnOutcome {
        self.run_turn(request, 0)
    }

    /// Run one turn at the given nesting depth and record it in history.
    #[instrument(skip_all, fields(mode = %self.mode, depth = depth))]
    pub fn run_turn(&mut self, request: &str, depth: u32) -> TurnOutcome {
        let outcome = self.turn(request, depth);
        self.history.push(Exchange {
            user: request.to_string(),
            assistant: outcome.render(),
        });
        outcome
    }

    /// Sibling session in `mode` that starts from copies of this session's
    /// context and history.
    pub(crate) fn nested(&self, mode: Mode) -> Session<'a> {
        let mut context = self.context.clone();
        context.invalidate();
        Session {
            tools: self.tools,
            settings: self.settings,
            prompts: self.prompts,
            mode,
            context,
            designs: Vec::new(),
            history: self.history.clone(),
        }
    }

    /// Take over the last exchange of a finished nested session.
    pub(crate) fn absorb(&mut self, nested: Session<'a>) {
        if let Some(last) = nested.history.into_iter().last() {
            self.history.push(last);
        }
        self.context.invalidate();
    }

    pub(crate) fn context_mut(&mut self) -> &mut ProjectContext {
        &mut self.context
    }

    fn turn(&mut self, request: &str, depth: u32) -> TurnOutcome {
        let prompt = match self.render_prompt(request) {
            Ok(prompt) => prompt,
            Err(reason) => return TurnOutcome::BackendFailed { reason },
        };

        self.tools.observer.diagnostic("Thinking...");
        let reply = match self.tools.backend.generate(&prompt) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(err = %e, "backend call failed");
                return TurnOutcome::BackendFailed {
                    reason: format!("{e:#}"),
                };
            }
        };
        if !reply.succeeded() {
            return TurnOutcome::BackendFailed {
                reason: reply.failure_reason(),
            };
        }

        let batch = match extract(&reply.stdout) {
            Ok(batch) => batch,
            Err(failure) => {
                warn!("no action list in backend reply");
                return TurnOutcome::Unparseable(failure);
            }
        };
        debug!(strategy = ?batch.strategy, records = batch.records.len(), "extracted");

        let normalized = match normalize(&batch.records, self.mode) {
            Ok(normalized) => normalized,
            Err(err) => return TurnOutcome::Rejected(err),
        };

        let executor = ActionExecutor::new(self.tools, &self.settings.exec);
        let report = executor.execute_batch(&normalized.actions, &mut self.context);

        let repair = if depth < REPAIR_DEPTH_LIMIT
            && self.mode.permits_auto_repair()
            && !report.failed_commands.is_empty()
        {
            info!(
                failed = report.failed_commands.len(),
                "starting repair session"
            );
            Some(run_repair(self, report.failed_commands.clone(), depth))
        } else {
            None
        };

        TurnOutcome::Executed {
            outcomes: report.outcomes,
            rejections: normalized.rejections,
            repair,
        }
    }

    fn render_prompt(&mut self, request: &str) -> Result<String, String> {
        let empty = BTreeMap::new();
        let files = match self.context.files() {
            Ok(files) => files,
            Err(e) => {
                warn!(err = %e, "project context unavailable");
                &empty
            }
        };
        self.prompts
            .render_turn(&TurnInputs {
                mode: self.mode,
                request,
                files,
                designs: &self.designs,
                history: &self.history,
            })
            .map_err(|e| format!("render prompt: {e:#}"))
    }
}
