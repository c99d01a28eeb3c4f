//! Shared deterministic types for the response pipeline.
//!
//! These types define stable contracts between the extractor, normalizer,
//! executor and repair loop. They carry no I/O handles.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical action kinds. The set is closed: anything else is rejected
/// during normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Create,
    Edit,
    Delete,
    Run,
    Message,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Create => "create",
            ActionKind::Edit => "edit",
            ActionKind::Delete => "delete",
            ActionKind::Run => "run",
            ActionKind::Message => "message",
        }
    }

    /// Every kind except `Message` needs a non-empty target.
    pub fn requires_target(self) -> bool {
        !matches!(self, ActionKind::Message)
    }

    /// Kinds that change files under the working directory.
    pub fn is_mutating(self) -> bool {
        matches!(
            self,
            ActionKind::Create | ActionKind::Edit | ActionKind::Delete
        )
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One canonical unit of requested work.
///
/// Serializes to the wire schema `{ "type", "target", "content" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub content: String,
}

impl Action {
    pub fn new(kind: ActionKind, target: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            content: content.into(),
        }
    }

    pub fn message(content: impl Into<String>) -> Self {
        Self::new(ActionKind::Message, String::new(), content)
    }
}

/// Result of applying one action. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub kind: ActionKind,
    pub target: String,
    pub succeeded: bool,
    /// One-line human readable status.
    pub summary: String,
    /// Captured process or file error text when the action failed.
    pub detail: Option<String>,
}

impl ExecutionOutcome {
    pub fn success(action: &Action, summary: impl Into<String>) -> Self {
        Self {
            kind: action.kind,
            target: action.target.clone(),
            succeeded: true,
            summary: summary.into(),
            detail: None,
        }
    }

    pub fn failure(action: &Action, summary: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            kind: action.kind,
            target: action.target.clone(),
            succeeded: false,
            summary: summary.into(),
            detail,
        }
    }

    /// Summary plus detail, as shown in the turn report.
    pub fn render(&self) -> String {
        match self.detail.as_deref().map(str::trim) {
            Some(detail) if !detail.is_empty() => format!("{}\n{}", self.summary, detail),
            _ => self.summary.clone(),
        }
    }
}

/// A `run` action that failed and is eligible for automatic repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedCommand {
    pub command: String,
    /// The rationale the model gave for running the command.
    pub purpose: String,
    /// Exit status line plus captured stdout and stderr.
    pub error_text: String,
}

/// One prior request/response exchange kept for prompt context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exchange {
    pub user: String,
    pub assistant: String,
}
