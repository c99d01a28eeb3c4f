//! Canonicalization and policy validation of extracted action records.
//!
//! Models name the same operation many ways (`write`, `update`, `exec`, ...)
//! and use several field names for the path. Normalization maps those onto
//! [`Action`] and reports every record it refuses as a [`Rejection`] instead of
//! dropping it.

use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::mode::Mode;
use crate::core::types::{Action, ActionKind};

/// An action-shaped JSON object as extracted from a response.
pub type RawRecord = Map<String, Value>;

const KIND_KEYS: [&str; 3] = ["type", "action", "kind"];
/// Checked in priority order; the first non-empty value wins.
const TARGET_KEYS: [&str; 5] = ["target", "path", "file_path", "file", "file_name"];
const RUN_TARGET_KEYS: [&str; 2] = ["command", "cmd"];
const CONTENT_KEYS: [&str; 9] = [
    "content",
    "code",
    "data",
    "text",
    "body",
    "message",
    "description",
    "purpose",
    "reason",
];
const RAW_PREVIEW_CHARS: usize = 200;

/// Map a loose verb onto a canonical kind.
pub fn canonical_kind(raw: &str) -> Option<ActionKind> {
    let key = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
    let kind = match key.as_str() {
        "create" | "create_file" | "write" | "write_file" | "new" | "new_file" | "add"
        | "add_file" | "make" => ActionKind::Create,
        "edit" | "edit_file" | "modify" | "update" | "update_file" | "change" | "replace"
        | "rewrite" | "overwrite" | "patch" => ActionKind::Edit,
        "delete" | "delete_file" | "remove" | "remove_file" | "rm" | "del" | "unlink" => {
            ActionKind::Delete
        }
        "run" | "run_command" | "exec" | "execute" | "command" | "shell" | "cmd" | "bash"
        | "sh" => ActionKind::Run,
        "message" | "msg" | "say" | "tell" | "reply" | "respond" | "note" | "explain" | "info"
        | "comment" => ActionKind::Message,
        _ => return None,
    };
    Some(kind)
}

/// Whether an object carries an action-type field rather than an action list.
pub fn looks_like_action(record: &RawRecord) -> bool {
    !record.contains_key("actions")
        && KIND_KEYS
            .iter()
            .any(|key| record.get(*key).is_some_and(Value::is_string))
}

/// Rewrite a loosely shaped action object into `{type, target, content}`.
///
/// Unknown verbs are kept verbatim so normalization can reject them with the
/// original spelling.
pub fn canonicalize_record(record: &RawRecord) -> RawRecord {
    let raw = raw_kind(record);
    let kind = canonical_kind(&raw);
    let mut out = Map::new();
    out.insert(
        "type".to_string(),
        Value::String(kind.map(|k| k.as_str().to_string()).unwrap_or(raw)),
    );
    out.insert(
        "target".to_string(),
        Value::String(resolve_target(record, kind)),
    );
    out.insert(
        "content".to_string(),
        Value::String(resolve_content(record)),
    );
    out
}

/// Why a record did not become an executable action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    UnknownKind,
    MissingTarget,
    /// The mode only allows `create`/`edit` on files with this extension.
    ExtensionPolicy { required: &'static str, mode: Mode },
}

/// A record refused during normalization. Reported, never executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub kind: Option<ActionKind>,
    /// The type string as the model wrote it.
    pub raw_kind: String,
    pub target: String,
    pub reason: RejectReason,
    /// Compact JSON of the offending record, truncated.
    pub raw: String,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            RejectReason::UnknownKind => write!(
                f,
                "rejected unknown action type `{}` (raw: {})",
                self.raw_kind, self.raw
            ),
            RejectReason::MissingTarget => write!(
                f,
                "rejected {} action with empty target (raw: {})",
                self.raw_kind, self.raw
            ),
            RejectReason::ExtensionPolicy { required, mode } => write!(
                f,
                "rejected {} `{}`: {mode} mode only writes {required} files",
                self.raw_kind, self.target
            ),
        }
    }
}

/// Terminal normalization failure: nothing left to execute.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("response contained no actions")]
    Empty,
    #[error("no executable actions remain; rejected targets: {}", rejected_targets(.rejections))]
    AllRejected { rejections: Vec<Rejection> },
}

fn rejected_targets(rejections: &[Rejection]) -> String {
    rejections
        .iter()
        .map(|r| {
            if r.target.is_empty() {
                format!("<{} without target>", r.raw_kind)
            } else {
                r.target.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Canonical actions plus the records refused along the way.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Normalized {
    pub actions: Vec<Action>,
    pub rejections: Vec<Rejection>,
}

/// Canonicalize raw records and apply the mode's policy.
///
/// Record order is preserved. Errors only when no action survives.
pub fn normalize(records: &[RawRecord], mode: Mode) -> Result<Normalized, NormalizeError> {
    if records.is_empty() {
        return Err(NormalizeError::Empty);
    }

    let mut out = Normalized::default();
    for record in records {
        match normalize_one(record, mode) {
            Ok(action) => out.actions.push(action),
            Err(rejection) => out.rejections.push(rejection),
        }
    }

    if out.actions.is_empty() {
        return Err(NormalizeError::AllRejected {
            rejections: out.rejections,
        });
    }
    Ok(out)
}

fn normalize_one(record: &RawRecord, mode: Mode) -> Result<Action, Rejection> {
    let raw_kind = raw_kind(record);
    let kind = canonical_kind(&raw_kind);
    let target = resolve_target(record, kind);
    let reject = |kind: Option<ActionKind>, target: String, reason: RejectReason| Rejection {
        kind,
        raw_kind: raw_kind.clone(),
        target,
        reason,
        raw: preview(record),
    };

    let Some(kind) = kind else {
        return Err(reject(None, target, RejectReason::UnknownKind));
    };

    let mut content = resolve_content(record);
    if !kind.requires_target() {
        if content.is_empty() {
            content = target;
        }
        return Ok(Action::message(content));
    }

    if target.is_empty() {
        return Err(reject(Some(kind), target, RejectReason::MissingTarget));
    }

    if matches!(kind, ActionKind::Create | ActionKind::Edit)
        && let Some(required) = mode.required_extension()
        && !target.ends_with(required)
    {
        return Err(reject(
            Some(kind),
            target,
            RejectReason::ExtensionPolicy { required, mode },
        ));
    }

    Ok(Action::new(kind, target, content))
}

fn raw_kind(record: &RawRecord) -> String {
    first_text(record, &KIND_KEYS).unwrap_or_default()
}

fn resolve_target(record: &RawRecord, kind: Option<ActionKind>) -> String {
    first_text(record, &TARGET_KEYS)
        .or_else(|| {
            (kind == Some(ActionKind::Run))
                .then(|| first_text(record, &RUN_TARGET_KEYS))
                .flatten()
        })
        .map(|target| target.trim().to_string())
        .unwrap_or_default()
}

fn resolve_content(record: &RawRecord) -> String {
    for key in CONTENT_KEYS {
        match record.get(key) {
            Some(Value::String(text)) if !text.is_empty() => return text.clone(),
            Some(Value::Null) | Some(Value::String(_)) | None => {}
            // Models sometimes inline JSON file contents as an object.
            Some(other) => return serde_json::to_string_pretty(other).unwrap_or_default(),
        }
    }
    String::new()
}

fn first_text(record: &RawRecord, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| record.get(*key).and_then(Value::as_str))
        .find(|value| !value.trim().is_empty())
        .map(str::to_string)
}

fn preview(record: &RawRecord) -> String {
    let raw = serde_json::to_string(record).unwrap_or_default();
    if raw.chars().count() <= RAW_PREVIEW_CHARS {
        return raw;
    }
    let mut cut: String = raw.chars().take(RAW_PREVIEW_CHARS).collect();
    cut.push_str("...");
    cut
}
