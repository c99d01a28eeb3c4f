//! Recovery of an action list from untrusted backend text.
//!
//! [`extract`] walks a fixed ladder of strategies, from strict parsing of the
//! payload to salvaging individual objects out of a broken `actions` array,
//! and returns the first one that yields records. Later strategies are never
//! consulted once an earlier one succeeds.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::core::normalize::{RawRecord, canonicalize_record, looks_like_action};
use crate::core::scan::{
    bracketed_from, relax, repair_truncation, sanitize_control_chars, scan_objects,
    strip_code_fence,
};

const ACTIONS_KEY: &str = "\"actions\"";
/// Characters of input kept in an [`ExtractionFailure`].
pub const FAILURE_PREVIEW_CHARS: usize = 500;

static ACTIONS_ARRAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""actions"\s*:\s*\["#).expect("actions regex is valid"));

/// Which rung of the ladder produced a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Balanced span containing `"actions"`, parsed as-is.
    Strict,
    /// Same span with comments and trailing commas removed.
    Relaxed,
    /// Same span with raw control bytes in strings escaped or dropped.
    Sanitized,
    /// Open string closed and missing closers appended.
    TruncationRepaired,
    /// Several independent objects collected into one batch.
    MultiObject,
    /// Objects salvaged one by one from inside the `actions` array.
    ActionsFragment,
}

/// Raw action records recovered from one response.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionBatch {
    pub records: Vec<RawRecord>,
    pub strategy: Strategy,
}

/// No strategy recovered a payload. Recoverable by re-asking the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not parse an action list from the response; it began with: {preview}")]
pub struct ExtractionFailure {
    /// First [`FAILURE_PREVIEW_CHARS`] characters of the input.
    pub preview: String,
}

type Attempt = fn(&str) -> Option<Vec<RawRecord>>;

const CANDIDATE_LADDER: [(Strategy, Attempt); 4] = [
    (Strategy::Strict, parse_strict),
    (Strategy::Relaxed, parse_relaxed),
    (Strategy::Sanitized, parse_sanitized),
    (Strategy::TruncationRepaired, parse_truncation_repaired),
];

/// Recover action records from raw backend text.
pub fn extract(raw: &str) -> Result<ActionBatch, ExtractionFailure> {
    if let Some(candidate) = actions_candidate(strip_code_fence(raw)) {
        for (strategy, attempt) in CANDIDATE_LADDER {
            if let Some(records) = attempt(candidate) {
                return Ok(found(records, strategy));
            }
        }
    }

    if let Some(records) = collect_objects(raw) {
        return Ok(found(records, Strategy::MultiObject));
    }
    if let Some(records) = salvage_actions_fragment(raw) {
        return Ok(found(records, Strategy::ActionsFragment));
    }

    debug!(len = raw.len(), "no extraction strategy succeeded");
    Err(ExtractionFailure {
        preview: raw.chars().take(FAILURE_PREVIEW_CHARS).collect(),
    })
}

fn found(records: Vec<RawRecord>, strategy: Strategy) -> ActionBatch {
    debug!(?strategy, records = records.len(), "extracted action records");
    ActionBatch { records, strategy }
}

/// The outermost balanced object mentioning `"actions"`, or an unterminated
/// trailing object that does.
fn actions_candidate(body: &str) -> Option<&str> {
    let scan = scan_objects(body);
    scan.complete
        .into_iter()
        .find(|object| object.contains(ACTIONS_KEY))
        .or(scan.unterminated.filter(|tail| tail.contains(ACTIONS_KEY)))
}

fn parse_strict(text: &str) -> Option<Vec<RawRecord>> {
    let value: Value = serde_json::from_str(text).ok()?;
    records_from(value)
}

fn parse_relaxed(text: &str) -> Option<Vec<RawRecord>> {
    parse_strict(&relax(text))
}

fn parse_sanitized(text: &str) -> Option<Vec<RawRecord>> {
    let cleaned = sanitize_control_chars(text);
    parse_strict(&cleaned).or_else(|| parse_relaxed(&cleaned))
}

fn parse_truncation_repaired(text: &str) -> Option<Vec<RawRecord>> {
    let repaired = repair_truncation(&sanitize_control_chars(text))?;
    parse_strict(&repaired).or_else(|| parse_relaxed(&repaired))
}

/// Parse with every text-level fix short of truncation repair.
fn parse_value_leniently(text: &str) -> Option<Value> {
    let attempt = |candidate: &str| serde_json::from_str::<Value>(candidate).ok();
    attempt(text).or_else(|| attempt(&relax(text))).or_else(|| {
        let cleaned = sanitize_control_chars(text);
        attempt(&cleaned).or_else(|| attempt(&relax(&cleaned)))
    })
}

/// Records from a parsed payload: an `actions` list anywhere in the object
/// tree, a top-level list of records, or a single action-shaped object.
fn records_from(value: Value) -> Option<Vec<RawRecord>> {
    match value {
        Value::Object(mut map) => {
            if let Some(actions) = map.remove("actions") {
                return match actions {
                    Value::Array(items) => Some(objects_in(items)),
                    Value::Object(single) => Some(vec![single]),
                    _ => None,
                };
            }
            if looks_like_action(&map) {
                return Some(vec![map]);
            }
            map.into_iter()
                .filter(|(_, nested)| nested.is_object())
                .find_map(|(_, nested)| records_from(nested))
        }
        Value::Array(items) => {
            let records = objects_in(items);
            (!records.is_empty() && records.iter().all(looks_like_action)).then_some(records)
        }
        _ => None,
    }
}

fn objects_in(items: Vec<Value>) -> Vec<RawRecord> {
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect()
}

/// Parse each top-level object independently and merge what they carry.
fn collect_objects(raw: &str) -> Option<Vec<RawRecord>> {
    let mut records = Vec::new();
    for text in scan_objects(raw).complete {
        let Some(Value::Object(map)) = parse_value_leniently(text) else {
            continue;
        };
        if map.contains_key("actions") {
            records.extend(records_from(Value::Object(map)).unwrap_or_default());
        } else if looks_like_action(&map) {
            records.push(canonicalize_record(&map));
        }
    }
    (!records.is_empty()).then_some(records)
}

/// Last resort: cut the text after `"actions": [` up to its closing bracket
/// and keep every object inside that parses on its own.
fn salvage_actions_fragment(raw: &str) -> Option<Vec<RawRecord>> {
    let found = ACTIONS_ARRAY_RE.find(raw)?;
    let fragment = bracketed_from(raw, found.end() - 1);
    let scan = scan_objects(&fragment[1..]);

    let mut records: Vec<RawRecord> = scan
        .complete
        .into_iter()
        .filter_map(|text| match parse_value_leniently(text) {
            Some(Value::Object(map)) => Some(map),
            _ => None,
        })
        .collect();

    if let Some(tail) = scan.unterminated
        && let Some(repaired) = repair_truncation(&sanitize_control_chars(tail))
        && let Some(Value::Object(map)) = parse_value_leniently(&repaired)
    {
        records.push(map);
    }

    let records: Vec<RawRecord> = records
        .into_iter()
        .map(|map| {
            if looks_like_action(&map) {
                canonicalize_record(&map)
            } else {
                map
            }
        })
        .collect();
    (!records.is_empty()).then_some(records)
}
