//! Escape-aware text scanning for JSON-like payloads.
//!
//! Every routine here is a single forward pass driven by [`ScanState`], so
//! braces, brackets, comment markers and control bytes are only interpreted
//! outside quoted strings.

/// Lexical position of the scanner relative to JSON string literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Normal,
    InString,
    /// Inside a string, immediately after a backslash.
    Escaped,
}

impl ScanState {
    /// Advance over one character.
    pub fn step(self, ch: char) -> ScanState {
        match self {
            ScanState::Normal if ch == '"' => ScanState::InString,
            ScanState::Normal => ScanState::Normal,
            ScanState::InString => match ch {
                '\\' => ScanState::Escaped,
                '"' => ScanState::Normal,
                _ => ScanState::InString,
            },
            ScanState::Escaped => ScanState::InString,
        }
    }
}

/// Balanced `{...}` objects found at the top level of a text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectScan<'a> {
    /// Complete top-level objects in order of appearance.
    pub complete: Vec<&'a str>,
    /// A trailing object whose closing brace never arrived.
    pub unterminated: Option<&'a str>,
}

/// Find top-level balanced objects using brace-depth counting.
///
/// String tracking starts at the opening brace, so quotes in surrounding prose
/// cannot desynchronize the scan.
pub fn scan_objects(text: &str) -> ObjectScan<'_> {
    let mut scan = ObjectScan::default();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut state = ScanState::Normal;

    for (idx, ch) in text.char_indices() {
        if depth == 0 {
            if ch == '{' {
                depth = 1;
                start = idx;
                state = ScanState::Normal;
            }
            continue;
        }
        let was = state;
        state = state.step(ch);
        if was != ScanState::Normal {
            continue;
        }
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    scan.complete.push(&text[start..idx + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    if depth > 0 {
        scan.unterminated = Some(&text[start..]);
    }
    scan
}

/// Return the text inside a leading code fence, or the input unchanged.
///
/// Only a fence that opens before the first `{` counts as a wrapper; fences
/// inside string values (e.g. markdown file contents) are left alone.
pub fn strip_code_fence(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text;
    };
    if text.find('{').is_some_and(|brace| brace < open) {
        return text;
    }

    let after = &text[open + 3..];
    let line_end = after.find('\n').unwrap_or(after.len());
    let tag = after[..line_end].trim();
    let body = if tag
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        after.get(line_end + 1..).unwrap_or("")
    } else {
        after
    };

    match body.rfind("```") {
        Some(close) if !body[close..].contains('}') => &body[..close],
        _ => body,
    }
}

/// Characters JSON forbids unescaped inside strings.
fn is_json_control(ch: char) -> bool {
    ch < ' '
}

/// Escape raw newline, carriage return and tab bytes inside string values and
/// drop every other byte below U+0020 found there. DEL and C1 characters are
/// legal in JSON strings and pass through, as does text outside strings.
pub fn sanitize_control_chars(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut state = ScanState::Normal;

    for ch in text.chars() {
        let was = state;
        state = state.step(ch);
        if !is_json_control(ch) || was == ScanState::Normal {
            out.push(ch);
            continue;
        }
        match (was, ch) {
            (ScanState::InString, '\n') => out.push_str("\\n"),
            (ScanState::InString, '\r') => out.push_str("\\r"),
            (ScanState::InString, '\t') => out.push_str("\\t"),
            // The backslash is already written; complete the escape.
            (ScanState::Escaped, '\n') => out.push('n'),
            (ScanState::Escaped, '\r') => out.push('r'),
            (ScanState::Escaped, '\t') => out.push('t'),
            (ScanState::Escaped, _) => out.push('\\'),
            _ => {}
        }
    }
    out
}

/// Remove `//` and `/* */` comments and trailing commas outside strings.
pub fn relax(text: &str) -> String {
    strip_trailing_commas(&strip_comments(text))
}

fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut state = ScanState::Normal;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if state == ScanState::Normal && ch == '/' {
            match chars.peek() {
                Some('/') => {
                    while chars.next_if(|next| *next != '\n').is_some() {}
                    continue;
                }
                Some('*') => {
                    chars.next();
                    let mut prev = '\0';
                    for next in chars.by_ref() {
                        if prev == '*' && next == '/' {
                            break;
                        }
                        prev = next;
                    }
                    continue;
                }
                _ => {}
            }
        }
        state = state.step(ch);
        out.push(ch);
    }
    out
}

fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut state = ScanState::Normal;

    for (idx, &ch) in chars.iter().enumerate() {
        let was = state;
        state = state.step(ch);
        if was == ScanState::Normal && ch == ',' {
            let next = chars[idx + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(ch);
    }
    out
}

/// Close a truncated payload: terminate an open string, drop a dangling
/// separator and append the missing closers in nesting order.
///
/// Returns `None` when the text is already balanced and not inside a string.
pub fn repair_truncation(text: &str) -> Option<String> {
    let mut state = ScanState::Normal;
    let mut closers: Vec<char> = Vec::new();

    for ch in text.chars() {
        let was = state;
        state = state.step(ch);
        if was != ScanState::Normal {
            continue;
        }
        match ch {
            '{' => closers.push('}'),
            '[' => closers.push(']'),
            '}' | ']' if closers.last() == Some(&ch) => {
                closers.pop();
            }
            _ => {}
        }
    }

    if closers.is_empty() && state == ScanState::Normal {
        return None;
    }

    let mut out = text.to_string();
    match state {
        ScanState::Escaped => {
            out.pop();
            out.push('"');
        }
        ScanState::InString => out.push('"'),
        ScanState::Normal => {}
    }

    out.truncate(out.trim_end().len());
    if out.ends_with(',') {
        out.pop();
    } else if out.ends_with(':') {
        out.push_str("null");
    }

    out.extend(closers.iter().rev());
    Some(out)
}

/// Slice from `open` (an index of `[`) through its matching `]`, or through
/// the end of the text when the bracket never closes.
pub fn bracketed_from(text: &str, open: usize) -> &str {
    let mut depth = 0usize;
    let mut state = ScanState::Normal;

    for (offset, ch) in text[open..].char_indices() {
        let was = state;
        state = state.step(ch);
        if was != ScanState::Normal {
            continue;
        }
        match ch {
            '[' => depth += 1,
            ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return &text[open..open + offset + 1];
                }
            }
            _ => {}
        }
    }
    &text[open..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_ignores_braces_inside_strings() {
        let text = r#"Sure! {"actions": [{"type": "create", "content": "fn main() { }"}]} done"#;
        let scan = scan_objects(text);
        assert_eq!(scan.complete.len(), 1);
        assert!(scan.complete[0].ends_with("}]}"));
        assert_eq!(scan.unterminated, None);
    }

    #[test]
    fn scan_reports_back_to_back_objects_and_open_tail() {
        let text = r#"{"a": 1} {"b": "}"} {"c": ["#;
        let scan = scan_objects(text);
        assert_eq!(scan.complete, vec![r#"{"a": 1}"#, r#"{"b": "}"}"#]);
        assert_eq!(scan.unterminated, Some(r#"{"c": ["#));
    }

    #[test]
    fn prose_quotes_do_not_flip_string_state() {
        let text = r#"The "plan is: {"actions": []}"#;
        let scan = scan_objects(text);
        assert_eq!(scan.complete, vec![r#"{"actions": []}"#]);
    }

    #[test]
    fn strip_fence_removes_language_tag_and_closing_fence() {
        let text = "Here you go:\n```json\n{\"actions\": []}\n```\nthanks";
        assert_eq!(strip_code_fence(text).trim(), "{\"actions\": []}");
    }

    #[test]
    fn strip_fence_leaves_fences_inside_values_alone() {
        let text = "{\"actions\": [{\"content\": \"```bash\\nls\\n```\"}]}";
        assert_eq!(strip_code_fence(text), text);
    }

    #[test]
    fn sanitize_escapes_whitespace_controls_in_strings_only() {
        let text = "{\"a\": \"line1\nline2\tx\r\u{1}\"}\n";
        assert_eq!(
            sanitize_control_chars(text),
            "{\"a\": \"line1\\nline2\\tx\\r\"}\n"
        );
    }

    #[test]
    fn sanitize_keeps_del_and_c1_characters() {
        let text = "{\"a\": \"x\u{7f}y\u{85}z\n\"}";
        assert_eq!(
            sanitize_control_chars(text),
            "{\"a\": \"x\u{7f}y\u{85}z\\n\"}"
        );
    }

    #[test]
    fn sanitize_respects_escaped_quotes() {
        let text = "{\"a\": \"say \\\"hi\\\"\nnext\"}";
        assert_eq!(
            sanitize_control_chars(text),
            "{\"a\": \"say \\\"hi\\\"\\nnext\"}"
        );
    }

    #[test]
    fn relax_drops_comments_and_trailing_commas() {
        let text = "{\n  // note\n  \"a\": [1, 2,], /* block */ \"b\": \"http://x, ]\",\n}";
        let relaxed = relax(text);
        let value: serde_json::Value = serde_json::from_str(&relaxed).expect("parse relaxed");
        assert_eq!(value["b"], "http://x, ]");
        assert_eq!(value["a"], serde_json::json!([1, 2]));
    }

    #[test]
    fn repair_closes_string_and_appends_closers() {
        let text = r#"{"actions": [{"type": "create", "target": "a.txt", "content": "hel"#;
        let repaired = repair_truncation(text).expect("needs repair");
        assert_eq!(
            repaired,
            r#"{"actions": [{"type": "create", "target": "a.txt", "content": "hel"}]}"#
        );
    }

    #[test]
    fn repair_drops_dangling_backslash_and_comma() {
        assert_eq!(
            repair_truncation(r#"{"a": "x\"#).as_deref(),
            Some(r#"{"a": "x"}"#)
        );
        assert_eq!(
            repair_truncation(r#"{"a": 1, "#).as_deref(),
            Some(r#"{"a": 1}"#)
        );
        assert_eq!(
            repair_truncation(r#"{"a":"#).as_deref(),
            Some(r#"{"a":null}"#)
        );
    }

    #[test]
    fn repair_returns_none_for_balanced_text() {
        assert_eq!(repair_truncation(r#"{"a": "}"}"#), None);
    }

    #[test]
    fn bracketed_from_stops_at_matching_bracket() {
        let text = r#"x "actions": [{"t": "]"}, [1]] tail"#;
        let open = text.find('[').expect("bracket");
        assert_eq!(bracketed_from(text, open), r#"[{"t": "]"}, [1]]"#);
    }
}
