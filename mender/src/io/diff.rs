//! Unified diffs for `edit` previews.

use similar::{ChangeTag, TextDiff};

/// Lines of unchanged context around each hunk.
pub const CONTEXT_LINES: usize = 3;

/// Render a unified diff of `old` → `new`, labelled with `path`.
///
/// Returns an empty string when the contents are identical.
pub fn unified(path: &str, old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    if diff.iter_all_changes().all(|c| c.tag() == ChangeTag::Equal) {
        return String::new();
    }
    diff.unified_diff()
        .context_radius(CONTEXT_LINES)
        .header(&format!("a/{path}"), &format!("b/{path}"))
        .to_string()
}

/// Count inserted and deleted lines.
pub fn line_stats(old: &str, new: &str) -> (usize, usize) {
    let diff = TextDiff::from_lines(old, new);
    diff.iter_all_changes()
        .fold((0, 0), |(ins, del), change| match change.tag() {
            ChangeTag::Insert => (ins + 1, del),
            ChangeTag::Delete => (ins, del + 1),
            ChangeTag::Equal => (ins, del),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_headers_and_changed_lines() {
        let diff = unified("app.py", "a\nb\nc\n", "a\nB\nc\n");
        assert!(diff.starts_with("--- a/app.py\n+++ b/app.py\n"));
        assert!(diff.contains("-b\n"));
        assert!(diff.contains("+B\n"));
        assert_eq!(line_stats("a\nb\nc\n", "a\nB\nc\n"), (1, 1));
    }

    #[test]
    fn identical_content_has_no_diff() {
        assert_eq!(unified("x", "same\n", "same\n"), "");
    }
}
