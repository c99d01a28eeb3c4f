//! Todo list shown before a batch is executed.

use crate::core::types::{Action, ActionKind};

const PREVIEW_CHARS: usize = 60;

/// One line per action, numbered in execution order.
pub fn todo_list(actions: &[Action]) -> Vec<String> {
    actions
        .iter()
        .enumerate()
        .map(|(idx, action)| format!("{}. {}", idx + 1, describe(action)))
        .collect()
}

fn describe(action: &Action) -> String {
    match action.kind {
        ActionKind::Create => format!("Create {}", action.target),
        ActionKind::Edit => format!("Edit {}", action.target),
        ActionKind::Delete => format!("Delete {}", action.target),
        ActionKind::Run => format!("Run `{}`", action.target),
        ActionKind::Message => format!("Say: {}", preview(&action.content)),
    }
}

fn preview(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    if first_line.chars().count() > PREVIEW_CHARS || text.trim().lines().count() > 1 {
        let cut: String = first_line.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        first_line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_actions_in_order() {
        let actions = vec![
            Action::new(ActionKind::Create, "a.txt", "x"),
            Action::new(ActionKind::Run, "cat a.txt", ""),
            Action::message("done\nmore"),
        ];
        assert_eq!(
            todo_list(&actions),
            vec!["1. Create a.txt", "2. Run `cat a.txt`", "3. Say: done..."]
        );
    }
}
