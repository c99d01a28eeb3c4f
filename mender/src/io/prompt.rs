//! Prompt rendering for backend turns and repair requests.

use std::collections::BTreeMap;

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::core::mode::Mode;
use crate::core::types::{Exchange, FailedCommand};

const TURN_TEMPLATE: &str = include_str!("prompts/turn.md");
const REPAIR_TEMPLATE: &str = include_str!("prompts/repair.md");
const SCHEMA_INSTRUCTIONS: &str = include_str!("prompts/modes/schema.md");

const RULE: &str = "================================================================================";
const TRUNCATED_MARKER: &str = "\n... (truncated)";

fn mode_instructions(mode: Mode) -> &'static str {
    match mode {
        Mode::Code => include_str!("prompts/modes/code.md"),
        Mode::Design => include_str!("prompts/modes/design.md"),
        Mode::Craft => include_str!("prompts/modes/craft.md"),
        Mode::Debug => include_str!("prompts/modes/debug.md"),
        Mode::Test => include_str!("prompts/modes/test.md"),
    }
}

/// How much project context and history goes into one prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptLimits {
    pub file_limit: usize,
    pub truncate_chars: usize,
    pub history_limit: usize,
}

/// A loaded design document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DesignDoc {
    pub path: String,
    pub content: String,
}

/// Everything one turn prompt is built from.
#[derive(Debug, Clone, Copy)]
pub struct TurnInputs<'a> {
    pub mode: Mode,
    pub request: &'a str,
    pub files: &'a BTreeMap<String, String>,
    pub designs: &'a [DesignDoc],
    pub history: &'a [Exchange],
}

#[derive(Debug, Serialize)]
struct FileEntry<'a> {
    path: &'a str,
    content: String,
}

/// Template engine wrapper around minijinja.
pub struct PromptBuilder {
    env: Environment<'static>,
    limits: PromptLimits,
}

impl PromptBuilder {
    pub fn new(limits: PromptLimits) -> Self {
        let mut env = Environment::new();
        env.add_template("turn", TURN_TEMPLATE)
            .expect("turn template should be valid");
        env.add_template("repair", REPAIR_TEMPLATE)
            .expect("repair template should be valid");
        Self { env, limits }
    }

    pub fn render_turn(&self, input: &TurnInputs<'_>) -> Result<String> {
        let listed: Vec<(&String, &String)> = input
            .files
            .iter()
            .filter(|(path, _)| !input.designs.iter().any(|d| &d.path == *path))
            .collect();
        let omitted = listed.len().saturating_sub(self.limits.file_limit);
        let files: Vec<FileEntry<'_>> = listed
            .into_iter()
            .take(self.limits.file_limit)
            .map(|(path, content)| FileEntry {
                path,
                content: truncate_chars(content, self.limits.truncate_chars),
            })
            .collect();

        let skip = input.history.len().saturating_sub(self.limits.history_limit);
        let history = &input.history[skip..];

        let instructions = format!(
            "{}\n{}",
            mode_instructions(input.mode).trim_end(),
            SCHEMA_INSTRUCTIONS.trim_end()
        );

        let template = self.env.get_template("turn")?;
        let rendered = template.render(context! {
            instructions => &instructions,
            rule => RULE,
            files => &files,
            omitted => omitted,
            designs => input.designs,
            craft => input.mode == Mode::Craft,
            history => history,
            request => input.request.trim(),
        })?;
        debug!(
            mode = %input.mode,
            files = files.len(),
            omitted,
            history = history.len(),
            bytes = rendered.len(),
            "rendered turn prompt"
        );
        Ok(rendered)
    }

    /// Diagnostic request handed to the nested repair pass.
    pub fn render_repair(&self, failures: &[FailedCommand]) -> Result<String> {
        let template = self.env.get_template("repair")?;
        Ok(template.render(context! { failures => failures })?)
    }
}

fn truncate_chars(content: &str, limit: usize) -> String {
    match content.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}{TRUNCATED_MARKER}", &content[..cut]),
        None => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder(file_limit: usize, truncate_chars: usize, history_limit: usize) -> PromptBuilder {
        PromptBuilder::new(PromptLimits {
            file_limit,
            truncate_chars,
            history_limit,
        })
    }

    fn exchange(n: usize) -> Exchange {
        Exchange {
            user: format!("request {n}"),
            assistant: format!("summary {n}"),
        }
    }

    /// Verifies file listing limits, truncation and the trailing directive.
    #[test]
    fn turn_prompt_limits_context() {
        let mut files = BTreeMap::new();
        files.insert("a.py".to_string(), "x".repeat(20));
        files.insert("b.py".to_string(), "short".to_string());
        files.insert("c.py".to_string(), "hidden".to_string());

        let prompt = builder(2, 10, 5)
            .render_turn(&TurnInputs {
                mode: Mode::Code,
                request: "add a test",
                files: &files,
                designs: &[],
                history: &[],
            })
            .expect("render");

        assert!(prompt.contains("--- a.py ---\nxxxxxxxxxx\n... (truncated)"));
        assert!(prompt.contains("--- b.py ---\nshort"));
        assert!(!prompt.contains("--- c.py ---"));
        assert!(prompt.contains("... and 1 more files"));
        assert!(prompt.contains("CURRENT REQUEST:"));
        assert!(prompt.contains("add a test"));
        assert!(prompt.trim_end().ends_with("Respond with JSON actions only:"));
        assert!(!prompt.contains("CONVERSATION HISTORY"));
    }

    /// Verifies only the most recent exchanges are included.
    #[test]
    fn turn_prompt_keeps_last_history_entries() {
        let history: Vec<Exchange> = (1..=4).map(exchange).collect();
        let prompt = builder(10, 100, 2)
            .render_turn(&TurnInputs {
                mode: Mode::Code,
                request: "next",
                files: &BTreeMap::new(),
                designs: &[],
                history: &history,
            })
            .expect("render");
        assert!(!prompt.contains("request 2"));
        assert!(prompt.contains("User: request 3\nAssistant: summary 3"));
        assert!(prompt.contains("request 4"));
        assert!(!prompt.contains("PROJECT CONTEXT"));
    }

    /// Verifies craft mode presents designs as the primary instruction.
    #[test]
    fn craft_prompt_leads_with_designs() {
        let mut files = BTreeMap::new();
        files.insert("shop.design".to_string(), "A shop.".to_string());
        let designs = vec![DesignDoc {
            path: "shop.design".to_string(),
            content: "A shop.".to_string(),
        }];
        let prompt = builder(10, 100, 5)
            .render_turn(&TurnInputs {
                mode: Mode::Craft,
                request: "Implement the designs.",
                files: &files,
                designs: &designs,
                history: &[],
            })
            .expect("render");
        assert!(prompt.contains("PRIMARY INSTRUCTION: IMPLEMENT THE DESIGN(S) BELOW"));
        assert_eq!(prompt.matches("--- shop.design ---").count(), 1);
        assert!(prompt.contains("implementation guide"));
    }

    #[test]
    fn repair_prompt_lists_every_failure() {
        let failures = vec![
            FailedCommand {
                command: "python app.py".to_string(),
                purpose: "run app".to_string(),
                error_text: "ModuleNotFoundError: flask".to_string(),
            },
            FailedCommand {
                command: "pytest".to_string(),
                purpose: "tests".to_string(),
                error_text: "exit 1".to_string(),
            },
        ];
        let prompt = builder(1, 1, 1).render_repair(&failures).expect("render");
        assert!(prompt.starts_with("The following commands failed."));
        assert!(prompt.contains("Command: python app.py\nPurpose: run app\nError: ModuleNotFoundError: flask"));
        assert!(prompt.contains("Command: pytest"));
    }

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_chars("héllo", 2), "hé\n... (truncated)");
        assert_eq!(truncate_chars("hi", 2), "hi");
    }
}
