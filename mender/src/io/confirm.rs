//! Interactive confirmation for destructive actions.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};

/// The only answer that lets a destructive action proceed.
pub const CONFIRM_WORD: &str = "yes";

pub trait Confirmer {
    /// Show `prompt` and return the raw answer, or `None` on EOF or interrupt.
    fn ask(&self, prompt: &str) -> Result<Option<String>>;
}

/// Whether an answer grants confirmation.
pub fn is_confirmed(answer: Option<&str>) -> bool {
    answer.is_some_and(|a| a.trim().eq_ignore_ascii_case(CONFIRM_WORD))
}

/// Prompts on stderr and reads one line from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinConfirmer;

impl Confirmer for StdinConfirmer {
    fn ask(&self, prompt: &str) -> Result<Option<String>> {
        let mut err = std::io::stderr().lock();
        write!(err, "{prompt} ").context("write confirmation prompt")?;
        err.flush().context("flush confirmation prompt")?;

        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(line)),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(e).context("read confirmation"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_yes_confirms() {
        assert!(is_confirmed(Some("yes\n")));
        assert!(is_confirmed(Some("  YES ")));
        assert!(!is_confirmed(Some("y")));
        assert!(!is_confirmed(Some("yes please")));
        assert!(!is_confirmed(None));
    }
}
