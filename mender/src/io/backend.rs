//! Language-model backend abstraction.
//!
//! The [`Backend`] trait decouples the pipeline from the program that answers
//! prompts (by default `ollama run <model>`). Tests use scripted backends that
//! return predetermined replies without spawning processes.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::process::run_command_with_timeout;

/// What the backend process produced for one prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendReply {
    /// Exit status; `None` when the process was killed.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl BackendReply {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.status == Some(0)
    }

    /// Reason shown to the user when the reply is unusable.
    pub fn failure_reason(&self) -> String {
        if self.timed_out {
            return "backend timed out".to_string();
        }
        let code = self
            .status
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("backend exited with status {code}")
        } else {
            format!("backend exited with status {code}: {stderr}")
        }
    }
}

/// Abstraction over prompt-answering backends.
pub trait Backend {
    /// Send one prompt and return the raw reply.
    fn generate(&self, prompt: &str) -> Result<BackendReply>;
}

/// Backend that spawns a local command and feeds the prompt on stdin.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    /// Program and leading arguments, e.g. `["ollama", "run"]`.
    pub command: Vec<String>,
    /// Model name appended as the final argument.
    pub model: String,
    pub workdir: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl CommandBackend {
    fn program(&self) -> Result<&str> {
        self.command
            .first()
            .map(String::as_str)
            .ok_or_else(|| anyhow!("backend command is empty"))
    }

    /// Check that the backend program runs at all (`<program> --version`).
    #[instrument(skip_all)]
    pub fn probe(&self) -> Result<()> {
        let program = self.program()?;
        let mut cmd = Command::new(program);
        cmd.arg("--version").current_dir(&self.workdir);
        let output = run_command_with_timeout(cmd, None, Duration::from_secs(10), 4096)
            .with_context(|| format!("probe backend {program}"))?;
        if output.timed_out || !output.status.success() {
            return Err(anyhow!(
                "backend {program} --version exited with status {:?}",
                output.status.code()
            ));
        }
        debug!(program, "backend available");
        Ok(())
    }
}

impl Backend for CommandBackend {
    #[instrument(skip_all, fields(model = %self.model, timeout_secs = self.timeout.as_secs()))]
    fn generate(&self, prompt: &str) -> Result<BackendReply> {
        let program = self.program()?;
        info!(prompt_bytes = prompt.len(), "querying backend");

        let mut cmd = Command::new(program);
        cmd.args(&self.command[1..])
            .arg(&self.model)
            .current_dir(&self.workdir);

        let output = run_command_with_timeout(
            cmd,
            Some(prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .with_context(|| format!("run backend {program}"))?;

        let reply = BackendReply {
            status: output.status.code(),
            stdout: output.stdout_text(),
            stderr: output.stderr_text(),
            timed_out: output.timed_out,
        };
        if !reply.succeeded() {
            warn!(exit_code = ?reply.status, timed_out = reply.timed_out, "backend failed");
        }
        Ok(reply)
    }
}
