//! Shell command adapter used by `run` actions and repair verification.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::io::process::run_command_with_timeout;

/// Captured result of one shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutput {
    /// Exit code; `None` when the command was killed.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.code == Some(0)
    }

    /// Combined stdout and stderr, trimmed.
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr).trim().to_string()
    }
}

pub trait Shell {
    fn run(&self, command: &str, cwd: &Path, timeout: Duration) -> Result<ShellOutput>;
}

/// Runs commands through `sh -c`.
#[derive(Debug, Clone)]
pub struct SystemShell {
    pub output_limit_bytes: usize,
}

impl Shell for SystemShell {
    #[instrument(skip_all, fields(command = %command, timeout_secs = timeout.as_secs()))]
    fn run(&self, command: &str, cwd: &Path, timeout: Duration) -> Result<ShellOutput> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).current_dir(cwd);
        let output = run_command_with_timeout(cmd, None, timeout, self.output_limit_bytes)
            .with_context(|| format!("run shell command {command}"))?;
        debug!(exit_code = ?output.status.code(), "shell command finished");
        Ok(ShellOutput {
            code: output.status.code(),
            stdout: output.stdout_text(),
            stderr: output.stderr_text(),
            timed_out: output.timed_out,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_in_requested_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("marker.txt"), "here").expect("write");
        let shell = SystemShell {
            output_limit_bytes: 1024,
        };
        let out = shell
            .run("cat marker.txt", temp.path(), Duration::from_secs(10))
            .expect("run");
        assert!(out.success());
        assert_eq!(out.combined(), "here");
    }

    #[test]
    fn failing_command_keeps_exit_code_and_stderr() {
        let temp = tempfile::tempdir().expect("tempdir");
        let shell = SystemShell {
            output_limit_bytes: 1024,
        };
        let out = shell
            .run("echo bad >&2; exit 2", temp.path(), Duration::from_secs(10))
            .expect("run");
        assert_eq!(out.code, Some(2));
        assert_eq!(out.combined(), "bad");
    }

    /// Verifies the timeout holds for commands that fork instead of exec.
    #[test]
    fn timeout_holds_for_compound_commands() {
        let temp = tempfile::tempdir().expect("tempdir");
        let shell = SystemShell {
            output_limit_bytes: 1024,
        };
        let started = std::time::Instant::now();
        let out = shell
            .run("sleep 8; echo done", temp.path(), Duration::from_secs(1))
            .expect("run");
        assert!(out.timed_out);
        assert!(!out.success());
        assert_eq!(out.code, None);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
