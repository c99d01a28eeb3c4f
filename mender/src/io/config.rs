//! Agent configuration stored under `.mender/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Environment variable that overrides [`AgentConfig::model`].
pub const MODEL_ENV: &str = "LOCAL_AI_MODEL";

/// Default config location relative to the working directory.
pub fn default_config_path(cwd: &Path) -> PathBuf {
    cwd.join(".mender").join("config.toml")
}

/// Agent configuration (TOML).
///
/// Missing fields take the defaults below, so an empty file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Model name passed to the backend command.
    pub model: String,

    /// Wall-clock budget for one backend call in seconds.
    pub backend_timeout_secs: u64,

    /// Wall-clock budget for one `run` action in seconds.
    pub command_timeout_secs: u64,

    /// Stdout/stderr kept in memory per child process.
    pub output_limit_bytes: usize,

    /// Repair iterations before a session is exhausted.
    pub max_repair_iterations: u32,

    /// Prior exchanges included in each prompt.
    pub history_limit: usize,

    /// Project files included in each prompt.
    pub context_file_limit: usize,

    /// Files larger than this are left out of the project context.
    pub context_max_file_bytes: u64,

    /// Characters of each file shown in the prompt.
    pub context_truncate_chars: usize,

    /// Copy files to `<path>.backup` before overwriting or deleting.
    pub backup: bool,

    pub backend: BackendConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackendConfig {
    /// Program and leading arguments; the model name is appended.
    pub command: Vec<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            command: vec!["ollama".to_string(), "run".to_string()],
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "qwen2.5-coder:14b".to_string(),
            backend_timeout_secs: 300,
            command_timeout_secs: 120,
            output_limit_bytes: 200_000,
            max_repair_iterations: 5,
            history_limit: 5,
            context_file_limit: 50,
            context_max_file_bytes: 300 * 1024,
            context_truncate_chars: 5000,
            backup: true,
            backend: BackendConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(anyhow!("model must be non-empty"));
        }
        if self.backend_timeout_secs == 0 {
            return Err(anyhow!("backend_timeout_secs must be > 0"));
        }
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.context_max_file_bytes == 0 {
            return Err(anyhow!("context_max_file_bytes must be > 0"));
        }
        if self.backend.command.is_empty() || self.backend.command[0].trim().is_empty() {
            return Err(anyhow!("backend.command must be a non-empty array"));
        }
        Ok(())
    }

    /// Replace the model when the override is set and non-blank.
    pub fn with_model_override(mut self, model: Option<String>) -> Self {
        if let Some(model) = model.filter(|m| !m.trim().is_empty()) {
            self.model = model.trim().to_string();
        }
        self
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AgentConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
