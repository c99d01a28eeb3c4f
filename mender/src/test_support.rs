//! Test-only collaborators and a scratch workspace.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;

use crate::core::mode::Mode;
use crate::execute::{ActionExecutor, ExecSettings, Tools};
use crate::io::backend::{Backend, BackendReply};
use crate::io::confirm::Confirmer;
use crate::io::context::ProjectContext;
use crate::io::files::LocalFs;
use crate::io::observer::Observer;
use crate::io::prompt::{PromptBuilder, PromptLimits};
use crate::io::shell::SystemShell;
use crate::pipeline::{PipelineSettings, Session};

/// Backend that answers from a queue and records every prompt.
///
/// Once the queue is empty it replies with exit status 1.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    replies: RefCell<VecDeque<BackendReply>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedBackend {
    /// Queue a successful reply with `stdout` as the model text.
    pub fn push(&self, stdout: impl Into<String>) {
        self.replies.borrow_mut().push_back(BackendReply {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
            timed_out: false,
        });
    }

    /// Queue a failed reply.
    pub fn push_failure(&self, status: i32, stderr: impl Into<String>) {
        self.replies.borrow_mut().push_back(BackendReply {
            status: Some(status),
            stdout: String::new(),
            stderr: stderr.into(),
            timed_out: false,
        });
    }

    pub fn calls(&self) -> usize {
        self.prompts.borrow().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl Backend for ScriptedBackend {
    fn generate(&self, prompt: &str) -> Result<BackendReply> {
        self.prompts.borrow_mut().push(prompt.to_string());
        Ok(self
            .replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| BackendReply {
                status: Some(1),
                stdout: String::new(),
                stderr: "no scripted reply left".to_string(),
                timed_out: false,
            }))
    }
}

/// Confirmer that always gives the same answer. `None` acts like EOF.
#[derive(Debug, Default)]
pub struct ScriptedConfirmer {
    answer: Option<String>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedConfirmer {
    pub fn answering(answer: Option<&str>) -> Self {
        Self {
            answer: answer.map(str::to_string),
            prompts: RefCell::default(),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl Confirmer for ScriptedConfirmer {
    fn ask(&self, prompt: &str) -> Result<Option<String>> {
        self.prompts.borrow_mut().push(prompt.to_string());
        Ok(self.answer.clone())
    }
}

/// Observer that keeps everything it is shown.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    diagnostics: RefCell<Vec<String>>,
    messages: RefCell<Vec<String>>,
}

impl RecordingObserver {
    pub fn diagnostics(&self) -> Vec<String> {
        self.diagnostics.borrow().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.borrow().clone()
    }
}

impl Observer for RecordingObserver {
    fn diagnostic(&self, text: &str) {
        self.diagnostics.borrow_mut().push(text.to_string());
    }

    fn message(&self, text: &str) {
        self.messages.borrow_mut().push(text.to_string());
    }
}

/// Temporary working directory wired to real shell and filesystem
/// collaborators and a scripted backend.
pub struct TestWorkspace {
    dir: TempDir,
    pub backend: ScriptedBackend,
    pub shell: SystemShell,
    pub files: LocalFs,
    pub observer: RecordingObserver,
    pub settings: PipelineSettings,
    pub prompts: PromptBuilder,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp workspace");
        let root = dir.path().to_path_buf();
        Self {
            backend: ScriptedBackend::default(),
            shell: SystemShell {
                output_limit_bytes: 64 * 1024,
            },
            files: LocalFs::new(&root),
            observer: RecordingObserver::default(),
            settings: PipelineSettings {
                exec: ExecSettings {
                    cwd: root,
                    command_timeout: Duration::from_secs(10),
                    backup: true,
                },
                max_repair_iterations: 5,
            },
            prompts: PromptBuilder::new(PromptLimits {
                file_limit: 50,
                truncate_chars: 5000,
                history_limit: 5,
            }),
            dir,
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, rel: &str, content: &str) {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(path, content).expect("write workspace file");
    }

    pub fn read(&self, rel: &str) -> Option<String> {
        fs::read_to_string(self.path().join(rel)).ok()
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.path().join(rel).exists()
    }

    pub fn context(&self) -> ProjectContext {
        ProjectContext::new(self.path(), 300 * 1024)
    }

    pub fn tools<'a>(&'a self, confirmer: &'a dyn Confirmer) -> Tools<'a> {
        Tools {
            backend: &self.backend,
            shell: &self.shell,
            files: &self.files,
            confirmer,
            observer: &self.observer,
        }
    }

    pub fn executor_with<'a>(&'a self, confirmer: &'a dyn Confirmer) -> ActionExecutor<'a> {
        ActionExecutor::new(self.tools(confirmer), &self.settings.exec)
    }

    pub fn session<'a>(&'a self, mode: Mode, confirmer: &'a dyn Confirmer) -> Session<'a> {
        Session::new(
            self.tools(confirmer),
            &self.settings,
            &self.prompts,
            mode,
            self.context(),
        )
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}
