//! `mender`: a local LLM coding agent that repairs its own failed commands.
//!
//! Sends the request plus project context to a local model, turns the reply
//! into file and shell actions, applies them, and re-prompts in debug mode
//! until failed commands pass or the repair budget runs out.

use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use mender::cli::{RequestSource, resolve_invocation, run_interactive};
use mender::core::mode::Mode;
use mender::execute::{ExecSettings, Tools};
use mender::exit_codes;
use mender::io::backend::CommandBackend;
use mender::io::config::{MODEL_ENV, default_config_path, load_config};
use mender::io::confirm::StdinConfirmer;
use mender::io::context::ProjectContext;
use mender::io::files::LocalFs;
use mender::io::observer::{ConsoleObserver, Observer};
use mender::io::prompt::{PromptBuilder, PromptLimits};
use mender::io::shell::SystemShell;
use mender::logging;
use mender::pipeline::{PipelineSettings, Session};

#[derive(Parser)]
#[command(
    name = "mender",
    version,
    about = "Local AI coding agent with automatic repair of failed commands"
)]
struct Cli {
    /// Operating mode.
    #[arg(value_enum)]
    mode: Mode,

    /// Request text. Without it, `code` starts an interactive session and
    /// other modes read the request from stdin.
    input: Vec<String>,

    /// Working directory (default: current directory).
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Config file (default: `<cwd>/.mender/config.toml`).
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::FATAL);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let cwd = match cli.cwd {
        Some(dir) => dir,
        None => std::env::current_dir().context("resolve current directory")?,
    };
    let cwd = cwd
        .canonicalize()
        .with_context(|| format!("working directory {}", cwd.display()))?;

    let config_path = cli.config.unwrap_or_else(|| default_config_path(&cwd));
    let config = load_config(&config_path)?.with_model_override(std::env::var(MODEL_ENV).ok());

    let backend = CommandBackend {
        command: config.backend.command.clone(),
        model: config.model.clone(),
        workdir: cwd.clone(),
        timeout: config.backend_timeout(),
        output_limit_bytes: config.output_limit_bytes,
    };
    if let Err(err) = backend.probe() {
        eprintln!(
            "Error: backend `{}` is not available: {:#}",
            config.backend.command.join(" "),
            err
        );
        return Ok(exit_codes::FATAL);
    }

    let invocation = resolve_invocation(cli.mode, &cli.input, &cwd)?;
    let observer = ConsoleObserver;
    for design in &invocation.designs {
        observer.diagnostic(&format!("Loaded design file: {}", design.path));
    }

    let shell = SystemShell {
        output_limit_bytes: config.output_limit_bytes,
    };
    let files = LocalFs::new(&cwd);
    let confirmer = StdinConfirmer;
    let tools = Tools {
        backend: &backend,
        shell: &shell,
        files: &files,
        confirmer: &confirmer,
        observer: &observer,
    };
    let settings = PipelineSettings {
        exec: ExecSettings {
            cwd: cwd.clone(),
            command_timeout: config.command_timeout(),
            backup: config.backup,
        },
        max_repair_iterations: config.max_repair_iterations,
    };
    let prompts = PromptBuilder::new(PromptLimits {
        file_limit: config.context_file_limit,
        truncate_chars: config.context_truncate_chars,
        history_limit: config.history_limit,
    });
    let context = ProjectContext::new(&cwd, config.context_max_file_bytes);
    let mut session =
        Session::new(tools, &settings, &prompts, cli.mode, context).with_designs(invocation.designs);

    info!(mode = %session.mode(), model = %config.model, cwd = %cwd.display(), "session ready");

    match invocation.source {
        RequestSource::Given(request) => {
            println!("{}", session.process(&request).render());
        }
        RequestSource::Interactive => {
            eprintln!("AI coding agent (mode: {})", cli.mode);
            eprintln!("Working directory: {}", cwd.display());
            eprintln!("Model: {}", config.model);
            eprintln!("Type 'exit' or 'quit' to leave\n");
            run_interactive(
                &mut session,
                |line| std::io::stdin().read_line(line),
                || {
                    eprint!("agent> ");
                    let _ = std::io::stderr().flush();
                },
                |summary| println!("{summary}\n"),
            )?;
        }
        RequestSource::Stdin => {
            eprintln!("AI agent (mode: {})", cli.mode);
            eprintln!("Working directory: {}", cwd.display());
            eprintln!("Model: {}", config.model);
            eprintln!("Enter your request (Ctrl+D to finish):");
            let mut request = String::new();
            std::io::stdin()
                .lock()
                .read_to_string(&mut request)
                .context("read request from stdin")?;
            let request = request.trim();
            if !request.is_empty() {
                println!("{}", session.process(request).render());
            }
        }
    }

    Ok(exit_codes::OK)
}
