//! Command-line input resolution and the interactive loop.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::debug;

use crate::core::mode::Mode;
use crate::io::context::{DESIGN_EXTENSION, design_files, primary_design_file};
use crate::io::prompt::DesignDoc;
use crate::pipeline::Session;

pub const CRAFT_ALL_REQUEST: &str = "Implement the design(s) from the loaded design files.";
pub const CRAFT_ONE_REQUEST: &str = "Implement the design from the loaded design file.";

pub const CRAFT_USAGE: &str = "No .design files found in the working directory.
Usage:
  mender craft                    # implement every .design file here
  mender craft project.design     # implement one design file
  mender craft \"your prompt\"      # craft code from a prompt";

/// Words that leave the interactive loop.
const EXIT_WORDS: &[&str] = &["exit", "quit", "q"];

/// Where the request comes from once arguments are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestSource {
    Given(String),
    /// `code` mode without input.
    Interactive,
    /// Any other mode without input.
    Stdin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub source: RequestSource,
    pub designs: Vec<DesignDoc>,
}

/// Turn positional input into a request and the design documents to load.
pub fn resolve_invocation(mode: Mode, input: &[String], cwd: &Path) -> Result<Invocation> {
    let joined = input.join(" ").trim().to_string();
    match mode {
        Mode::Craft => resolve_craft(input, &joined, cwd),
        Mode::Design => {
            let designs = match primary_design_file(cwd)? {
                Some(path) => vec![load_design(&path, cwd)?],
                None => Vec::new(),
            };
            Ok(Invocation {
                source: given_or(&joined, RequestSource::Stdin),
                designs,
            })
        }
        Mode::Code => Ok(Invocation {
            source: given_or(&joined, RequestSource::Interactive),
            designs: Vec::new(),
        }),
        Mode::Debug | Mode::Test => Ok(Invocation {
            source: given_or(&joined, RequestSource::Stdin),
            designs: Vec::new(),
        }),
    }
}

fn given_or(joined: &str, fallback: RequestSource) -> RequestSource {
    if joined.is_empty() {
        fallback
    } else {
        RequestSource::Given(joined.to_string())
    }
}

fn resolve_craft(input: &[String], joined: &str, cwd: &Path) -> Result<Invocation> {
    if joined.is_empty() {
        let paths = design_files(cwd)?;
        if paths.is_empty() {
            bail!("{CRAFT_USAGE}");
        }
        let designs = paths
            .iter()
            .map(|path| load_design(path, cwd))
            .collect::<Result<Vec<_>>>()?;
        return Ok(Invocation {
            source: RequestSource::Given(CRAFT_ALL_REQUEST.to_string()),
            designs,
        });
    }

    let first = cwd.join(&input[0]);
    let is_design = first.is_file() && first.extension().is_some_and(|ext| ext == DESIGN_EXTENSION);
    if !is_design {
        return Ok(Invocation {
            source: RequestSource::Given(joined.to_string()),
            designs: Vec::new(),
        });
    }

    let rest = input[1..].join(" ").trim().to_string();
    let request = if rest.is_empty() {
        CRAFT_ONE_REQUEST.to_string()
    } else {
        rest
    };
    Ok(Invocation {
        source: RequestSource::Given(request),
        designs: vec![load_design(&first, cwd)?],
    })
}

fn load_design(path: &Path, cwd: &Path) -> Result<DesignDoc> {
    let content =
        fs::read_to_string(path).with_context(|| format!("read design {}", path.display()))?;
    let relative = path.strip_prefix(cwd).unwrap_or(path);
    debug!(path = %relative.display(), "loaded design");
    Ok(DesignDoc {
        path: relative.to_string_lossy().replace('\\', "/"),
        content,
    })
}

/// Read prompts line by line until EOF or an exit word, printing each turn's
/// summary with `print`.
///
/// `read_line` must not hold stdin between calls: delete confirmations read
/// from the same stream.
pub fn run_interactive(
    session: &mut Session<'_>,
    mut read_line: impl FnMut(&mut String) -> std::io::Result<usize>,
    mut prompt: impl FnMut(),
    mut print: impl FnMut(&str),
) -> Result<()> {
    loop {
        prompt();
        let mut line = String::new();
        let read = match read_line(&mut line) {
            Ok(read) => read,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e).context("read request"),
        };
        if read == 0 {
            return Ok(());
        }
        let request = line.trim();
        if request.is_empty() {
            continue;
        }
        if EXIT_WORDS.contains(&request.to_ascii_lowercase().as_str()) {
            return Ok(());
        }
        let outcome = session.process(request);
        print(&outcome.render());
    }
}
